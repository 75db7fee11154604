use crate::Error;

/// Maximum number of data bytes carried by one SYN packet.
pub const PAYLOAD: usize = 256;

/// Sliding window width, in packets. Fixed at 32 because the ACK bitmap is a
/// single u32 — one bit per window slot.
pub const WINDOW: u32 = 32;

const TYPE_SYN: u8 = 0x01;
const TYPE_ACK: u8 = 0x02;
const TYPE_FIN: u8 = 0x03;

/// One RCP wire frame. A UDP datagram carries exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RCPPacket {
    /// Data-bearing packet. `data` is 1..=PAYLOAD bytes.
    Syn { seq: u32, data: Vec<u8> },
    /// Cumulative base plus a 32-slot bitmap of held receive-window packets.
    Ack { seq: u32, acks: u32 },
    /// End-of-stream marker.
    Fin { seq: u32 },
}

impl RCPPacket {
    pub fn seq(&self) -> u32 {
        match self {
            RCPPacket::Syn { seq, .. } => *seq,
            RCPPacket::Ack { seq, .. } => *seq,
            RCPPacket::Fin { seq } => *seq,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            RCPPacket::Syn { seq, data } => {
                let mut buf = Vec::with_capacity(5 + data.len());
                buf.push(TYPE_SYN);
                buf.extend_from_slice(&seq.to_be_bytes());
                buf.extend_from_slice(data);
                buf
            }
            RCPPacket::Ack { seq, acks } => {
                let mut buf = Vec::with_capacity(9);
                buf.push(TYPE_ACK);
                buf.extend_from_slice(&seq.to_be_bytes());
                buf.extend_from_slice(&acks.to_be_bytes());
                buf
            }
            RCPPacket::Fin { seq } => {
                let mut buf = Vec::with_capacity(5);
                buf.push(TYPE_FIN);
                buf.extend_from_slice(&seq.to_be_bytes());
                buf
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < 5 {
            return Err(Error::MalformedPacket("frame shorter than a header"));
        }

        let seq = u32::from_be_bytes(buf[1..5].try_into().unwrap());

        match buf[0] {
            TYPE_SYN => {
                let data = &buf[5..];
                if data.is_empty() || data.len() > PAYLOAD {
                    return Err(Error::MalformedPacket("syn payload out of bounds"));
                }
                Ok(RCPPacket::Syn {
                    seq,
                    data: data.to_vec(),
                })
            }
            TYPE_ACK => {
                if buf.len() != 9 {
                    return Err(Error::MalformedPacket("ack frame wrong length"));
                }
                let acks = u32::from_be_bytes(buf[5..9].try_into().unwrap());
                Ok(RCPPacket::Ack { seq, acks })
            }
            TYPE_FIN => {
                if buf.len() != 5 {
                    return Err(Error::MalformedPacket("fin carries no data"));
                }
                Ok(RCPPacket::Fin { seq })
            }
            _ => Err(Error::MalformedPacket("unknown packet type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_syn() {
        let p = RCPPacket::Syn {
            seq: 42,
            data: b"Hello, world!".to_vec(),
        };
        assert_eq!(
            p.encode(),
            b"\x01\x00\x00\x00\x2aHello, world!".to_vec()
        );
    }

    #[test]
    fn encode_ack() {
        let mut acks = 0u32;
        for i in 0..16 {
            acks |= 1 << i;
        }
        let p = RCPPacket::Ack { seq: 42, acks };
        assert_eq!(p.encode(), b"\x02\x00\x00\x00\x2a\x00\x00\xff\xff".to_vec());
    }

    #[test]
    fn encode_fin() {
        let p = RCPPacket::Fin { seq: 7 };
        assert_eq!(p.encode(), vec![0x03, 0, 0, 0, 7]);
    }

    #[test]
    fn decode_syn() {
        let encoded = b"\x01\x00\x00\x00\x2aHello, world!";
        let p = RCPPacket::decode(encoded).unwrap();
        assert_eq!(
            p,
            RCPPacket::Syn {
                seq: 42,
                data: b"Hello, world!".to_vec(),
            }
        );
    }

    #[test]
    fn decode_ack() {
        let encoded = b"\x02\x00\x00\x00\x2a\x00\x00\xff\xff";
        let p = RCPPacket::decode(encoded).unwrap();
        let mut acks = 0u32;
        for i in 0..16 {
            acks |= 1 << i;
        }
        assert_eq!(p, RCPPacket::Ack { seq: 42, acks });
    }

    #[test]
    fn round_trip_all_kinds() {
        let packets = vec![
            RCPPacket::Syn {
                seq: 0,
                data: vec![1, 2, 3],
            },
            RCPPacket::Syn {
                seq: u32::MAX,
                data: vec![0xff; PAYLOAD],
            },
            RCPPacket::Ack {
                seq: 1000,
                acks: 0xdead_beef,
            },
            RCPPacket::Fin { seq: 99 },
        ];
        for p in packets {
            assert_eq!(RCPPacket::decode(&p.encode()).unwrap(), p);
        }
    }

    #[test]
    fn decode_rejects_empty_syn() {
        let encoded = [TYPE_SYN, 0, 0, 0, 0];
        assert!(matches!(
            RCPPacket::decode(&encoded),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn decode_rejects_oversize_syn() {
        let mut encoded = vec![TYPE_SYN, 0, 0, 0, 0];
        encoded.extend(vec![0u8; PAYLOAD + 1]);
        assert!(matches!(
            RCPPacket::decode(&encoded),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn decode_rejects_short_ack() {
        let encoded = [TYPE_ACK, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            RCPPacket::decode(&encoded),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let encoded = [0x7f, 0, 0, 0, 0];
        assert!(matches!(
            RCPPacket::decode(&encoded),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn decode_rejects_fin_with_trailing_bytes() {
        let encoded = [TYPE_FIN, 0, 0, 0, 1, 0xaa];
        assert!(matches!(
            RCPPacket::decode(&encoded),
            Err(Error::MalformedPacket(_))
        ));
    }
}

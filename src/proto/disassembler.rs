use std::collections::VecDeque;

use super::packet::{RCPPacket, PAYLOAD};

/// Splits an outgoing byte stream into fixed-size, sequence-numbered SYN
/// packets. Packets are produced in order and handed out one at a time so a
/// sender can stop pulling once its window is full without losing track of
/// where it left off.
pub struct Disassembler {
    /// Complete packets waiting to be sent, oldest first.
    ready: VecDeque<RCPPacket>,
    /// Sequence number the next packet appended to `ready` will carry.
    next_seq: u32,
    /// Bytes written but not yet sliced into a full PAYLOAD-sized packet.
    pending: Vec<u8>,
}

impl Disassembler {
    pub fn new(start_seq: u32) -> Self {
        Disassembler {
            ready: VecDeque::new(),
            next_seq: start_seq,
            pending: Vec::new(),
        }
    }

    /// Sequence number the next packet produced will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Claim the next sequence number for a packet built outside the normal
    /// `append`/`flush` path (a FIN), without producing a SYN packet for it.
    pub fn reserve_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    /// Buffer `data`, slicing off complete PAYLOAD-sized packets as they
    /// accumulate. Does not force a short final packet — call `flush` for
    /// that.
    pub fn append(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= PAYLOAD {
            let chunk: Vec<u8> = self.pending.drain(..PAYLOAD).collect();
            self.push_syn(chunk);
        }
    }

    /// Turn any partial buffered tail into a final, possibly short, packet.
    /// A no-op if nothing is buffered.
    pub fn flush(&mut self) {
        if !self.pending.is_empty() {
            let chunk = std::mem::take(&mut self.pending);
            self.push_syn(chunk);
        }
    }

    fn push_syn(&mut self, data: Vec<u8>) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.ready.push_back(RCPPacket::Syn { seq, data });
    }

    /// Buffer `data` and return any packets it completed, without forcing a
    /// short tail packet — a partial buffered remainder stays held until a
    /// later `write`/`append` tops it up or `flush` forces it out.
    /// Convenience wrapper combining `append` and `drain_ready` for callers
    /// that don't need to pull packets one at a time.
    pub fn write(&mut self, data: &[u8]) -> Vec<RCPPacket> {
        self.append(data);
        self.drain_ready()
    }

    /// Pull the oldest buffered packet without discarding it from the
    /// disassembler's bookkeeping — used by a sender that needs to re-offer
    /// a packet still sitting in its own retransmit queue.
    pub fn peek_next_packet(&self) -> Option<&RCPPacket> {
        self.ready.front()
    }

    /// Remove and return the oldest ready packet, if any.
    pub fn next_packet(&mut self) -> Option<RCPPacket> {
        self.ready.pop_front()
    }

    /// Remove and return all ready packets, oldest first.
    pub fn drain_ready(&mut self) -> Vec<RCPPacket> {
        self.ready.drain(..).collect()
    }

    /// Number of complete packets waiting to be picked up.
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Bytes buffered but not yet sliced into a packet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_splits_into_payload_sized_packets_and_holds_the_tail() {
        let mut d = Disassembler::new(0);
        let data = vec![b'x'; PAYLOAD * 2 + 10];
        let packets = d.write(&data);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].seq(), 0);
        assert_eq!(packets[1].seq(), 1);
        assert_eq!(d.pending_len(), 10);
    }

    #[test]
    fn write_short_message_buffers_without_flush() {
        let mut d = Disassembler::new(5);
        assert!(d.write(b"hello").is_empty());
        assert_eq!(d.pending_len(), 5);

        d.flush();
        let packets = d.drain_ready();
        assert_eq!(packets.len(), 1);
        assert_eq!(
            packets[0],
            RCPPacket::Syn {
                seq: 5,
                data: b"hello".to_vec(),
            }
        );
    }

    #[test]
    fn append_without_flush_holds_back_partial_tail() {
        let mut d = Disassembler::new(0);
        d.append(&vec![b'a'; PAYLOAD + 1]);
        assert_eq!(d.ready_len(), 1);
        assert_eq!(d.pending_len(), 1);
        d.flush();
        assert_eq!(d.ready_len(), 2);
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn next_packet_drains_one_at_a_time_in_order() {
        let mut d = Disassembler::new(100);
        d.append(&vec![b'z'; PAYLOAD * 3]);
        assert_eq!(d.next_packet().unwrap().seq(), 100);
        assert_eq!(d.next_packet().unwrap().seq(), 101);
        assert_eq!(d.ready_len(), 1);
    }

    #[test]
    fn breakdown_matches_spec_shape() {
        // Mirrors the spec's breakdown scenario (stated there at PAYLOAD=32
        // for a compact fixture): a write just under one payload produces
        // nothing yet; a second write crossing two more boundaries emits
        // packets for each full payload and holds the remainder; a final
        // finishing flush emits the residual plus an empty FIN marker.
        let mut d = Disassembler::new(0);
        assert!(d.write(&vec![b'h'; PAYLOAD - 1]).is_empty());
        assert_eq!(d.pending_len(), PAYLOAD - 1);

        let second = vec![b'e'; PAYLOAD * 2];
        d.append(&second);
        let produced = d.drain_ready();
        assert_eq!(produced.len(), 2);
        assert_eq!(produced[0].seq(), 0);
        assert_eq!(produced[1].seq(), 1);
        match &produced[0] {
            RCPPacket::Syn { data, .. } => {
                assert_eq!(data.len(), PAYLOAD);
                assert_eq!(&data[..PAYLOAD - 1], vec![b'h'; PAYLOAD - 1].as_slice());
                assert_eq!(data[PAYLOAD - 1], b'e');
            }
            _ => panic!("expected syn"),
        }
        assert_eq!(d.pending_len(), PAYLOAD - 1);
        assert_eq!(d.next_seq(), 2);

        d.flush();
        let fin_seq = d.reserve_seq();
        let tail = d.drain_ready();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq(), 2);
        match &tail[0] {
            RCPPacket::Syn { data, .. } => assert_eq!(data.len(), PAYLOAD - 1),
            _ => panic!("expected syn"),
        }
        assert_eq!(fin_seq, 3);
    }

    #[test]
    fn seq_wraps_past_u32_max() {
        let mut d = Disassembler::new(u32::MAX);
        let packets = d.write(&vec![b'a'; PAYLOAD * 2]);
        assert_eq!(packets[0].seq(), u32::MAX);
        assert_eq!(packets[1].seq(), 0);
    }
}

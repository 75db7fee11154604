use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::Error;

use super::assembler::Assembler;
use super::disassembler::Disassembler;
use super::packet::{RCPPacket, PAYLOAD, WINDOW};
use super::seq_advances;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
    Failed,
}

struct Inner {
    state: SessionState,
    /// Set once the application has called `close()`; no further bytes may
    /// be enqueued for sending from this point on.
    fin_sent: bool,
    disassembler: Disassembler,
    /// Oldest sent-but-unacked sequence number.
    send_base: u32,
    /// Sent packets awaiting acknowledgement, keyed by sequence number —
    /// this is the session's send queue, including the FIN packet itself
    /// once `close()` has queued one.
    inflight: BTreeMap<u32, RCPPacket>,
    assembler: Assembler,
    peer_fin_seq: Option<u32>,
    last_rx: Instant,
}

impl Inner {
    /// The peer's FIN has not just arrived but been fully drained: every
    /// byte before it has already reached the application, and the FIN's
    /// own sequence number has been folded into `recv_base` so our ACKs
    /// cover it.
    fn peer_fin_drained(&self) -> bool {
        self.peer_fin_seq
            .map(|seq| self.assembler.recv_base() == seq.wrapping_add(1))
            .unwrap_or(false)
    }

    /// If the peer's FIN sequence is known and `recv_base` has just reached
    /// it, fold it in — a FIN occupies one sequence number but carries no
    /// payload, so nothing in the assembler itself would otherwise advance
    /// past it. Must be called after anything that can move `recv_base`
    /// forward (an inbound SYN) and after the FIN itself is first recorded.
    fn try_consume_peer_fin(&mut self) {
        if let Some(seq) = self.peer_fin_seq {
            self.assembler.consume_marker(seq);
        }
    }

    fn outstanding(&self) -> usize {
        self.inflight.len()
    }

    /// Recompute the composite state from the four underlying facts
    /// (fin_sent, peer_fin_drained, send queue empty, failed), mirroring a
    /// session's lifecycle exactly rather than tracking ad hoc transitions.
    /// A no-op once `Failed` — that state only clears via a fresh session.
    fn recompute_state(&mut self) {
        if self.state == SessionState::Failed {
            return;
        }
        self.state = match (self.fin_sent, self.peer_fin_drained(), self.outstanding() == 0) {
            (true, true, true) => SessionState::Closed,
            (true, _, _) => SessionState::HalfClosedLocal,
            (false, true, _) => SessionState::HalfClosedRemote,
            (false, false, _) => SessionState::Open,
        };
    }
}

/// True if the in-flight packet at `seq` is covered by a receiver's
/// cumulative-base-plus-bitmap acknowledgement.
fn covered_by_ack(seq: u32, ack_base: u32, bitmap: u32) -> bool {
    if !seq_advances(ack_base, seq) {
        return true;
    }
    let offset = seq.wrapping_sub(ack_base);
    offset < WINDOW && (bitmap & (1 << offset)) != 0
}

/// One established RCP connection: a reliable, ordered, bidirectional byte
/// stream multiplexed over a single UDP socket via the owning [`Router`].
///
/// All blocking calls synchronize through one internal mutex plus a pair of
/// condvars (readable / writable), following the same pattern the teacher
/// uses to make its TCP stream reads and writes block without holding a lock
/// across I/O.
pub struct Session {
    peer: SocketAddr,
    inner: Mutex<Inner>,
    readable: Condvar,
    writable: Condvar,
    closed: Condvar,
}

impl Session {
    pub(crate) fn new(peer: SocketAddr, send_start: u32, recv_start: u32, now: Instant) -> Self {
        Session {
            peer,
            inner: Mutex::new(Inner {
                state: SessionState::Open,
                fin_sent: false,
                disassembler: Disassembler::new(send_start),
                send_base: send_start,
                inflight: BTreeMap::new(),
                assembler: Assembler::new(recv_start),
                peer_fin_seq: None,
                last_rx: now,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            closed: Condvar::new(),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_failed(&self) -> bool {
        self.inner.lock().unwrap().state == SessionState::Failed
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(
            self.inner.lock().unwrap().state,
            SessionState::Closed | SessionState::Failed
        )
    }

    /// Buffer `data` for transmission, blocking while the send window is
    /// full. Returns an error once the local side has already closed for
    /// sending or the session has failed.
    pub fn send(&self, data: &[u8]) -> Result<(), Error> {
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + PAYLOAD).min(data.len());
            let chunk = &data[offset..end];

            let mut inner = self.inner.lock().unwrap();
            if inner.fin_sent || inner.state == SessionState::Failed {
                return Err(Error::ClosedForSend);
            }

            inner = self
                .writable
                .wait_while(inner, |inner| {
                    inner.outstanding() >= WINDOW as usize
                        && inner.state != SessionState::Failed
                })
                .unwrap();

            if inner.state == SessionState::Failed {
                return Err(Error::ClosedForSend);
            }

            inner.disassembler.append(chunk);
            if end == data.len() {
                inner.disassembler.flush();
            }
            for packet in inner.disassembler.drain_ready() {
                inner.inflight.insert(packet.seq(), packet);
            }

            offset = end;
        }
        Ok(())
    }

    /// Return whatever bytes are currently assembled, blocking until there
    /// is something to hand back: new data, the peer's stream fully
    /// delivered, failure, or the local side itself having already closed.
    /// Mirrors `recv()` on a Unix socket: a single non-growing poll, not a
    /// read-to-completion.
    pub fn recv(&self) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        inner = self
            .readable
            .wait_while(inner, |inner| {
                inner.assembler.peek().is_empty()
                    && !inner.peer_fin_drained()
                    && inner.state != SessionState::Failed
                    && !inner.fin_sent
            })
            .unwrap();
        inner.assembler.drain()
    }

    /// Read until the peer's side of the stream is fully delivered (its FIN
    /// observed and every byte before it drained) or the session fails.
    /// Unlike `recv`, a local `close()` does not shortcut this call — it
    /// keeps collecting whatever the peer still has in flight.
    pub fn read(&self) -> Vec<u8> {
        let mut collected = Vec::new();
        loop {
            let mut inner = self.inner.lock().unwrap();
            inner = self
                .readable
                .wait_while(inner, |inner| {
                    inner.assembler.peek().is_empty()
                        && !inner.peer_fin_drained()
                        && inner.state != SessionState::Failed
                })
                .unwrap();
            collected.extend_from_slice(&inner.assembler.drain());
            let done = inner.peer_fin_drained() || inner.state == SessionState::Failed;
            drop(inner);
            if done {
                break;
            }
        }
        collected
    }

    /// Close the local side for sending: no further `send()` calls succeed,
    /// and a FIN is queued for transmission. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.fin_sent {
            return;
        }
        inner.fin_sent = true;
        let fin_seq = inner.disassembler.reserve_seq();
        inner.inflight.insert(fin_seq, RCPPacket::Fin { seq: fin_seq });
        inner.recompute_state();
        let done = inner.state == SessionState::Closed;
        drop(inner);
        self.readable.notify_all();
        self.writable.notify_all();
        if done {
            self.closed.notify_all();
        }
    }

    /// Block until the session reaches `Closed` or `Failed`.
    pub fn wait_closed(&self) {
        let inner = self.inner.lock().unwrap();
        let _ = self
            .closed
            .wait_while(inner, |inner| {
                !matches!(inner.state, SessionState::Closed | SessionState::Failed)
            })
            .unwrap();
    }

    /// Apply an inbound packet already known to belong to this session.
    pub(crate) fn on_packet(&self, packet: RCPPacket, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_rx = now;
        match packet {
            RCPPacket::Syn { seq, data } => {
                inner.assembler.offer(seq, &data);
                inner.try_consume_peer_fin();
                inner.recompute_state();
                let done = inner.state == SessionState::Closed;
                drop(inner);
                self.readable.notify_all();
                if done {
                    self.closed.notify_all();
                }
            }
            RCPPacket::Ack { seq, acks } => {
                if seq_advances(inner.send_base, seq) {
                    inner.send_base = seq;
                }
                inner.inflight.retain(|&s, _| !covered_by_ack(s, seq, acks));
                inner.recompute_state();
                let done = inner.state == SessionState::Closed;
                drop(inner);
                self.writable.notify_all();
                if done {
                    self.closed.notify_all();
                }
            }
            RCPPacket::Fin { seq } => {
                inner.peer_fin_seq = Some(seq);
                inner.try_consume_peer_fin();
                inner.recompute_state();
                let done = inner.state == SessionState::Closed;
                drop(inner);
                self.readable.notify_all();
                if done {
                    self.closed.notify_all();
                }
            }
        }
    }

    /// Periodic housekeeping: detect inactivity timeout and return the set
    /// of packets this session wants retransmitted or freshly sent this
    /// tick (in-flight data/FIN plus a current receiver-state ACK).
    pub(crate) fn tick(&self, now: Instant, timeout: Duration) -> Vec<RCPPacket> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SessionState::Failed {
            return Vec::new();
        }
        if now.duration_since(inner.last_rx) > timeout {
            inner.state = SessionState::Failed;
            drop(inner);
            self.readable.notify_all();
            self.writable.notify_all();
            self.closed.notify_all();
            return Vec::new();
        }

        let mut outgoing: Vec<RCPPacket> = inner.inflight.values().cloned().collect();
        outgoing.push(RCPPacket::Ack {
            seq: inner.assembler.recv_base(),
            acks: inner.assembler.bitmap(),
        });
        outgoing
    }
}

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use nix::poll::{poll, PollFd, PollFlags};

use crate::Error;

use super::packet::RCPPacket;
use super::session::Session;

/// Tunables for a [`Router`]'s background loops. Mirrors the defaults used
/// throughout the protocol's wire format: a 32-packet window serviced on a
/// fixed cadence, with a generous inactivity grace period before a session
/// is declared dead.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// How often the write loop re-evaluates every session's send window.
    pub tick_interval: Duration,
    /// How long a session may go without receiving anything before it is
    /// marked `Failed`.
    pub inactivity_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            tick_interval: Duration::from_millis(100),
            inactivity_timeout: Duration::from_secs(30),
        }
    }
}

/// The datagram transport a [`Router`] multiplexes sessions over. Exists so
/// tests can substitute a lossy wrapper around a real socket — the same way
/// the reference implementation's loss-injection harness wraps a real
/// socket rather than faking the network at a higher layer — without the
/// production path paying for an abstraction it doesn't need.
pub trait Transport: Send + Sync + 'static {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
    fn as_raw_fd(&self) -> RawFd;
}

impl Transport for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UdpSocket::set_nonblocking(self, nonblocking)
    }

    fn as_raw_fd(&self) -> RawFd {
        AsRawFd::as_raw_fd(self)
    }
}

struct Table {
    sessions: HashMap<SocketAddr, Arc<Session>>,
    accept_queue: VecDeque<Arc<Session>>,
    listening: bool,
}

/// Owns one UDP socket and every session multiplexed over it. Runs two
/// dedicated background threads for the lifetime of the router: a Read Loop
/// that demultiplexes inbound datagrams onto sessions, and a Write Loop that
/// drives retransmission and ACK generation on a fixed tick. Application
/// threads only ever touch the session table through the `Mutex` below, and
/// never hold it across a blocking socket call.
pub struct Router {
    socket: Arc<dyn Transport>,
    table: Arc<Mutex<Table>>,
    accept_cv: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    read_thread: Option<JoinHandle<()>>,
    write_thread: Option<JoinHandle<()>>,
}

impl Router {
    /// Bind a UDP socket at `addr` and start the router's background loops.
    pub fn bind<A: ToSocketAddrs>(addr: A, config: RouterConfig) -> Result<Self, Error> {
        let socket = UdpSocket::bind(addr).map_err(Error::BindFailed)?;
        Self::with_transport(socket, config)
    }

    /// Start the router's background loops over an arbitrary [`Transport`],
    /// for example a loss-injecting wrapper around a real `UdpSocket` used
    /// in tests. `set_nonblocking(true)` is called on the transport here;
    /// callers don't need to do it themselves.
    pub fn with_transport<T: Transport>(transport: T, config: RouterConfig) -> Result<Self, Error> {
        transport.set_nonblocking(true).map_err(Error::BindFailed)?;
        let socket: Arc<dyn Transport> = Arc::new(transport);

        let table = Arc::new(Mutex::new(Table {
            sessions: HashMap::new(),
            accept_queue: VecDeque::new(),
            listening: false,
        }));
        let accept_cv = Arc::new(Condvar::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let read_thread = {
            let socket = Arc::clone(&socket);
            let table = Arc::clone(&table);
            let accept_cv = Arc::clone(&accept_cv);
            let shutdown = Arc::clone(&shutdown);
            let tick = config.tick_interval;
            thread::Builder::new()
                .name("rcp-read-loop".into())
                .spawn(move || read_loop(socket, table, accept_cv, shutdown, tick))
                .expect("failed to spawn rcp read loop")
        };

        let write_thread = {
            let socket = Arc::clone(&socket);
            let table = Arc::clone(&table);
            let shutdown = Arc::clone(&shutdown);
            let tick = config.tick_interval;
            let timeout = config.inactivity_timeout;
            thread::Builder::new()
                .name("rcp-write-loop".into())
                .spawn(move || write_loop(socket, table, shutdown, tick, timeout))
                .expect("failed to spawn rcp write loop")
        };

        Ok(Router {
            socket,
            table,
            accept_cv,
            shutdown,
            read_thread: Some(read_thread),
            write_thread: Some(write_thread),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.socket.local_addr().map_err(Error::BindFailed)
    }

    /// Start accepting inbound connections from previously-unknown peers.
    /// Before this is called, datagrams from unknown addresses are dropped.
    pub fn listen(&self) {
        self.table.lock().unwrap().listening = true;
    }

    /// Block until an inbound peer has a session ready, or the router has
    /// been shut down.
    pub fn accept(&self) -> Option<Arc<Session>> {
        let table = self.table.lock().unwrap();
        let mut table = self
            .accept_cv
            .wait_while(table, |t| {
                t.accept_queue.is_empty() && !self.shutdown.load(Ordering::Acquire)
            })
            .unwrap();
        table.accept_queue.pop_front()
    }

    /// Open a session to `peer`. RCP has no handshake: the session is usable
    /// for `send`/`recv` as soon as this returns, and the first data it
    /// carries doubles as the peer's introduction to the connection.
    pub fn connect(&self, peer: SocketAddr) -> Arc<Session> {
        let mut table = self.table.lock().unwrap();
        Arc::clone(
            table
                .sessions
                .entry(peer)
                .or_insert_with(|| Arc::new(Session::new(peer, 0, 0, Instant::now()))),
        )
    }

    /// Number of sessions currently tracked by the router (for tests that
    /// want to confirm both ends finalized a close).
    pub fn session_count(&self) -> usize {
        self.table.lock().unwrap().sessions.len()
    }

    /// Stop the background loops and join them. Sessions already handed out
    /// keep their last state but no longer retransmit or receive.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.accept_cv.notify_all();
        if let Some(t) = self.read_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.write_thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(
    socket: Arc<dyn Transport>,
    table: Arc<Mutex<Table>>,
    accept_cv: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    tick: Duration,
) {
    let raw_fd = socket.as_raw_fd();
    let mut buf = [0u8; 2048];

    while !shutdown.load(Ordering::Acquire) {
        let mut fds = [PollFd::new(raw_fd, PollFlags::POLLIN)];
        match poll(&mut fds, tick.as_millis() as i32) {
            Ok(0) | Err(_) => continue,
            Ok(_) => {}
        }

        loop {
            let (n, peer) = match socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("rcp read loop: recv_from failed: {e}");
                    break;
                }
            };

            let packet = match RCPPacket::decode(&buf[..n]) {
                Ok(p) => p,
                Err(e) => {
                    debug!("rcp read loop: dropping malformed packet from {peer}: {e}");
                    continue;
                }
            };

            dispatch(&table, &accept_cv, peer, packet);
        }
    }
}

fn dispatch(table: &Mutex<Table>, accept_cv: &Condvar, peer: SocketAddr, packet: RCPPacket) {
    let session = {
        let mut table = table.lock().unwrap();
        if let Some(session) = table.sessions.get(&peer) {
            Arc::clone(session)
        } else if table.listening {
            let session = Arc::new(Session::new(peer, 0, 0, Instant::now()));
            table.sessions.insert(peer, Arc::clone(&session));
            table.accept_queue.push_back(Arc::clone(&session));
            accept_cv.notify_all();
            trace!("rcp read loop: accepted new session from {peer}");
            session
        } else {
            debug!("rcp read loop: dropping packet from unknown peer {peer} (not listening)");
            return;
        }
    };
    session.on_packet(packet, Instant::now());
}

fn write_loop(
    socket: Arc<dyn Transport>,
    table: Arc<Mutex<Table>>,
    shutdown: Arc<AtomicBool>,
    tick: Duration,
    timeout: Duration,
) {
    while !shutdown.load(Ordering::Acquire) {
        thread::sleep(tick);
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let sessions: Vec<Arc<Session>> = {
            let table = table.lock().unwrap();
            table.sessions.values().cloned().collect()
        };

        let mut terminal = Vec::new();
        for session in &sessions {
            let outgoing = session.tick(Instant::now(), timeout);
            for packet in outgoing {
                if let Err(e) = socket.send_to(&packet.encode(), session.peer_addr()) {
                    warn!(
                        "rcp write loop: send_to {} failed: {e}",
                        session.peer_addr()
                    );
                }
            }
            if session.is_terminal() {
                terminal.push(session.peer_addr());
            }
        }

        if !terminal.is_empty() {
            let mut table = table.lock().unwrap();
            for addr in terminal {
                table.sessions.remove(&addr);
            }
        }
    }
}

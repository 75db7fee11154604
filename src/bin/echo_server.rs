use std::env;
use std::sync::Arc;
use std::thread;

use log::{info, warn};
use rcp::{Router, RouterConfig, Session};

fn serve(session: Arc<Session>) {
    loop {
        let msg = session.recv();
        if msg.is_empty() {
            break;
        }
        if let Err(e) = session.send(&msg) {
            warn!("echo server: send to {} failed: {e}", session.peer_addr());
            break;
        }
    }
    session.close();
}

fn main() {
    rcp::logging::init(log::LevelFilter::Info);

    let addr = env::args().nth(1).unwrap_or_else(|| "0.0.0.0:9090".into());
    let router = Router::bind(&addr, RouterConfig::default()).expect("failed to bind");
    info!(
        "rcp echo server listening on {}",
        router.local_addr().unwrap()
    );
    router.listen();

    loop {
        let Some(session) = router.accept() else {
            break;
        };
        info!("accepted connection from {}", session.peer_addr());
        thread::spawn(move || serve(session));
    }
}

use std::env;
use std::net::ToSocketAddrs;

use log::info;
use rcp::{Router, RouterConfig};

fn main() {
    rcp::logging::init(log::LevelFilter::Info);

    let mut args = env::args().skip(1);
    let server = args
        .next()
        .expect("usage: rcp-echo-client <server addr> <message>");
    let message = args
        .next()
        .expect("usage: rcp-echo-client <server addr> <message>");

    let peer = server
        .to_socket_addrs()
        .expect("invalid server address")
        .next()
        .expect("server address resolved to nothing");

    let router = Router::bind("0.0.0.0:0", RouterConfig::default()).expect("failed to bind");
    let session = router.connect(peer);

    info!("sending {} bytes to {peer}", message.len());
    session.send(message.as_bytes()).expect("send failed");
    session.close();

    let reply = session.read();
    println!("{}", String::from_utf8_lossy(&reply));
}

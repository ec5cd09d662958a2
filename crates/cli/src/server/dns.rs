use std::sync::Arc;

use spuddns_infrastructure::dns::server::DnsServerHandler;
use tokio::net::UdpSocket;
use tracing::{error, info};

const MAX_QUERY_SIZE: usize = 4096;

/// Plain-DNS listener: one receive loop, one task per datagram so a slow
/// resolution never blocks the socket.
pub async fn run_dns_server(socket: UdpSocket, handler: Arc<DnsServerHandler>) {
    let socket = Arc::new(socket);
    if let Ok(addr) = socket.local_addr() {
        info!(listener = %addr, "dns server ready");
    }

    let mut buf = [0u8; MAX_QUERY_SIZE];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                error!(error = %e, "udp recv error");
                continue;
            }
        };

        let data = buf[..len].to_vec();
        let handler = handler.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            if let Some(reply) = handler.handle_raw(&data, from.ip()).await {
                let _ = socket.send_to(&reply, from).await;
            }
        });
    }
}

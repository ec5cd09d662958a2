use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use spuddns_infrastructure::dns::server::DnsServerHandler;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

/// Loads the DoT certificate and key. Failing here is fatal for the
/// process, not something to limp past.
pub fn load_tls_config(cert_path: &str, key_path: &str) -> Result<Arc<rustls::ServerConfig>> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut cert_reader = BufReader::new(
        File::open(cert_path).with_context(|| format!("unable to open certificate {cert_path}"))?,
    );
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificates from {cert_path}"))?;

    let mut key_reader = BufReader::new(
        File::open(key_path).with_context(|| format!("unable to open private key {key_path}"))?,
    );
    let key = rustls_pemfile::private_key(&mut key_reader)
        .with_context(|| format!("failed to parse private key from {key_path}"))?
        .ok_or_else(|| anyhow!("no usable private key found in {key_path}"))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid DoT certificate or key")?;
    config.alpn_protocols = vec![b"dot".to_vec()];

    Ok(Arc::new(config))
}

/// DNS-over-TLS listener: TLS handshake per connection, then standard
/// 2-byte length-prefixed DNS frames.
pub async fn run_dot_server(
    listener: TcpListener,
    tls_config: Arc<rustls::ServerConfig>,
    handler: Arc<DnsServerHandler>,
) {
    let acceptor = TlsAcceptor::from(tls_config);
    if let Ok(addr) = listener.local_addr() {
        info!(listener = %addr, "dns over tls server ready");
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "failed to accept dot connection");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_dot_connection(acceptor, stream, handler).await {
                warn!(peer = %peer, error = %e, "dot connection terminated");
            }
        });
    }
}

async fn handle_dot_connection(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    handler: Arc<DnsServerHandler>,
) -> Result<()> {
    let peer_ip = stream.peer_addr().context("peer address unavailable")?.ip();
    let mut tls_stream = acceptor
        .accept(stream)
        .await
        .context("tls handshake failed")?;

    loop {
        let mut len_buf = [0u8; 2];
        match tls_stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("failed to read dot frame length"),
        }

        let len = u16::from_be_bytes(len_buf) as usize;
        if len == 0 {
            continue;
        }

        let mut payload = vec![0u8; len];
        tls_stream
            .read_exact(&mut payload)
            .await
            .context("failed to read dot frame payload")?;

        if let Some(reply) = handler.handle_raw(&payload, peer_ip).await {
            write_dot_frame(&mut tls_stream, &reply).await?;
        }
    }

    Ok(())
}

async fn write_dot_frame(stream: &mut TlsStream<TcpStream>, payload: &[u8]) -> Result<()> {
    if payload.len() >= u16::MAX as usize {
        anyhow::bail!("dns message exceeds dot frame size limit");
    }
    stream
        .write_u16(payload.len() as u16)
        .await
        .context("failed to write dot frame length")?;
    stream
        .write_all(payload)
        .await
        .context("failed to write dot frame payload")?;
    stream.flush().await.context("failed to flush dot frame")
}

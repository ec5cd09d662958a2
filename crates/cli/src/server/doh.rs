use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use spuddns_application::use_cases::ResolveQueryUseCase;
use spuddns_infrastructure::dns::server::http::doh_router;
use tokio::net::TcpListener;
use tracing::info;

/// DNS-over-HTTP listener.
pub async fn run_doh_server(
    listener: TcpListener,
    use_case: Arc<ResolveQueryUseCase>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(listener = %addr, "dns over http server ready");
    }

    let router = doh_router(use_case);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("dns over http server terminated unexpectedly")
}

//! Dashboard Module
//!
//! Read-only liveness and status endpoints over the monitor's status board.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use crate::monitor::SharedBoard;

/// Start the liveness server
pub async fn start_server(board: SharedBoard, bind_addr: &str) -> anyhow::Result<()> {
    let app = create_router(board);
    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid dashboard bind address {:?}: {}", bind_addr, e))?;

    tracing::info!("🖥️ Dashboard API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

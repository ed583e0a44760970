//! Keepalive HTTP endpoint for hosting platforms that ping the bot.

use std::net::{Ipv4Addr, SocketAddr};

use axum::routing::get;
use axum::Router;
use tracing::info;

async fn root() -> &'static str {
    "Bot is running!"
}

/// Serve `GET /` on the given port until the process exits.
pub async fn serve(port: u16) -> Result<(), std::io::Error> {
    let app = Router::new().route("/", get(root));
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Keepalive endpoint on http://{addr}");
    axum::serve(listener, app).await
}

use rustyextract::{
    api::{self, SourcePolicy},
    config,
    extraction::Extractor,
    logging,
};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();
    let extractor = Extractor::from_config(config)?;
    let sources = SourcePolicy::from_config(config)?;
    let app = api::create_router(Arc::new(extractor), sources);

    let (listener, port) = bind_listener(config.server_host).await?;
    tracing::info!("Listening on http://{}:{}", config.server_host, port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bind_listener(host: IpAddr) -> Result<(TcpListener, u16), std::io::Error> {
    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((host, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4300..=4399;
    for port in PORT_RANGE {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4300-4399",
    ))
}

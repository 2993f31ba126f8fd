//! Relay server implementation
//!
//! Builds the axum app (WebSocket relay, static files, health probe, optional
//! basic-auth gate) and runs it next to the relay hub.

use axum::{middleware, routing::get, Router};
use remoto_core::{Config, Credentials};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::basic_auth_middleware;
use crate::handler::relay_handler;
use crate::hub::{RelayHandle, RelayHub};
use crate::Result;

/// Shared state handed to every request
#[derive(Clone)]
pub struct RelayState {
    /// Sender side of the relay hub
    pub relay: RelayHandle,
    /// Directory served for plain HTTP requests
    pub static_dir: Arc<PathBuf>,
    /// Basic-auth credentials, if the gate is enabled
    pub credentials: Option<Arc<Credentials>>,
}

impl RelayState {
    pub fn new(relay: RelayHandle, config: &Config) -> Self {
        Self {
            relay,
            static_dir: Arc::new(config.static_dir.clone()),
            credentials: config.credentials().map(Arc::new),
        }
    }
}

/// Build the HTTP surface
pub fn build_router(state: RelayState) -> Router {
    let mut router = Router::new()
        .route("/health", get(|| async { "OK" }))
        .fallback(relay_handler);

    if state.credentials.is_some() {
        info!("Basic authentication enabled");
        router = router.layer(middleware::from_fn_with_state(
            state.clone(),
            basic_auth_middleware,
        ));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve the relay on an already-bound listener until the server fails
pub async fn serve(listener: TcpListener, config: &Config) -> Result<()> {
    let sweep_interval = Some(Duration::from_secs(config.sweep_interval_secs));
    let (hub, relay) = RelayHub::new(sweep_interval);
    let hub_task = tokio::spawn(hub.run());

    let app = build_router(RelayState::new(relay, config));

    info!("Listening on {}", listener.local_addr()?);
    let result = axum::serve(listener, app).await;

    hub_task.abort();
    Ok(result?)
}

/// Bind `0.0.0.0:<port>` and serve the relay
pub async fn start_relay_server(config: &Config) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Serving static files from: {}", config.static_dir.display());
    serve(listener, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_config() {
        let (_hub, relay) = RelayHub::new(None);
        let config = Config {
            user: Some("admin".to_string()),
            password: Some("secret".to_string()),
            static_dir: PathBuf::from("www"),
            ..Default::default()
        };
        let state = RelayState::new(relay, &config);
        assert_eq!(*state.static_dir, PathBuf::from("www"));
        assert_eq!(
            state.credentials.as_deref(),
            Some(&Credentials::new("admin", "secret"))
        );
    }

    #[test]
    fn test_state_without_credentials() {
        let (_hub, relay) = RelayHub::new(None);
        let state = RelayState::new(relay, &Config::default());
        assert!(state.credentials.is_none());
    }
}

//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Networking API surface for LAN clients."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mrit_device::{CommandDispatcher, CommandResult};
use mrit_registry::{DeviceEntry, DeviceRegistry, DeviceUpdate};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub mod command;
pub mod host;

pub use command::{parse_command, ValidationError};
pub use host::{GatewayHost, SiteStatus};
pub use mrit_registry::DEFAULT_DEVICE_NAME;

/// Routes served by the gateway, for startup banners.
pub const ROUTES: [(&str, &str, &str); 3] = [
    ("GET", "/status", "site status"),
    ("GET", "/devices", "registered devices"),
    ("POST", "/command", "send a power command to a device"),
];

/// Shared API state exposed to handlers.
pub struct ApiState {
    registry: Arc<DeviceRegistry>,
    dispatcher: CommandDispatcher,
}

impl ApiState {
    pub fn new(registry: Arc<DeviceRegistry>, dispatcher: CommandDispatcher) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    fn status(&self) -> StatusResponse {
        let meta = self.registry.site_metadata();
        StatusResponse {
            status: "ok".to_owned(),
            site_name: meta.site_name,
            devices_count: meta.device_count,
            port: meta.http_port,
        }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    running: watch::Receiver<bool>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// True until the serve loop returns, for any reason.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Resolve once the serve loop has returned.
    pub async fn closed(&self) {
        let mut running = self.running.clone();
        let _ = running.wait_for(|running| !*running).await;
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Build the gateway router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/status", get(get_status).fallback(route_not_found))
        .route("/devices", get(get_devices).fallback(route_not_found))
        .route("/command", post(post_command).fallback(route_not_found))
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve the API on the current tokio runtime.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let app = router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (running_tx, running_rx) = watch::channel(true);
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        let outcome = axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        let _ = running_tx.send(false);
        if let Err(err) = outcome {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        info!(address = %addr, "api server stopped");
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        running: running_rx,
        task: handle,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub site_name: String,
    pub devices_count: usize,
    pub port: u16,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            success: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(state.status())
}

async fn get_devices(State(state): State<Arc<ApiState>>) -> Json<Vec<DeviceEntry>> {
    Json(state.registry.list())
}

async fn post_command(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<CommandResult>, ApiError> {
    let command = parse_command(&body).inspect_err(|err| {
        warn!(error = %err, "rejected command request");
    })?;

    // The record is stored before dispatch and regardless of the outcome.
    let saved = state.registry.upsert(DeviceUpdate {
        device_id: command.device_id.clone(),
        name: command.device_name.clone(),
        local_key: command.local_key.clone(),
        lan_ip: command.lan_ip.clone(),
        version: command.version,
    });
    if !saved {
        warn!(device_id = %command.device_id, "device not persisted; dispatching anyway");
    }

    Ok(Json(state.dispatcher.send(&command).await))
}

async fn route_not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "route not found")
}

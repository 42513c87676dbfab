//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Networking API surface for LAN clients."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
//! Background runtime that keeps the API alive beside a foreground host.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::{spawn_api_server, ApiState};

/// Snapshot reported to the foreground host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub site_name: String,
    pub http_port: u16,
    pub devices_count: usize,
    pub running: bool,
}

/// Runs the API server on a dedicated thread with its own runtime.
#[derive(Debug)]
pub struct GatewayHost {
    state: Arc<ApiState>,
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl GatewayHost {
    /// Bind `addr` and start serving. Returns once the listener is accepting
    /// connections, or with the bind error.
    pub fn start(state: Arc<ApiState>, addr: SocketAddr) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr>>();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread_state = Arc::clone(&state);
        let thread_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("mrit-api".into())
            .spawn(move || serve(thread_state, addr, thread_running, ready_tx, stop_rx))
            .context("failed to spawn API thread")?;

        let bound = match ready_rx.recv() {
            Ok(Ok(bound)) => bound,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(anyhow!("API thread exited before reporting readiness"));
            }
        };

        info!(address = %bound, "gateway host started");
        Ok(Self {
            state,
            addr: bound,
            running,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Address actually bound, useful when started on port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SiteStatus {
        let meta = self.state.registry().site_metadata();
        SiteStatus {
            site_name: meta.site_name,
            http_port: meta.http_port,
            devices_count: meta.device_count,
            running: self.is_running(),
        }
    }

    /// Stop the server and wait for the API thread to exit.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("API thread panicked");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for GatewayHost {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

fn serve(
    state: Arc<ApiState>,
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<SocketAddr>>,
    stop: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(anyhow!(err).context("failed to build API runtime")));
            return;
        }
    };

    runtime.block_on(async move {
        let server = match spawn_api_server(state, addr) {
            Ok(server) => server,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        running.store(true, Ordering::SeqCst);
        let _ = ready.send(Ok(server.addr()));

        tokio::select! {
            _ = stop => {}
            _ = server.closed() => {
                warn!(address = %server.addr(), "api server stopped unexpectedly");
            }
        }
        if let Err(err) = server.shutdown().await {
            error!(error = %err, "api server shutdown failed");
        }
        running.store(false, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrit_device::{CommandDispatcher, SimulatedConnector};
    use mrit_registry::{ConfigStore, DeviceRegistry, DeviceUpdate};
    use std::net::TcpListener;

    fn state(dir: &tempfile::TempDir) -> Arc<ApiState> {
        let store = ConfigStore::new(dir.path().join("local_config.json"));
        let registry = Arc::new(DeviceRegistry::open(store).unwrap());
        let dispatcher = CommandDispatcher::new(Arc::new(SimulatedConnector::new()), "Host Site");
        Arc::new(ApiState::new(registry, dispatcher))
    }

    #[test]
    fn start_status_stop() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let mut host = GatewayHost::start(Arc::clone(&state), "127.0.0.1:0".parse().unwrap())
            .unwrap();
        assert!(host.is_running());
        assert_ne!(host.addr().port(), 0);

        state.registry().upsert(DeviceUpdate {
            device_id: "d1".into(),
            name: "Lamp".into(),
            local_key: "k".into(),
            lan_ip: "10.0.0.5".into(),
            version: 3.3,
        });
        let status = host.status();
        assert_eq!(status.devices_count, 1);
        assert_eq!(status.http_port, 8080);
        assert!(status.running);

        host.stop();
        assert!(!host.is_running());
        assert!(!host.status().running);
        host.stop();
    }

    #[test]
    fn serves_requests_from_its_own_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut host =
            GatewayHost::start(state(&dir), "127.0.0.1:0".parse().unwrap()).unwrap();
        let url = format!("http://{}/status", host.addr());

        let client_runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let body: serde_json::Value = client_runtime.block_on(async {
            reqwest::get(url).await.unwrap().json().await.unwrap()
        });
        assert_eq!(body["site_name"], "Site Local");
        host.stop();
    }

    #[test]
    fn occupied_port_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let err = GatewayHost::start(state(&dir), addr).unwrap_err();
        assert!(err.to_string().contains("failed to bind"));
    }
}

//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "module"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "HTTP client wrapper for the gateway API."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Debug, Args)]
pub struct CommandArgs {
    #[arg(long, help = "Vendor device identifier")]
    pub device_id: String,
    #[arg(long, help = "Power action, `on` or `off`")]
    pub action: String,
    #[arg(long, env = "MRIT_LOCAL_KEY", hide_env_values = true, help = "Device local key")]
    pub local_key: String,
    #[arg(long, help = "Device LAN address")]
    pub lan_ip: String,
    #[arg(long, help = "Display name stored with the device")]
    pub name: Option<String>,
    #[arg(long, help = "Device protocol version, e.g. 3.3")]
    pub version: Option<String>,
}

impl CommandArgs {
    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("tuya_device_id".into(), json!(self.device_id));
        body.insert("action".into(), json!(self.action));
        body.insert("local_key".into(), json!(self.local_key));
        body.insert("lan_ip".into(), json!(self.lan_ip));
        if let Some(name) = &self.name {
            body.insert("device_name".into(), json!(name));
        }
        if let Some(version) = &self.version {
            body.insert("version".into(), json!(version));
        }
        Value::Object(body)
    }
}

/// Status code and JSON body of one gateway response.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

pub struct GatewayClient {
    http: Client,
    base: String,
}

impl GatewayClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_owned(),
        })
    }

    pub async fn status(&self) -> Result<Reply> {
        self.execute(self.http.get(self.url("/status"))).await
    }

    pub async fn devices(&self) -> Result<Reply> {
        self.execute(self.http.get(self.url("/devices"))).await
    }

    pub async fn command(&self, args: &CommandArgs) -> Result<Reply> {
        self.execute(self.http.post(self.url("/command")).json(&args.body()))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Reply> {
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach gateway at {}", self.base))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("failed to read gateway response")?;
        debug!(status = %status, "gateway replied");
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(Reply { status, body })
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rkboot::{BootCtx, Category, Entry, EntryRegistry, FactoryCtx, FactoryRegistration, FactoryResult};

use crate::config::PromEntryConfig;

pub const PROM_ENTRY_TYPE: &str = "prom";

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns a Prometheus recorder and serves its text rendering on `path`.
///
/// The recorder is local to the entry rather than installed globally, so several
/// boots in one process (tests included) never share series.
pub struct PromEntry {
    config: PromEntryConfig,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    local_addr: Mutex<Option<SocketAddr>>,
    cancel: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl PromEntry {
    pub fn new(config: PromEntryConfig) -> Result<Self> {
        let mut builder = PrometheusBuilder::new();
        if !config.buckets.is_empty() {
            builder = builder
                .set_buckets(&config.buckets)
                .with_context(|| format!("invalid buckets for prom entry '{}'", config.name))?;
        }
        let recorder = builder.build_recorder();
        let handle = recorder.handle();
        Ok(Self {
            config,
            recorder,
            handle,
            local_addr: Mutex::new(None),
            cancel: CancellationToken::new(),
            server: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PromEntryConfig {
        &self.config
    }

    /// Count one request and record its latency, labelled by the serving entry.
    pub fn record_http(&self, entry: &str, method: &str, path: &str, status: u16, latency: Duration) {
        let labels = [
            ("entry", entry.to_string()),
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status", status.to_string()),
        ];
        metrics::with_local_recorder(&self.recorder, || {
            counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
            histogram!(HTTP_REQUEST_DURATION, &labels).record(latency.as_secs_f64());
        });
    }

    /// Text exposition format of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn is_serving(&self) -> bool {
        self.server
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn scrape_router(&self) -> Router {
        Router::new()
            .route(&self.config.path, get(scrape))
            .with_state(self.handle.clone())
    }
}

async fn scrape(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

#[async_trait]
impl Entry for PromEntry {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn entry_type(&self) -> &str {
        PROM_ENTRY_TYPE
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    async fn bootstrap(&self, ctx: &BootCtx) -> Result<()> {
        let listener = tokio::net::TcpListener::bind((self.config.address.as_str(), self.config.port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind prom entry '{}' on {}:{}",
                    self.config.name, self.config.address, self.config.port
                )
            })?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(addr);
        info!(event_id = %ctx.event_id(), entry = %self.config.name, %addr, path = %self.config.path, "Prometheus endpoint bound");

        let router = self.scrape_router();
        let cancel = self.cancel.clone();
        let name = self.config.name.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
            {
                error!(entry = %name, error = %e, "Prometheus endpoint failed");
            }
        });
        *self.server.lock() = Some(handle);

        Ok(())
    }

    async fn interrupt(&self, ctx: &BootCtx) -> Result<()> {
        self.cancel.cancel();

        let handle = self.server.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => {
                info!(event_id = %ctx.event_id(), entry = %self.config.name, "Prometheus endpoint stopped");
                Ok(())
            }
            Ok(Err(e)) => bail!("prom entry '{}' server task failed: {e}", self.config.name),
            Err(_) => {
                warn!(entry = %self.config.name, "Prometheus endpoint did not stop within {:?}", STOP_TIMEOUT);
                bail!("prom entry '{}' stop timed out", self.config.name)
            }
        }
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.config.name,
            "type": PROM_ENTRY_TYPE,
            "description": self.config.description,
            "address": self.config.address,
            "port": self.config.port,
            "path": self.config.path,
            "localAddr": self.local_addr().map(|a| a.to_string()),
        })
    }
}

/// Factory for the `prom:` section.
pub fn register_prom_entries_from_config(ctx: &FactoryCtx<'_>) -> FactoryResult {
    let mut entries: Vec<Arc<dyn Entry>> = Vec::new();
    for cfg in ctx.entry_configs::<PromEntryConfig>(PROM_ENTRY_TYPE)? {
        entries.push(Arc::new(PromEntry::new(cfg)?));
    }
    Ok(entries)
}

inventory::submit! {
    FactoryRegistration {
        category: Category::Plugin,
        name: PROM_ENTRY_TYPE,
        factory: register_prom_entries_from_config,
    }
}

pub fn get_prom_entry(registry: &EntryRegistry, name: &str) -> Option<Arc<PromEntry>> {
    registry.get_typed::<PromEntry>(PROM_ENTRY_TYPE, name)
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::field::Empty;
use tracing::{error, info, warn};

use prom_entry::{get_prom_entry, PromEntry};
use rkboot::{BootCtx, Category, Entry, EntryRegistry, FactoryCtx, FactoryRegistration, FactoryResult};

use crate::api::rest::handlers::CommonState;
use crate::api::rest::routes::common_routes;
use crate::config::HttpEntryConfig;

pub const HTTP_ENTRY_TYPE: &str = "http";

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// An axum HTTP server bound at bootstrap and drained at interrupt.
///
/// Routes are added before bootstrap with [`HttpEntry::add_routes`].
pub struct HttpEntry {
    config: HttpEntryConfig,
    // None once the router was handed to the server
    routes: Mutex<Option<Router>>,
    local_addr: Mutex<Option<SocketAddr>>,
    cancel: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
    prom: Option<Arc<PromEntry>>,
}

impl HttpEntry {
    pub fn new(config: HttpEntryConfig) -> Self {
        Self {
            config,
            routes: Mutex::new(Some(Router::new())),
            local_addr: Mutex::new(None),
            cancel: CancellationToken::new(),
            server: Mutex::new(None),
            prom: None,
        }
    }

    /// Record request metrics into `prom`.
    pub fn with_prom(mut self, prom: Arc<PromEntry>) -> Self {
        self.prom = Some(prom);
        self
    }

    pub fn prom(&self) -> Option<&Arc<PromEntry>> {
        self.prom.as_ref()
    }

    pub fn config(&self) -> &HttpEntryConfig {
        &self.config
    }

    /// Merge `router` into the served routes. Fails once the server was started.
    pub fn add_routes(&self, router: Router) -> Result<()> {
        let mut routes = self.routes.lock();
        match routes.take() {
            Some(current) => {
                *routes = Some(current.merge(router));
                Ok(())
            }
            None => bail!("http entry '{}' is already serving", self.config.name),
        }
    }

    /// Address actually bound; `None` before bootstrap.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn is_serving(&self) -> bool {
        self.server
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Final router: caller routes plus common service routes when enabled, wrapped in
    /// the metrics layer (when a prom entry is attached) and the timeout and trace layers. Takes the routes, so it can only be built once.
    pub fn build_router(&self, ctx: &BootCtx) -> Result<Router> {
        let Some(mut router) = self.routes.lock().take() else {
            bail!("http entry '{}' router was already built", self.config.name);
        };

        if self.config.common_service.enabled {
            let state = CommonState {
                registry: ctx.registry().clone(),
                shutdown: ctx.shutdown().clone(),
                entry_name: self.config.name.clone(),
            };
            router = router.merge(common_routes(&self.config.common_service.path_prefix, state));
        }

        if let Some(prom) = &self.prom {
            router = prom_entry::instrument(router, prom.clone(), &self.config.name);
        }

        let name = self.config.name.clone();
        router = router
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeout_sec)))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(move |req: &Request<Body>| {
                        tracing::info_span!(
                            "http_request",
                            entry = %name,
                            method = %req.method(),
                            uri = %req.uri().path(),
                            status = Empty,
                            latency_ms = Empty
                        )
                    })
                    .on_response(
                        |res: &Response<Body>, latency: Duration, span: &tracing::Span| {
                            span.record("status", res.status().as_u16());
                            span.record("latency_ms", latency.as_millis() as u64);
                        },
                    ),
            );

        Ok(router)
    }
}

#[async_trait]
impl Entry for HttpEntry {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn entry_type(&self) -> &str {
        HTTP_ENTRY_TYPE
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    async fn bootstrap(&self, ctx: &BootCtx) -> Result<()> {
        let router = self.build_router(ctx)?;

        let listener = tokio::net::TcpListener::bind((self.config.address.as_str(), self.config.port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind http entry '{}' on {}:{}",
                    self.config.name, self.config.address, self.config.port
                )
            })?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(addr);
        info!(event_id = %ctx.event_id(), entry = %self.config.name, %addr, "HTTP server bound");

        let cancel = self.cancel.clone();
        let name = self.config.name.clone();
        let handle = tokio::spawn(async move {
            let shutdown = {
                let name = name.clone();
                async move {
                    cancel.cancelled().await;
                    info!(entry = %name, "HTTP server shutting down gracefully");
                }
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(entry = %name, error = %e, "HTTP server failed");
            }
        });
        *self.server.lock() = Some(handle);

        Ok(())
    }

    async fn interrupt(&self, ctx: &BootCtx) -> Result<()> {
        self.cancel.cancel();

        let handle = self.server.lock().take();
        let Some(handle) = handle else {
            // never bootstrapped
            return Ok(());
        };

        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => {
                info!(event_id = %ctx.event_id(), entry = %self.config.name, "HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => bail!("http entry '{}' server task failed: {e}", self.config.name),
            Err(_) => {
                warn!(entry = %self.config.name, "HTTP server did not stop within {:?}", STOP_TIMEOUT);
                bail!("http entry '{}' stop timed out", self.config.name)
            }
        }
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.config.name,
            "type": HTTP_ENTRY_TYPE,
            "description": self.config.description,
            "address": self.config.address,
            "port": self.config.port,
            "localAddr": self.local_addr().map(|a| a.to_string()),
            "commonService": self.config.common_service,
            "prom": self.prom.as_ref().map(|p| p.name().to_string()),
        })
    }
}

/// Factory for the `http:` section.
///
/// An item with `prom.enabled` needs its prom entry already in the registry; the
/// factory fails when it is not, which aborts construction.
pub fn register_http_entries_from_config(ctx: &FactoryCtx<'_>) -> FactoryResult {
    let mut entries: Vec<Arc<dyn Entry>> = Vec::new();
    for cfg in ctx.entry_configs::<HttpEntryConfig>(HTTP_ENTRY_TYPE)? {
        let prom = if cfg.prom.enabled {
            let prom = get_prom_entry(ctx.registry(), &cfg.prom.entry).with_context(|| {
                format!(
                    "http entry '{}' needs prom entry '{}', which is not registered",
                    cfg.name, cfg.prom.entry
                )
            })?;
            Some(prom)
        } else {
            None
        };

        let mut entry = HttpEntry::new(cfg);
        if let Some(prom) = prom {
            entry = entry.with_prom(prom);
        }
        entries.push(Arc::new(entry));
    }
    Ok(entries)
}

inventory::submit! {
    FactoryRegistration {
        category: Category::WebFramework,
        name: HTTP_ENTRY_TYPE,
        factory: register_http_entries_from_config,
    }
}

pub fn get_http_entry(registry: &EntryRegistry, name: &str) -> Option<Arc<HttpEntry>> {
    registry.get_typed::<HttpEntry>(HTTP_ENTRY_TYPE, name)
}

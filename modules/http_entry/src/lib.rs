//! `http` entries: one axum server per item of the `http:` boot section.
//!
//! ```yaml
//! http:
//!   - name: greeter
//!     port: 8080
//!     commonService:
//!       enabled: true
//!     prom:
//!       enabled: true   # needs a `prom` entry, see the prom_entry crate
//! ```
//!
//! Callers attach their routes between construction and bootstrap:
//!
//! ```rust,ignore
//! let http = http_entry::get_http_entry(boot.registry(), "greeter").unwrap();
//! http.add_routes(Router::new().route("/hello", get(hello)))?;
//! boot.bootstrap().await?;
//! ```

pub mod config;
pub mod entry;

#[doc(hidden)]
pub mod api;

pub use config::{CommonServiceConfig, HttpEntryConfig, PromConfig};
pub use entry::{get_http_entry, register_http_entries_from_config, HttpEntry, HTTP_ENTRY_TYPE};

//! Osikatu - backend for fans tracking their oshi
//!
//! Osikatu keeps a fan's diary, expenses, goods and schedules around the
//! idols they support, and lets fans gather in circles with chat, shared
//! points and bill splitting. Points pay for gacha draws; paid plans unlock
//! ten-pulls, expense summaries and higher limits.
//!
//! The server is built on axum and tokio. Every domain area is a
//! [`RouteModule`] nested under `/api`, backed by a service that talks to an
//! async store trait. The crate ships in-memory stores.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use osikatu::{App, ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     osikatu::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env()?.build()?;
//!     App::from_config(config).serve().await?;
//!     Ok(())
//! }
//! ```

mod app;
pub mod auth;
pub mod billing;
pub mod chat;
pub mod circles;
mod config;
mod core;
pub mod diary;
mod error;
pub mod expenses;
pub mod gacha;
pub mod goods;
pub mod health;
pub mod http;
pub mod middleware;
pub mod oplog;
pub mod oshi;
pub mod points;
pub mod schedules;
pub mod settlements;
pub mod store;
pub mod testing;
pub mod utils;
pub mod validation;

// Re-exports for public API
pub use app::{AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder, LoggingConfig, ServerConfig};
pub use core::{App, AppBuilder};
pub use error::{ErrorResponse, FieldErrors, OsikatuError, Result};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus};
pub use http::{
    CreatedResponse, NoContentResponse, PaginatedData, PaginationMeta, PaginationQuery,
    RouteModule,
};
pub use middleware::{CorsConfig, TimeoutConfig};
pub use validation::{ValidatedJson, ValidatedQuery};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// Call early in `main()`, before building the app.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "osikatu=debug")
/// - `OSIKATU_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = utils::get_env_parsed::<bool>("LOG_JSON").unwrap_or(false);
    install(env_filter, json_logs);
}

/// Initialize tracing from the `logging` section of a loaded config
///
/// `RUST_LOG` still wins over `config.logging.level` when set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    install(env_filter, config.logging.json);
}

fn install(env_filter: EnvFilter, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

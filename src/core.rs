use crate::{
    app::AppContext,
    auth::AccountModule,
    billing::BillingModule,
    chat::{ChatModule, ChatSocketModule},
    circles::CircleModule,
    config::Config,
    diary::DiaryModule,
    expenses::ExpenseModule,
    gacha::GachaModule,
    goods::GoodsModule,
    health::health_handler,
    http::RouteModule,
    middleware::{MakeRequestUuid, build_cors_layer, build_timeout_layer, request_context},
    oplog::OperationLogModule,
    oshi::OshiModule,
    points::{CirclePointsModule, PointsModule},
    schedules::ScheduleModule,
    settlements::SettlementModule,
};
use axum::{Router, extract::DefaultBodyLimit, middleware::from_fn, routing::get};
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// The Osikatu HTTP application
///
/// Route modules are nested under `/api`. Regular modules sit behind the
/// body limit and the request timeout; socket modules skip the timeout so
/// long-lived upgrades survive.
pub struct App {
    api: Router<AppContext>,
    sockets: Router<AppContext>,
    config: Config,
    context: AppContext,
}

impl App {
    /// An app without any route modules besides `/health`.
    pub fn empty(config: Config, context: AppContext) -> Self {
        Self {
            api: Router::new(),
            sockets: Router::new(),
            config,
            context,
        }
    }

    /// Every Osikatu module registered over `context`.
    pub fn new(config: Config, context: AppContext) -> Self {
        Self::empty(config, context)
            .register_module(AccountModule)
            .register_module(OshiModule)
            .register_module(DiaryModule)
            .register_module(ExpenseModule)
            .register_module(GoodsModule)
            .register_module(ScheduleModule)
            .register_module(CircleModule)
            .register_module(ChatModule)
            .register_module(SettlementModule)
            .register_module(PointsModule)
            .register_module(CirclePointsModule)
            .register_module(GachaModule)
            .register_module(BillingModule)
            .register_module(OperationLogModule)
            .register_socket_module(ChatSocketModule)
    }

    /// Build the context from `config` with in-memory stores.
    pub fn from_config(config: Config) -> Self {
        let context = AppContext::builder(&config).build();
        Self::new(config, context)
    }

    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.api = module.register(self.api);
        self
    }

    /// Register routes that must not be cut by the request timeout.
    pub fn register_socket_module<M: RouteModule>(mut self, module: M) -> Self {
        self.sockets = module.register(self.sockets);
        self
    }

    /// The full router with middleware and state applied.
    pub fn into_router(self) -> Router {
        let mut api = self
            .api
            .layer(DefaultBodyLimit::max(self.config.server.max_body_size));
        if let Some(timeout_layer) = build_timeout_layer(&self.config.timeout) {
            api = api.layer(timeout_layer);
        }
        let api = api.merge(self.sockets);

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .nest("/api", api);

        if let Some(cors_layer) = build_cors_layer(&self.config.cors) {
            router = router.layer(cors_layer);
        }

        // Outermost first: assign the id, trace with it, echo it back, then
        // expose it to the operation log.
        router
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(from_fn(request_context)),
            )
            .with_state(self.context)
    }

    /// Router for integration tests; identical to what [`serve`](Self::serve) runs.
    pub fn into_test_router(self) -> Router {
        self.into_router()
    }

    /// Bind and serve until Ctrl+C or SIGTERM.
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = self.config.server.addr().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
        })?;

        let router = self.into_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("Server starting on http://{}", addr);
        tracing::info!("Health check available at http://{}/health", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

/// Builder for App with fluent API
#[must_use = "builder does nothing until you call build()"]
pub struct AppBuilder {
    config: Option<Config>,
    context: Option<AppContext>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            context: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a prepared context instead of one built from the config.
    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Fails when no config was given.
    pub fn build(self) -> crate::error::Result<App> {
        let config = self
            .config
            .ok_or_else(|| crate::error::OsikatuError::internal("App config not set"))?;
        Ok(match self.context {
            Some(context) => App::new(config, context),
            None => App::from_config(config),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give connections a grace period to close
    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
}

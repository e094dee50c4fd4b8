use axum::Router;

use crate::app::AppContext;

/// A group of routes for one domain area
///
/// Each module returns a stateless router over [`AppContext`]; the `App`
/// nests it under `/api` plus the module's prefix and applies state once.
///
/// ```ignore
/// struct OshiModule;
///
/// impl RouteModule for OshiModule {
///     fn routes(&self) -> Router<AppContext> {
///         Router::new()
///             .route("/", get(list).post(create))
///             .route("/{id}", get(show))
///     }
///
///     fn prefix(&self) -> Option<&str> {
///         Some("/oshi")
///     }
/// }
/// ```
pub trait RouteModule {
    fn routes(&self) -> Router<AppContext>;

    /// Optional path prefix for all routes in this module
    fn prefix(&self) -> Option<&str> {
        None
    }

    /// Merge or nest this module's routes into `router`
    fn register(&self, router: Router<AppContext>) -> Router<AppContext> {
        let routes = self.routes();

        match self.prefix() {
            Some(prefix) => router.nest(prefix, routes),
            None => router.merge(routes),
        }
    }
}

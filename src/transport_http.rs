use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;

use crate::handler::Handler;

/// Create an Axum router that hands every request to `handler`.
///
/// There are no fixed routes: the final path segment picks the method and
/// verb filtering is left to the handler, so e.g. `PUT` gets the handler's
/// 500 rather than axum's 405.
pub fn http_router(handler: Handler) -> Router {
    shared_router(Arc::new(handler))
}

/// Same as [`http_router`] for a handler that is already shared.
pub fn shared_router(handler: Arc<Handler>) -> Router {
    Router::new().fallback(dispatch).with_state(handler)
}

async fn dispatch(State(handler): State<Arc<Handler>>, req: Request) -> Response {
    handler.handle(req).await
}

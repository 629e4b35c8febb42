//! `httpize` — expose the methods of a provider object as HTTP endpoints.
//!
//! A provider declares its methods once, each with named, typed parameters.
//! The [`Handler`] then maps the final path segment of a request to a
//! method, builds and validates every argument from the query string,
//! invokes the method and streams its [`Reply`] back, applying the reply's
//! [`Settings`] (content type, `Expires`, gzip).
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use httpize::{arg, ConfigError, Handler, MethodProvider, Methods, Reply, SafeString, Settings};
//!
//! struct Api;
//!
//! impl MethodProvider for Api {
//!     fn httpize(&self, methods: &mut Methods<Self>) -> Result<(), ConfigError> {
//!         methods.add("Echo", &["name"], vec![arg::<SafeString>()], |_api: Arc<Api>, args| async move {
//!             let name = args.require::<SafeString>("name")?;
//!             Ok(Reply::text(format!("Echo {name}"))
//!                 .with_settings(Settings::new().content_type("text/html")))
//!         })
//!     }
//! }
//!
//! # async fn example() {
//! let handler = Handler::new(Api).expect("valid declarations");
//! let req = http::Request::get("http://host/Echo?name=Gopher").body(()).unwrap();
//! let resp = handler.handle(req).await;
//! assert_eq!(resp.status(), 200);
//! # }
//! ```
//!
//! To serve it, wrap the handler with [`http_router`] and pass the router
//! to `axum::serve`.

pub mod args;
pub mod handler;
pub mod loader;
pub mod pattern;
pub mod query;
pub mod registry;
pub mod transport_http;
pub mod types;

// Re-export the most commonly used items at the crate root.
pub use args::{arg, Arg, ArgFactory, Args, SafeString};
pub use handler::{Handler, HandlerBuilder};
pub use loader::{load_settings, parse_settings};
pub use pattern::{parse_pattern, ArgTypes, Pattern};
pub use registry::{ArgDef, CallDef, Method, MethodProvider, Methods, Registry};
pub use transport_http::{http_router, shared_router};
pub use types::{
    BodyReader, ConfigError, MethodError, Reply, RequestError, Settings, StatusError, MAX_ARGS,
};

//! Small httpize server.
//!
//! Run with: `cargo run --example echo_server`
//! Then try:
//!   curl -i 'http://localhost:3000/Echo?name=Gopher'
//!   curl -i 'http://localhost:3000/Greeting' -H 'Accept-Encoding: gzip' --compressed
//!   curl -i 'http://localhost:3000/ThreeOhThree'

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use httpize::{
    arg, http_router, ArgTypes, Args, ConfigError, Handler, Method, MethodError, MethodProvider,
    Methods, Reply, SafeString, Settings, StatusError,
};

/// Stateless method with its own type, registered through `add_method`.
struct Shout;

#[async_trait]
impl Method for Shout {
    async fn call(&self, args: Args) -> Result<Reply, MethodError> {
        let word = args.require::<SafeString>("word")?;
        Ok(Reply::text(word.as_str().to_uppercase()))
    }
}

/// Counts greetings so the demo has a bit of shared state.
#[derive(Default)]
struct Api {
    greetings: AtomicU64,
}

impl MethodProvider for Api {
    fn httpize(&self, methods: &mut Methods<Self>) -> Result<(), ConfigError> {
        // Pattern form: method name and typed parameters in one string.
        methods.add_pattern(
            "/Echo?name SafeString",
            &ArgTypes::with_builtins(),
            |_api: Arc<Self>, args| async move {
                let name = args.require::<SafeString>("name")?;
                Ok(Reply::text(format!("Echo {name}"))
                    .with_settings(Settings::new().content_type("text/html")))
            },
        )?;

        methods.add("Greeting", &[], vec![], |api: Arc<Self>, _args| async move {
            let n = api.greetings.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(Reply::text(format!("Hello World (#{n})")).with_settings(
                Settings::new()
                    .content_type("text/plain; charset=utf-8")
                    .cache(300)
                    .gzip(true),
            ))
        })?;

        methods.add_method("Shout", &["word"], vec![arg::<SafeString>()], Arc::new(Shout))?;

        methods.add("ThreeOhThree", &[], vec![], |_api: Arc<Self>, _args| async {
            Err(MethodError::Status(StatusError::redirect(
                StatusCode::SEE_OTHER,
                "http://lookhere",
            )))
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let handler = match Handler::builder(Api::default())
        .default_settings(Settings::new().content_type("text/plain"))
        .build()
    {
        Ok(handler) => handler,
        Err(e) => {
            tracing::error!("invalid method declarations: {}", e);
            std::process::exit(1);
        }
    };

    let app = http_router(handler);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    println!("httpize demo listening on http://localhost:3000");
    println!("  GET|POST /Echo?name=..   /Greeting   /Shout?word=..   /ThreeOhThree");
    axum::serve(listener, app).await.unwrap();
}

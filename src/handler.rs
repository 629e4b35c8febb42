use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_compression::tokio::bufread::GzipEncoder;
use axum::body::Body;
use axum::response::Response;
use chrono::{TimeDelta, Utc};
use http::header::{self, HeaderValue};
use http::request::Parts;
use http::{HeaderMap, Method, Request, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tokio_util::io::ReaderStream;

use crate::args::Args;
use crate::loader;
use crate::query::{decode_path_segment, parse_query, Query};
use crate::registry::{CallDef, MethodProvider, Registry};
use crate::types::{ConfigError, MethodError, Reply, RequestError, Settings, StatusError};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Size of the read that must succeed before the response head is built.
const FIRST_READ: usize = 8 * 1024;

/// Why a request stopped before a successful response.
enum Failure {
    /// Request-shape problem: opaque 500.
    Request(RequestError),
    /// Raised by an argument check or by the method itself.
    Method(MethodError),
}

impl From<RequestError> for Failure {
    fn from(err: RequestError) -> Self {
        Failure::Request(err)
    }
}

/// Dispatches HTTP requests to the methods of a [`MethodProvider`].
///
/// The final path segment names the method, the query string supplies its
/// arguments, and the returned [`Reply`] becomes the response body.
/// Build once at startup and share (e.g. behind an `Arc`) between requests.
pub struct Handler {
    registry: Registry,
    default_settings: Settings,
}

impl Handler {
    /// Build a handler with default settings.
    pub fn new<P: MethodProvider>(provider: P) -> Result<Self, ConfigError> {
        Self::builder(provider).build()
    }

    pub fn builder<P: MethodProvider>(provider: P) -> HandlerBuilder<P> {
        HandlerBuilder {
            provider,
            default_settings: Settings::default(),
            error: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Settings applied when a method returns none of its own.
    pub fn default_settings(&self) -> &Settings {
        &self.default_settings
    }

    /// Serve one request. The request body is never read.
    pub async fn handle<B>(&self, req: Request<B>) -> Response {
        let (parts, _) = req.into_parts();
        self.handle_parts(&parts).await
    }

    /// Serve one request from its head alone.
    ///
    /// The body streams from the method's reader after the head is
    /// returned. Only a failure on the first read still becomes a 500; a
    /// later one ends the body early.
    pub async fn handle_parts(&self, parts: &Parts) -> Response {
        let name = method_name(parts.uri.path());
        match self.dispatch(parts, name).await {
            Ok(resp) => {
                tracing::debug!(
                    method = name,
                    url = %parts.uri,
                    status = resp.status().as_u16(),
                    "served"
                );
                resp
            }
            Err(Failure::Request(err)) => {
                tracing::error!(method = name, url = %parts.uri, error = %err, "request rejected");
                internal_error()
            }
            Err(Failure::Method(err)) => classify(err, name, &parts.uri.to_string()),
        }
    }

    async fn dispatch(&self, parts: &Parts, segment: &str) -> Result<Response, Failure> {
        if parts.method != Method::GET && parts.method != Method::POST {
            return Err(RequestError::UnsupportedVerb(parts.method.clone()).into());
        }

        let name = decode_path_segment(segment).map_err(RequestError::MalformedPath)?;
        let call = self
            .registry
            .get(&name)
            .ok_or_else(|| RequestError::UnknownMethod(name.clone()))?;

        let query = parse_query(parts.uri.query().unwrap_or_default())
            .map_err(RequestError::MalformedQuery)?;

        let args = build_args(call, &query)?;
        let reply = call.method.call(args).await.map_err(Failure::Method)?;
        let resp = self.write_reply(parts, &name, reply).await?;
        Ok(resp)
    }

    async fn write_reply(
        &self,
        parts: &Parts,
        name: &str,
        reply: Reply,
    ) -> Result<Response, RequestError> {
        let Reply { body, settings } = reply;
        let settings = settings.as_ref().unwrap_or(&self.default_settings);
        let mut reader = body.ok_or(RequestError::NoBody)?;

        let mut headers = HeaderMap::new();
        if !settings.content_type.is_empty() {
            let value = HeaderValue::from_str(&settings.content_type).map_err(|_| {
                RequestError::BadHeader {
                    header: "Content-Type",
                    value: settings.content_type.clone(),
                }
            })?;
            headers.insert(header::CONTENT_TYPE, value);
        }

        if settings.cache > 0 && parts.method == Method::GET {
            match expires_at(settings.cache) {
                Some(value) => {
                    headers.insert(header::EXPIRES, value);
                }
                None => tracing::warn!(
                    method = name,
                    url = %parts.uri,
                    cache = settings.cache,
                    "cache duration out of range, Expires omitted"
                ),
            }
        }

        // Nothing is committed yet, so a failing first read is still a 500.
        let mut first = vec![0u8; FIRST_READ];
        let n = reader.read(&mut first).await?;
        first.truncate(n);

        let source = BodyTap {
            inner: Cursor::new(first).chain(reader),
            bytes: 0,
            method: name.to_string(),
            url: parts.uri.to_string(),
        };
        let body = if settings.gzip && accepts_gzip(&parts.headers) {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            Body::from_stream(ReaderStream::new(GzipEncoder::new(BufReader::new(source))))
        } else {
            Body::from_stream(ReaderStream::new(source))
        };

        let mut resp = Response::new(body);
        *resp.headers_mut() = headers;
        Ok(resp)
    }
}

/// Reader between the method's body and the response stream. Logs the
/// byte count at EOF and any error that cuts the body short.
struct BodyTap<R> {
    inner: R,
    bytes: u64,
    method: String,
    url: String,
}

impl<R: AsyncRead + Unpin> AsyncRead for BodyTap<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n == 0 {
                    tracing::debug!(
                        method = %this.method,
                        url = %this.url,
                        bytes = this.bytes,
                        "body sent"
                    );
                } else {
                    this.bytes += n as u64;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                tracing::warn!(
                    method = %this.method,
                    url = %this.url,
                    bytes = this.bytes,
                    error = %e,
                    "body copy failed after headers were sent"
                );
                Poll::Ready(Err(e))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Builder for [`Handler`].
pub struct HandlerBuilder<P> {
    provider: P,
    default_settings: Settings,
    error: Option<ConfigError>,
}

impl<P: MethodProvider> HandlerBuilder<P> {
    /// Settings used when a method returns none.
    pub fn default_settings(mut self, settings: Settings) -> Self {
        self.default_settings = settings;
        self
    }

    /// Parse default settings from raw JSON bytes.
    pub fn settings_json(mut self, data: &[u8]) -> Self {
        match loader::parse_settings(data) {
            Ok(settings) => self.default_settings = settings,
            Err(e) => {
                tracing::error!("parse settings json: {}", e);
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Load default settings from a JSON file.
    pub fn settings_file(mut self, path: impl AsRef<std::path::Path>) -> Self {
        match loader::load_settings(path) {
            Ok(settings) => self.default_settings = settings,
            Err(e) => {
                tracing::error!("load settings file: {}", e);
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Run the provider's declarations and bind them. Any malformed
    /// declaration or settings source fails the whole build.
    pub fn build(self) -> Result<Handler, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let registry = Registry::from_provider(Arc::new(self.provider))?;
        tracing::info!(methods = ?registry.names(), "handler ready");
        Ok(Handler {
            registry,
            default_settings: self.default_settings,
        })
    }
}

/// Final `/`-delimited segment of the path, still percent-encoded.
fn method_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Construct and check every declared argument, then require that the
/// query holds exactly one value per declared parameter and nothing else.
fn build_args(call: &CallDef, query: &Query) -> Result<Args, Failure> {
    let mut args = Args::with_capacity(call.arg_defs.len());
    for def in &call.arg_defs {
        let Some(raw) = query.first(&def.name) else {
            continue;
        };
        let value = def
            .factory
            .create(raw)
            .map_err(|reason| RequestError::BadArg {
                name: def.name.clone(),
                reason,
            })?;
        value.check().map_err(Failure::Method)?;
        args.push(def.name.clone(), value);
    }

    let found = args.len();
    if found != call.arg_defs.len() || found != query.total_values() {
        return Err(count_mismatch(call, query).into());
    }
    Ok(args)
}

fn count_mismatch(call: &CallDef, query: &Query) -> RequestError {
    if let Some(def) = call.arg_defs.iter().find(|d| !query.contains(&d.name)) {
        return RequestError::MissingParam(def.name.clone());
    }
    let mut keys: Vec<&str> = query.keys().collect();
    keys.sort_unstable();
    if let Some(key) = keys
        .iter()
        .find(|k| !call.arg_defs.iter().any(|d| d.name == **k))
    {
        return RequestError::UnexpectedParam((*key).to_string());
    }
    let repeated = keys
        .into_iter()
        .find(|k| query.values(k).len() > 1)
        .unwrap_or_default();
    RequestError::DuplicateParam(repeated.to_string())
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .any(|v| v.to_str().is_ok_and(|s| s.contains("gzip")))
}

fn expires_at(cache: i64) -> Option<HeaderValue> {
    let at = Utc::now().checked_add_signed(TimeDelta::try_seconds(cache)?)?;
    HeaderValue::from_str(&at.format(HTTP_DATE).to_string()).ok()
}

/// Shape the response for an error raised by a method or argument check.
fn classify(err: MethodError, method: &str, url: &str) -> Response {
    match err {
        MethodError::Status(e) => {
            tracing::debug!(method, url, status = e.code.as_u16(), "application error");
            status_response(&e, method, url)
        }
        other => {
            tracing::error!(method, url, error = %other, "method failed");
            internal_error()
        }
    }
}

fn status_response(err: &StatusError, method: &str, url: &str) -> Response {
    let mut resp = text_response(err.code, &err.message);
    if err.is_redirect() {
        if let Some(location) = &err.location {
            match HeaderValue::from_str(location) {
                Ok(value) => {
                    resp.headers_mut().insert(header::LOCATION, value);
                }
                Err(_) => {
                    tracing::error!(method, url, location, "invalid redirect location");
                    return internal_error();
                }
            }
        }
    }
    resp
}

fn internal_error() -> Response {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, "error")
}

fn text_response(code: StatusCode, message: &str) -> Response {
    let mut resp = Response::new(Body::from(format!("{message}\n")));
    *resp.status_mut() = code;
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    resp
}

use std::fmt;
use std::io::Cursor;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Maximum number of arguments a single method may declare.
pub const MAX_ARGS: usize = 10;

/// Readable byte stream returned by a method as the response body.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

// ── Settings ──

/// Per-response settings produced by a method call.
///
/// A zero value means "unset": an empty `content_type` writes no
/// `Content-Type` header, a `cache` of zero or less writes no `Expires`
/// header, and `gzip = false` never compresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub content_type: String,
    /// Cache lifetime in seconds, applied to GET responses only.
    pub cache: i64,
    pub gzip: bool,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every field to its default.
    pub fn set_to_default(&mut self) {
        *self = Self::default();
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn cache(mut self, seconds: i64) -> Self {
        self.cache = seconds;
        self
    }

    pub fn gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }
}

// ── Reply ──

/// Successful result of a method call: the body stream plus optional
/// settings. When `settings` is `None` the handler's defaults apply.
///
/// A reply without a body is legal to construct but the dispatcher answers
/// it with a 500.
pub struct Reply {
    pub(crate) body: Option<BodyReader>,
    pub(crate) settings: Option<Settings>,
}

impl Reply {
    /// Reply with an arbitrary async reader as body.
    pub fn reader(body: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            body: Some(Box::new(body)),
            settings: None,
        }
    }

    /// Reply with an in-memory byte body.
    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self::reader(Cursor::new(body.into()))
    }

    /// Reply with a UTF-8 text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes(body.into().into_bytes())
    }

    /// Reply carrying no body at all.
    pub fn no_body() -> Self {
        Self {
            body: None,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("body", &self.body.as_ref().map(|_| ".."))
            .field("settings", &self.settings)
            .finish()
    }
}

// ── Errors ──

/// Application error: written to the client as its own status and message.
///
/// For 301/302/303 the `location` becomes the `Location` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub code: StatusCode,
    pub message: String,
    pub location: Option<String>,
}

impl StatusError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    /// Redirect with the canonical reason phrase as message.
    pub fn redirect(code: StatusCode, location: impl Into<String>) -> Self {
        Self {
            code,
            message: code.canonical_reason().unwrap_or("Redirect").to_string(),
            location: Some(location.into()),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// True for the codes that carry a `Location` header.
    pub fn is_redirect(&self) -> bool {
        matches!(
            self.code,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
        )
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code.as_u16(), self.message)
    }
}

impl std::error::Error for StatusError {}

/// Error returned by a method or by an argument's `check()`.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error("{0}")]
    Status(StatusError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl MethodError {
    pub fn other(message: impl Into<String>) -> Self {
        MethodError::Other(message.into())
    }
}

impl From<StatusError> for MethodError {
    fn from(err: StatusError) -> Self {
        MethodError::Status(err)
    }
}

/// Malformed registration. Only ever produced while building a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("method {method}: {names} argument names but {factories} factories")]
    ArgCountMismatch {
        method: String,
        names: usize,
        factories: usize,
    },
    #[error("method {method}: too many parameters ({count} > {max})", max = MAX_ARGS)]
    TooManyArgs { method: String, count: usize },
    #[error("method {method}: argument \"{arg}\" declared twice or empty")]
    DuplicateArg { method: String, arg: String },
    #[error("method {0} registered twice")]
    DuplicateMethod(String),
    #[error("invalid method name \"{0}\"")]
    InvalidMethodName(String),
    #[error("invalid pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("unknown argument type \"{0}\"")]
    UnknownArgType(String),
    #[error("settings: {0}")]
    Settings(String),
}

/// Request-shape failure. Always answered with an opaque 500 and logged.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("unsupported HTTP method {0}")]
    UnsupportedVerb(http::Method),
    #[error("malformed path segment: {0}")]
    MalformedPath(String),
    #[error("method {0} not defined")]
    UnknownMethod(String),
    #[error("malformed query: {0}")]
    MalformedQuery(String),
    #[error("missing parameter {0}")]
    MissingParam(String),
    #[error("parameter {0} supplied more than once")]
    DuplicateParam(String),
    #[error("unexpected parameter {0}")]
    UnexpectedParam(String),
    #[error("bad parameter {name}: {reason}")]
    BadArg { name: String, reason: String },
    #[error("method returned no body and no error")]
    NoBody,
    #[error("copy body: {0}")]
    Copy(#[from] std::io::Error),
    #[error("invalid header {header}: {value:?}")]
    BadHeader { header: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_is_unset() {
        let s = Settings::default();
        assert!(s.content_type.is_empty());
        assert_eq!(s.cache, 0);
        assert!(!s.gzip);
    }

    #[test]
    fn test_settings_set_to_default() {
        let mut s = Settings::new().content_type("text/html").cache(300).gzip(true);
        s.set_to_default();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_redirect_uses_reason_phrase() {
        let err = StatusError::redirect(StatusCode::SEE_OTHER, "http://lookhere");
        assert_eq!(err.message, "See Other");
        assert_eq!(err.location.as_deref(), Some("http://lookhere"));
        assert!(err.is_redirect());
    }

    #[test]
    fn test_is_redirect_only_for_301_302_303() {
        assert!(StatusError::new(StatusCode::FOUND, "x").is_redirect());
        assert!(StatusError::new(StatusCode::MOVED_PERMANENTLY, "x").is_redirect());
        assert!(!StatusError::new(StatusCode::TEMPORARY_REDIRECT, "x").is_redirect());
        assert!(!StatusError::bad_request("x").is_redirect());
    }

    #[test]
    fn test_status_error_converts_to_method_error() {
        let err: MethodError = StatusError::not_found("gone").into();
        match err {
            MethodError::Status(e) => assert_eq!(e.code, StatusCode::NOT_FOUND),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reply_no_body() {
        let reply = Reply::no_body().with_settings(Settings::new().gzip(true));
        assert!(!reply.has_body());
        assert!(reply.settings().is_some_and(|s| s.gzip));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::TooManyArgs {
            method: "Echo".into(),
            count: 11,
        };
        assert_eq!(err.to_string(), "method Echo: too many parameters (11 > 10)");
    }
}

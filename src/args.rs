use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::types::{MethodError, StatusError};

/// Contract every method argument type satisfies: it is built from the raw
/// query value by an [`ArgFactory`] and then validates itself.
///
/// A failing `check()` is handed to the client like any other method error,
/// so return a [`StatusError`] to pick the status code.
pub trait Arg: Any + Send + Sync {
    fn check(&self) -> Result<(), MethodError>;
}

type FactoryFn = dyn Fn(&str) -> Result<Box<dyn Arg>, String> + Send + Sync;

/// Builds an [`Arg`] from a single raw string value.
#[derive(Clone)]
pub struct ArgFactory {
    f: Arc<FactoryFn>,
}

impl ArgFactory {
    /// Factory for any `FromStr` argument type. A parse error is reported
    /// as a bad parameter, not as a validation failure.
    pub fn parse<T>() -> Self
    where
        T: Arg + FromStr,
        T::Err: fmt::Display,
    {
        Self {
            f: Arc::new(|raw: &str| {
                raw.parse::<T>()
                    .map(|v| Box::new(v) as Box<dyn Arg>)
                    .map_err(|e| e.to_string())
            }),
        }
    }

    /// Factory from an infallible constructor.
    pub fn from_fn<T, F>(f: F) -> Self
    where
        T: Arg,
        F: Fn(&str) -> T + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |raw: &str| Ok(Box::new(f(raw)) as Box<dyn Arg>)),
        }
    }

    /// Factory from a fallible constructor.
    pub fn try_from_fn<T, E, F>(f: F) -> Self
    where
        T: Arg,
        E: fmt::Display,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |raw: &str| {
                f(raw)
                    .map(|v| Box::new(v) as Box<dyn Arg>)
                    .map_err(|e| e.to_string())
            }),
        }
    }

    pub(crate) fn create(&self, raw: &str) -> Result<Box<dyn Arg>, String> {
        (self.f)(raw)
    }
}

impl fmt::Debug for ArgFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgFactory")
    }
}

/// Shorthand for [`ArgFactory::parse`].
pub fn arg<T>() -> ArgFactory
where
    T: Arg + FromStr,
    T::Err: fmt::Display,
{
    ArgFactory::parse::<T>()
}

/// Constructed and validated arguments, in declaration order.
#[derive(Default)]
pub struct Args {
    values: Vec<(String, Box<dyn Arg>)>,
}

impl Args {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            values: Vec::with_capacity(n),
        }
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: Box<dyn Arg>) {
        self.values.push((name.into(), value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    /// Borrow the argument `name` as `T`. `None` if absent or of another type.
    pub fn get<T: Arg>(&self, name: &str) -> Option<&T> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| {
                let any: &dyn Any = &**v;
                any.downcast_ref::<T>()
            })
    }

    /// Like [`get`](Self::get) but reports a missing or mistyped argument
    /// as an error, for use with `?` inside a method.
    pub fn require<T: Arg>(&self, name: &str) -> Result<&T, MethodError> {
        self.get(name).ok_or_else(|| {
            MethodError::other(format!(
                "argument {name} missing or not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Move the argument `name` out as `T`.
    pub fn take<T: Arg>(&mut self, name: &str) -> Option<T> {
        let idx = self.values.iter().position(|(n, v)| {
            let any: &dyn Any = &**v;
            n == name && any.is::<T>()
        })?;
        let (_, value) = self.values.remove(idx);
        let any: Box<dyn Any> = value;
        any.downcast::<T>().ok().map(|b| *b)
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ── Built-in argument types ──

/// A string restricted to ASCII letters, digits, space, `-`, `_` and `.`.
///
/// Anything else fails `check()` with 400 Bad Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeString(pub String);

impl SafeString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SafeString {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SafeString(s.to_string()))
    }
}

impl fmt::Display for SafeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Arg for SafeString {
    fn check(&self) -> Result<(), MethodError> {
        let ok = self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'));
        if ok {
            Ok(())
        } else {
            Err(StatusError::bad_request("parameter contains unsafe characters").into())
        }
    }
}

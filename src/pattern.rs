//! Method declaration strings.
//!
//! A pattern names the method and its typed parameters in one line:
//!
//! ```text
//! /Echo?name SafeString
//! /api/Search?term SafeString&limit Count
//! ```
//!
//! Only the final path segment matters for routing, so `/api/Search`
//! declares the method `Search`.

use std::collections::HashMap;

use crate::args::{arg, ArgFactory, SafeString};
use crate::types::ConfigError;

/// Parsed form of a declaration pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub method: String,
    /// `(parameter name, type name)` in declaration order.
    pub args: Vec<(String, String)>,
}

/// Parse a declaration pattern. Type names are not resolved here.
pub fn parse_pattern(pattern: &str) -> Result<Pattern, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = pattern.trim();
    if !trimmed.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    let (path, params) = match trimmed.split_once('?') {
        Some((path, params)) => (path, Some(params)),
        None => (trimmed, None),
    };

    let method = path.rsplit('/').next().unwrap_or_default();
    if method.is_empty() {
        return Err(invalid("empty method name"));
    }

    let mut args = Vec::new();
    if let Some(params) = params {
        for spec in params.split('&') {
            let mut parts = spec.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(type_name), None) => {
                    args.push((name.to_string(), type_name.to_string()));
                }
                _ => return Err(invalid("parameters must read \"name Type\"")),
            }
        }
    }

    Ok(Pattern {
        method: method.to_string(),
        args,
    })
}

/// Type-name → factory table used to resolve patterns.
#[derive(Debug, Clone, Default)]
pub struct ArgTypes {
    factories: HashMap<String, ArgFactory>,
}

impl ArgTypes {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table that already knows the built-in argument types.
    pub fn with_builtins() -> Self {
        let mut types = Self::new();
        types.register("SafeString", arg::<SafeString>());
        types
    }

    /// Add or replace a type name.
    pub fn register(&mut self, name: impl Into<String>, factory: ArgFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<ArgFactory, ConfigError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownArgType(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_args() {
        let p = parse_pattern("/Greeting").unwrap();
        assert_eq!(p.method, "Greeting");
        assert!(p.args.is_empty());
    }

    #[test]
    fn test_parse_one_arg() {
        let p = parse_pattern("/Echo?name SafeString").unwrap();
        assert_eq!(p.method, "Echo");
        assert_eq!(p.args, vec![("name".into(), "SafeString".into())]);
    }

    #[test]
    fn test_parse_nested_path_uses_last_segment() {
        let p = parse_pattern("/api/v1/Search?term SafeString&limit Count").unwrap();
        assert_eq!(p.method, "Search");
        assert_eq!(p.args.len(), 2);
        assert_eq!(p.args[1], ("limit".into(), "Count".into()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["Echo", "/", "/api/", "/Echo?name", "/Echo?name A B", "/Echo?"] {
            let err = parse_pattern(bad).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidPattern { .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn test_arg_types_resolve() {
        let types = ArgTypes::with_builtins();
        assert!(types.resolve("SafeString").is_ok());
        assert_eq!(
            types.resolve("Nope").unwrap_err(),
            ConfigError::UnknownArgType("Nope".into())
        );
    }

    #[test]
    fn test_arg_types_register() {
        let mut types = ArgTypes::new();
        assert!(types.resolve("Name").is_err());
        types.register("Name", arg::<SafeString>());
        assert!(types.resolve("Name").is_ok());
    }
}

use std::path::Path;

use crate::types::{ConfigError, Settings};

/// Load default settings from a JSON file on disk.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| ConfigError::Settings(format!("read {}: {}", path.display(), e)))?;
    parse_settings(&data)
}

/// Parse settings from raw JSON bytes.
///
/// Every field is optional: `{"contentType":"text/html","cache":300,"gzip":true}`.
pub fn parse_settings(data: &[u8]) -> Result<Settings, ConfigError> {
    serde_json::from_slice(data).map_err(|e| ConfigError::Settings(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings_full() {
        let json = r#"{"contentType":"text/html","cache":300,"gzip":true}"#;
        let s = parse_settings(json.as_bytes()).unwrap();
        assert_eq!(s.content_type, "text/html");
        assert_eq!(s.cache, 300);
        assert!(s.gzip);
    }

    #[test]
    fn test_parse_settings_partial() {
        let s = parse_settings(br#"{"gzip":true}"#).unwrap();
        assert!(s.gzip);
        assert!(s.content_type.is_empty());
        assert_eq!(s.cache, 0);
    }

    #[test]
    fn test_parse_settings_malformed() {
        let result = parse_settings(b"{not valid json");
        assert!(matches!(result, Err(ConfigError::Settings(_))));
    }

    #[test]
    fn test_load_settings_missing_file() {
        let result = load_settings("/nonexistent/settings.json");
        assert!(result.is_err());
    }
}

//! Strict `application/x-www-form-urlencoded` query parsing.
//!
//! Unlike lenient decoders this rejects bad percent escapes, `;`
//! separators and non-UTF-8 results, so a garbled query never reaches a
//! method as a plausible value.

use std::collections::HashMap;

/// Multi-valued query mapping. Values keep the order they appeared in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Query {
    params: HashMap<String, Vec<String>>,
}

impl Query {
    /// First value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn values(&self, key: &str) -> &[String] {
        self.params.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Count of every supplied value, repeats and unknown keys included.
    pub fn total_values(&self) -> usize {
        self.params.values().map(Vec::len).sum()
    }
}

/// Parse a raw query string (without the leading `?`).
pub fn parse_query(raw: &str) -> Result<Query, String> {
    let mut query = Query::default();
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        if pair.contains(';') {
            return Err(format!("invalid semicolon separator in {pair:?}"));
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(key, true)?;
        let value = decode(value, true)?;
        query.params.entry(key).or_default().push(value);
    }
    Ok(query)
}

/// Percent-decode one path segment. Unlike query values, `+` stays `+`.
pub fn decode_path_segment(segment: &str) -> Result<String, String> {
    decode(segment, false)
}

fn decode(s: &str, plus_as_space: bool) -> Result<String, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' if plus_as_space => out.push(b' '),
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_val);
                let lo = bytes.get(i + 2).copied().and_then(hex_val);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => {
                        let end = (i + 3).min(bytes.len());
                        return Err(format!(
                            "invalid escape {:?}",
                            String::from_utf8_lossy(&bytes[i..end])
                        ));
                    }
                }
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| format!("invalid UTF-8 in {s:?}"))
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let q = parse_query("name=Gopher&n=5").unwrap();
        assert_eq!(q.first("name"), Some("Gopher"));
        assert_eq!(q.first("n"), Some("5"));
        assert_eq!(q.total_values(), 2);
    }

    #[test]
    fn test_parse_empty() {
        let q = parse_query("").unwrap();
        assert_eq!(q.total_values(), 0);
        assert!(!q.contains("name"));
    }

    #[test]
    fn test_repeated_key_keeps_all_values() {
        let q = parse_query("name=a&name=b").unwrap();
        assert_eq!(q.values("name"), ["a".to_string(), "b".to_string()]);
        assert_eq!(q.first("name"), Some("a"));
        assert_eq!(q.total_values(), 2);
    }

    #[test]
    fn test_decodes_plus_and_percent() {
        let q = parse_query("msg=hello+big%20world%21").unwrap();
        assert_eq!(q.first("msg"), Some("hello big world!"));
    }

    #[test]
    fn test_key_without_value() {
        let q = parse_query("flag").unwrap();
        assert_eq!(q.first("flag"), Some(""));
    }

    #[test]
    fn test_rejects_bad_escape() {
        assert!(parse_query("name=%zz").is_err());
        assert!(parse_query("name=abc%4").is_err());
        assert!(parse_query("name=%").is_err());
        assert!(parse_query("name=%é").is_err());
    }

    #[test]
    fn test_decode_path_segment() {
        assert_eq!(decode_path_segment("Ec%68o").unwrap(), "Echo");
        assert_eq!(decode_path_segment("a+b").unwrap(), "a+b");
        assert!(decode_path_segment("Ec%6").is_err());
    }

    #[test]
    fn test_rejects_semicolon() {
        assert!(parse_query("a=1;b=2").is_err());
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        assert!(parse_query("name=%ff%fe").is_err());
    }
}

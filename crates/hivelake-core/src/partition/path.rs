//! Hive-style `key=value` path segments.
//!
//! Keys and values are escaped the way Hive escapes partition directory
//! names: control characters and a fixed set of path-hostile punctuation
//! become `%XX` with upper-case hex digits.

use std::{fmt, path::PathBuf};

fn needs_escape(c: char) -> bool {
    c.is_ascii_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Escape a partition key or value for use in a directory name.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if needs_escape(c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse [`escape`]. Returns `None` on a malformed `%` sequence.
pub fn unescape(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let hi = chars.next()?.to_digit(16)?;
        let lo = chars.next()?.to_digit(16)?;
        out.push(char::from_u32(hi * 16 + lo)?);
    }
    Some(out)
}

/// One `key=value` level of a partition path (unescaped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionSegment {
    /// Partition key name.
    pub key: String,
    /// Canonical text of the partition value.
    pub value: String,
}

impl PartitionSegment {
    /// Directory name for this segment: `escape(key)=escape(value)`.
    pub fn dir_name(&self) -> String {
        format!("{}={}", escape(&self.key), escape(&self.value))
    }

    /// Parse a directory name. The first unescaped `=` separates key and value.
    pub fn parse_dir_name(name: &str) -> Option<Self> {
        let (key, value) = name.split_once('=')?;
        Some(Self {
            key: unescape(key)?,
            value: unescape(value)?,
        })
    }
}

/// Ordered partition segments identifying one partition directory.
///
/// An empty path denotes the table root (unpartitioned tables).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionPath {
    segments: Vec<PartitionSegment>,
}

impl PartitionPath {
    /// Build a path from segments in nesting order.
    pub fn new(segments: Vec<PartitionSegment>) -> Self {
        Self { segments }
    }

    /// Segments in nesting order.
    pub fn segments(&self) -> &[PartitionSegment] {
        &self.segments
    }

    /// Value of `key`, if present.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|s| s.key == key)
            .map(|s| s.value.as_str())
    }

    /// Path relative to the table directory, e.g. `date_year=2024/ticker=AAPL`.
    pub fn to_rel_path(&self) -> PathBuf {
        self.segments.iter().map(PartitionSegment::dir_name).collect()
    }
}

impl fmt::Display for PartitionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        for (i, s) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&s.dir_name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_hive_special_characters() {
        assert_eq!(escape("AAPL"), "AAPL");
        assert_eq!(escape("2024-01-01 09:30:00"), "2024-01-01 09%3A30%3A00");
        assert_eq!(escape("a/b=c"), "a%2Fb%3Dc");
        assert_eq!(escape("100%"), "100%25");
        assert_eq!(escape("tab\there"), "tab%09here");
        assert_eq!(escape("\u{7f}"), "%7F");
    }

    #[test]
    fn unescape_reverses_escape() {
        for raw in ["plain", "a/b=c", "x:y?z#", "50% off", "[brackets]{}^", "é"] {
            assert_eq!(unescape(&escape(raw)).as_deref(), Some(raw));
        }
    }

    #[test]
    fn unescape_rejects_malformed_sequences() {
        assert_eq!(unescape("%"), None);
        assert_eq!(unescape("%4"), None);
        assert_eq!(unescape("%ZZ"), None);
    }

    #[test]
    fn segments_parse_at_first_equals() {
        let seg = PartitionSegment {
            key: "k=1".to_string(),
            value: "v=2".to_string(),
        };
        let name = seg.dir_name();
        assert_eq!(name, "k%3D1=v%3D2");
        assert_eq!(PartitionSegment::parse_dir_name(&name), Some(seg));
        assert_eq!(PartitionSegment::parse_dir_name("no_equals"), None);
    }

    #[test]
    fn rel_path_nests_segments_in_order() {
        let path = PartitionPath::new(vec![
            PartitionSegment {
                key: "date_year".to_string(),
                value: "2024".to_string(),
            },
            PartitionSegment {
                key: "ticker".to_string(),
                value: "AAPL".to_string(),
            },
        ]);
        assert_eq!(path.to_rel_path(), PathBuf::from("date_year=2024/ticker=AAPL"));
        assert_eq!(path.to_string(), "date_year=2024/ticker=AAPL");
        assert_eq!(path.value_of("ticker"), Some("AAPL"));
        assert_eq!(PartitionPath::default().to_rel_path(), PathBuf::new());
    }
}

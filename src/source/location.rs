//! Source location grammar.

use std::fmt;
use std::path::PathBuf;

/// Where a loader gets its bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// `""` or `"-"`: the feature is turned off.
    Disabled,
    /// `http://...` or `https://...`.
    Http(String),
    /// Anything else is a filesystem path.
    File(PathBuf),
}

impl SourceLocation {
    /// Classify a raw location string.
    pub fn parse(raw: &str) -> Self {
        if is_disabled(raw) {
            SourceLocation::Disabled
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            SourceLocation::Http(raw.to_string())
        } else {
            SourceLocation::File(PathBuf::from(raw))
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, SourceLocation::Disabled)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceLocation::Http(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceLocation::Disabled => "disabled",
            SourceLocation::Http(_) => "http",
            SourceLocation::File(_) => "file",
        }
    }
}

/// True for the sentinel values that switch a feature off.
pub fn is_disabled(raw: &str) -> bool {
    raw.is_empty() || raw == "-"
}

impl From<&str> for SourceLocation {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Disabled => write!(f, "-"),
            SourceLocation::Http(url) => write!(f, "{}", url),
            SourceLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grammar() {
        assert_eq!(SourceLocation::parse(""), SourceLocation::Disabled);
        assert_eq!(SourceLocation::parse("-"), SourceLocation::Disabled);
        assert_eq!(
            SourceLocation::parse("https://conf.example.com/dyn.json"),
            SourceLocation::Http("https://conf.example.com/dyn.json".into())
        );
        assert!(SourceLocation::parse("http://127.0.0.1:8080/x").is_remote());
        assert_eq!(
            SourceLocation::parse("./conf/local.json"),
            SourceLocation::File(PathBuf::from("./conf/local.json"))
        );
        // Only the two schemes count as network locations.
        assert_eq!(SourceLocation::parse("ftp://host/x").kind(), "file");
        assert_eq!(SourceLocation::parse("--").kind(), "file");
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["http://h/dyn.json", "/etc/app/state.json"] {
            assert_eq!(SourceLocation::parse(raw).to_string(), raw);
        }
        assert_eq!(SourceLocation::Disabled.to_string(), "-");
    }
}

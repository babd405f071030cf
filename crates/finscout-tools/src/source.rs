use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a regulatory document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceReference {
    Url {
        address: String,
        /// CSS selector scoping the content of interest.
        selector: Option<String>,
    },
    File {
        path: PathBuf,
    },
}

impl SourceReference {
    /// Classify raw user input: anything starting with `http://` or `https://`
    /// is a URL, everything else is a local file path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url {
                address: trimmed.to_owned(),
                selector: None,
            }
        } else {
            Self::File {
                path: PathBuf::from(trimmed),
            }
        }
    }

    /// Attach a selector. File references are returned unchanged.
    #[must_use]
    pub fn with_selector(self, selector: impl Into<String>) -> Self {
        match self {
            Self::Url { address, .. } => Self::Url {
                address,
                selector: Some(selector.into()),
            },
            file @ Self::File { .. } => file,
        }
    }

    #[must_use]
    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::Url { selector, .. } => selector.as_deref(),
            Self::File { .. } => None,
        }
    }

    #[must_use]
    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url { .. })
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url {
                address,
                selector: Some(selector),
            } => write!(f, "{address} [{selector}]"),
            Self::Url { address, .. } => f.write_str(address),
            Self::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Plain text pulled from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub text: String,
    pub source: SourceReference,
}

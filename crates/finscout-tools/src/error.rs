use std::time::Duration;

/// Failure to obtain text from a source.
///
/// Carried verbatim into pipeline errors, so messages name the concrete
/// path, URL and selector involved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Error reading PDF file {path}: {reason}")]
    UnreadableFile { path: String, reason: String },

    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("selector '{selector}' not found on {url} within {timeout:?}")]
    SelectorNotFound {
        selector: String,
        url: String,
        timeout: Duration,
    },

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("URL not allowed: {0}")]
    UrlNotAllowed(String),

    #[error("no selector given for {url}")]
    MissingSelector { url: String },

    #[error("browser session failed: {0}")]
    Session(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_not_found_names_everything() {
        let err = ExtractionError::SelectorNotFound {
            selector: "#rules".into(),
            url: "https://regulator.example/notice".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "selector '#rules' not found on https://regulator.example/notice within 10s"
        );
    }

    #[test]
    fn unreadable_file_message() {
        let err = ExtractionError::UnreadableFile {
            path: "/tmp/missing.pdf".into(),
            reason: "No such file or directory".into(),
        };
        assert!(err.to_string().starts_with("Error reading PDF file /tmp/missing.pdf"));
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use super::{DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata};

/// Loads markdown corpus files as single documents.
pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let content = tokio::fs::read_to_string(&path).await?;
            let mut extra = HashMap::new();
            if let Some(title) = first_heading(&content) {
                extra.insert("title".to_owned(), title);
            }

            Ok(vec![Document {
                content,
                metadata: DocumentMetadata {
                    source: path.display().to_string(),
                    content_type: "text/markdown".to_owned(),
                    extra,
                },
            }])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }
}

fn first_heading(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix('#'))
        .map(|rest| rest.trim_start_matches('#').trim().to_owned())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_markdown_with_title() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lcr.md");
        std::fs::write(&file, "## Liquidity Coverage Ratio\n\nBanks hold HQLA.").unwrap();

        let docs = TextLoader::default().load(&file).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.contains("HQLA"));
        assert_eq!(docs[0].metadata.content_type, "text/markdown");
        assert_eq!(
            docs[0].metadata.extra.get("title").map(String::as_str),
            Some("Liquidity Coverage Ratio")
        );
    }

    #[tokio::test]
    async fn file_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.md");
        std::fs::write(&file, "x".repeat(100)).unwrap();

        let loader = TextLoader { max_file_size: 10 };
        let err = loader.load(&file).await.unwrap_err();
        assert!(matches!(err, DocumentError::FileTooLarge(100)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = TextLoader::default()
            .load(Path::new("/nonexistent/x.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Io(_)));
    }

    #[test]
    fn heading_detection() {
        assert_eq!(first_heading("text\n# Title\n"), Some("Title".into()));
        assert_eq!(first_heading("no heading"), None);
        assert_eq!(first_heading("#\n"), None);
    }
}

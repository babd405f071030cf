use std::path::Path;

use crate::error::ExtractionError;

/// Reads the text layer of PDF files, page by page.
#[derive(Debug, Clone)]
pub struct PdfReader {
    max_file_size: u64,
}

impl PdfReader {
    #[must_use]
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// Extract the text of every page, concatenated in page order.
    ///
    /// An empty file yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnreadableFile`] if the file is missing,
    /// too large, or not a parseable PDF.
    pub async fn read(&self, path: &Path) -> Result<String, ExtractionError> {
        let unreadable = |reason: String| ExtractionError::UnreadableFile {
            path: path.display().to_string(),
            reason,
        };

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if !meta.is_file() {
            return Err(unreadable("not a regular file".into()));
        }
        if meta.len() > self.max_file_size {
            return Err(unreadable(format!(
                "file too large: {} bytes (max: {})",
                meta.len(),
                self.max_file_size
            )));
        }
        if meta.len() == 0 {
            return Ok(String::new());
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if !has_pdf_header(&bytes) {
            return Err(unreadable("not a PDF document".into()));
        }

        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| unreadable(format!("PDF parser aborted: {e}")))?
        .map_err(unreadable)?;

        tracing::debug!(pages = pages.len(), "read {}", path.display());
        Ok(join_pages(&pages))
    }
}

/// The `%PDF-` marker may be preceded by up to 1 KiB of junk.
fn has_pdf_header(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 1024 * 1024;

    #[test]
    fn pages_keep_order() {
        let pages = vec![
            "Page one\n".to_owned(),
            "  ".to_owned(),
            "Page three".to_owned(),
        ];
        assert_eq!(join_pages(&pages), "Page one\n\nPage three");
    }

    #[test]
    fn header_detection() {
        assert!(has_pdf_header(b"%PDF-1.4\n..."));
        assert!(has_pdf_header(b"\xef\xbb\xbf%PDF-1.7"));
        assert!(!has_pdf_header(b"<html></html>"));
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let err = PdfReader::new(LIMIT)
            .read(Path::new("/nonexistent/rule.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::UnreadableFile { ref path, .. } if path == "/nonexistent/rule.pdf"
        ));
    }

    #[tokio::test]
    async fn empty_file_reads_as_empty_text() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let text = PdfReader::new(LIMIT).read(file.path()).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn non_pdf_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, "just some text").unwrap();
        let err = PdfReader::new(LIMIT).read(&path).await.unwrap_err();
        assert!(err.to_string().contains("not a PDF document"));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.pdf");
        std::fs::write(&path, vec![b'x'; 64]).unwrap();
        let err = PdfReader::new(16).read(&path).await.unwrap_err();
        assert!(err.to_string().contains("file too large"));
    }

    #[tokio::test]
    async fn directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = PdfReader::new(LIMIT).read(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}

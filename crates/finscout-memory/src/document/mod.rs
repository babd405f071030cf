pub mod error;
pub mod loader;
pub mod types;

use std::path::Path;

pub use error::DocumentError;
pub use loader::TextLoader;
pub use types::{Chunk, Document, DocumentMetadata};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>,
    >;

    fn supported_extensions(&self) -> &[&str];
}

/// Load every markdown document under `dir`, recursively, in path order.
///
/// A missing directory yields an empty corpus.
///
/// # Errors
///
/// Returns an error if a matched file cannot be read.
pub async fn load_corpus(
    dir: &Path,
    loader: &dyn DocumentLoader,
) -> Result<Vec<Document>, DocumentError> {
    if !dir.is_dir() {
        tracing::warn!("knowledge corpus directory {} not found", dir.display());
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for ext in loader.supported_extensions() {
        let pattern = format!("{}/**/*.{ext}", glob::Pattern::escape(&dir.display().to_string()));
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping unreadable corpus entry: {e}"),
            }
        }
    }
    paths.sort();
    paths.dedup();

    let mut documents = Vec::with_capacity(paths.len());
    for path in &paths {
        documents.extend(loader.load(path).await?);
    }
    tracing::debug!("loaded {} corpus documents from {}", documents.len(), dir.display());
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_markdown_recursively_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("basel")).unwrap();
        std::fs::write(dir.path().join("b.md"), "second").unwrap();
        std::fs::write(dir.path().join("basel/a.md"), "nested").unwrap();
        std::fs::write(dir.path().join("a.md"), "first").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let docs = load_corpus(dir.path(), &TextLoader::default()).await.unwrap();
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "nested"]);
    }

    #[tokio::test]
    async fn missing_dir_is_empty_corpus() {
        let docs = load_corpus(Path::new("/nonexistent/knowledge"), &TextLoader::default())
            .await
            .unwrap();
        assert!(docs.is_empty());
    }
}

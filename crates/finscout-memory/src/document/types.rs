use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub source: String,
    pub content_type: String,
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// A semantically coherent piece of a corpus document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub chunk_index: usize,
}

impl Chunk {
    /// Content hash; identical text from any document maps to the same id.
    #[must_use]
    pub fn content_hash(&self) -> String {
        blake3::hash(self.content.trim().as_bytes()).to_hex().to_string()
    }
}

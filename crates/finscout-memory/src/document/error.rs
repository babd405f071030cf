#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid corpus pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),
}

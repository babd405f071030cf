//! Source content extraction.
//!
//! [`ContentExtractor`] turns a [`SourceReference`] into plain text: PDFs are
//! read page by page, web pages are loaded in an isolated [`Browser`] session
//! and scoped to a CSS selector.

pub mod browser;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fenced;
pub mod html;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pdf;
pub mod source;

pub use browser::{Browser, HttpBrowser, PageSession};
pub use config::ExtractConfig;
pub use error::ExtractionError;
pub use extractor::ContentExtractor;
pub use fenced::extract_fenced_blocks;
pub use html::SelectorCandidate;
pub use pdf::PdfReader;
pub use source::{ExtractedDocument, SourceReference};

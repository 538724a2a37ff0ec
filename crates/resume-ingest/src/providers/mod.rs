//! Provider abstractions for the document parsing engine and candidate persistence
//!
//! The coordinator only sees the traits; the HTTP parser and the SQLite-backed
//! store are the default implementations.

pub mod http;
pub mod local;
pub mod parser;
pub mod persistence;

pub use http::HttpDocumentParser;
pub use local::LocalCandidateStore;
pub use parser::DocumentParser;
pub use persistence::CandidateStore;

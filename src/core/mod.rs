// Public modules
pub mod credential;
pub mod defaults;
pub mod deploy;
pub mod error;
pub mod git;
pub mod paths;
pub mod payload;
pub mod pipeline;
pub mod push;
pub mod status;
pub mod target;

// Internal modules - not part of public API
pub(crate) mod http;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use http::HttpStatusSource;

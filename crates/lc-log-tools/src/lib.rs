//! Log extraction for LogCurl.
//!
//! Turns heterogeneous log text (newline-delimited JSON, raw HTTP request
//! dumps, logged curl commands, plaintext access lines) into canonical
//! `CallIntent`s, with format auto-detection and a `LogSource` abstraction
//! for testability.

pub mod error;
pub mod mock;
pub mod normalize;
pub mod parsers;
pub mod source;
pub mod types;

pub use error::{LogError, LogResult};
pub use mock::MockLogSource;
pub use parsers::curl::{ParsedCurl, parse_curl_command};
pub use parsers::{detect_format, extract_intents, extract_with_format};
pub use source::{FileLogSource, LogSource, extract_from_source};
pub use types::{ExtractedIntent, LogFormat};

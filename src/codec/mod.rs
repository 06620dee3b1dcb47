//! Encoding and decoding collaborators.
//!
//! # Data Flow
//! ```text
//! Adapting stage:
//!     pending Parameters → encoding.rs → query string or body + content-type
//!
//! Completion:
//!     buffered body → decoding.rs (ResponseDecoder) → typed value
//! ```

pub mod decoding;
pub mod encoding;

pub use decoding::{BytesDecoder, DecodeError, JsonDecoder, ResponseDecoder, StringDecoder};
pub use encoding::{Destination, ParameterEncoding, Parameters};

//! Error types for DTB merge operations.

use thiserror::Error;

/// Errors that can occur while resolving, building, or saving a DTB.
///
/// Cancellation is not represented here: a cancelled build or save returns
/// `Ok(false)`.
#[derive(Error, Debug)]
pub enum Error {
    /// The builder was asked to do something it has no input for.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required anchor, heading, SMIL document, or `<seq>` is missing or ambiguous.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Unsupported container, malformed clip value, or mismatched sample formats.
    #[error("Format error: {0}")]
    Format(String),

    /// Timing data that contradicts the audio it refers to.
    #[error("Data consistency error: {0}")]
    DataConsistency(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid URI: {0}")]
    Url(#[from] url::ParseError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Audio decoding error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("Audio encoding error: {0}")]
    Encode(String),
}

impl Error {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

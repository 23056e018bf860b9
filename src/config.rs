//! Build configuration.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::util::random_prefix;

/// Default tolerance for trailing audio left after the last clip of a source
/// file before the verbatim-copy fast path is abandoned.
pub const DEFAULT_ALLOWED_FILE_END_AUDIO: Duration = Duration::from_millis(1500);

/// Default audio streaming chunk size in bytes.
pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

/// Produces the per-build prefix that keeps generated file names unique.
///
/// The default draws a fresh random prefix for every build; tests and
/// reproducible builds inject a fixed one.
#[derive(Clone)]
pub struct PrefixGenerator(Rc<dyn Fn() -> String>);

impl PrefixGenerator {
    pub fn new(generate: impl Fn() -> String + 'static) -> Self {
        Self(Rc::new(generate))
    }

    /// Always returns `prefix`.
    pub fn fixed(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move || prefix.clone())
    }

    /// Random lowercase prefix of `len` letters per build.
    pub fn random(len: usize) -> Self {
        Self::new(move || random_prefix(len))
    }

    pub fn generate(&self) -> String {
        (self.0)()
    }
}

impl Default for PrefixGenerator {
    fn default() -> Self {
        Self::random(4)
    }
}

impl fmt::Debug for PrefixGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrefixGenerator")
    }
}

/// Options for [`crate::DtbBuilder`].
///
/// ```
/// use std::time::Duration;
/// use dtbmerge::BuildOptions;
///
/// let options = BuildOptions::default()
///     .with_allowed_file_end_audio(Duration::from_secs(2))
///     .with_fixed_prefix("book");
/// assert_eq!(options.ncc_name, "ncc.html");
/// ```
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum audio allowed after a single clip's end for the source file to
    /// be copied verbatim instead of re-encoded.
    pub allowed_file_end_audio: Duration,
    /// File name of the output NCC.
    pub ncc_name: String,
    /// File name of the output content document, when one is produced.
    pub content_name: String,
    /// Per-build file name prefix source.
    pub prefix: PrefixGenerator,
    /// Size of the buffer used to stream PCM between decoder and encoder.
    pub chunk_bytes: usize,
    /// Bitrate for re-encoded MP3 destinations.
    pub mp3_bitrate_kbps: u32,
    /// Value written to `ncc:generator` metas.
    pub generator: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            allowed_file_end_audio: DEFAULT_ALLOWED_FILE_END_AUDIO,
            ncc_name: "ncc.html".to_string(),
            content_name: "content.html".to_string(),
            prefix: PrefixGenerator::default(),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            mp3_bitrate_kbps: 64,
            generator: format!("dtbmerge {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BuildOptions {
    pub fn with_allowed_file_end_audio(mut self, tolerance: Duration) -> Self {
        self.allowed_file_end_audio = tolerance;
        self
    }

    pub fn with_ncc_name(mut self, name: impl Into<String>) -> Self {
        self.ncc_name = name.into();
        self
    }

    pub fn with_content_name(mut self, name: impl Into<String>) -> Self {
        self.content_name = name.into();
        self
    }

    pub fn with_prefix(mut self, prefix: PrefixGenerator) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_fixed_prefix(self, prefix: impl Into<String>) -> Self {
        self.with_prefix(PrefixGenerator::fixed(prefix))
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn with_mp3_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.mp3_bitrate_kbps = kbps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BuildOptions::default();
        assert_eq!(options.allowed_file_end_audio, Duration::from_millis(1500));
        assert_eq!(options.content_name, "content.html");
        assert_eq!(options.prefix.generate().len(), 4);
    }

    #[test]
    fn test_fixed_prefix() {
        let options = BuildOptions::default().with_fixed_prefix("dtb");
        assert_eq!(options.prefix.generate(), "dtb");
        assert_eq!(options.prefix.generate(), "dtb");
    }

    #[test]
    fn test_chunk_bytes_never_zero() {
        assert_eq!(BuildOptions::default().with_chunk_bytes(0).chunk_bytes, 1);
    }
}

//! Audio segments and assembly.
//!
//! A merge unit's audio is an ordered list of [`AudioSegment`]s: windows into
//! source files. The [`assemble`] module turns each list into one destination
//! file, either by copying a source verbatim or by streaming the decoded PCM
//! windows into a new stream.

pub mod assemble;
pub mod id3;
pub mod pcm;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::dom::uri;
use crate::error::{Error, Result};

pub use assemble::{AssemblyMode, AudioAssembler, audio_file_duration};
pub use pcm::PcmFormat;

/// A `[clip_begin, clip_end)` window into one source audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub audio_file: Url,
    pub clip_begin: Duration,
    pub clip_end: Duration,
}

impl AudioSegment {
    pub fn new(audio_file: Url, clip_begin: Duration, clip_end: Duration) -> Self {
        Self {
            audio_file,
            clip_begin,
            clip_end,
        }
    }

    pub fn duration(&self) -> Duration {
        self.clip_end.saturating_sub(self.clip_begin)
    }
}

impl fmt::Display for AudioSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:.3}s, {:.3}s)",
            uri::file_name(&self.audio_file),
            self.clip_begin.as_secs_f64(),
            self.clip_end.as_secs_f64()
        )
    }
}

/// Merge adjacent segments on the same file whose clips touch.
pub fn coalesce_segments(segments: impl IntoIterator<Item = AudioSegment>) -> Vec<AudioSegment> {
    let mut out: Vec<AudioSegment> = Vec::new();
    for segment in segments {
        if let Some(last) = out.last_mut()
            && last.audio_file == segment.audio_file
            && last.clip_end == segment.clip_begin
        {
            last.clip_end = segment.clip_end;
            continue;
        }
        out.push(segment);
    }
    out
}

/// Supported audio containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    Wav,
    Mp3,
}

impl AudioContainer {
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioContainer::Wav),
            "mp3" => Ok(AudioContainer::Mp3),
            other => Err(Error::format(format!(
                "unsupported audio container extension {other:?}"
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                Error::format(format!("audio file has no extension: {}", path.display()))
            })?;
        Self::from_extension(ext)
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let ext = uri::extension(url)
            .ok_or_else(|| Error::format(format!("audio file has no extension: {url}")))?;
        Self::from_extension(&ext)
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioContainer::Wav => "wav",
            AudioContainer::Mp3 => "mp3",
        }
    }
}

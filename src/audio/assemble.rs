//! Destination audio assembly.
//!
//! For every generated audio file the builder records the ordered source
//! segments it must contain. A destination made of one clip that covers a
//! whole source (give or take `allowed_file_end_audio` of trailing audio) is a
//! plain file copy. Anything else is decoded and streamed window by window into
//! a fresh stream in bounded chunks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use super::id3::{leading_id3v2, trailing_id3v1};
use super::pcm::{PcmFormat, PcmReader, create_writer, open_reader};
use super::{AudioContainer, AudioSegment};
use crate::config::BuildOptions;
use crate::error::{Error, Result};
use crate::progress::{Progress, percent};
use crate::store::to_file_path;

/// How a destination file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    /// The source file was copied byte for byte.
    Copied,
    /// The segments were decoded and re-encoded.
    Encoded,
}

/// Header facts about a source file.
#[derive(Debug, Clone, Copy)]
struct SourceInfo {
    container: AudioContainer,
    format: PcmFormat,
    duration: Duration,
}

/// Decoded duration of an audio file, from its container header when it
/// states a length, otherwise by decoding the whole stream.
pub fn audio_file_duration(path: &Path) -> Result<Duration> {
    Ok(probe(path)?.duration)
}

fn probe(path: &Path) -> Result<SourceInfo> {
    let container = AudioContainer::from_path(path)?;
    let mut reader = open_reader(path)?;
    let format = reader.format();
    let frames = match reader.total_frames() {
        Some(frames) => frames,
        None => count_frames(reader.as_mut())?,
    };
    Ok(SourceInfo {
        container,
        format,
        duration: format.frames_to_duration(frames),
    })
}

fn count_frames(reader: &mut dyn PcmReader) -> Result<u64> {
    let block = reader.format().block_align().max(1);
    let mut buf = vec![0u8; block * 4096];
    let mut bytes = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        bytes += n as u64;
    }
    Ok(bytes / block as u64)
}

/// Builds destination audio files from segment lists.
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    allowed_file_end_audio: Duration,
    chunk_bytes: usize,
    mp3_bitrate_kbps: u32,
}

impl AudioAssembler {
    pub fn new(options: &BuildOptions) -> Self {
        Self {
            allowed_file_end_audio: options.allowed_file_end_audio,
            chunk_bytes: options.chunk_bytes,
            mp3_bitrate_kbps: options.mp3_bitrate_kbps,
        }
    }

    /// Assemble every `(file name, segments)` pair into `dir`, skipping empty
    /// segment lists. Checks for cancellation once per destination.
    pub fn assemble_all(
        &self,
        dir: &Path,
        plan: &[(String, Vec<AudioSegment>)],
        progress: &mut dyn Progress,
    ) -> Result<bool> {
        for (i, (name, segments)) in plan.iter().enumerate() {
            if progress
                .report(percent(i, plan.len()), &format!("Assembling audio {name}"))
                .is_cancel()
            {
                log::info!("Audio assembly cancelled before {name}");
                return Ok(false);
            }
            if segments.is_empty() {
                continue;
            }
            self.assemble(&dir.join(name), segments)?;
        }
        Ok(true)
    }

    /// Produce `destination` from `segments`.
    pub fn assemble(&self, destination: &Path, segments: &[AudioSegment]) -> Result<AssemblyMode> {
        if segments.is_empty() {
            return Err(Error::Configuration(format!(
                "no audio segments for {}",
                destination.display()
            )));
        }
        let dest_container = AudioContainer::from_path(destination)?;

        let mut sources: HashMap<&Url, (PathBuf, SourceInfo)> = HashMap::new();
        for segment in segments {
            if !sources.contains_key(&segment.audio_file) {
                let path = to_file_path(&segment.audio_file)?;
                let info = probe(&path)?;
                sources.insert(&segment.audio_file, (path, info));
            }
        }

        for segment in segments {
            let (path, info) = &sources[&segment.audio_file];
            if segment.clip_end <= segment.clip_begin {
                return Err(Error::DataConsistency(format!(
                    "empty or inverted clip {segment}"
                )));
            }
            if segment.clip_end > info.duration {
                return Err(Error::DataConsistency(format!(
                    "clip end {:.3}s is beyond the {:.3}s of audio in {}",
                    segment.clip_end.as_secs_f64(),
                    info.duration.as_secs_f64(),
                    path.display()
                )));
            }
        }

        if let [segment] = segments {
            let (path, info) = &sources[&segment.audio_file];
            let trailing = info.duration - segment.clip_end;
            if segment.clip_begin.is_zero()
                && trailing < self.allowed_file_end_audio
                && info.container == dest_container
            {
                log::debug!(
                    "Copying {} to {}",
                    path.display(),
                    destination.display()
                );
                std::fs::copy(path, destination)?;
                return Ok(AssemblyMode::Copied);
            }
        }

        let first = &sources[&segments[0].audio_file];
        let format = first.1.format;
        for segment in segments {
            let (path, info) = &sources[&segment.audio_file];
            if info.format != format {
                return Err(Error::format(format!(
                    "sample format mismatch for {}: {} is {}, expected {}",
                    destination.display(),
                    path.display(),
                    info.format,
                    format
                )));
            }
        }

        let (leading, trailing) = if dest_container == AudioContainer::Mp3 {
            let last = &sources[&segments[segments.len() - 1].audio_file];
            let leading = if first.1.container == AudioContainer::Mp3 {
                leading_id3v2(&first.0)?
            } else {
                Vec::new()
            };
            let trailing = if last.1.container == AudioContainer::Mp3 {
                trailing_id3v1(&last.0)?
            } else {
                Vec::new()
            };
            (leading, trailing)
        } else {
            (Vec::new(), Vec::new())
        };

        log::debug!(
            "Encoding {} segment(s) into {} ({format})",
            segments.len(),
            destination.display()
        );
        let result = self.stream_segments(
            destination,
            format,
            segments,
            &sources,
            leading,
            trailing,
        );
        if result.is_err() {
            let _ = std::fs::remove_file(destination);
        }
        result.map(|()| AssemblyMode::Encoded)
    }

    fn stream_segments(
        &self,
        destination: &Path,
        format: PcmFormat,
        segments: &[AudioSegment],
        sources: &HashMap<&Url, (PathBuf, SourceInfo)>,
        leading: Vec<u8>,
        trailing: Vec<u8>,
    ) -> Result<()> {
        let mut writer = create_writer(
            destination,
            format,
            self.mp3_bitrate_kbps,
            leading,
            trailing,
        )?;

        let block = format.block_align().max(1);
        let chunk = (self.chunk_bytes / block).max(1) * block;
        let mut buf = vec![0u8; chunk];

        for segment in segments {
            let (path, _) = &sources[&segment.audio_file];
            let mut reader = open_reader(path)?;

            let start = format.byte_offset(segment.clip_begin);
            let end = format.byte_offset(segment.clip_end);

            if reader.skip(start)? < start {
                return Err(Error::DataConsistency(format!(
                    "{} ends before clip begin {:.3}s",
                    path.display(),
                    segment.clip_begin.as_secs_f64()
                )));
            }

            let mut remaining = end - start;
            while remaining > 0 {
                let want = (remaining.min(chunk as u64)) as usize;
                let n = reader.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(Error::DataConsistency(format!(
                        "{} ends {:.3}s before clip end {:.3}s",
                        path.display(),
                        format.frames_to_duration(remaining / block as u64).as_secs_f64(),
                        segment.clip_end.as_secs_f64()
                    )));
                }
                writer.write_pcm(&buf[..n])?;
                remaining -= n as u64;
            }
        }

        writer.finish()
    }
}

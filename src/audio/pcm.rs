//! PCM byte streams over WAV and MP3 files.
//!
//! Readers produce interleaved little-endian signed PCM at the source's bit
//! depth; writers consume the same layout. Offsets into a stream are always
//! whole sample frames.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use mp3lame_encoder::{Bitrate, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AudioContainer;
use crate::error::{Error, Result};

/// Sample layout of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample).div_ceil(8)
    }

    /// Bytes per sample frame (one sample for every channel).
    pub fn block_align(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * self.block_align() as u64
    }

    /// Sample frame nearest to `at`.
    pub fn frame_at(&self, at: Duration) -> u64 {
        let rate = u128::from(self.sample_rate);
        ((at.as_nanos() * rate + 500_000_000) / 1_000_000_000) as u64
    }

    /// Byte offset of the frame nearest to `at`: `seconds × bytesPerSecond`
    /// aligned to a frame boundary.
    pub fn byte_offset(&self, at: Duration) -> u64 {
        self.frame_at(at) * self.block_align() as u64
    }

    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(frames) * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::new(
            (nanos / 1_000_000_000) as u64,
            (nanos % 1_000_000_000) as u32,
        )
    }
}

impl std::fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} bit, {} ch",
            self.sample_rate, self.bits_per_sample, self.channels
        )
    }
}

// ============================================================================
// Readers
// ============================================================================

/// A decoder producing PCM bytes.
pub trait PcmReader {
    fn format(&self) -> PcmFormat;

    /// Total length in frames, if the container header states it.
    fn total_frames(&self) -> Option<u64>;

    /// Discard `bytes` bytes of PCM. Returns how many were actually skipped.
    fn skip(&mut self, bytes: u64) -> Result<u64>;

    /// Fill `buf` with PCM bytes. `buf.len()` must be a multiple of the
    /// frame size. Returns 0 at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Open a PCM reader for `path`, choosing the decoder by extension.
pub fn open_reader(path: &Path) -> Result<Box<dyn PcmReader>> {
    match AudioContainer::from_path(path)? {
        AudioContainer::Wav => Ok(Box::new(WavPcmReader::open(path)?)),
        AudioContainer::Mp3 => Ok(Box::new(Mp3PcmReader::open(path)?)),
    }
}

/// WAV source read through hound.
pub struct WavPcmReader {
    reader: hound::WavReader<BufReader<File>>,
    format: PcmFormat,
    position: u64,
}

impl WavPcmReader {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(Error::format(format!(
                "floating point WAV is not supported: {}",
                path.display()
            )));
        }
        if !matches!(spec.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(Error::format(format!(
                "unsupported WAV bit depth {}: {}",
                spec.bits_per_sample,
                path.display()
            )));
        }
        Ok(Self {
            reader,
            format: PcmFormat {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                bits_per_sample: spec.bits_per_sample,
            },
            position: 0,
        })
    }
}

impl PcmReader for WavPcmReader {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn total_frames(&self) -> Option<u64> {
        Some(u64::from(self.reader.duration()))
    }

    fn skip(&mut self, bytes: u64) -> Result<u64> {
        let total = u64::from(self.reader.duration());
        let frames = bytes / self.format.block_align() as u64;
        let target = (self.position + frames).min(total);
        self.reader.seek(target as u32)?;
        let skipped = (target - self.position) * self.format.block_align() as u64;
        self.position = target;
        Ok(skipped)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let width = self.format.bytes_per_sample();
        let wanted = buf.len() / width;
        let mut written = 0;
        for sample in self.reader.samples::<i32>().take(wanted) {
            let sample = sample?;
            let bytes = sample.to_le_bytes();
            buf[written..written + width].copy_from_slice(&bytes[..width]);
            written += width;
        }
        self.position += (written / self.format.block_align()) as u64;
        Ok(written)
    }
}

/// MP3 source decoded through symphonia into 16-bit PCM.
pub struct Mp3PcmReader {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: PcmFormat,
    total_frames: Option<u64>,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
}

impl Mp3PcmReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let format_options = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &format_options,
            &MetadataOptions::default(),
        )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::format(format!("no audio track in {}", path.display())))?;
        let params = track.codec_params.clone();
        let track_id = track.id;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::format(format!("unknown sample rate: {}", path.display())))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::format(format!("unknown channel layout: {}", path.display())))?;

        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            format: PcmFormat {
                sample_rate,
                channels,
                bits_per_sample: 16,
            },
            total_frames: params.n_frames,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        })
    }

    /// Decode the next packet into `pending`. Returns false at end of stream.
    fn fill(&mut self) -> Result<bool> {
        while !self.finished {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);

                    self.pending.clear();
                    self.pending_pos = 0;
                    for s in samples.samples() {
                        self.pending.extend_from_slice(&s.to_le_bytes());
                    }
                    if !self.pending.is_empty() {
                        return Ok(true);
                    }
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::warn!("Skipping undecodable MP3 frame: {msg}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    fn available(&self) -> usize {
        self.pending.len() - self.pending_pos
    }
}

impl PcmReader for Mp3PcmReader {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn skip(&mut self, bytes: u64) -> Result<u64> {
        let mut skipped = 0u64;
        while skipped < bytes {
            if self.available() == 0 && !self.fill()? {
                break;
            }
            let take = (self.available() as u64).min(bytes - skipped) as usize;
            self.pending_pos += take;
            skipped += take as u64;
        }
        Ok(skipped)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.available() == 0 && !self.fill()? {
                break;
            }
            let take = self.available().min(buf.len() - written);
            buf[written..written + take]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
            self.pending_pos += take;
            written += take;
        }
        Ok(written)
    }
}

// ============================================================================
// Writers
// ============================================================================

/// An encoder consuming PCM bytes.
pub trait PcmWriter {
    fn write_pcm(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush the encoder and close the file.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Open a PCM writer for `path`. `leading`/`trailing` are raw tag bytes
/// written around an MP3 stream; they are ignored for WAV.
pub fn create_writer(
    path: &Path,
    format: PcmFormat,
    mp3_bitrate_kbps: u32,
    leading: Vec<u8>,
    trailing: Vec<u8>,
) -> Result<Box<dyn PcmWriter>> {
    match AudioContainer::from_path(path)? {
        AudioContainer::Wav => Ok(Box::new(WavPcmWriter::create(path, format)?)),
        AudioContainer::Mp3 => Ok(Box::new(Mp3PcmWriter::create(
            path,
            format,
            mp3_bitrate_kbps,
            &leading,
            trailing,
        )?)),
    }
}

/// WAV destination written through hound.
pub struct WavPcmWriter {
    writer: hound::WavWriter<BufWriter<File>>,
    format: PcmFormat,
}

impl WavPcmWriter {
    pub fn create(path: &Path, format: PcmFormat) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: hound::WavWriter::create(path, spec)?,
            format,
        })
    }
}

impl PcmWriter for WavPcmWriter {
    fn write_pcm(&mut self, bytes: &[u8]) -> Result<()> {
        let width = self.format.bytes_per_sample();
        for chunk in bytes.chunks_exact(width) {
            match width {
                1 => self.writer.write_sample(chunk[0] as i8)?,
                2 => self.writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?,
                3 => {
                    let value = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                    self.writer.write_sample(value)?;
                }
                _ => self.writer.write_sample(i32::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3],
                ]))?,
            }
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

/// MP3 destination encoded through LAME.
pub struct Mp3PcmWriter {
    encoder: mp3lame_encoder::Encoder,
    file: BufWriter<File>,
    channels: u16,
    trailing: Vec<u8>,
    samples: Vec<i16>,
    encoded: Vec<u8>,
}

impl Mp3PcmWriter {
    pub fn create(
        path: &Path,
        format: PcmFormat,
        bitrate_kbps: u32,
        leading: &[u8],
        trailing: Vec<u8>,
    ) -> Result<Self> {
        if format.bits_per_sample != 16 {
            return Err(Error::format(format!(
                "MP3 output needs 16-bit PCM, got {format}"
            )));
        }
        if !(1..=2).contains(&format.channels) {
            return Err(Error::format(format!(
                "MP3 output supports mono or stereo, got {format}"
            )));
        }

        let mut builder = mp3lame_encoder::Builder::new()
            .ok_or_else(|| Error::Encode("failed to initialize LAME".to_string()))?;
        builder
            .set_num_channels(format.channels as u8)
            .map_err(encode_error)?;
        builder
            .set_sample_rate(format.sample_rate)
            .map_err(encode_error)?;
        builder
            .set_brate(bitrate(bitrate_kbps))
            .map_err(encode_error)?;
        builder.set_quality(Quality::Good).map_err(encode_error)?;
        let encoder = builder.build().map_err(encode_error)?;

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(leading)?;

        Ok(Self {
            encoder,
            file,
            channels: format.channels,
            trailing,
            samples: Vec::new(),
            encoded: Vec::new(),
        })
    }
}

impl PcmWriter for Mp3PcmWriter {
    fn write_pcm(&mut self, bytes: &[u8]) -> Result<()> {
        self.samples.clear();
        self.samples.extend(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]])),
        );
        self.encoded.clear();
        self.encoded
            .reserve(mp3lame_encoder::max_required_buffer_size(self.samples.len()));
        let result = if self.channels == 1 {
            self.encoder
                .encode_to_vec(MonoPcm(&self.samples), &mut self.encoded)
        } else {
            self.encoder
                .encode_to_vec(InterleavedPcm(&self.samples), &mut self.encoded)
        };
        result.map_err(encode_error)?;
        self.file.write_all(&self.encoded)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.encoded.clear();
        self.encoded.reserve(7200);
        self.encoder
            .flush_to_vec::<FlushNoGap>(&mut self.encoded)
            .map_err(encode_error)?;
        self.file.write_all(&self.encoded)?;
        self.file.write_all(&self.trailing)?;
        self.file.flush()?;
        Ok(())
    }
}

fn encode_error<E: std::fmt::Debug>(e: E) -> Error {
    Error::Encode(format!("{e:?}"))
}

fn bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=8 => Bitrate::Kbps8,
        9..=16 => Bitrate::Kbps16,
        17..=24 => Bitrate::Kbps24,
        25..=32 => Bitrate::Kbps32,
        33..=40 => Bitrate::Kbps40,
        41..=48 => Bitrate::Kbps48,
        49..=64 => Bitrate::Kbps64,
        65..=80 => Bitrate::Kbps80,
        81..=96 => Bitrate::Kbps96,
        97..=112 => Bitrate::Kbps112,
        113..=128 => Bitrate::Kbps128,
        129..=160 => Bitrate::Kbps160,
        161..=192 => Bitrate::Kbps192,
        193..=224 => Bitrate::Kbps224,
        225..=256 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}

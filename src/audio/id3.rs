//! ID3 tag passthrough for re-encoded MP3 destinations.
//!
//! The leading ID3v2 tag of the first source and the trailing ID3v1 tag of
//! the last source are copied byte for byte around the newly encoded stream.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

const ID3V2_HEADER_LEN: usize = 10;
const ID3V1_LEN: u64 = 128;

/// Bytes of the ID3v2 tag at the start of `path`, header and footer included.
/// Empty when the file has none.
pub fn leading_id3v2(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut header = [0u8; ID3V2_HEADER_LEN];
    if read_fully(&mut file, &mut header)? < ID3V2_HEADER_LEN {
        return Ok(Vec::new());
    }
    let Some(total) = id3v2_tag_len(&header) else {
        return Ok(Vec::new());
    };

    let mut tag = vec![0u8; total];
    tag[..ID3V2_HEADER_LEN].copy_from_slice(&header);
    let read = read_fully(&mut file, &mut tag[ID3V2_HEADER_LEN..])?;
    tag.truncate(ID3V2_HEADER_LEN + read);
    Ok(tag)
}

/// Total tag length described by an ID3v2 header, or `None` when `header`
/// is not one.
pub fn id3v2_tag_len(header: &[u8; ID3V2_HEADER_LEN]) -> Option<usize> {
    if &header[..3] != b"ID3" || header[3] == 0xFF || header[4] == 0xFF {
        return None;
    }
    if header[6..10].iter().any(|&b| b & 0x80 != 0) {
        return None;
    }
    let size = header[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | usize::from(b));
    let footer = if header[5] & 0x10 != 0 { 10 } else { 0 };
    Some(ID3V2_HEADER_LEN + size + footer)
}

/// The 128-byte ID3v1 tag at the end of `path`. Empty when the file has none.
pub fn trailing_id3v1(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < ID3V1_LEN {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::End(-(ID3V1_LEN as i64)))?;
    let mut tag = vec![0u8; ID3V1_LEN as usize];
    file.read_exact(&mut tag)?;
    if tag.starts_with(b"TAG") {
        Ok(tag)
    } else {
        Ok(Vec::new())
    }
}

fn read_fully(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

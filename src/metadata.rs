//! # Metadata Preservation Module
//!
//! Preserva i due tipi di metadata richiesti dalla conversione:
//! - **EXIF**: il blob estratto dal HEIC viene inserito così com'è nel JPEG
//!   come segmento APP1 (`Exif\0\0` + header TIFF)
//! - **Timestamp filesystem**: atime/mtime della sorgente copiati sulla
//!   destinazione con `filetime`, sempre DOPO l'ultima scrittura del file
//!
//! Il blob EXIF non viene mai reinterpretato: si toglie solo il framing
//! specifico di HEIF (offset a 4 byte verso l'header TIFF).

use crate::error::ConvertError;
use filetime::FileTime;
use std::path::Path;
use tracing::debug;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: [u8; 2] = [0xFF, 0xE0];
const APP1: [u8; 2] = [0xFF, 0xE1];
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Largest payload a single JPEG segment can carry (length field includes itself)
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

/// Extract the TIFF-headed EXIF payload from a HEIF `Exif` item.
///
/// HEIF prefixes the payload with a big-endian u32 offset to the TIFF header.
pub fn heif_exif_payload(raw: &[u8]) -> Result<&[u8], ConvertError> {
    if raw.len() < 4 {
        return Err(ConvertError::Metadata(format!(
            "EXIF item too short ({} bytes)",
            raw.len()
        )));
    }

    let offset = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let start = 4usize.saturating_add(offset);
    if start >= raw.len() {
        return Err(ConvertError::Metadata(format!(
            "EXIF TIFF header offset {} outside item of {} bytes",
            offset,
            raw.len()
        )));
    }

    Ok(&raw[start..])
}

/// Insert an APP1 EXIF segment into an encoded JPEG.
///
/// The segment goes right after the JFIF APP0 segment when there is one,
/// otherwise right after SOI.
pub fn embed_exif(jpeg: &[u8], exif: &[u8]) -> Result<Vec<u8>, ConvertError> {
    if jpeg.len() < 4 || jpeg[..2] != SOI {
        return Err(ConvertError::Encode("encoder output is not a JPEG stream".into()));
    }

    let body = exif.strip_prefix(EXIF_HEADER).unwrap_or(exif);
    let payload_len = EXIF_HEADER.len() + body.len();
    if payload_len > MAX_SEGMENT_PAYLOAD {
        return Err(ConvertError::Metadata(format!(
            "EXIF block of {} bytes does not fit in one APP1 segment",
            payload_len
        )));
    }

    let insert_at = app0_end(jpeg)?;
    let segment_len = (payload_len + 2) as u16;

    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 4);
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(&APP1);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(body);
    out.extend_from_slice(&jpeg[insert_at..]);

    debug!("Embedded {} bytes of EXIF at offset {}", payload_len, insert_at);
    Ok(out)
}

/// Offset just past the APP0 segment, or just past SOI if there is none
fn app0_end(jpeg: &[u8]) -> Result<usize, ConvertError> {
    if jpeg[2..4] != APP0 {
        return Ok(2);
    }
    if jpeg.len() < 6 {
        return Err(ConvertError::Encode("truncated APP0 segment".into()));
    }

    let len = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
    let end = 4 + len;
    if end > jpeg.len() {
        return Err(ConvertError::Encode("truncated APP0 segment".into()));
    }
    Ok(end)
}

/// Copy last-access and last-modification times from `src` onto `dst`
pub fn copy_timestamps(src: &Path, dst: &Path) -> Result<(), ConvertError> {
    let metadata = std::fs::metadata(src).map_err(|e| {
        ConvertError::Metadata(format!("cannot stat {}: {}", src.display(), e))
    })?;

    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);

    filetime::set_file_times(dst, atime, mtime).map_err(|e| {
        ConvertError::Metadata(format!("cannot set file times on {}: {}", dst.display(), e))
    })
}

//! # Codec Module
//!
//! Questo modulo contiene la conversione vera e propria di un singolo file.
//!
//! ## Responsabilità:
//! - Definisce il trait `Codec`, il punto di estensione usato dai worker
//! - Implementa `HeicToJpeg`: decode HEIC con libheif, encode JPEG con `image`
//! - Estrae il blob EXIF dal HEIC e lo reinserisce nel JPEG
//! - Scrive il JPEG in modo atomico (temp file nella directory di destinazione + rename)
//!
//! ## Pipeline per file:
//! 1. **Sniff**: controlla il box `ftyp` per riconoscere un container HEIF
//! 2. **Decode**: immagine primaria in RGB 8-bit interleaved + EXIF opzionale
//! 3. **Encode**: JPEG alla qualità richiesta (clamp 1-100)
//! 4. **EXIF**: segmento APP1 se presente, omesso altrimenti
//! 5. **Write**: `NamedTempFile::new_in(dest_dir)` → `persist(dest)`
//!
//! Il decode HEIC richiede la feature `heif` (libheif di sistema). Senza la
//! feature ogni sorgente fallisce con `ConvertError::Decode`.
//!
//! ## Esempio:
//! ```rust,ignore
//! let codec = HeicToJpeg;
//! codec.transcode(Path::new("IMG_0001.HEIC"), Path::new("out/IMG_0001.jpg"), 85)?;
//! ```

use crate::error::ConvertError;
use crate::metadata;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// HEIF major/compatible brands accepted as HEIC sources
const HEIF_BRANDS: &[&[u8; 4]] = &[b"heic", b"heix", b"heim", b"heis", b"hevc", b"hevx", b"mif1", b"msf1"];

/// A single-file transcoder.
///
/// Implementations are shared by every worker, so they must be stateless
/// (or internally synchronized). Errors are returned, never panicked.
pub trait Codec: Send + Sync {
    /// Accepted source extension, lowercase, without dot
    fn source_extension(&self) -> &str;

    /// Extension given to destination files, lowercase, without dot
    fn destination_extension(&self) -> &str;

    /// Convert `source` into a new file at `destination`
    fn transcode(&self, source: &Path, destination: &Path, quality: u8) -> Result<(), ConvertError>;
}

/// Decoded primary image, RGB 8-bit, tightly packed
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    /// TIFF-headed EXIF payload, if the source carried one
    pub exif: Option<Vec<u8>>,
}

/// HEIC → JPEG
#[derive(Debug, Clone, Copy, Default)]
pub struct HeicToJpeg;

impl HeicToJpeg {
    /// Decode a HEIC file into RGB pixels plus its EXIF block
    pub fn decode(&self, source: &Path) -> Result<DecodedImage, ConvertError> {
        if !is_heif_container(source)? {
            return Err(ConvertError::Decode(format!(
                "{} is not a HEIF container",
                source.display()
            )));
        }
        decode_heif(source)
    }
}

impl Codec for HeicToJpeg {
    fn source_extension(&self) -> &str {
        "heic"
    }

    fn destination_extension(&self) -> &str {
        "jpg"
    }

    fn transcode(&self, source: &Path, destination: &Path, quality: u8) -> Result<(), ConvertError> {
        let decoded = self.decode(source)?;
        debug!(
            "Decoded {} ({}x{}, exif: {})",
            source.display(),
            decoded.width,
            decoded.height,
            decoded.exif.as_ref().map_or(0, |e| e.len())
        );

        let mut jpeg = encode_jpeg(&decoded, quality)?;
        if let Some(ref exif) = decoded.exif {
            jpeg = metadata::embed_exif(&jpeg, exif)?;
        }

        write_atomically(destination, &jpeg)
    }
}

/// Encode RGB pixels as JPEG. Out-of-range quality is clamped to 1-100.
pub fn encode_jpeg(image: &DecodedImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let expected = image.width as usize * image.height as usize * 3;
    if image.rgb.len() != expected {
        return Err(ConvertError::Encode(format!(
            "pixel buffer has {} bytes, expected {} for {}x{}",
            image.rgb.len(),
            expected,
            image.width,
            image.height
        )));
    }

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode(&image.rgb, image.width, image.height, ColorType::Rgb8)
        .map_err(|e| ConvertError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Write `bytes` to `destination` through a temp file in the same directory,
/// so a crash never leaves a truncated file under the final name.
pub fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let parent = destination
        .parent()
        .ok_or_else(|| ConvertError::Encode(format!("{} has no parent directory", destination.display())))?;

    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| ConvertError::Encode(format!("cannot create temp file in {}: {}", parent.display(), e)))?;
    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .map_err(|e| ConvertError::Encode(format!("cannot write {}: {}", destination.display(), e)))?;
    temp.persist(destination)
        .map_err(|e| ConvertError::Encode(format!("cannot move into {}: {}", destination.display(), e.error)))?;
    Ok(())
}

/// Check the ISO-BMFF `ftyp` box for a HEIF brand
pub fn is_heif_container(path: &Path) -> Result<bool, ConvertError> {
    let mut file = File::open(path)
        .map_err(|e| ConvertError::Decode(format!("cannot open {}: {}", path.display(), e)))?;

    let mut header = [0u8; 12];
    match file.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => {
            return Err(ConvertError::Decode(format!("cannot read {}: {}", path.display(), e)));
        }
    }

    Ok(&header[4..8] == b"ftyp" && HEIF_BRANDS.iter().any(|brand| header[8..12] == brand[..]))
}

#[cfg(feature = "heif")]
fn decode_heif(path: &Path) -> Result<DecodedImage, ConvertError> {
    use libheif_rs::{ColorSpace, HeifContext, ItemId, LibHeif, RgbChroma};

    let path_str = path
        .to_str()
        .ok_or_else(|| ConvertError::Decode(format!("non UTF-8 path: {}", path.display())))?;

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_file(path_str)
        .map_err(|e| ConvertError::Decode(format!("failed to read HEIC: {}", e)))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| ConvertError::Decode(format!("failed to get primary image: {}", e)))?;

    let mut exif_ids: [ItemId; 1] = [0];
    let exif = match handle.metadata_block_ids(&mut exif_ids, b"Exif") {
        0 => None,
        _ => {
            let raw = handle
                .metadata(exif_ids[0])
                .map_err(|e| ConvertError::Metadata(format!("failed to read EXIF: {}", e)))?;
            Some(metadata::heif_exif_payload(&raw)?.to_vec())
        }
    };

    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| ConvertError::Decode(format!("failed to decode HEIC: {}", e)))?;
    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| ConvertError::Decode("no interleaved RGB plane".to_string()))?;

    let width = plane.width;
    let height = plane.height;
    let row_len = width as usize * 3;
    if plane.stride < row_len {
        return Err(ConvertError::Decode(format!(
            "plane stride {} shorter than row of {} bytes",
            plane.stride, row_len
        )));
    }

    // libheif pads rows to `stride`; repack tightly for the encoder
    let mut rgb = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        if row.len() < row_len {
            return Err(ConvertError::Decode("truncated RGB plane".to_string()));
        }
        rgb.extend_from_slice(&row[..row_len]);
    }

    Ok(DecodedImage {
        width,
        height,
        rgb,
        exif,
    })
}

#[cfg(not(feature = "heif"))]
fn decode_heif(path: &Path) -> Result<DecodedImage, ConvertError> {
    Err(ConvertError::Decode(format!(
        "cannot decode {}: built without the heif feature",
        path.display()
    )))
}

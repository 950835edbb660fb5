use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::models::proposal::LogoAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogoError {
    #[error("unsupported logo type '{0}' (use image/png or image/jpeg)")]
    UnsupportedType(String),
    #[error("logo is not valid base64")]
    InvalidBase64,
    #[error("logo bytes are not a readable {0} image")]
    Unreadable(&'static str),
}

/// A logo with its raw bytes, pixel dimensions and colour channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLogo {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Decodes the base64 payload and reads dimensions from the image header.
pub fn decode_logo(asset: &LogoAsset) -> Result<DecodedLogo, LogoError> {
    let format = match asset.media_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => ImageFormat::Png,
        "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
        other => return Err(LogoError::UnsupportedType(other.to_string())),
    };
    let bytes = STANDARD
        .decode(asset.data_base64.trim())
        .map_err(|_| LogoError::InvalidBase64)?;
    let (width, height, channels) = match format {
        ImageFormat::Png => read_png_header(&bytes),
        ImageFormat::Jpeg => read_jpeg_frame(&bytes),
    }
    .ok_or(LogoError::Unreadable(format.media_type()))?;

    Ok(DecodedLogo {
        format,
        bytes,
        width,
        height,
        channels,
    })
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Width, height and channels from the IHDR chunk, which always follows the signature.
fn read_png_header(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    if bytes.len() < 26 || !bytes.starts_with(PNG_SIGNATURE) || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    let channels = match bytes[25] {
        0 => 1,
        4 => 2,
        2 | 3 => 3,
        6 => 4,
        _ => return None,
    };
    (width > 0 && height > 0).then_some((width, height, channels))
}

/// Width, height and component count from the first start-of-frame marker.
fn read_jpeg_frame(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Fill bytes and standalone markers carry no length.
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let frame = bytes.get(pos + 4..pos + 10)?;
            let height = u16::from_be_bytes([frame[1], frame[2]]) as u32;
            let width = u16::from_be_bytes([frame[3], frame[4]]) as u32;
            let components = frame[5];
            return (width > 0 && height > 0 && components > 0).then_some((width, height, components));
        }
        if len < 2 {
            return None;
        }
        pos += 2 + len;
    }
    None
}

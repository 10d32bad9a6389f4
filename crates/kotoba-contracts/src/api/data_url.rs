use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataUrlError {
    #[error("value is not a data URL")]
    NotDataUrl,
    #[error("unsupported image type '{0}' (expected png or jpeg)")]
    UnsupportedMime(String),
    #[error("data URL is not base64-encoded")]
    NotBase64,
    #[error("data URL payload is empty")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// A decoded `data:image/{png|jpeg|jpg};base64,…` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDataUrl {
    pub mime_type: &'static str,
    pub base64: String,
    pub bytes: Vec<u8>,
}

impl ImageDataUrl {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// MIME comes from the prefix only; the bytes are not sniffed.
pub fn parse_image_data_url(text: &str) -> Result<ImageDataUrl, DataUrlError> {
    let rest = text
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUrlError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotDataUrl)?;
    let mut header_parts = header.split(';');
    let mime = header_parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let mime_type = match mime.as_str() {
        "image/png" => "image/png",
        "image/jpeg" | "image/jpg" => "image/jpeg",
        _ => return Err(DataUrlError::UnsupportedMime(mime)),
    };
    if !header_parts.any(|part| part.trim().eq_ignore_ascii_case("base64")) {
        return Err(DataUrlError::NotBase64);
    }
    let base64: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
    if base64.is_empty() {
        return Err(DataUrlError::Empty);
    }
    let bytes = STANDARD
        .decode(base64.as_bytes())
        .map_err(|err| DataUrlError::InvalidBase64(err.to_string()))?;
    if bytes.is_empty() {
        return Err(DataUrlError::Empty);
    }
    Ok(ImageDataUrl {
        mime_type,
        base64,
        bytes,
    })
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

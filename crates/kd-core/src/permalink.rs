//! Shareable links that embed a keymap document in the query string.
//!
//! The document is gzip-compressed, base64-encoded with the URL-safe alphabet
//! (padding kept) and percent-encoded into the `keymap_yaml` parameter.

use std::io::{self, Read, Write};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine as _, GeneralPurpose, GeneralPurposeConfig};
use base64::engine::general_purpose::URL_SAFE;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

pub const APP_URL: &str = "https://caksoylar.github.io/keymap-drawer";
pub const PERMALINK_PARAM: &str = "keymap_yaml";

// Same unreserved set as Python's `quote`, which the web app decodes with.
const PARAM_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum PermalinkError {
    #[error("link has no {PERMALINK_PARAM} parameter")]
    MissingParam,
    #[error("link is not a valid URL")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{PERMALINK_PARAM} is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("{PERMALINK_PARAM} does not hold gzip data")]
    Gzip(#[source] io::Error),
    #[error("decoded keymap is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encode a keymap document as the value of the permalink parameter.
///
/// # Errors
///
/// Only fails if the in-memory gzip stream cannot be written.
pub fn encode_permalink_param(document: &str) -> io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(document.as_bytes())?;
    let compressed = encoder.finish()?;
    let encoded = URL_SAFE.encode(compressed);
    Ok(utf8_percent_encode(&encoded, PARAM_ESCAPES).to_string())
}

/// Full permalink into the hosted drawer for `document`.
///
/// # Errors
///
/// See [`encode_permalink_param`].
pub fn permalink(document: &str) -> io::Result<String> {
    Ok(format!(
        "{APP_URL}?{PERMALINK_PARAM}={}",
        encode_permalink_param(document)?
    ))
}

/// Invert [`encode_permalink_param`].
///
/// Padding is optional and the standard base64 alphabet is accepted as well.
///
/// # Errors
///
/// Fails on invalid base64, non-gzip payloads, or non-UTF-8 documents.
pub fn decode_permalink_param(param: &str) -> Result<String, PermalinkError> {
    let unquoted: Vec<u8> = percent_decode_str(param.trim())
        .map(|byte| match byte {
            b'+' => b'-',
            b'/' => b'_',
            other => other,
        })
        .collect();
    let compressed = LENIENT_URL_SAFE.decode(unquoted)?;
    let mut raw = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut raw)
        .map_err(PermalinkError::Gzip)?;
    Ok(String::from_utf8(raw)?)
}

/// Extract and decode the keymap from a full permalink.
///
/// The raw query is split by hand: form decoding would turn `+` into spaces.
///
/// # Errors
///
/// Fails when the URL is malformed, lacks the parameter, or the payload is invalid.
pub fn keymap_from_permalink(link: &str) -> Result<String, PermalinkError> {
    let url = Url::parse(link.trim())?;
    let param = url
        .query()
        .unwrap_or_default()
        .split('&')
        .find_map(|pair| pair.strip_prefix(PERMALINK_PARAM)?.strip_prefix('='))
        .ok_or(PermalinkError::MissingParam)?;
    decode_permalink_param(param)
}

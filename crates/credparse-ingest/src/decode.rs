//! Field text decoding
//!
//! Credential dumps arrive in whatever encoding their source used. Fields are
//! decoded with a prioritized list of encodings; the default list ends with
//! Windows-1252, which maps every byte, so decoding only falls back to raw
//! bytes when a caller configures a list without a total encoding.

use encoding_rs::Encoding;
use tracing::trace;

use crate::record::Field;

/// Decodes split fields using a prioritized list of encodings
#[derive(Debug, Clone)]
pub struct TextDecoder {
    encodings: Vec<&'static Encoding>,
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self::new(vec![encoding_rs::UTF_8, encoding_rs::WINDOWS_1252])
    }
}

impl TextDecoder {
    pub fn new(encodings: Vec<&'static Encoding>) -> Self {
        Self { encodings }
    }

    /// Build a decoder from WHATWG encoding labels ("utf-8", "latin1", ...)
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, String> {
        labels
            .iter()
            .map(|label| {
                Encoding::for_label(label.as_ref().trim().as_bytes())
                    .ok_or_else(|| format!("Unknown encoding label: {}", label.as_ref()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn encodings(&self) -> &[&'static Encoding] {
        &self.encodings
    }

    /// Decode all fields with the first encoding that accepts every one of them.
    ///
    /// When no encoding accepts them the fields are returned as [`Field::Raw`].
    pub fn decode(&self, raw: Vec<Vec<u8>>) -> Vec<Field> {
        for &encoding in &self.encodings {
            if let Some(fields) = decode_all(encoding, &raw) {
                return fields.into_iter().map(Field::Text).collect();
            }
            trace!(encoding = encoding.name(), "Encoding rejected line");
        }

        raw.into_iter().map(Field::Raw).collect()
    }
}

fn decode_all(encoding: &'static Encoding, raw: &[Vec<u8>]) -> Option<Vec<String>> {
    raw.iter()
        .map(|bytes| {
            encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
        })
        .collect()
}

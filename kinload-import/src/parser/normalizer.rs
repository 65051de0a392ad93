//! Line normalizer
//!
//! Splits a raw byte buffer into decoded text lines. Handles:
//! - Byte-order marks for UTF-8, UTF-16LE/BE and UTF-32LE/BE (stripped once)
//! - BOM-less UTF-16/32 detected from the null-byte layout of the first level digit
//! - LF, CRLF and lone CR terminators
//! - Invalid UTF-8 decoded as Windows-1252
//!
//! Byte offsets always refer to the raw buffer so a checkpointed offset can
//! be handed back to [`LineNormalizer::resume_at`].

use super::ParseError;
use serde::{Deserialize, Serialize};

/// Character encoding of the source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl SourceEncoding {
    /// Width of one code unit in bytes
    pub fn unit_width(self) -> usize {
        match self {
            SourceEncoding::Utf8 => 1,
            SourceEncoding::Utf16Le | SourceEncoding::Utf16Be => 2,
            SourceEncoding::Utf32Le | SourceEncoding::Utf32Be => 4,
        }
    }

    /// Detect the encoding of a buffer and the length of its byte-order mark
    ///
    /// UTF-32LE must be tested before UTF-16LE since its BOM starts with the
    /// UTF-16LE BOM.
    pub fn detect(bytes: &[u8]) -> (Self, usize) {
        match bytes {
            [0xFF, 0xFE, 0x00, 0x00, ..] => (SourceEncoding::Utf32Le, 4),
            [0x00, 0x00, 0xFE, 0xFF, ..] => (SourceEncoding::Utf32Be, 4),
            [0xEF, 0xBB, 0xBF, ..] => (SourceEncoding::Utf8, 3),
            [0xFF, 0xFE, ..] => (SourceEncoding::Utf16Le, 2),
            [0xFE, 0xFF, ..] => (SourceEncoding::Utf16Be, 2),
            [d, 0x00, 0x00, 0x00, ..] if d.is_ascii_digit() => (SourceEncoding::Utf32Le, 0),
            [0x00, 0x00, 0x00, d, ..] if d.is_ascii_digit() => (SourceEncoding::Utf32Be, 0),
            [d, 0x00, ..] if d.is_ascii_digit() => (SourceEncoding::Utf16Le, 0),
            [0x00, d, ..] if d.is_ascii_digit() => (SourceEncoding::Utf16Be, 0),
            _ => (SourceEncoding::Utf8, 0),
        }
    }
}

/// One decoded, terminator-free line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    /// Line text with leading whitespace and the terminator removed
    pub text: String,
    /// 1-based physical line number
    pub line_number: u64,
    /// Byte offset of the line start in the raw buffer
    pub offset: u64,
    /// Byte offset of the following line
    pub next_offset: u64,
}

/// Lazy line iterator over a raw buffer
pub struct LineNormalizer<'a> {
    bytes: &'a [u8],
    encoding: SourceEncoding,
    pos: usize,
    line_number: u64,
    strip_decoded_bom: bool,
}

impl<'a> LineNormalizer<'a> {
    /// Start at the beginning of the buffer
    pub fn new(bytes: &'a [u8]) -> Self {
        let (encoding, bom_len) = SourceEncoding::detect(bytes);
        Self {
            bytes,
            encoding,
            pos: bom_len,
            line_number: 0,
            strip_decoded_bom: bom_len == 0,
        }
    }

    /// Restart at a byte offset previously reported by this normalizer
    ///
    /// `line_number` is the number of the line that starts at `offset`.
    /// The encoding is still detected from the start of the buffer.
    pub fn resume_at(bytes: &'a [u8], offset: u64, line_number: u64) -> Self {
        let (encoding, bom_len) = SourceEncoding::detect(bytes);
        let pos = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .max(bom_len)
            .min(bytes.len());
        Self {
            bytes,
            encoding,
            pos,
            line_number: line_number.saturating_sub(1),
            strip_decoded_bom: bom_len == 0 && pos == 0,
        }
    }

    fn unit_at(&self, i: usize) -> Option<u32> {
        let b = self.bytes.get(i..i + self.encoding.unit_width())?;
        Some(match self.encoding {
            SourceEncoding::Utf8 => u32::from(b[0]),
            SourceEncoding::Utf16Le => u32::from(u16::from_le_bytes([b[0], b[1]])),
            SourceEncoding::Utf16Be => u32::from(u16::from_be_bytes([b[0], b[1]])),
            SourceEncoding::Utf32Le => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            SourceEncoding::Utf32Be => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    /// Locate the next physical line: (content start, content end, next line start)
    fn next_raw_line(&self) -> Option<(usize, usize, usize)> {
        let len = self.bytes.len();
        if self.pos >= len {
            return None;
        }

        let width = self.encoding.unit_width();
        let start = self.pos;
        let mut i = start;

        while let Some(unit) = self.unit_at(i) {
            match unit {
                0x0A => return Some((start, i, i + width)),
                0x0D => {
                    let mut next = i + width;
                    if self.unit_at(next) == Some(0x0A) {
                        next += width;
                    }
                    return Some((start, i, next));
                }
                _ => i += width,
            }
        }

        // Final line without terminator; a trailing partial code unit is dropped
        Some((start, i, len))
    }

    fn decode(&self, raw: &[u8]) -> String {
        match self.encoding {
            SourceEncoding::Utf8 => match std::str::from_utf8(raw) {
                Ok(s) => s.to_owned(),
                Err(_) => encoding_rs::WINDOWS_1252
                    .decode_without_bom_handling(raw)
                    .0
                    .into_owned(),
            },
            SourceEncoding::Utf16Le => encoding_rs::UTF_16LE
                .decode_without_bom_handling(raw)
                .0
                .into_owned(),
            SourceEncoding::Utf16Be => encoding_rs::UTF_16BE
                .decode_without_bom_handling(raw)
                .0
                .into_owned(),
            SourceEncoding::Utf32Le => decode_utf32(raw, u32::from_le_bytes),
            SourceEncoding::Utf32Be => decode_utf32(raw, u32::from_be_bytes),
        }
    }
}

fn decode_utf32(raw: &[u8], unit: fn([u8; 4]) -> u32) -> String {
    raw.chunks_exact(4)
        .map(|c| char::from_u32(unit([c[0], c[1], c[2], c[3]])).unwrap_or('\u{FFFD}'))
        .collect()
}

/// `^\d+\s`
fn has_level_prefix(text: &str) -> bool {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0
        && text[digits..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace)
}

impl Iterator for LineNormalizer<'_> {
    type Item = Result<NormalizedLine, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (start, end, next) = self.next_raw_line()?;
            self.pos = next;
            self.line_number += 1;

            let mut text = self.decode(&self.bytes[start..end]);
            if self.strip_decoded_bom {
                self.strip_decoded_bom = false;
                if let Some(rest) = text.strip_prefix('\u{FEFF}') {
                    text = rest.to_owned();
                }
            }

            let trimmed = text.trim_start();
            if trimmed.trim_end().is_empty() {
                continue;
            }

            if !has_level_prefix(trimmed) {
                return Some(Err(ParseError::MalformedLine {
                    line_number: self.line_number,
                    content: trimmed.to_owned(),
                }));
            }

            return Some(Ok(NormalizedLine {
                text: trimmed.to_owned(),
                line_number: self.line_number,
                offset: start as u64,
                next_offset: next as u64,
            }));
        }
    }
}

//! Heading payload decoding
//! The ESP32 firmware sends either text ("heading: 123", "H:123", "123.4") or a
//! little-endian u16.

use std::fmt;

use regex::Regex;
use serde::Serialize;

/// A compass heading in whole degrees, clockwise from north, always in `0..360`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Heading(u16);

impl Heading {
    /// Builds a heading from a raw value in `0..=360`; 360 wraps to 0.
    pub fn new(degrees: u16) -> Option<Self> {
        match degrees {
            360 => Some(Self(0)),
            0..=359 => Some(Self(degrees)),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Heading payload parser
pub struct HeadingParser {
    number: Regex,
}

impl HeadingParser {
    pub fn new() -> Self {
        Self {
            number: Regex::new(r"\d+(?:\.\d+)?").expect("number pattern is valid"),
        }
    }

    /// Decodes a raw payload, returning `None` when it carries no valid heading.
    pub fn parse(&self, data: &[u8]) -> Option<Heading> {
        match Self::as_text(data) {
            Some(text) => self.parse_text(text),
            // UTF-8 with stray control bytes, e.g. a NUL-terminated C string
            None => Self::parse_binary(data).or_else(|| {
                std::str::from_utf8(data)
                    .ok()
                    .and_then(|text| self.parse_text(text))
            }),
        }
    }

    /// Returns the first number in `text` that rounds into `0..=360`.
    pub fn parse_text(&self, text: &str) -> Option<Heading> {
        self.number
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .map(f64::round)
            .find(|value| (0.0..=360.0).contains(value))
            .and_then(|value| Heading::new(value as u16))
    }

    /// Reads the first two bytes as a little-endian u16.
    pub fn parse_binary(data: &[u8]) -> Option<Heading> {
        match data {
            [lo, hi, ..] => Heading::new(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// Payloads that decode as UTF-8 and hold no control characters besides whitespace are text.
    /// A binary reading in `0..=360` always has 0x00 or 0x01 as its high byte, so it never
    /// passes this check.
    fn as_text(data: &[u8]) -> Option<&str> {
        let text = std::str::from_utf8(data).ok()?;
        if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return None;
        }
        Some(text)
    }
}

impl Default for HeadingParser {
    fn default() -> Self {
        Self::new()
    }
}

//! Cursor colours.
//!
//! On the wire a colour is the CSS string `rgb(r, g, b)`. The local user
//! picks one as `#rrggbb`, so both forms parse.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::WireError;

/// An RGB colour used to draw a participant's cursor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Create a colour from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#rrggbb` (or `rrggbb`) colour picker value.
    pub fn from_hex(hex: &str) -> Result<Self, WireError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(WireError::InvalidColour(hex.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| WireError::InvalidColour(hex.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    fn from_css(css: &str) -> Result<Self, WireError> {
        let invalid = || WireError::InvalidColour(css.to_string());
        let inner = css
            .trim()
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;

        let mut channels = inner.split(',').map(|part| part.trim().parse::<u8>());
        let mut next = || channels.next().ok_or_else(invalid)?.map_err(|_| invalid());
        let colour = Self::new(next()?, next()?, next()?);
        if channels.next().is_some() {
            return Err(invalid());
        }
        Ok(colour)
    }
}

impl Default for Rgb {
    /// Magenta, the authorship colour the editor ships with.
    fn default() -> Self {
        Self::new(255, 0, 255)
    }
}

impl FromStr for Rgb {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim_start().starts_with("rgb(") {
            Self::from_css(s)
        } else {
            Self::from_hex(s)
        }
    }
}

impl TryFrom<String> for Rgb {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(colour: Rgb) -> Self {
        colour.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl fmt::Debug for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

//! Linear RGBA colours and hex parsing for theme colours.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorParseError {
    #[error("colour '{0}' must start with '#'")]
    MissingHash(String),
    #[error("colour '{0}' must have 6 or 8 hex digits")]
    BadLength(String),
    #[error("colour '{0}' contains a non-hex digit")]
    BadDigit(String),
}

/// Linear-space RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
    pub const TRANSPARENT: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Build from 8-bit sRGB channels, converting to linear.
    pub fn from_srgb8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: srgb_to_linear(r as f32 / 255.0),
            g: srgb_to_linear(g as f32 / 255.0),
            b: srgb_to_linear(b as f32 / 255.0),
            a: a as f32 / 255.0,
        }
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (sRGB).
    pub fn parse_hex(s: &str) -> Result<Self, ColorParseError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(s.to_string()))?;
        if digits.len() != 6 && digits.len() != 8 {
            return Err(ColorParseError::BadLength(s.to_string()));
        }
        let channel = |i: usize| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ColorParseError::BadDigit(s.to_string()))
        };
        let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::from_srgb8(channel(0)?, channel(2)?, channel(4)?, alpha))
    }

    /// Format as `#rrggbbaa` sRGB.
    pub fn to_hex(&self) -> String {
        let byte = |c: f32| (linear_to_srgb(c).clamp(0.0, 1.0) * 255.0).round() as u8;
        let alpha = (self.a.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b), alpha)
    }

    /// Same colour with a different alpha.
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_wgpu(&self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        let white = Color::parse_hex("#ffffff").unwrap();
        assert_eq!(white, Color::WHITE);

        let clear = Color::parse_hex("#00000000").unwrap();
        assert_eq!(clear, Color::TRANSPARENT);

        let mid = Color::parse_hex("#808080").unwrap();
        // sRGB 0.5 is roughly 0.216 linear
        assert!((mid.r - 0.2158).abs() < 1e-3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Color::parse_hex("ffffff"), Err(ColorParseError::MissingHash(_))));
        assert!(matches!(Color::parse_hex("#fff"), Err(ColorParseError::BadLength(_))));
        assert!(matches!(Color::parse_hex("#gg0000"), Err(ColorParseError::BadDigit(_))));
    }

    #[test]
    fn test_hex_round_trip_through_serde() {
        let color = Color::parse_hex("#3366cc").unwrap();
        let json = serde_json::to_string(&color).unwrap();
        assert_eq!(json, "\"#3366ccff\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert!((back.g - color.g).abs() < 1e-6);
    }
}

//! Coordinate literal interpretation under a `%FS` format.
//!
//! A literal keeps its digit string until interpretation time: with
//! trailing-omit the padding side changes the value, and `-0` must stay
//! distinguishable from `0` for incremental moves.

use crate::types::{Format, OmitZeros};

/// A signed coordinate literal as written in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordLit {
    pub negative: bool,
    pub digits: String,
}

impl CoordLit {
    pub fn new(negative: bool, digits: impl Into<String>) -> Self {
        CoordLit {
            negative,
            digits: digits.into(),
        }
    }

    /// Numeric value in file units for an X-axis literal.
    pub fn decode_x(&self, f: &Format) -> f64 {
        self.decode(f.x_int, f.x_dec, f.omit_zeros)
    }

    /// Numeric value in file units for a Y-axis literal.
    pub fn decode_y(&self, f: &Format) -> f64 {
        self.decode(f.y_int, f.y_dec, f.omit_zeros)
    }

    pub fn decode(&self, int_digits: u8, dec_digits: u8, omit: OmitZeros) -> f64 {
        let width = (int_digits + dec_digits) as usize;
        let mut digits = self.digits.clone();
        match omit {
            OmitZeros::Trailing => {
                // Trailing zeros omitted: pad on the right.
                while digits.len() < width {
                    digits.push('0');
                }
            }
            OmitZeros::Leading | OmitZeros::Explicit => {
                // Left padding does not change the numeric value.
            }
        }
        let raw: f64 = digits.parse().unwrap_or(0.0);
        let v = raw / 10f64.powi(dec_digits as i32);
        if self.negative {
            -v
        } else {
            v
        }
    }
}

/// Integer-encode a value for the writer: `round(value * 10^dec)`.
pub fn encode(value: f64, dec_digits: u8) -> i64 {
    (value * 10f64.powi(dec_digits as i32)).round() as i64
}

/// Format an encoded coordinate with leading-zero compression (the writer
/// always emits leading-omit). Zero encodes as `0`, never as empty.
pub fn format_lzc(encoded: i64) -> String {
    encoded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Format;

    fn fmt(omit: OmitZeros) -> Format {
        Format {
            omit_zeros: omit,
            x_int: 2,
            x_dec: 3,
            y_int: 2,
            y_dec: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_leading_omit() {
        // "1000" under 2.3 leading-omit is 1.000.
        let lit = CoordLit::new(false, "1000");
        assert!((lit.decode_x(&fmt(OmitZeros::Leading)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_omit_pads_right() {
        // "1" under 2.3 trailing-omit is "10000" → 10.000.
        let lit = CoordLit::new(false, "1");
        assert!((lit.decode_x(&fmt(OmitZeros::Trailing)) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_omit_full_width() {
        let lit = CoordLit::new(false, "12345");
        assert!((lit.decode_x(&fmt(OmitZeros::Trailing)) - 12.345).abs() < 1e-9);
    }

    #[test]
    fn test_negative_zero_value() {
        let lit = CoordLit::new(true, "0");
        assert!(lit.negative);
        assert_eq!(lit.decode_x(&fmt(OmitZeros::Leading)), 0.0);
    }

    #[test]
    fn test_negative() {
        let lit = CoordLit::new(true, "2500");
        assert!((lit.decode_x(&fmt(OmitZeros::Leading)) + 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_encode_round_trip() {
        let f = fmt(OmitZeros::Leading);
        for &v in &[0.0, 1.0, -2.5, 12.345, 0.001] {
            let enc = encode(v, f.x_dec);
            let lit = CoordLit::new(enc < 0, enc.abs().to_string());
            assert!((lit.decode_x(&f) - v).abs() < 1e-9, "value {v}");
        }
    }

    #[test]
    fn test_zero_formats_as_zero() {
        assert_eq!(format_lzc(encode(0.0, 3)), "0");
    }
}

//! Numeric representation kinds and bit widths

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OptResult, OptimizeError};

/// Numeric representation a unit is quantized into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    /// Signed fixed-point codes with a power-of-two scale
    FixedPoint,
    /// Signed symmetric integer codes with a float scale
    Integer,
}

impl Representation {
    /// Short name used in strategy listings and summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            Representation::FixedPoint => "fxp",
            Representation::Integer => "int",
        }
    }

    /// Supported bit widths (inclusive)
    pub fn bit_range(&self) -> (u8, u8) {
        match self {
            Representation::FixedPoint => (2, 32),
            Representation::Integer => (2, 16),
        }
    }

    /// Check a bit width against [`Representation::bit_range`]
    pub fn validate_bits(&self, bits: u8) -> OptResult<()> {
        let (min, max) = self.bit_range();
        if bits < min || bits > max {
            return Err(OptimizeError::UnsupportedBitWidth {
                repr: self.as_str(),
                bits,
                min,
                max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Representation {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fxp" | "fixed" | "fixed_point" => Ok(Representation::FixedPoint),
            "int" | "integer" => Ok(Representation::Integer),
            other => Err(OptimizeError::UnknownRepresentation(other.to_string())),
        }
    }
}

/// Representation kind plus bit width, validated on construction
///
/// Decoding goes through [`QuantParams::new`] as well, so a file with an
/// out-of-range width fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuantParams")]
pub struct QuantParams {
    repr: Representation,
    bits: u8,
}

#[derive(Deserialize)]
struct RawQuantParams {
    repr: Representation,
    bits: u8,
}

impl TryFrom<RawQuantParams> for QuantParams {
    type Error = OptimizeError;

    fn try_from(raw: RawQuantParams) -> Result<Self, Self::Error> {
        Self::new(raw.repr, raw.bits)
    }
}

impl QuantParams {
    /// Create validated parameters
    pub fn new(repr: Representation, bits: u8) -> OptResult<Self> {
        repr.validate_bits(bits)?;
        Ok(Self { repr, bits })
    }

    /// Parse a representation name and validate the width
    pub fn parse(repr: &str, bits: u8) -> OptResult<Self> {
        Self::new(repr.parse()?, bits)
    }

    /// Representation kind
    pub fn repr(&self) -> Representation {
        self.repr
    }

    /// Bit width
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Largest representable code
    pub fn code_max(&self) -> i64 {
        (1i64 << (self.bits - 1)) - 1
    }

    /// Smallest representable code
    ///
    /// Integer codes are symmetric, fixed-point codes use the full two's
    /// complement range.
    pub fn code_min(&self) -> i64 {
        match self.repr {
            Representation::Integer => -self.code_max(),
            Representation::FixedPoint => -(1i64 << (self.bits - 1)),
        }
    }
}

impl fmt::Display for QuantParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.repr, self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("int", Representation::Integer)]
    #[case("INTEGER", Representation::Integer)]
    #[case("fxp", Representation::FixedPoint)]
    #[case("fixed_point", Representation::FixedPoint)]
    fn test_parse_representation(#[case] text: &str, #[case] expected: Representation) {
        assert_eq!(text.parse::<Representation>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_representation() {
        let err = "float".parse::<Representation>().unwrap_err();
        assert!(matches!(err, OptimizeError::UnknownRepresentation(_)));
    }

    #[rstest]
    #[case(Representation::Integer, 1, false)]
    #[case(Representation::Integer, 2, true)]
    #[case(Representation::Integer, 16, true)]
    #[case(Representation::Integer, 17, false)]
    #[case(Representation::FixedPoint, 32, true)]
    #[case(Representation::FixedPoint, 33, false)]
    fn test_bit_range(#[case] repr: Representation, #[case] bits: u8, #[case] ok: bool) {
        assert_eq!(QuantParams::new(repr, bits).is_ok(), ok);
    }

    #[test]
    fn test_code_range() {
        let int8 = QuantParams::new(Representation::Integer, 8).unwrap();
        assert_eq!((int8.code_min(), int8.code_max()), (-127, 127));

        let fxp8 = QuantParams::new(Representation::FixedPoint, 8).unwrap();
        assert_eq!((fxp8.code_min(), fxp8.code_max()), (-128, 127));

        let fxp32 = QuantParams::new(Representation::FixedPoint, 32).unwrap();
        assert_eq!(fxp32.code_max(), i32::MAX as i64);
        assert_eq!(fxp32.code_min(), i32::MIN as i64);
    }

    #[test]
    fn test_decode_validates_width() {
        let ok: QuantParams = serde_json::from_str(r#"{"repr":"integer","bits":8}"#).unwrap();
        assert_eq!(ok, QuantParams::new(Representation::Integer, 8).unwrap());

        let err = serde_json::from_str::<QuantParams>(r#"{"repr":"integer","bits":0}"#);
        assert!(err.unwrap_err().to_string().contains("bit"));
    }

    #[test]
    fn test_display() {
        let p = QuantParams::parse("fixed", 16).unwrap();
        assert_eq!(p.to_string(), "fxp16");
    }
}

use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

/// Bit width of an encoded standard error.
pub const DEFAULT_BIT_WIDTH: usize = 32;

/// Number of fractional bits of an encoded standard error.
pub const DEFAULT_SCALE: u32 = 24;

/// Value that cannot be represented in the agreed fixed-point format.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RangeError {
    #[error("value {0} is negative")]
    Negative(f64),

    #[error("value {0} is not a finite number")]
    NonFinite(f64),

    #[error("value {value} does not fit into {bit_width} bits with scale {scale}")]
    Overflow {
        value: f64,
        bit_width: usize,
        scale: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("bit width {0} is not between 1 and 64")]
    BitWidth(usize),

    #[error("scale {0} must be smaller than 64")]
    Scale(u32),

    #[error("integer {raw} does not fit into {bit_width} bits")]
    TooLarge { raw: u64, bit_width: usize },

    #[error("cannot decode XOR share '{0}'")]
    InvalidShare(String),
}

/// Unsigned fixed-point format shared by both parties.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FixedPoint {
    bit_width: usize,
    scale: u32,
}

impl FixedPoint {
    pub fn new(bit_width: usize, scale: u32) -> Result<Self, EncodingError> {
        if !(1..=64).contains(&bit_width) {
            return Err(EncodingError::BitWidth(bit_width));
        }
        if scale >= 64 {
            return Err(EncodingError::Scale(scale));
        }
        Ok(Self { bit_width, scale })
    }

    pub fn bit_width(&self) -> usize {
        self.bit_width
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Multiply by `2^scale` and round to the nearest integer.
    pub fn encode(&self, value: f64) -> Result<EncodedValue, RangeError> {
        if !value.is_finite() {
            return Err(RangeError::NonFinite(value));
        }
        if value < 0.0 {
            return Err(RangeError::Negative(value));
        }

        let scaled = (value * 2f64.powi(self.scale as i32)).round();
        if scaled >= 2f64.powi(self.bit_width as i32) {
            return Err(RangeError::Overflow {
                value,
                bit_width: self.bit_width,
                scale: self.scale,
            });
        }

        Ok(EncodedValue {
            raw: scaled as u64,
            bit_width: self.bit_width,
        })
    }

    /// Interpret as unsigned integer and divide by `2^scale`.
    pub fn decode(&self, value: &EncodedValue) -> f64 {
        value.raw as f64 / 2f64.powi(self.scale as i32)
    }

    /// Largest error introduced by encoding a representable value.
    pub fn precision(&self) -> f64 {
        2f64.powi(-(self.scale as i32))
    }
}

impl Default for FixedPoint {
    fn default() -> Self {
        Self {
            bit_width: DEFAULT_BIT_WIDTH,
            scale: DEFAULT_SCALE,
        }
    }
}

/// Fixed-width unsigned integer, the unit submitted to the secure environment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EncodedValue {
    raw: u64,
    bit_width: usize,
}

impl EncodedValue {
    pub fn from_raw(raw: u64, bit_width: usize) -> Result<Self, EncodingError> {
        if !(1..=64).contains(&bit_width) {
            return Err(EncodingError::BitWidth(bit_width));
        }
        if bit_width < 64 && raw >> bit_width != 0 {
            return Err(EncodingError::TooLarge { raw, bit_width });
        }
        Ok(Self { raw, bit_width })
    }

    /// Collect bits, least significant first.
    pub fn from_bits(bits: &[bool]) -> Result<Self, EncodingError> {
        if bits.is_empty() || bits.len() > 64 {
            return Err(EncodingError::BitWidth(bits.len()));
        }
        let raw = bits
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &bit)| acc | ((bit as u64) << i));
        Ok(Self {
            raw,
            bit_width: bits.len(),
        })
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn bit_width(&self) -> usize {
        self.bit_width
    }

    /// Bits of the value, least significant first.
    pub fn to_bits(&self) -> Vec<bool> {
        (0..self.bit_width).map(|i| (self.raw >> i) & 1 == 1).collect()
    }
}

/// How the standard error column of a study file is written.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SeFormat {
    /// Plain decimal number, encoded locally as fixed point.
    #[default]
    Decimal,
    /// Base64 of a little-endian 32-bit XOR share of the already encoded value.
    XorShare,
}

impl SeFormat {
    /// Decode an XOR share written as base64 of four little-endian bytes.
    pub fn parse_share(field: &str) -> Result<u32, EncodingError> {
        let bytes = STANDARD
            .decode(field)
            .map_err(|_| EncodingError::InvalidShare(field.to_string()))?;
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| EncodingError::InvalidShare(field.to_string()))?;
        Ok(u32::from_le_bytes(bytes))
    }
}

impl FromStr for SeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decimal" => Ok(SeFormat::Decimal),
            "xor-share" => Ok(SeFormat::XorShare),
            _ => Err(format!(
                "Unsupported standard error format '{s}'. Available options: decimal, xor-share"
            )),
        }
    }
}

impl fmt::Display for SeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeFormat::Decimal => write!(f, "decimal"),
            SeFormat::XorShare => write!(f, "xor-share"),
        }
    }
}

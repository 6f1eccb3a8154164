//! Kubernetes quantity parsing and rendering
//!
//! Quantities are parsed exactly (no floating point) into integer
//! milli-cores or bytes. Fractions round up, matching how the API server
//! reports milli and integer values.

use crate::error::MutatorError;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Bytes per binary mebibyte
pub const MEBIBYTE: u64 = 1 << 20;

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

/// value = mantissa * 10^pow10 * 2^pow2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scaled {
    mantissa: u128,
    pow10: i32,
    pow2: u32,
}

impl Scaled {
    fn ceil_at(&self, extra_pow10: i32) -> Option<u64> {
        let numerator = self.mantissa.checked_mul(1u128.checked_shl(self.pow2)?)?;
        let exp = self.pow10 + extra_pow10;
        let value = if exp >= 0 {
            numerator.checked_mul(10u128.checked_pow(exp as u32)?)?
        } else {
            match 10u128.checked_pow(exp.unsigned_abs()) {
                Some(denominator) => numerator.div_ceil(denominator),
                // Anything this small rounds up to one unit, or stays zero.
                None => u128::from(numerator > 0),
            }
        };
        u64::try_from(value).ok()
    }
}

fn parse_scaled(raw: &str) -> Result<Scaled, MutatorError> {
    let invalid = || MutatorError::protocol(format!("invalid quantity '{raw}'"));

    let text = raw.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    if text.starts_with('-') {
        return Err(MutatorError::protocol(format!(
            "negative quantity '{raw}' is not a valid request"
        )));
    }

    let number_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(number_end);
    if number.is_empty() || number == "." {
        return Err(invalid());
    }

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.contains('.') {
        return Err(invalid());
    }

    let mut mantissa: u128 = 0;
    for digit in whole.chars().chain(fraction.chars()) {
        let d = digit.to_digit(10).ok_or_else(invalid)?;
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(u128::from(d)))
            .ok_or_else(invalid)?;
    }
    let mut scaled = Scaled {
        mantissa,
        pow10: -(fraction.len() as i32),
        pow2: 0,
    };

    if suffix.is_empty() {
        return Ok(scaled);
    }

    if let Some(&(_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        scaled.pow2 = shift;
        return Ok(scaled);
    }

    if let Some(&(_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        scaled.pow10 += exp;
        return Ok(scaled);
    }

    // Decimal exponent: 1e3, 5E-2
    if let Some(exp) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
        .and_then(|e| e.parse::<i32>().ok())
    {
        if exp.abs() > 38 {
            return Err(invalid());
        }
        scaled.pow10 += exp;
        return Ok(scaled);
    }

    Err(invalid())
}

/// Parse a CPU quantity into milli-cores, rounding up
pub fn parse_cpu_milli(raw: &str) -> Result<u64, MutatorError> {
    parse_scaled(raw)?
        .ceil_at(3)
        .ok_or_else(|| MutatorError::protocol(format!("cpu quantity '{raw}' out of range")))
}

/// Parse a memory quantity into bytes, rounding up
pub fn parse_memory_bytes(raw: &str) -> Result<u64, MutatorError> {
    parse_scaled(raw)?
        .ceil_at(0)
        .ok_or_else(|| MutatorError::protocol(format!("memory quantity '{raw}' out of range")))
}

/// Round a byte count up to whole mebibytes
pub fn ceil_mebibytes(bytes: u64) -> u64 {
    bytes.div_ceil(MEBIBYTE)
}

pub fn cpu_quantity(milli: u64) -> Quantity {
    Quantity(format!("{milli}m"))
}

/// Render bytes as a whole-mebibyte quantity, rounding up
pub fn memory_quantity(bytes: u64) -> Quantity {
    Quantity(format!("{}Mi", ceil_mebibytes(bytes)))
}

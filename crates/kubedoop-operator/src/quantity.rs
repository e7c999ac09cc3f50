//! Numeric values of Kubernetes resource quantities like `500m`, `1.5Gi` or `2e3`.
//!
//! The API server stores quantities in a canonical form, `0.5` comes back as `500m` and `2048Mi`
//! as `2Gi`. Comparing the values instead of the strings tells such rewrites apart from real
//! changes.
use std::{num::ParseFloatError, str::FromStr};

use snafu::{ResultExt, Snafu, ensure};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseQuantityError {
    #[snafu(display("input is either empty or contains non-ascii characters"))]
    InvalidFormat,

    #[snafu(display("failed to parse floating point number"))]
    InvalidFloat { source: ParseFloatError },

    #[snafu(display("failed to parse {input:?} as quantity suffix"))]
    InvalidSuffix { input: String },
}

/// The suffixes of the Kubernetes serialization format, except for decimal exponents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString)]
enum Suffix {
    #[strum(serialize = "Ki")]
    Kibi,
    #[strum(serialize = "Mi")]
    Mebi,
    #[strum(serialize = "Gi")]
    Gibi,
    #[strum(serialize = "Ti")]
    Tebi,
    #[strum(serialize = "Pi")]
    Pebi,
    #[strum(serialize = "Ei")]
    Exbi,

    #[strum(serialize = "n")]
    Nano,
    #[strum(serialize = "u")]
    Micro,
    #[strum(serialize = "m")]
    Milli,
    #[strum(serialize = "k")]
    Kilo,
    #[strum(serialize = "M")]
    Mega,
    #[strum(serialize = "G")]
    Giga,
    #[strum(serialize = "T")]
    Tera,
    #[strum(serialize = "P")]
    Peta,
    #[strum(serialize = "E")]
    Exa,
}

impl Suffix {
    fn factor(self) -> f64 {
        match self {
            Self::Kibi => 2f64.powi(10),
            Self::Mebi => 2f64.powi(20),
            Self::Gibi => 2f64.powi(30),
            Self::Tebi => 2f64.powi(40),
            Self::Pebi => 2f64.powi(50),
            Self::Exbi => 2f64.powi(60),
            Self::Nano => 10f64.powi(-9),
            Self::Micro => 10f64.powi(-6),
            Self::Milli => 10f64.powi(-3),
            Self::Kilo => 10f64.powi(3),
            Self::Mega => 10f64.powi(6),
            Self::Giga => 10f64.powi(9),
            Self::Tera => 10f64.powi(12),
            Self::Peta => 10f64.powi(15),
            Self::Exa => 10f64.powi(18),
        }
    }
}

/// Parses `input` into its value in base units, i.e. cores or bytes.
pub fn quantity_value(input: &str) -> Result<f64, ParseQuantityError> {
    ensure!(!input.is_empty() && input.is_ascii(), InvalidFormatSnafu);

    let number_end = input
        .char_indices()
        .find(|(index, c)| !(c.is_ascii_digit() || *c == '.' || (*index == 0 && "+-".contains(*c))))
        .map_or(input.len(), |(index, _)| index);
    let (number, suffix) = input.split_at(number_end);
    let value = f64::from_str(number).context(InvalidFloatSnafu)?;

    if suffix.is_empty() {
        return Ok(value);
    }
    if let Ok(suffix) = Suffix::from_str(suffix) {
        return Ok(value * suffix.factor());
    }
    if let Some(exponent) = suffix
        .strip_prefix(['e', 'E'])
        .and_then(|exponent| i32::from_str(exponent).ok())
    {
        return Ok(value * 10f64.powi(exponent));
    }

    InvalidSuffixSnafu { input: suffix }.fail()
}

/// Whether `a` and `b` denote the same quantity. Strings which are no quantities are only equal
/// to themselves.
pub fn same_quantity(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (quantity_value(a), quantity_value(b)) {
        (Ok(a), Ok(b)) => (a - b).abs() <= f64::EPSILON * 4.0 * a.abs().max(b.abs()),
        _ => false,
    }
}

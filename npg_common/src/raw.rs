use std::{
    fmt::Display,
    iter::Sum,
    ops::Add,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op;

pub const NANO_CURRENCY_CODE: &str = "XNO";
/// The number of raw in one Nano (10^30).
pub const RAW_PER_NANO: u128 = 1_000_000_000_000_000_000_000_000_000_000;
const NANO_DECIMALS: usize = 30;
/// Below this value (one micro-Nano), amounts are displayed in raw.
const DISPLAY_RAW_THRESHOLD: u128 = 1_000_000_000_000_000_000_000_000;

//--------------------------------------        Raw         ---------------------------------------------------------
/// An amount of Nano, in the ledger's atomic unit (raw).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Raw(u128);

op!(binary Raw, Add, add);
op!(binary Raw, Sub, sub);
op!(inplace Raw, AddAssign, add_assign);
op!(inplace Raw, SubAssign, sub_assign);

impl Sum for Raw {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented in raw: {0}")]
pub struct RawConversionError(String);

impl From<u128> for Raw {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<Raw> for String {
    fn from(value: Raw) -> Self {
        value.0.to_string()
    }
}

impl TryFrom<String> for Raw {
    type Error = RawConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_raw_str(&value)
    }
}

impl Display for Raw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < DISPLAY_RAW_THRESHOLD {
            return write!(f, "{} raw", self.0);
        }
        let whole = self.0 / RAW_PER_NANO;
        let fraction = self.0 % RAW_PER_NANO;
        if fraction == 0 {
            write!(f, "{whole} {NANO_CURRENCY_CODE}")
        } else {
            let fraction = format!("{fraction:030}");
            write!(f, "{whole}.{} {NANO_CURRENCY_CODE}", fraction.trim_end_matches('0'))
        }
    }
}

impl Raw {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Parses an integer amount of raw, as returned by the node RPC, e.g. `"1000000000000000000000000"`.
    pub fn from_raw_str(value: &str) -> Result<Self, RawConversionError> {
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RawConversionError(format!("'{value}' is not an integer amount of raw")));
        }
        value.parse::<u128>().map(Self).map_err(|e| RawConversionError(format!("{value}: {e}")))
    }

    /// Parses a human-readable decimal amount of Nano, e.g. `"0.25"`, into raw without going through floating point.
    pub fn from_nano_str(value: &str) -> Result<Self, RawConversionError> {
        let value = value.trim();
        let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(RawConversionError(format!("'{value}' is not an amount of Nano")));
        }
        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(whole) || !is_digits(fraction) {
            return Err(RawConversionError(format!("'{value}' is not an amount of Nano")));
        }
        if fraction.len() > NANO_DECIMALS {
            return Err(RawConversionError(format!("'{value}' has more than {NANO_DECIMALS} decimal places")));
        }
        let too_large = || RawConversionError(format!("'{value}' is too large"));
        let whole = if whole.is_empty() { 0 } else { whole.parse::<u128>().map_err(|_| too_large())? };
        let fraction = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<NANO_DECIMALS$}").parse::<u128>().map_err(|_| too_large())?
        };
        whole.checked_mul(RAW_PER_NANO).and_then(|w| w.checked_add(fraction)).map(Self).ok_or_else(too_large)
    }
}

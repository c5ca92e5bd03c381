//! Conversions between satoshi, bitcoin, mBTC and µBTC.
//!
//! Amounts are rendered as fixed-point strings. Digits beyond the target
//! precision are cut off, never rounded.

use bitcoin::{Denomination, SignedAmount};

use crate::error::ClientError;

const BTC_DECIMALS: usize = 8;
const SUB_UNIT_DECIMALS: u32 = 4;

/// Satoshi to bitcoin with eight decimals: `1000` is `"0.00001000"`.
pub fn to_bitcoin(satoshi: i64) -> String {
    format_fixed(i128::from(satoshi), BTC_DECIMALS as u32)
}

/// Bitcoin to satoshi. Sub-satoshi digits are dropped.
pub fn to_satoshi(bitcoin: f64) -> Result<i64, ClientError> {
    let fixed = to_fixed(bitcoin, BTC_DECIMALS);
    SignedAmount::from_str_in(&fixed, Denomination::Bitcoin)
        .map(SignedAmount::to_sat)
        .map_err(|e| ClientError::InvalidAmount(format!("{bitcoin} BTC: {e}")))
}

/// Bitcoin to µBTC (bits) with four decimals.
pub fn to_ubtc(bitcoin: f64) -> Result<String, ClientError> {
    let satoshi = to_satoshi(bitcoin)?;
    // 1 µBTC = 100 sat, so sat * 100 is µBTC in units of 1e-4.
    Ok(format_fixed(i128::from(satoshi) * 100, SUB_UNIT_DECIMALS))
}

/// Bitcoin to mBTC with four decimals.
pub fn to_mbtc(bitcoin: f64) -> Result<String, ClientError> {
    let satoshi = to_satoshi(bitcoin)?;
    // 1 mBTC = 100_000 sat; a tenth of a satoshi count is mBTC in units of 1e-4.
    Ok(format_fixed(i128::from(satoshi) / 10, SUB_UNIT_DECIMALS))
}

/// `number` with exactly `precision` decimals, truncated toward zero.
///
/// Works on the shortest decimal representation of the float, so
/// `to_fixed(0.1, 3)` is `"0.100"` and not affected by binary rounding.
pub fn to_fixed(number: f64, precision: usize) -> String {
    let repr = number.to_string();
    if !number.is_finite() {
        return repr;
    }

    let (integer, fraction) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let fraction: String = fraction
        .chars()
        .chain(std::iter::repeat('0'))
        .take(precision)
        .collect();
    let fixed = if precision == 0 {
        integer.to_owned()
    } else {
        format!("{integer}.{fraction}")
    };

    // Truncation can leave "-0.00"; render it as zero.
    match fixed.strip_prefix('-') {
        Some(magnitude) if magnitude.chars().all(|c| c == '0' || c == '.') => {
            magnitude.to_owned()
        }
        _ => fixed,
    }
}

fn format_fixed(units: i128, scale: u32) -> String {
    let sign = if units < 0 { "-" } else { "" };
    let magnitude = units.unsigned_abs();
    if scale == 0 {
        return format!("{sign}{magnitude}");
    }
    let divisor = 10_u128.pow(scale);
    format!(
        "{sign}{}.{:0width$}",
        magnitude / divisor,
        magnitude % divisor,
        width = scale as usize
    )
}

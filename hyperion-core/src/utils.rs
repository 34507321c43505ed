use std::time::Duration;

use crate::{ChainCommunicationError, ChainResult, H160, H256, U256};

const GWEI: u64 = 1_000_000_000;

/// Parse a gas price such as `"500gwei"` or `"500"` into wei.
pub fn parse_wei(value: &str) -> ChainResult<U256> {
    let value = value.trim().to_lowercase();
    let (digits, multiplier) = match value.strip_suffix("gwei") {
        Some(digits) => (digits.trim(), U256::from(GWEI)),
        None => (value.trim_end_matches("wei").trim(), U256::one()),
    };
    let amount = U256::from_dec_str(digits).map_err(|e| {
        ChainCommunicationError::ParseError(format!("invalid gas price {value:?}: {e}"))
    })?;
    amount
        .checked_mul(multiplier)
        .ok_or_else(|| ChainCommunicationError::ParseError(format!("gas price overflow {value}")))
}

/// Multiply a wei amount by a decimal factor, rounding down.
pub fn scale_wei(value: U256, factor: f64) -> U256 {
    // 6 decimal places of precision are plenty for gas adjustments
    let scaled = (factor * 1_000_000f64).round().max(0f64) as u64;
    value.saturating_mul(U256::from(scaled)) / U256::from(1_000_000u64)
}

/// Convert an integer token amount into a float with `decimals` places.
pub fn u256_to_scaled_f64(value: U256, decimals: u8) -> f64 {
    let divisor = 10f64.powi(decimals as i32);
    if value <= U256::from(u128::MAX) {
        value.as_u128() as f64 / divisor
    } else {
        // fall back to the decimal string for amounts above u128
        value.to_string().parse::<f64>().unwrap_or(f64::MAX) / divisor
    }
}

/// Left pad a 20 byte address into a `bytes32`.
pub fn address_to_h256(address: H160) -> H256 {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(address.as_bytes());
    H256(out)
}

/// Left pad arbitrary bytes (at most 32) into a `bytes32`.
pub fn bytes_to_h256(bytes: &[u8]) -> ChainResult<H256> {
    if bytes.len() > 32 {
        return Err(ChainCommunicationError::ParseError(format!(
            "{} bytes do not fit in bytes32",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(H256(out))
}

/// Parse a hex address with or without `0x`.
pub fn parse_address(value: &str) -> ChainResult<H160> {
    let raw = hex::decode(value.trim().trim_start_matches("0x"))
        .map_err(|e| ChainCommunicationError::ParseError(format!("address {value}: {e}")))?;
    if raw.len() != 20 {
        return Err(ChainCommunicationError::ParseError(format!(
            "address {value} must be 20 bytes"
        )));
    }
    Ok(H160::from_slice(&raw))
}

/// Format a duration for logs and the admin API.
pub fn fmt_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m{}s", secs / 60, secs % 60),
        _ => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}

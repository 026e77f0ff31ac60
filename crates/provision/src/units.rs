//! Exact conversions between human-readable amounts and base units.
//!
//! Token and ether amounts never pass through floating point.

use alloy_core::primitives::{U256, utils::parse_ether};
use anyhow::Context;

/// Scale `amount` whole tokens to the token's smallest unit: `amount * 10^decimals`.
///
/// Fails if the result does not fit in 256 bits.
pub fn format_amount(amount: u64, decimals: u8) -> anyhow::Result<U256> {
    let scale = U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .with_context(|| format!("10^{} overflows 256 bits", decimals))?;

    U256::from(amount)
        .checked_mul(scale)
        .with_context(|| format!("{} * 10^{} overflows 256 bits", amount, decimals))
}

/// Convert a decimal ether amount such as `"1"` or `"0.25"` to wei.
pub fn ether_to_wei(ether: &str) -> anyhow::Result<U256> {
    parse_ether(ether).with_context(|| format!("Invalid ether amount: '{}'", ether))
}

/// Render a quantity the way JSON-RPC expects it (`0x`-prefixed, no leading zeros).
pub fn to_hex_quantity(value: U256) -> String {
    format!("0x{:x}", value)
}

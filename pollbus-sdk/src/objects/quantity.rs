//! `0x`-prefixed hex quantities as used by the Ethereum JSON-RPC API.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity `{0}` is missing the 0x prefix")]
    MissingPrefix(String),
    #[error("quantity `{0}` is not valid hex")]
    InvalidHex(String),
}

/// Parse a hex quantity such as `"0x1b4"`.
pub fn parse_quantity(raw: &str) -> Result<u128, QuantityError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| QuantityError::MissingPrefix(raw.to_string()))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(QuantityError::InvalidHex(raw.to_string()));
    }
    u128::from_str_radix(digits, 16).map_err(|_| QuantityError::InvalidHex(raw.to_string()))
}

/// Parse a hex quantity that must fit in a `u64` (block numbers, nonces).
pub fn parse_u64_quantity(raw: &str) -> Result<u64, QuantityError> {
    let value = parse_quantity(raw)?;
    u64::try_from(value).map_err(|_| QuantityError::InvalidHex(raw.to_string()))
}

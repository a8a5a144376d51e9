//! Lossless conversions between human decimal amounts and smallest units.
//!
//! All arithmetic is on decimal strings — no floating point anywhere on the
//! money path. Fractional digits beyond the token's declared decimals are
//! truncated, never rounded.

use crate::error::WalletError;

/// Convert a human-readable decimal amount (`"1.5"`) to smallest units at the
/// given decimals (`1_500_000` for 6). Rejects empty, negative, zero, and
/// non-numeric input. Fractional digits past `decimals` are truncated.
pub fn to_smallest_units(human: &str, decimals: u8) -> Result<u128, WalletError> {
    let trimmed = human.trim();
    if trimmed.is_empty() {
        return Err(WalletError::InvalidArgument("amount is empty".into()));
    }
    if trimmed.starts_with('-') {
        return Err(WalletError::InvalidArgument(format!(
            "amount must be positive: {trimmed}"
        )));
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    let int_part = if int_part.is_empty() { "0" } else { int_part };
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(WalletError::InvalidArgument(format!(
            "amount is not a decimal number: {trimmed}"
        )));
    }

    // Truncate or right-pad the fractional part to exactly `decimals` digits.
    let mut frac = frac_part.to_string();
    frac.truncate(decimals as usize);
    while frac.len() < decimals as usize {
        frac.push('0');
    }

    let combined = format!("{int_part}{frac}");
    let units: u128 = combined
        .trim_start_matches('0')
        .parse()
        .or_else(|_| {
            if combined.bytes().all(|b| b == b'0') {
                Ok(0)
            } else {
                Err(WalletError::InvalidArgument(format!(
                    "amount too large: {trimmed}"
                )))
            }
        })?;

    if units == 0 {
        return Err(WalletError::InvalidArgument(format!(
            "amount must be greater than zero: {trimmed}"
        )));
    }
    Ok(units)
}

/// Normalize a raw integer balance at `decimals` to the fixed 18-decimal
/// string representation used by the read API, by right-padding (or
/// truncating from the right when `decimals > 18`).
pub fn normalize_to_18(raw: &str, decimals: u8) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = if digits.is_empty() { "0".to_string() } else { digits };

    if decimals <= 18 {
        let mut out = digits;
        for _ in 0..(18 - decimals) {
            out.push('0');
        }
        trim_leading_zeros(out)
    } else {
        let drop = (decimals - 18) as usize;
        let keep = digits.len().saturating_sub(drop);
        let out = if keep == 0 { "0".to_string() } else { digits[..keep].to_string() };
        trim_leading_zeros(out)
    }
}

/// Render smallest units as a human decimal string (`1500000` @ 6 → `"1.5"`).
pub fn format_units(amount: u128, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let s = amount.to_string();
    let (int_part, frac_part) = if s.len() > decimals as usize {
        let split = s.len() - decimals as usize;
        (s[..split].to_string(), s[split..].to_string())
    } else {
        let mut frac = String::new();
        for _ in 0..(decimals as usize - s.len()) {
            frac.push('0');
        }
        frac.push_str(&s);
        ("0".to_string(), frac)
    };
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac}")
    }
}

fn trim_leading_zeros(s: String) -> String {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

use alloy::primitives::U256;

/// Fractional digits kept when an estimated output is shown to the user.
pub const DISPLAY_FRACTION_DIGITS: usize = 8;

fn scale_for(decimals: u8) -> Option<U256> {
    U256::from(10_u64).checked_pow(U256::from(decimals))
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a UI decimal string (e.g. `"1.5"`) into base units at `decimals` places.
///
/// Returns `None` for empty, negative, or non-numeric input: the caller treats that as "no amount",
/// not as an error. Fractional digits beyond `decimals` are truncated.
pub fn parse_amount_ui_to_base(s: &str, decimals: u8) -> Option<U256> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !is_digits(whole) || !is_digits(frac) {
        return None;
    }

    let keep = usize::from(decimals);
    let frac = frac.get(..keep).unwrap_or(frac);
    let mut frac_s = frac.to_owned();
    while frac_s.len() < keep {
        frac_s.push('0');
    }

    let whole_v = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).ok()?
    };
    let frac_v = if frac_s.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&frac_s, 10).ok()?
    };

    whole_v
        .checked_mul(scale_for(decimals)?)
        .and_then(|x| x.checked_add(frac_v))
}

/// Like [`parse_amount_ui_to_base`] but zero also counts as "no amount".
pub fn parse_positive_amount(s: &str, decimals: u8) -> Option<U256> {
    parse_amount_ui_to_base(s, decimals).filter(|v| !v.is_zero())
}

/// Format a base-unit amount into a UI decimal string without floats.
///
/// - base=1500000, decimals=6 => "1.5"
/// - base=1, decimals=6 => "0.000001"
pub fn format_amount_base_to_ui_string(base: U256, decimals: u8) -> String {
    let Some(scale) = scale_for(decimals) else {
        return base.to_string();
    };
    if decimals == 0 {
        return base.to_string();
    }
    let whole = base / scale;
    let frac = base % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let digits = frac.to_string();
    let mut frac_s = "0".repeat(usize::from(decimals).saturating_sub(digits.len()));
    frac_s.push_str(&digits);
    while frac_s.ends_with('0') {
        frac_s.pop();
    }
    format!("{whole}.{frac_s}")
}

/// Cut the fractional part of a formatted amount to at most `max_digits` characters.
pub fn truncate_fraction(ui: &str, max_digits: usize) -> String {
    match ui.split_once('.') {
        Some((whole, frac)) if frac.len() > max_digits => {
            format!("{whole}.{}", frac.get(..max_digits).unwrap_or(frac))
        }
        _ => ui.to_owned(),
    }
}

/// Display form of an estimated output. The underlying integer is left untouched.
pub fn format_amount_for_display(base: U256, decimals: u8) -> String {
    truncate_fraction(
        &format_amount_base_to_ui_string(base, decimals),
        DISPLAY_FRACTION_DIGITS,
    )
}

/// Balance display: whole part capped at 10 characters, 4 fractional digits.
pub fn format_balance(base: Option<U256>, decimals: u8) -> String {
    let Some(base) = base.filter(|b| !b.is_zero()) else {
        return "0.00".to_owned();
    };
    let s = format_amount_base_to_ui_string(base, decimals);
    let (whole, frac) = s.split_once('.').unwrap_or((s.as_str(), ""));
    let whole_short = whole.get(..10).unwrap_or(whole);
    let ellipsis = if whole.len() > 10 { "..." } else { "" };
    if frac.is_empty() {
        return format!("{whole_short}{ellipsis}");
    }
    format!("{whole_short}{ellipsis}.{}", frac.get(..4).unwrap_or(frac))
}

//! Float helpers for USD valuation and display.
//!
//! All `cast_precision_loss` / `float_arithmetic` lint expects live here so that
//! portfolio code can stay lint-clean. Nothing on the swap path uses floats.

#![expect(
    clippy::float_arithmetic,
    reason = "dedicated float-math module; arithmetic is intentional"
)]

/// Parse a UI decimal string (as produced by the amount codec) into `f64`. Unparseable input is zero.
pub fn ui_to_f64(ui: &str) -> f64 {
    ui.trim().parse::<f64>().unwrap_or(0.0_f64)
}

/// USD value of `amount` whole tokens at `price` USD each.
pub fn usd_value(amount: f64, price: f64) -> f64 {
    amount * price
}

pub fn sum_f64(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |a, b| a + b)
}

/// Round to `decimals` places and drop trailing zeros (`12.50` -> `"12.5"`).
fn fixed_trimmed(x: f64, decimals: usize) -> String {
    let s = format!("{x:.decimals$}");
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Scientific notation with two fractional digits and an explicit exponent sign (`1.23e+16`).
fn exponential_2(x: f64) -> String {
    let s = format!("{x:.2e}");
    match s.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => s,
    }
}

/// Compact USD-style number: `999`, `1.23K`, `4.5M`, `7B`, `1.20T`, or scientific above 1e15.
pub fn format_compact(x: f64) -> String {
    if x == 0.0_f64 || !x.is_finite() {
        return "0".to_owned();
    }
    if x >= 1e12_f64 {
        if x > 1e15_f64 {
            return exponential_2(x);
        }
        return format!("{:.2}T", x / 1e12_f64);
    }
    let abs = x.abs();
    let (scaled, suffix) = if abs >= 1e9_f64 {
        (x / 1e9_f64, "B")
    } else if abs >= 1e6_f64 {
        (x / 1e6_f64, "M")
    } else if abs >= 1e3_f64 {
        (x / 1e3_f64, "K")
    } else {
        (x, "")
    };
    format!("{}{suffix}", fixed_trimmed(scaled, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_suffixes() {
        assert_eq!(format_compact(0.0_f64), "0");
        assert_eq!(format_compact(12.346_f64), "12.35");
        assert_eq!(format_compact(999.0_f64), "999");
        assert_eq!(format_compact(1_234.0_f64), "1.23K");
        assert_eq!(format_compact(4_500_000.0_f64), "4.5M");
        assert_eq!(format_compact(7_000_000_000.0_f64), "7B");
        assert_eq!(format_compact(1.2e12_f64), "1.20T");
        assert_eq!(format_compact(2.5e16_f64), "2.50e+16");
    }

    #[test]
    fn valuation_helpers() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9_f64;
        assert!(close(ui_to_f64("1.5"), 1.5_f64), "decimal string parses");
        assert!(close(ui_to_f64("garbage"), 0.0_f64), "garbage is zero");
        assert!(close(usd_value(2.0_f64, 3000.0_f64), 6000.0_f64), "usd value");
        assert!(close(sum_f64(&[1.0_f64, 2.5_f64]), 3.5_f64), "sum");
    }
}

use crate::errors::SwapError;
use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive as _;
use rust_decimal::Decimal;
use std::str::FromStr as _;

/// Denominator of the tolerance factor (4-decimal precision).
const FACTOR_SCALE: u64 = 10_000;

/// Slippage tolerance in percent, always within `[0, 50]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlippageTolerance(Decimal);

impl SlippageTolerance {
    pub const MAX_PERCENT: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
    /// Above this the tolerance is flagged (never blocked).
    pub const HIGH_RISK_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);
    pub const DEFAULT_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

    pub fn new(percent: Decimal) -> Result<Self, SwapError> {
        if percent.is_sign_negative() || percent > Self::MAX_PERCENT {
            return Err(SwapError::ToleranceOutOfRange(percent.to_string()));
        }
        Ok(Self(percent))
    }

    pub fn parse(s: &str) -> Result<Self, SwapError> {
        let t = s.trim().trim_end_matches('%');
        let Ok(v) = Decimal::from_str(t) else {
            return Err(SwapError::ToleranceOutOfRange(s.to_owned()));
        };
        Self::new(v)
    }

    pub const fn percent(self) -> Decimal {
        self.0
    }

    pub fn is_high_risk(self) -> bool {
        self.0 > Self::HIGH_RISK_PERCENT
    }

    /// `floor((1 - t/100) * 10000)`, e.g. 9950 for 0.5%.
    pub fn factor(self) -> u64 {
        let f = (Decimal::ONE - self.0 / Decimal::ONE_HUNDRED) * Decimal::from(FACTOR_SCALE);
        f.floor().to_u64().unwrap_or(0)
    }
}

impl Default for SlippageTolerance {
    fn default() -> Self {
        Self(Self::DEFAULT_PERCENT)
    }
}

/// Minimum acceptable output for `quote` under `tolerance`: `floor(quote * factor / 10000)`.
///
/// This value goes unmodified into the swap call's `minOut` argument.
pub fn min_out(quote: U256, tolerance: SlippageTolerance) -> U256 {
    let factor = U256::from(tolerance.factor());
    let scale = U256::from(FACTOR_SCALE);
    match quote.checked_mul(factor) {
        Some(v) => v / scale,
        // Only reachable for quotes near U256::MAX.
        None => quote / scale * factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tol(s: &str) -> SlippageTolerance {
        SlippageTolerance::parse(s).unwrap_or_default()
    }

    #[test]
    fn factor_uses_four_decimal_precision() {
        assert_eq!(tol("0").factor(), 10_000);
        assert_eq!(tol("0.5").factor(), 9_950);
        assert_eq!(tol("1").factor(), 9_900);
        assert_eq!(tol("50").factor(), 5_000);
        assert_eq!(tol("0.05").factor(), 9_995);
        // Sub-basis-point tolerance is dropped by the floor.
        assert_eq!(tol("0.00001").factor(), 9_999);
    }

    #[test]
    fn zero_tolerance_keeps_quote() {
        let q = U256::from(123_456_789_u64);
        assert_eq!(min_out(q, tol("0")), q);
    }

    #[test]
    fn min_out_never_exceeds_quote() {
        let quotes = [0_u64, 1, 9_999, 10_000, 49_999_999_999, u64::MAX];
        let tols = ["0", "0.01", "0.5", "3", "5.5", "49.99", "50"];
        for q in quotes {
            for t in tols {
                let q = U256::from(q);
                assert!(min_out(q, tol(t)) <= q, "q={q} t={t}");
            }
        }
        assert!(min_out(U256::MAX, tol("0.5")) <= U256::MAX);
    }

    #[test]
    fn scenario_hundred_bbusd_half_percent() {
        // 100 BBUSD quoted at 0.05 BBETH (18 decimals).
        let quote = U256::from(50_000_000_000_000_000_u64);
        let got = min_out(quote, tol("0.5"));
        assert_eq!(got, quote * U256::from(9_950_u64) / U256::from(10_000_u64));
        assert_eq!(got, U256::from(49_750_000_000_000_000_u64));
    }

    #[test]
    fn range_is_enforced_and_high_risk_flagged() {
        assert!(SlippageTolerance::parse("-0.1").is_err());
        assert!(SlippageTolerance::parse("50.01").is_err());
        assert!(SlippageTolerance::parse("abc").is_err());
        assert!(!tol("5").is_high_risk());
        assert!(tol("5.1").is_high_risk());
        assert_eq!(tol("50").percent(), Decimal::from(50_u64));
        assert_eq!(tol("1%").percent(), Decimal::ONE);
        assert_eq!(SlippageTolerance::default().factor(), 9_950);
    }
}

use alloy::primitives::U256;

/// An approval must precede the swap when the allowance is unknown or below the spend.
pub fn needs_approval(allowance: Option<U256>, amount_in: U256) -> bool {
    allowance.map_or(true, |a| a < amount_in)
}

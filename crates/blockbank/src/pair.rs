use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of the traded pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

/// Which way a swap goes. Token A is BBUSD and token B is BBETH on the default deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub const ALL: [Self; 2] = [Self::AToB, Self::BToA];

    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::AToB => Self::BToA,
            Self::BToA => Self::AToB,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AToB => f.write_str("a-to-b"),
            Self::BToA => f.write_str("b-to-a"),
        }
    }
}

/// The fixed exchange: two tokens and the swap contract that trades between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub token_a: TokenInfo,
    pub token_b: TokenInfo,
    pub swap_contract: Address,
}

impl Pair {
    pub const fn sell_token(&self, direction: Direction) -> &TokenInfo {
        match direction {
            Direction::AToB => &self.token_a,
            Direction::BToA => &self.token_b,
        }
    }

    pub const fn buy_token(&self, direction: Direction) -> &TokenInfo {
        match direction {
            Direction::AToB => &self.token_b,
            Direction::BToA => &self.token_a,
        }
    }

    /// `"BBUSD -> BBETH"` style label for logs and prompts.
    pub fn label(&self, direction: Direction) -> String {
        format!(
            "{} -> {}",
            self.sell_token(direction).symbol,
            self.buy_token(direction).symbol
        )
    }
}

/// Input state after the user flips the pair: the old displayed output becomes the new sell amount.
pub fn switch_direction(direction: Direction, displayed_buy_amount: &str) -> (Direction, String) {
    (direction.flip(), displayed_buy_amount.trim().to_owned())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{Pair, TokenInfo};
    use alloy::primitives::Address;

    pub fn pair() -> Pair {
        Pair {
            token_a: TokenInfo {
                symbol: "BBUSD".to_owned(),
                address: Address::repeat_byte(0xaa),
                decimals: 6,
            },
            token_b: TokenInfo {
                symbol: "BBETH".to_owned(),
                address: Address::repeat_byte(0xbb),
                decimals: 18,
            },
            swap_contract: Address::repeat_byte(0x55),
        }
    }
}

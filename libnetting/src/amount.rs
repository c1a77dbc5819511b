use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::iter::Sum;
use std::ops::{Add, Sub};

/// A quantity of the channel's asset, in the asset's smallest indivisible unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount {
    amount: u64,
}

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount { amount: 0 };

    pub const fn new(amount: u64) -> Self {
        TokenAmount { amount }
    }

    pub const fn value(&self) -> u64 {
        self.amount
    }

    pub const fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn checked_add(self, rhs: TokenAmount) -> Option<TokenAmount> {
        self.amount.checked_add(rhs.amount).map(TokenAmount::new)
    }

    pub fn checked_sub(self, rhs: TokenAmount) -> Option<TokenAmount> {
        self.amount.checked_sub(rhs.amount).map(TokenAmount::new)
    }

    pub fn saturating_sub(self, rhs: TokenAmount) -> TokenAmount {
        TokenAmount::new(self.amount.saturating_sub(rhs.amount))
    }

    /// Parses a plain decimal integer. Returns `None` for anything else, including negative numbers and fractions.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        s.parse::<u64>().ok().map(TokenAmount::new)
    }
}

impl From<u64> for TokenAmount {
    fn from(amount: u64) -> Self {
        TokenAmount::new(amount)
    }
}

impl From<TokenAmount> for u64 {
    fn from(amount: TokenAmount) -> Self {
        amount.amount
    }
}

/// Panics on overflow. Use [`TokenAmount::checked_add`] for values that come off the wire.
impl Add for TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: Self) -> Self::Output {
        TokenAmount::new(self.amount + rhs.amount)
    }
}

/// Panics on underflow. Use [`TokenAmount::checked_sub`] for values that come off the wire.
impl Sub for TokenAmount {
    type Output = TokenAmount;

    fn sub(self, rhs: Self) -> Self::Output {
        TokenAmount::new(self.amount - rhs.amount)
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TokenAmount::ZERO, |acc, v| acc + v)
    }
}

impl<'a> Sum<&'a TokenAmount> for TokenAmount {
    fn sum<I: Iterator<Item = &'a TokenAmount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.amount)
    }
}

#[cfg(test)]
mod test {
    use crate::amount::TokenAmount;

    #[test]
    fn parse_amounts() {
        assert_eq!(TokenAmount::parse("100"), Some(TokenAmount::new(100)));
        assert_eq!(TokenAmount::parse(" 7 "), Some(TokenAmount::new(7)));
        assert_eq!(TokenAmount::parse("0"), Some(TokenAmount::ZERO));
        assert!(TokenAmount::parse("-1").is_none());
        assert!(TokenAmount::parse("1.5").is_none());
        assert!(TokenAmount::parse("").is_none());
        assert!(TokenAmount::parse("ten").is_none());
        assert!(TokenAmount::parse("18446744073709551616").is_none());
    }

    #[test]
    fn checked_arithmetic() {
        let a = TokenAmount::new(10);
        let b = TokenAmount::new(3);
        assert_eq!(a.checked_sub(b), Some(TokenAmount::new(7)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), TokenAmount::ZERO);
        assert_eq!(TokenAmount::new(u64::MAX).checked_add(b), None);
        assert_eq!(a + b, TokenAmount::new(13));
    }

    #[test]
    fn sum_of_amounts() {
        let amounts = [TokenAmount::new(1), TokenAmount::new(2), TokenAmount::new(3)];
        let total: TokenAmount = amounts.iter().sum();
        assert_eq!(total, TokenAmount::new(6));
        assert_eq!(total.to_string(), "6");
    }
}

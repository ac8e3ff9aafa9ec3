//! Value Objects for the hierarchy builder

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authorized territory label (free text, trimmed, never blank)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Territory(String);

impl Territory {
    pub fn new(value: impl Into<String>) -> Result<Self, TerritoryError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(TerritoryError::Blank); }
        if value.chars().count() > 120 { return Err(TerritoryError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Territory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum TerritoryError { Blank, TooLong }
impl std::error::Error for TerritoryError {}
impl fmt::Display for TerritoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Blank => write!(f, "territory is blank"), Self::TooLong => write!(f, "territory too long") }
    }
}

/// Percentage in the closed range 0..=100
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED { return Err(PercentageError::OutOfRange(value)); }
        Ok(Self(value))
    }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn value(&self) -> Decimal { self.0 }
}

impl Default for Percentage { fn default() -> Self { Self::zero() } }

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PercentageError { OutOfRange(Decimal) }
impl std::error::Error for PercentageError {}
impl fmt::Display for PercentageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::OutOfRange(v) => write!(f, "percentage {} outside 0..=100", v) }
    }
}

/// Non-negative price
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount < Decimal::ZERO { return Err(PriceError::Negative(amount)); }
        Ok(Self(amount))
    }
    pub fn amount(&self) -> Decimal { self.0 }

    /// Applies a discount factor, rounded to cents.
    pub fn discounted(&self, factor: Decimal) -> Price { Price((self.0 * factor).round_dp(2)) }

    pub fn capped_at(self, ceiling: Price) -> Result<Price, PriceError> {
        if self.0 > ceiling.0 { return Err(PriceError::AboveCeiling { amount: self.0, ceiling: ceiling.0 }); }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PriceError { Negative(Decimal), AboveCeiling { amount: Decimal, ceiling: Decimal } }
impl std::error::Error for PriceError {}
impl fmt::Display for PriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative(v) => write!(f, "price {} is negative", v),
            Self::AboveCeiling { amount, ceiling } => write!(f, "price {} exceeds catalog price {}", amount, ceiling),
        }
    }
}

impl From<TerritoryError> for crate::HierarchyError {
    fn from(e: TerritoryError) -> Self { crate::HierarchyError::Validation(e.to_string()) }
}
impl From<PercentageError> for crate::HierarchyError {
    fn from(e: PercentageError) -> Self { crate::HierarchyError::Validation(e.to_string()) }
}
impl From<PriceError> for crate::HierarchyError {
    fn from(e: PriceError) -> Self { crate::HierarchyError::Validation(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_territory_trims() { let t = Territory::new("  Lahore ").unwrap(); assert_eq!(t.as_str(), "Lahore"); }
    #[test]
    fn test_territory_blank() { assert_eq!(Territory::new("   "), Err(TerritoryError::Blank)); }
    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(Decimal::new(100, 0)).is_ok());
        assert!(Percentage::new(Decimal::new(1001, 1)).is_err());
        assert!(Percentage::new(Decimal::new(-1, 0)).is_err());
    }
    #[test]
    fn test_price_discount() {
        let p = Price::new(Decimal::new(100, 0)).unwrap();
        assert_eq!(p.discounted(Decimal::new(8, 1)).amount(), Decimal::new(8000, 2));
        assert_eq!(Price::new(Decimal::new(1999, 2)).unwrap().discounted(Decimal::new(9, 1)).amount(), Decimal::new(1799, 2));
    }
    #[test]
    fn test_price_ceiling() {
        let ceiling = Price::new(Decimal::new(50, 0)).unwrap();
        assert!(Price::new(Decimal::new(51, 0)).unwrap().capped_at(ceiling).is_err());
        assert!(Price::new(Decimal::new(50, 0)).unwrap().capped_at(ceiling).is_ok());
        assert!(Price::new(Decimal::new(-1, 0)).is_err());
    }
}

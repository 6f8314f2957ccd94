//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flat delivery fee charged on every order, in major currency units.
pub const DELIVERY_FEE: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

/// Promo code value object. Codes are stored upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromoCode(String);

impl PromoCode {
    pub fn new(value: impl Into<String>) -> Result<Self, PromoCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(PromoCodeError::Empty); }
        if value.len() > 32 { return Err(PromoCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PromoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PromoCodeError { Empty, TooLong }
impl std::error::Error for PromoCodeError {}
impl fmt::Display for PromoCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "Please enter a promo code"), Self::TooLong => write!(f, "Promo code too long") }
    }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn ghs(amount: Decimal) -> Self { Self::new(amount, "GHS") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }

    /// Amount in the currency's minor unit (pesewas, kobo, cents), rounded half away from zero.
    pub fn minor_units(&self) -> Result<i64, MoneyError> {
        (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)
    }
}

impl Default for Money { fn default() -> Self { Self::zero("GHS") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {:.2}", self.currency, self.amount) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Amount out of range") }
}

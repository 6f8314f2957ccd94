//! Promotion codes and their validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::aggregates::cart::AppliedPromotion;
use crate::domain::value_objects::{PromoCode, PromoCodeError};

/// A `promo_codes` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromotionRecord {
    pub id: i64,
    pub code: String,
    pub discount_percentage: i32,
    pub is_active: bool,
    pub expiry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromotionError {
    #[error("Please enter a promo code")]
    Empty,
    #[error("A promo code is already applied")]
    AlreadyApplied,
    #[error("Invalid promo code")]
    NotFound,
    #[error("Promo code has expired")]
    Expired,
    #[error("Failed to apply promo code: {0}")]
    Lookup(String),
    #[error("Discount must be between 1 and 100 percent, got {0}")]
    InvalidPercentage(i32),
}

impl From<PromoCodeError> for PromotionError {
    fn from(_: PromoCodeError) -> Self { Self::NotFound }
}

/// Normalises user input into a code, rejecting blank input and a second promotion.
pub fn parse_code(input: &str, already_applied: bool) -> Result<PromoCode, PromotionError> {
    let code = match PromoCode::new(input) {
        Err(PromoCodeError::Empty) => return Err(PromotionError::Empty),
        other => other?,
    };
    if already_applied { return Err(PromotionError::AlreadyApplied); }
    Ok(code)
}

fn active() -> bool { true }

/// A promo code as entered in the back office.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NewPromotion {
    pub code: String,
    pub discount_percentage: i32,
    pub expiry_date: DateTime<Utc>,
    #[serde(default = "active")]
    pub is_active: bool,
}

impl NewPromotion {
    /// Upper-cases the code and checks the percentage range.
    pub fn normalized(self) -> Result<Self, PromotionError> {
        let code = parse_code(&self.code, false)?;
        if !(1..=100).contains(&self.discount_percentage) {
            return Err(PromotionError::InvalidPercentage(self.discount_percentage));
        }
        Ok(Self { code: code.as_str().to_string(), ..self })
    }
}

/// Decides whether a looked-up record may be applied at `now`.
///
/// The lookup is expected to be filtered to active codes already; inactive or
/// mismatched rows are still rejected here so the check is self-contained.
pub fn evaluate(code: &PromoCode, found: Option<PromotionRecord>, now: DateTime<Utc>) -> Result<AppliedPromotion, PromotionError> {
    let record = found.filter(|r| r.is_active && r.code.eq_ignore_ascii_case(code.as_str())).ok_or(PromotionError::NotFound)?;
    let discount_percentage = u8::try_from(record.discount_percentage)
        .ok()
        .filter(|p| (1..=100).contains(p))
        .ok_or(PromotionError::NotFound)?;
    if record.expiry_date < now { return Err(PromotionError::Expired); }
    Ok(AppliedPromotion { id: record.id, code: code.as_str().to_string(), discount_percentage, expiry: record.expiry_date })
}

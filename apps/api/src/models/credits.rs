use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::GenerationError;

/// Ceiling for any stored credit counter; the database columns are `INTEGER`.
pub const MAX_CREDIT_COUNTER: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Plus,
    Premium,
}

impl SubscriptionTier {
    /// Credits included per calendar month. `None` means unlimited.
    pub fn monthly_allowance(&self) -> Option<u32> {
        match self {
            SubscriptionTier::Free => Some(10),
            SubscriptionTier::Plus => Some(200),
            SubscriptionTier::Premium => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "FREE",
            SubscriptionTier::Plus => "PLUS",
            SubscriptionTier::Premium => "PREMIUM",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(SubscriptionTier::Free),
            "PLUS" => Ok(SubscriptionTier::Plus),
            "PREMIUM" => Ok(SubscriptionTier::Premium),
            other => Err(format!("Unknown subscription tier '{other}'")),
        }
    }
}

/// A user's credit position. `held` covers reservations not yet committed or released.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditAccount {
    pub user_id: Uuid,
    pub tier: SubscriptionTier,
    pub monthly_used: u32,
    pub bonus_credits: u32,
    pub held: u32,
    pub period_start: DateTime<Utc>,
}

impl CreditAccount {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tier: SubscriptionTier::Free,
            monthly_used: 0,
            bonus_credits: 0,
            held: 0,
            period_start: now,
        }
    }

    /// Zeroes monthly usage once a calendar month boundary has passed.
    pub fn roll_period(&mut self, now: DateTime<Utc>) {
        let months = (now.year() - self.period_start.year()) * 12 + now.month() as i32
            - self.period_start.month() as i32;
        if months >= 1 {
            self.monthly_used = 0;
            self.period_start = now;
        }
    }

    /// Spendable credits right now; `None` means unlimited.
    pub fn available(&self) -> Option<u32> {
        let allowance = self.tier.monthly_allowance()?;
        let monthly_remaining = allowance.saturating_sub(self.monthly_used);
        Some(
            monthly_remaining
                .saturating_add(self.bonus_credits)
                .saturating_sub(self.held),
        )
    }

    /// Places a hold of `amount` credits.
    pub fn hold(&mut self, amount: u32) -> Result<(), GenerationError> {
        self.held = checked_counter(self.held, amount, "held credits")?;
        Ok(())
    }

    pub fn add_bonus(&mut self, amount: u32) -> Result<(), GenerationError> {
        self.bonus_credits = checked_counter(self.bonus_credits, amount, "bonus credits")?;
        Ok(())
    }

    /// Applies a permanent deduction: monthly allowance first, then bonus credits.
    pub fn deduct(&mut self, amount: u32) {
        match self.tier.monthly_allowance() {
            None => {
                self.monthly_used = self.monthly_used.saturating_add(amount).min(MAX_CREDIT_COUNTER)
            }
            Some(allowance) => {
                let monthly_remaining = allowance.saturating_sub(self.monthly_used);
                let from_monthly = monthly_remaining.min(amount);
                self.monthly_used += from_monthly;
                self.bonus_credits = self.bonus_credits.saturating_sub(amount - from_monthly);
            }
        }
    }

    pub fn balance(&self) -> CreditBalance {
        CreditBalance {
            user_id: self.user_id,
            tier: self.tier,
            available: self.available(),
            monthly_used: self.monthly_used,
            monthly_allowance: self.tier.monthly_allowance(),
            bonus_credits: self.bonus_credits,
            held: self.held,
        }
    }
}

fn checked_counter(current: u32, amount: u32, what: &str) -> Result<u32, GenerationError> {
    current
        .checked_add(amount)
        .filter(|total| *total <= MAX_CREDIT_COUNTER)
        .ok_or_else(|| {
            GenerationError::Validation(format!(
                "{what} would exceed the maximum of {MAX_CREDIT_COUNTER}"
            ))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub user_id: Uuid,
    pub tier: SubscriptionTier,
    /// `null` for unlimited tiers.
    pub available: Option<u32>,
    pub monthly_used: u32,
    pub monthly_allowance: Option<u32>,
    pub bonus_credits: u32,
    pub held: u32,
}

#[derive(Debug, Clone, FromRow)]
pub struct CreditAccountRow {
    pub user_id: Uuid,
    pub tier: String,
    pub monthly_used: i32,
    pub bonus_credits: i32,
    pub held: i32,
    pub period_start: DateTime<Utc>,
}

impl From<CreditAccountRow> for CreditAccount {
    fn from(row: CreditAccountRow) -> Self {
        CreditAccount {
            user_id: row.user_id,
            tier: row.tier.parse().unwrap_or_default(),
            monthly_used: row.monthly_used.max(0) as u32,
            bonus_credits: row.bonus_credits.max(0) as u32,
            held: row.held.max(0) as u32,
            period_start: row.period_start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Held,
    Committed,
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Held => "held",
            ReservationState::Committed => "committed",
            ReservationState::Released => "released",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditReservation {
    pub token: Uuid,
    pub user_id: Uuid,
    pub amount: u32,
    pub state: ReservationState,
}

//! Credit Ledger — reserve / commit / release against a user's balance.
//!
//! A reservation moves credits into `held` so parallel generations for the
//! same user cannot spend the same credit twice. Commit turns the hold into a
//! permanent deduction; release hands it back. Both are idempotent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::GenerationError;
use crate::models::credits::{
    CreditAccount, CreditAccountRow, CreditBalance, CreditReservation, ReservationState,
};

#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Holds `amount` credits. Fails with `InsufficientCredits` when the
    /// available balance is smaller than `amount`.
    async fn reserve(&self, user_id: Uuid, amount: u32) -> Result<Uuid, GenerationError>;

    /// Converts a hold into a deduction. A second commit is a no-op.
    async fn commit(&self, token: Uuid) -> Result<(), GenerationError>;

    /// Returns a hold to the available balance. A second release is a no-op.
    async fn release(&self, token: Uuid) -> Result<(), GenerationError>;

    async fn balance(&self, user_id: Uuid) -> Result<CreditBalance, GenerationError>;

    async fn add_bonus_credits(
        &self,
        user_id: Uuid,
        amount: u32,
    ) -> Result<CreditBalance, GenerationError>;
}

/// Shared transition rules so both backends agree on what a repeat call does.
/// Returns `true` when the caller should apply the transition.
fn check_transition(
    reservation: &CreditReservation,
    target: ReservationState,
) -> Result<bool, GenerationError> {
    match (reservation.state, target) {
        (ReservationState::Held, _) => Ok(true),
        (current, target) if current == target => {
            debug!(
                "Reservation {} already {}, ignoring repeat call",
                reservation.token,
                current.as_str()
            );
            Ok(false)
        }
        (ReservationState::Released, ReservationState::Committed) => {
            Err(GenerationError::Validation(format!(
                "Reservation {} was released and cannot be committed",
                reservation.token
            )))
        }
        (current, _) => {
            warn!(
                "Reservation {} is {}, ignoring release",
                reservation.token,
                current.as_str()
            );
            Ok(false)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory ledger
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Uuid, CreditAccount>,
    reservations: HashMap<Uuid, CreditReservation>,
}

/// Process-local ledger. One mutex guards accounts and reservations together,
/// which makes every operation atomic.
pub struct InMemoryCreditLedger {
    state: Mutex<LedgerState>,
    clock: Arc<dyn Clock>,
    signup_bonus: u32,
}

impl InMemoryCreditLedger {
    pub fn new(clock: Arc<dyn Clock>, signup_bonus: u32) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            clock,
            signup_bonus,
        }
    }

    /// Seeds or replaces an account.
    #[cfg(test)]
    pub fn upsert_account(&self, account: CreditAccount) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.accounts.insert(account.user_id, account);
    }

    fn with_account<T>(&self, user_id: Uuid, f: impl FnOnce(&mut CreditAccount) -> T) -> T {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let account = state.accounts.entry(user_id).or_insert_with(|| {
            let mut account = CreditAccount::new(user_id, now);
            account.bonus_credits = self.signup_bonus;
            account
        });
        account.roll_period(now);
        f(account)
    }

    fn transition(&self, token: Uuid, target: ReservationState) -> Result<(), GenerationError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let LedgerState {
            accounts,
            reservations,
        } = &mut *state;

        let reservation = reservations
            .get_mut(&token)
            .ok_or_else(|| GenerationError::NotFound(format!("Reservation {token} not found")))?;
        if !check_transition(reservation, target)? {
            return Ok(());
        }

        let account = accounts.get_mut(&reservation.user_id).ok_or_else(|| {
            GenerationError::Storage(format!("Account {} vanished", reservation.user_id))
        })?;
        account.held = account.held.saturating_sub(reservation.amount);
        if target == ReservationState::Committed {
            account.deduct(reservation.amount);
        }
        reservation.state = target;

        info!(
            "Reservation {token} {} ({} credits, user {})",
            target.as_str(),
            reservation.amount,
            reservation.user_id
        );
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn reserve(&self, user_id: Uuid, amount: u32) -> Result<Uuid, GenerationError> {
        let token = Uuid::new_v4();
        self.with_account(user_id, |account| match account.available() {
            Some(available) if available < amount => Err(GenerationError::InsufficientCredits {
                required: amount,
                available,
            }),
            _ => account.hold(amount),
        })?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.reservations.insert(
            token,
            CreditReservation {
                token,
                user_id,
                amount,
                state: ReservationState::Held,
            },
        );
        debug!("Reserved {amount} credits for user {user_id} (token {token})");
        Ok(token)
    }

    async fn commit(&self, token: Uuid) -> Result<(), GenerationError> {
        self.transition(token, ReservationState::Committed)
    }

    async fn release(&self, token: Uuid) -> Result<(), GenerationError> {
        self.transition(token, ReservationState::Released)
    }

    async fn balance(&self, user_id: Uuid) -> Result<CreditBalance, GenerationError> {
        Ok(self.with_account(user_id, |account| account.balance()))
    }

    async fn add_bonus_credits(
        &self,
        user_id: Uuid,
        amount: u32,
    ) -> Result<CreditBalance, GenerationError> {
        self.with_account(user_id, |account| -> Result<_, GenerationError> {
            account.add_bonus(amount)?;
            Ok(account.balance())
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL ledger
// ────────────────────────────────────────────────────────────────────────────

fn db_counter(value: u32) -> Result<i32, GenerationError> {
    i32::try_from(value).map_err(|_| {
        GenerationError::Validation(format!("Credit amount {value} exceeds the storable range"))
    })
}

/// Ledger backed by `credit_accounts` / `credit_reservations`.
/// Every operation runs in one transaction holding the account row lock.
pub struct PgCreditLedger {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Creates the account if needed, then locks it for the rest of the transaction.
    async fn lock_account(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<CreditAccount, GenerationError> {
        let now = self.clock.now();
        sqlx::query(
            "INSERT INTO credit_accounts (user_id, period_start) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let row = sqlx::query_as::<_, CreditAccountRow>(
            "SELECT user_id, tier, monthly_used, bonus_credits, held, period_start \
             FROM credit_accounts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        let mut account = CreditAccount::from(row);
        account.roll_period(now);
        Ok(account)
    }

    async fn store_account(
        tx: &mut Transaction<'_, Postgres>,
        account: &CreditAccount,
    ) -> Result<(), GenerationError> {
        sqlx::query(
            r#"
            UPDATE credit_accounts
            SET monthly_used = $2, bonus_credits = $3, held = $4, period_start = $5
            WHERE user_id = $1
            "#,
        )
        .bind(account.user_id)
        .bind(db_counter(account.monthly_used)?)
        .bind(db_counter(account.bonus_credits)?)
        .bind(db_counter(account.held)?)
        .bind(account.period_start)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn transition(&self, token: Uuid, target: ReservationState) -> Result<(), GenerationError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid, i32, String)> = sqlx::query_as(
            "SELECT user_id, amount, state FROM credit_reservations WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;
        let (user_id, amount, state) =
            row.ok_or_else(|| GenerationError::NotFound(format!("Reservation {token} not found")))?;

        let reservation = CreditReservation {
            token,
            user_id,
            amount: amount.max(0) as u32,
            state: match state.as_str() {
                "held" => ReservationState::Held,
                "committed" => ReservationState::Committed,
                _ => ReservationState::Released,
            },
        };
        if !check_transition(&reservation, target)? {
            return Ok(());
        }

        let mut account = self.lock_account(&mut tx, user_id).await?;
        account.held = account.held.saturating_sub(reservation.amount);
        if target == ReservationState::Committed {
            account.deduct(reservation.amount);
        }
        Self::store_account(&mut tx, &account).await?;

        sqlx::query("UPDATE credit_reservations SET state = $2, updated_at = $3 WHERE token = $1")
            .bind(token)
            .bind(target.as_str())
            .bind(self.clock.now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "Reservation {token} {} ({} credits, user {user_id})",
            target.as_str(),
            reservation.amount
        );
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn reserve(&self, user_id: Uuid, amount: u32) -> Result<Uuid, GenerationError> {
        let mut tx = self.pool.begin().await?;
        let mut account = self.lock_account(&mut tx, user_id).await?;

        if let Some(available) = account.available() {
            if available < amount {
                return Err(GenerationError::InsufficientCredits {
                    required: amount,
                    available,
                });
            }
        }
        account.hold(amount)?;
        Self::store_account(&mut tx, &account).await?;

        let token = Uuid::new_v4();
        let now = self.clock.now();
        sqlx::query(
            r#"
            INSERT INTO credit_reservations (token, user_id, amount, state, created_at, updated_at)
            VALUES ($1, $2, $3, 'held', $4, $4)
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(db_counter(amount)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Reserved {amount} credits for user {user_id} (token {token})");
        Ok(token)
    }

    async fn commit(&self, token: Uuid) -> Result<(), GenerationError> {
        self.transition(token, ReservationState::Committed).await
    }

    async fn release(&self, token: Uuid) -> Result<(), GenerationError> {
        self.transition(token, ReservationState::Released).await
    }

    async fn balance(&self, user_id: Uuid) -> Result<CreditBalance, GenerationError> {
        let mut tx = self.pool.begin().await?;
        let account = self.lock_account(&mut tx, user_id).await?;
        Self::store_account(&mut tx, &account).await?;
        tx.commit().await?;
        Ok(account.balance())
    }

    async fn add_bonus_credits(
        &self,
        user_id: Uuid,
        amount: u32,
    ) -> Result<CreditBalance, GenerationError> {
        let mut tx = self.pool.begin().await?;
        let mut account = self.lock_account(&mut tx, user_id).await?;
        account.add_bonus(amount)?;
        Self::store_account(&mut tx, &account).await?;
        tx.commit().await?;
        Ok(account.balance())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::clock::{ManualClock, SystemClock};
    use crate::models::credits::SubscriptionTier;

    fn ledger() -> InMemoryCreditLedger {
        InMemoryCreditLedger::new(Arc::new(SystemClock), 0)
    }

    #[tokio::test]
    async fn test_new_user_gets_free_allowance() {
        let ledger = ledger();
        let balance = ledger.balance(Uuid::new_v4()).await.unwrap();
        assert_eq!(balance.tier, SubscriptionTier::Free);
        assert_eq!(balance.available, Some(10));
    }

    #[tokio::test]
    async fn test_reserve_holds_and_commit_deducts() {
        let ledger = ledger();
        let user = Uuid::new_v4();

        let token = ledger.reserve(user, 3).await.unwrap();
        let held = ledger.balance(user).await.unwrap();
        assert_eq!(held.available, Some(7));
        assert_eq!(held.held, 3);

        ledger.commit(token).await.unwrap();
        let after = ledger.balance(user).await.unwrap();
        assert_eq!(after.available, Some(7));
        assert_eq!(after.held, 0);
        assert_eq!(after.monthly_used, 3);
    }

    #[tokio::test]
    async fn test_release_restores_balance() {
        let ledger = ledger();
        let user = Uuid::new_v4();

        let token = ledger.reserve(user, 4).await.unwrap();
        ledger.release(token).await.unwrap();
        let balance = ledger.balance(user).await.unwrap();
        assert_eq!(balance.available, Some(10));
        assert_eq!(balance.monthly_used, 0);
    }

    #[tokio::test]
    async fn test_commit_and_release_are_idempotent() {
        let ledger = ledger();
        let user = Uuid::new_v4();

        let committed = ledger.reserve(user, 2).await.unwrap();
        ledger.commit(committed).await.unwrap();
        ledger.commit(committed).await.unwrap();
        ledger.release(committed).await.unwrap();

        let released = ledger.reserve(user, 2).await.unwrap();
        ledger.release(released).await.unwrap();
        ledger.release(released).await.unwrap();

        let balance = ledger.balance(user).await.unwrap();
        assert_eq!(balance.monthly_used, 2);
        assert_eq!(balance.available, Some(8));
    }

    #[tokio::test]
    async fn test_commit_after_release_is_rejected() {
        let ledger = ledger();
        let token = ledger.reserve(Uuid::new_v4(), 1).await.unwrap();
        ledger.release(token).await.unwrap();
        assert!(matches!(
            ledger.commit(token).await,
            Err(GenerationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let ledger = ledger();
        assert!(matches!(
            ledger.commit(Uuid::new_v4()).await,
            Err(GenerationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_insufficient_credits_reports_available() {
        let ledger = ledger();
        let user = Uuid::new_v4();
        ledger.reserve(user, 9).await.unwrap();
        let err = ledger.reserve(user, 2).await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::InsufficientCredits {
                required: 2,
                available: 1
            }
        );
    }

    #[tokio::test]
    async fn test_parallel_reservations_never_overspend() {
        let ledger = Arc::new(ledger());
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.reserve(user, 1).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
        assert_eq!(ledger.balance(user).await.unwrap().available, Some(0));
    }

    #[tokio::test]
    async fn test_bonus_credits_extend_allowance() {
        let ledger = ledger();
        let user = Uuid::new_v4();
        let balance = ledger.add_bonus_credits(user, 5).await.unwrap();
        assert_eq!(balance.available, Some(15));

        let token = ledger.reserve(user, 12).await.unwrap();
        ledger.commit(token).await.unwrap();
        let balance = ledger.balance(user).await.unwrap();
        assert_eq!(balance.monthly_used, 10);
        assert_eq!(balance.bonus_credits, 3);
    }

    #[tokio::test]
    async fn test_premium_never_runs_out() {
        let ledger = ledger();
        let user = Uuid::new_v4();
        let mut account = CreditAccount::new(user, Utc::now());
        account.tier = SubscriptionTier::Premium;
        ledger.upsert_account(account);

        for _ in 0..50 {
            let token = ledger.reserve(user, 5).await.unwrap();
            ledger.commit(token).await.unwrap();
        }
        assert_eq!(ledger.balance(user).await.unwrap().available, None);
    }

    #[tokio::test]
    async fn test_signup_bonus_applied_once() {
        let ledger = InMemoryCreditLedger::new(Arc::new(SystemClock), 3);
        let user = Uuid::new_v4();
        assert_eq!(ledger.balance(user).await.unwrap().available, Some(13));
        assert_eq!(ledger.balance(user).await.unwrap().available, Some(13));
    }

    #[tokio::test]
    async fn test_allowance_resets_in_new_month() {
        let start = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 5, 20, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let ledger = InMemoryCreditLedger::new(clock.clone(), 0);
        let user = Uuid::new_v4();

        let token = ledger.reserve(user, 10).await.unwrap();
        ledger.commit(token).await.unwrap();
        assert!(matches!(
            ledger.reserve(user, 1).await,
            Err(GenerationError::InsufficientCredits { .. })
        ));

        clock.advance(chrono::Duration::days(15));
        let balance = ledger.balance(user).await.unwrap();
        assert_eq!(balance.monthly_used, 0);
        assert_eq!(balance.available, Some(10));
    }

    #[tokio::test]
    async fn test_oversized_bonus_is_rejected_without_touching_balance() {
        let ledger = ledger();
        let user = Uuid::new_v4();
        assert!(matches!(
            ledger.add_bonus_credits(user, u32::MAX).await,
            Err(GenerationError::Validation(_))
        ));

        let balance = ledger.balance(user).await.unwrap();
        assert_eq!(balance.bonus_credits, 0);
        assert_eq!(balance.available, Some(10));
    }

    #[test]
    fn test_db_counter_refuses_values_beyond_i32() {
        assert_eq!(db_counter(42).unwrap(), 42);
        assert!(db_counter(i32::MAX as u32 + 1).is_err());
    }
}

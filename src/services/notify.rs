use async_trait::async_trait;
use bigdecimal::BigDecimal;
use uuid::Uuid;

/// Fire-and-forget user notifications. Implementations must never fail the
/// calling flow; money has already moved by the time these run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deposit_credited(&self, user_id: Uuid, credited: &BigDecimal, new_balance: &BigDecimal);

    async fn card_topped_up(&self, user_id: Uuid, card_id: Uuid, amount: &BigDecimal);

    async fn balance_reconciled(
        &self,
        card_id: Uuid,
        old_balance: Option<&BigDecimal>,
        new_balance: &BigDecimal,
    );
}

/// Default sink: structured log lines. A push/email notifier can replace
/// this without touching the services.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deposit_credited(
        &self,
        user_id: Uuid,
        credited: &BigDecimal,
        new_balance: &BigDecimal,
    ) {
        tracing::info!(
            "Deposit credited: user {} received {} (balance now {})",
            user_id,
            credited,
            new_balance
        );
    }

    async fn card_topped_up(&self, user_id: Uuid, card_id: Uuid, amount: &BigDecimal) {
        tracing::info!(
            "Card top-up: user {} loaded {} onto card {}",
            user_id,
            amount,
            card_id
        );
    }

    async fn balance_reconciled(
        &self,
        card_id: Uuid,
        old_balance: Option<&BigDecimal>,
        new_balance: &BigDecimal,
    ) {
        match old_balance {
            Some(old) => tracing::info!(
                "Card {} balance corrected from {} to {}",
                card_id,
                old,
                new_balance
            ),
            None => tracing::info!("Card {} balance initialized to {}", card_id, new_balance),
        }
    }
}

pub mod deposit;
pub mod notify;
pub mod reconciliation;
pub mod topup;
pub mod verification;

pub use deposit::{DepositError, DepositOutcome, DepositRequest, DepositService};
pub use notify::{LogNotifier, Notifier};
pub use reconciliation::{
    run_sweeper, ReconcileError, ReconcileOutcome, ReconciliationService, SweepReport,
    TransactionAudit,
};
pub use topup::{TopupError, TopupOutcome, TopupRequest, TopupService};
pub use verification::VerificationService;

//! Transaction aggregate rules.
//! Closed status enums and the status transition table, independent of storage.

use std::fmt;

closed_enum! {
    TransactionStatus, "transaction_status", "status" {
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

closed_enum! {
    PaymentMethod, "payment_method", "payment_method" {
        Cash => "cash",
        DigitalWallet => "digital_wallet",
        BankTransfer => "bank_transfer",
        Balance => "balance",
        Voucher => "voucher",
    }
}

closed_enum! {
    PaymentStatus, "payment_status", "payment_status" {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
}

impl TransactionStatus {
    /// Completed and cancelled transactions accept no further transitions or item edits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Cancelled)
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Legal status edges. `pending -> completed` is only open for direct sales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub allow_direct_completion: bool,
}

impl TransitionPolicy {
    pub fn new(allow_direct_completion: bool) -> Self {
        Self {
            allow_direct_completion,
        }
    }

    pub fn permits(&self, from: TransactionStatus, to: TransactionStatus) -> bool {
        use TransactionStatus::*;

        match (from, to) {
            (Pending, Confirmed)
            | (Confirmed, Completed)
            | (Pending, Cancelled)
            | (Confirmed, Cancelled) => true,
            (Pending, Completed) => self.allow_direct_completion,
            _ => false,
        }
    }

    pub fn check(
        &self,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<(), InvalidTransition> {
        if self.permits(from, to) {
            Ok(())
        } else {
            Err(InvalidTransition { from, to })
        }
    }
}

/// Payment status implied by entering a status, if any.
pub fn implied_payment_status(to: TransactionStatus) -> Option<PaymentStatus> {
    match to {
        TransactionStatus::Cancelled => Some(PaymentStatus::Failed),
        _ => None,
    }
}

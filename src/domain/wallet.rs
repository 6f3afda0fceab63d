//! Wallet ledger entry kinds.

closed_enum! {
    /// Kind of balance-affecting event. The sign of an entry's amount is
    /// chosen by the caller, never inferred from the kind.
    WalletEntryType, "wallet_entry_type", "entry_type" {
        Deposit => "deposit",
        Withdrawal => "withdrawal",
        WasteSale => "waste_sale",
    }
}

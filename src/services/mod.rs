pub mod catalog;
pub mod ledger;
pub mod qr_ticket;
pub mod wallet;

pub use catalog::CatalogStore;
pub use ledger::TransactionLedger;
pub use qr_ticket::QrTicketManager;
pub use wallet::WalletAccessor;

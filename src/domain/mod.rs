//! Storage-independent rules for tickets, transactions, line items and wallets.

/// Declares a closed string-backed enum shared by Postgres, JSON and query strings.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $pg_type:literal, $field:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash,
            ::serde::Serialize, ::serde::Deserialize, ::sqlx::Type,
        )]
        #[sqlx(type_name = $pg_type, rename_all = "snake_case")]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::validation::ValidationError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::validation::ValidationError::new(
                        $field,
                        format!(
                            "unknown value '{}', expected one of: {}",
                            other,
                            [$($text),+].join(", ")
                        ),
                    )),
                }
            }
        }
    };
}

pub mod line_item;
pub mod ticket;
pub mod transaction;
pub mod wallet;

pub use line_item::{LineItemInput, PricedLineItem, Totals};
pub use ticket::{TicketFields, TicketState};
pub use transaction::{
    implied_payment_status, InvalidTransition, PaymentMethod, PaymentStatus, TransactionStatus,
    TransitionPolicy,
};
pub use wallet::WalletEntryType;

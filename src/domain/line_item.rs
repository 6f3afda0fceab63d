//! Line-item pricing and header totals.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::validation::{
    sanitize_optional, validate_non_negative, validate_optional_max_len, validate_positive,
    ValidationError, NOTES_MAX_LEN,
};

/// A line item as submitted by a waste-bank operator.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    pub waste_category_id: Uuid,
    pub weight: BigDecimal,
    pub price_per_unit: BigDecimal,
    /// Optional echo of the client's own computation; checked, never trusted.
    pub subtotal: Option<BigDecimal>,
    pub notes: Option<String>,
}

/// A validated line item whose subtotal was computed server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLineItem {
    pub waste_category_id: Uuid,
    pub weight: BigDecimal,
    pub price_per_unit: BigDecimal,
    pub subtotal: BigDecimal,
    pub notes: Option<String>,
}

pub fn subtotal(weight: &BigDecimal, price_per_unit: &BigDecimal) -> BigDecimal {
    weight * price_per_unit
}

pub fn price_line_item(input: LineItemInput) -> Result<PricedLineItem, ValidationError> {
    validate_positive("weight", &input.weight)?;
    validate_non_negative("price_per_unit", &input.price_per_unit)?;

    let computed = subtotal(&input.weight, &input.price_per_unit);
    if let Some(claimed) = &input.subtotal {
        if claimed != &computed {
            return Err(ValidationError::new(
                "subtotal",
                format!(
                    "{} does not match weight x price_per_unit = {}",
                    claimed, computed
                ),
            ));
        }
    }

    let notes = sanitize_optional(input.notes);
    validate_optional_max_len("notes", notes.as_deref(), NOTES_MAX_LEN)?;

    Ok(PricedLineItem {
        waste_category_id: input.waste_category_id,
        weight: input.weight,
        price_per_unit: input.price_per_unit,
        subtotal: computed,
        notes,
    })
}

pub fn price_line_items(
    inputs: Vec<LineItemInput>,
) -> Result<Vec<PricedLineItem>, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::new("items", "at least one line item is required"));
    }

    inputs.into_iter().map(price_line_item).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub amount: BigDecimal,
    pub weight: BigDecimal,
}

impl Totals {
    pub fn of(items: &[PricedLineItem]) -> Self {
        items.iter().fold(
            Totals {
                amount: BigDecimal::from(0),
                weight: BigDecimal::from(0),
            },
            |acc, item| Totals {
                amount: acc.amount + &item.subtotal,
                weight: acc.weight + &item.weight,
            },
        )
    }

    /// Rejects caller-declared totals that disagree with the line items.
    pub fn verify_declared(
        &self,
        amount: Option<&BigDecimal>,
        weight: Option<&BigDecimal>,
    ) -> Result<(), ValidationError> {
        if let Some(amount) = amount {
            if amount != &self.amount {
                return Err(ValidationError::new(
                    "total_amount",
                    format!("{} does not match the line-item sum {}", amount, self.amount),
                ));
            }
        }
        if let Some(weight) = weight {
            if weight != &self.weight {
                return Err(ValidationError::new(
                    "total_weight",
                    format!("{} does not match the line-item sum {}", weight, self.weight),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn input(weight: &str, price: &str, subtotal: Option<&str>) -> LineItemInput {
        LineItemInput {
            waste_category_id: Uuid::new_v4(),
            weight: dec(weight),
            price_per_unit: dec(price),
            subtotal: subtotal.map(dec),
            notes: None,
        }
    }

    #[test]
    fn computes_subtotal_server_side() {
        let item = price_line_item(input("3.5", "2500", None)).unwrap();
        assert_eq!(item.subtotal, dec("8750"));
    }

    #[test]
    fn accepts_matching_client_subtotal_at_any_scale() {
        let item = price_line_item(input("3.5", "2500", Some("8750.00"))).unwrap();
        assert_eq!(item.subtotal, dec("8750"));
    }

    #[test]
    fn rejects_tampered_subtotal() {
        let err = price_line_item(input("3.5", "2500", Some("9999"))).unwrap_err();
        assert_eq!(err.field, "subtotal");
    }

    #[test]
    fn rejects_non_positive_weight_and_negative_price() {
        assert_eq!(price_line_item(input("0", "2500", None)).unwrap_err().field, "weight");
        assert_eq!(
            price_line_item(input("1", "-1", None)).unwrap_err().field,
            "price_per_unit"
        );
    }

    #[test]
    fn requires_at_least_one_item() {
        let err = price_line_items(vec![]).unwrap_err();
        assert_eq!(err.field, "items");
    }

    #[test]
    fn totals_are_exact_decimal_sums() {
        let items = price_line_items(vec![
            input("3.5", "2500", Some("8750")),
            input("1.0", "1500", Some("1500")),
        ])
        .unwrap();

        let totals = Totals::of(&items);
        assert_eq!(totals.amount, dec("10250"));
        assert_eq!(totals.weight, dec("4.5"));
    }

    #[test]
    fn decimal_sums_do_not_drift() {
        let items: Vec<_> = (0..10)
            .map(|_| price_line_item(input("0.1", "0.3", None)).unwrap())
            .collect();

        let totals = Totals::of(&items);
        assert_eq!(totals.weight, dec("1"));
        assert_eq!(totals.amount, dec("0.3"));
    }

    #[test]
    fn verifies_declared_totals() {
        let totals = Totals {
            amount: dec("10250"),
            weight: dec("4.5"),
        };

        assert!(totals.verify_declared(None, None).is_ok());
        assert!(totals
            .verify_declared(Some(&dec("10250.0")), Some(&dec("4.50")))
            .is_ok());
        assert_eq!(
            totals.verify_declared(Some(&dec("10000")), None).unwrap_err().field,
            "total_amount"
        );
        assert_eq!(
            totals.verify_declared(None, Some(&dec("5"))).unwrap_err().field,
            "total_weight"
        );
    }
}

//! Server-side cart pricing.
//!
//! The single authoritative price computation: every checkout re-runs it
//! against the catalogue, whatever the client claims to have calculated.
//! Pure and deterministic; all amounts are integer cents.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::catalog::{self, Product};
use crate::entities::order::FulfillmentMode;
use crate::errors::ServiceError;

pub const MIN_QTY_PER_LINE: i32 = 1;
pub const MAX_QTY_PER_LINE: i32 = 10;

/// One requested cart line: a catalogue slug and a quantity.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartLine {
    #[validate(length(min = 1, max = 100))]
    pub id: String,
    pub qty: i32,
}

/// A validated line with its catalogue snapshot and computed totals.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product: &'static Product,
    pub qty: i32,
    pub item_total_cents: i64,
    pub shipping_total_cents: i64,
}

/// Computed breakdown for a cart.
#[derive(Debug, Clone)]
pub struct CartTotals {
    pub items_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
    pub lines: Vec<PricedLine>,
}

/// Validates and prices a cart against the authoritative catalogue.
///
/// Per line, in order: the product must exist and be active, the quantity
/// must be within [1, 10], and when stock is tracked the quantity must not
/// exceed it. The first failing line aborts the computation (no partial
/// result). Shipping is charged per unit in delivery mode only.
pub fn compute_cart_totals(
    items: &[CartLine],
    mode: FulfillmentMode,
) -> Result<CartTotals, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError("cart is empty".into()));
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut items_total_cents: i64 = 0;
    let mut shipping_total_cents: i64 = 0;

    for item in items {
        let product = catalog::product_by_id(&item.id).ok_or_else(|| {
            ServiceError::ValidationError(format!("product not found: {}", item.id))
        })?;

        if item.qty < MIN_QTY_PER_LINE || item.qty > MAX_QTY_PER_LINE {
            return Err(ServiceError::ValidationError(format!(
                "invalid quantity for {}: {} (allowed {}-{})",
                product.name, item.qty, MIN_QTY_PER_LINE, MAX_QTY_PER_LINE
            )));
        }

        if let Some(stock) = product.stock_quantity {
            if i64::from(item.qty) > stock {
                return Err(ServiceError::InsufficientStock(format!(
                    "only {} of {} available",
                    stock, product.name
                )));
            }
        }

        let item_total = product.unit_price_cents * i64::from(item.qty);
        let item_shipping = match mode {
            FulfillmentMode::Delivery => product.shipping_cents_per_unit * i64::from(item.qty),
            FulfillmentMode::Pickup => 0,
        };

        items_total_cents += item_total;
        shipping_total_cents += item_shipping;

        lines.push(PricedLine {
            product,
            qty: item.qty,
            item_total_cents: item_total,
            shipping_total_cents: item_shipping,
        });
    }

    Ok(CartTotals {
        items_total_cents,
        shipping_total_cents,
        grand_total_cents: items_total_cents + shipping_total_cents,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn line(id: &str, qty: i32) -> CartLine {
        CartLine {
            id: id.to_string(),
            qty,
        }
    }

    #[test]
    fn delivery_charges_shipping_per_unit() {
        // 2 x mug-crest: 1200/unit + 450 shipping/unit
        let totals =
            compute_cart_totals(&[line("mug-crest", 2)], FulfillmentMode::Delivery).unwrap();
        assert_eq!(totals.items_total_cents, 2400);
        assert_eq!(totals.shipping_total_cents, 900);
        assert_eq!(totals.grand_total_cents, 3300);
    }

    #[test]
    fn pickup_never_charges_shipping() {
        let totals = compute_cart_totals(
            &[line("mug-crest", 2), line("pin-crest", 3)],
            FulfillmentMode::Pickup,
        )
        .unwrap();
        assert_eq!(totals.shipping_total_cents, 0);
        assert_eq!(totals.items_total_cents, totals.grand_total_cents);
    }

    #[test]
    fn totals_are_deterministic() {
        let items = [line("notebook-1885", 3), line("stickers-archive", 1)];
        let a = compute_cart_totals(&items, FulfillmentMode::Delivery).unwrap();
        let b = compute_cart_totals(&items, FulfillmentMode::Delivery).unwrap();
        assert_eq!(a.grand_total_cents, b.grand_total_cents);
        assert_eq!(a.items_total_cents, b.items_total_cents);
        assert_eq!(a.shipping_total_cents, b.shipping_total_cents);
    }

    #[test]
    fn quantity_bounds_are_enforced() {
        assert_matches!(
            compute_cart_totals(&[line("mug-crest", 0)], FulfillmentMode::Delivery),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            compute_cart_totals(&[line("mug-crest", 11)], FulfillmentMode::Delivery),
            Err(ServiceError::ValidationError(_))
        );
        assert!(compute_cart_totals(&[line("mug-crest", 1)], FulfillmentMode::Delivery).is_ok());
        assert!(compute_cart_totals(&[line("mug-crest", 10)], FulfillmentMode::Delivery).is_ok());
    }

    #[test]
    fn unknown_product_fails_fast() {
        let result = compute_cart_totals(
            &[line("no-such-thing", 1), line("mug-crest", 1)],
            FulfillmentMode::Delivery,
        );
        assert_matches!(result, Err(ServiceError::ValidationError(msg)) => {
            assert!(msg.contains("no-such-thing"));
        });
    }

    #[test]
    fn inactive_product_is_not_purchasable() {
        assert_matches!(
            compute_cart_totals(&[line("patch-centenary", 1)], FulfillmentMode::Pickup),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn stock_limit_is_enforced() {
        // poster-belfry tracks 8 in stock.
        assert_matches!(
            compute_cart_totals(&[line("poster-belfry", 9)], FulfillmentMode::Delivery),
            Err(ServiceError::InsufficientStock(_))
        );
        assert!(compute_cart_totals(&[line("poster-belfry", 8)], FulfillmentMode::Delivery).is_ok());
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert_matches!(
            compute_cart_totals(&[], FulfillmentMode::Delivery),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn shipping_invariant_holds() {
        let totals = compute_cart_totals(
            &[line("tote-market-hall", 4), line("bottle-ramparts", 2)],
            FulfillmentMode::Delivery,
        )
        .unwrap();
        assert_eq!(
            totals.items_total_cents + totals.shipping_total_cents,
            totals.grand_total_cents
        );
    }
}

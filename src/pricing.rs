//! Pricing calculator: turns resolved cart lines, a shipping method and an
//! optional discount into order totals.
//!
//! Unit prices come from the catalog rows passed in, never from the client.
//! Inapplicable discount codes are skipped, not errors (fail-open policy).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Discount, DiscountType, ResolvedVariant};

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("{sku}: requested {requested}, only {available} in stock")]
    OutOfStock {
        sku: String,
        requested: u32,
        available: i32,
    },
}

#[derive(Debug, Clone)]
pub struct PricedLine {
    pub variant: ResolvedVariant,
    pub quantity: u32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub subtotal: Decimal,
    pub shipping_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
    /// What the buyer saved; differs from `discount_total` for free-shipping
    /// codes, where the saving shows up as a zeroed shipping line.
    pub amount_saved: Decimal,
    /// Set only when a discount actually applied.
    pub discount_id: Option<Uuid>,
    pub lines: Vec<PricedLine>,
}

/// Flat rate table keyed by method name; unknown methods get the standard
/// rate. Shipping is free at or above the threshold.
pub fn shipping_cost(method: &str, subtotal: Decimal, free_threshold: Decimal) -> Decimal {
    if subtotal >= free_threshold {
        return Decimal::ZERO;
    }
    match method {
        "express" => Decimal::from(249),
        "pickup" => Decimal::ZERO,
        _ => Decimal::from(99),
    }
}

pub fn quote(
    lines: Vec<(ResolvedVariant, u32)>,
    shipping_method: &str,
    discount: Option<&Discount>,
    free_threshold: Decimal,
    now: DateTime<Utc>,
) -> Result<Quote, PricingError> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = Decimal::ZERO;
    for (variant, quantity) in lines {
        if (variant.stock_quantity as i64) < quantity as i64 {
            return Err(PricingError::OutOfStock {
                sku: variant.sku,
                requested: quantity,
                available: variant.stock_quantity,
            });
        }
        let line_total = variant.unit_price * Decimal::from(quantity);
        subtotal += line_total;
        priced.push(PricedLine {
            variant,
            quantity,
            line_total,
        });
    }

    let mut shipping_total = shipping_cost(shipping_method, subtotal, free_threshold);
    let mut discount_total = Decimal::ZERO;
    let mut amount_saved = Decimal::ZERO;
    let mut discount_id = None;

    if let Some(d) = discount {
        match d.applicability(now) {
            Err(reason) => {
                debug!(code = %d.code, ?reason, "discount code skipped");
            }
            Ok(()) => {
                let applied = match d.kind {
                    DiscountType::Percentage => {
                        let mut amount =
                            (subtotal * d.value / Decimal::from(100)).round_dp(2);
                        if let Some(ceiling) = d.maximum_discount {
                            amount = amount.min(ceiling);
                        }
                        discount_total = amount;
                        amount_saved = amount;
                        true
                    }
                    DiscountType::FixedAmount => {
                        discount_total = d.value;
                        amount_saved = d.value;
                        true
                    }
                    DiscountType::FreeShipping => {
                        amount_saved = shipping_total;
                        shipping_total = Decimal::ZERO;
                        true
                    }
                    DiscountType::BuyXGetY => match (d.buy_quantity, d.get_quantity) {
                        (Some(buy), Some(get)) if buy > 0 && get > 0 => {
                            let bundle = (buy + get) as u32;
                            let free_value: Decimal = priced
                                .iter()
                                .map(|line| {
                                    let free_units = line.quantity / bundle * get as u32;
                                    line.variant.unit_price * Decimal::from(free_units)
                                })
                                .sum();
                            discount_total = free_value;
                            amount_saved = free_value;
                            true
                        }
                        _ => {
                            debug!(code = %d.code, "buy_x_get_y discount missing quantities, skipped");
                            false
                        }
                    },
                };
                if applied {
                    // keep total == subtotal + shipping - discount while
                    // never letting it go negative
                    let ceiling = subtotal + shipping_total;
                    if discount_total > ceiling {
                        discount_total = ceiling;
                    }
                    discount_id = Some(d.id);
                }
            }
        }
    }

    let total = subtotal + shipping_total - discount_total;
    Ok(Quote {
        subtotal,
        shipping_total,
        discount_total,
        total,
        amount_saved,
        discount_id,
        lines: priced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn variant(price: i64, stock: i32) -> ResolvedVariant {
        ResolvedVariant {
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            product_name: "Widget".into(),
            variant_name: "M".into(),
            sku: "WID-M".into(),
            unit_price: Decimal::from(price),
            stock_quantity: stock,
            image_url: None,
        }
    }

    fn percentage(value: i64, maximum: Option<i64>) -> Discount {
        Discount {
            id: Uuid::new_v4(),
            code: "SAVE".into(),
            kind: DiscountType::Percentage,
            value: Decimal::from(value),
            maximum_discount: maximum.map(Decimal::from),
            buy_quantity: None,
            get_quantity: None,
            usage_count: 0,
            usage_limit: None,
            is_active: true,
            starts_at: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    fn threshold() -> Decimal {
        Decimal::from(2500)
    }

    #[test]
    fn standard_cart_totals() {
        let q = quote(
            vec![(variant(500, 10), 2)],
            "standard",
            None,
            threshold(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.subtotal, Decimal::from(1000));
        assert_eq!(q.shipping_total, Decimal::from(99));
        assert_eq!(q.discount_total, Decimal::ZERO);
        assert_eq!(q.total, Decimal::from(1099));
    }

    #[test]
    fn totals_identity_holds() {
        let carts = vec![
            vec![(variant(500, 10), 2)],
            vec![(variant(19, 100), 7), (variant(1250, 5), 1)],
            vec![(variant(3000, 3), 1)],
        ];
        for lines in carts {
            let q = quote(lines, "express", Some(&percentage(15, None)), threshold(), Utc::now())
                .unwrap();
            assert_eq!(q.total, q.subtotal + q.shipping_total - q.discount_total);
            assert!(q.total >= Decimal::ZERO);
        }
    }

    #[test]
    fn percentage_discount_clamped_to_maximum() {
        let q = quote(
            vec![(variant(500, 10), 2)],
            "standard",
            Some(&percentage(20, Some(100))),
            threshold(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.discount_total, Decimal::from(100));
    }

    #[test]
    fn expired_code_is_ignored_not_an_error() {
        let mut d = percentage(20, None);
        d.expires_at = Some(Utc::now() - Duration::days(1));
        let q = quote(
            vec![(variant(500, 10), 2)],
            "standard",
            Some(&d),
            threshold(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.discount_total, Decimal::ZERO);
        assert_eq!(q.discount_id, None);
        assert_eq!(q.total, Decimal::from(1099));
    }

    #[test]
    fn over_stock_quantity_fails() {
        let err = quote(
            vec![(variant(500, 1), 2)],
            "standard",
            None,
            threshold(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, PricingError::OutOfStock { requested: 2, available: 1, .. }));
    }

    #[test]
    fn free_shipping_over_threshold() {
        let q = quote(
            vec![(variant(3000, 5), 1)],
            "standard",
            None,
            threshold(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.shipping_total, Decimal::ZERO);
    }

    #[test]
    fn unknown_method_gets_standard_rate() {
        let q = quote(
            vec![(variant(500, 10), 1)],
            "carrier-pigeon",
            None,
            threshold(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.shipping_total, Decimal::from(99));
    }

    #[test]
    fn free_shipping_discount_zeroes_shipping() {
        let mut d = percentage(0, None);
        d.kind = DiscountType::FreeShipping;
        let q = quote(
            vec![(variant(500, 10), 1)],
            "express",
            Some(&d),
            threshold(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.shipping_total, Decimal::ZERO);
        assert_eq!(q.discount_total, Decimal::ZERO);
        assert_eq!(q.amount_saved, Decimal::from(249));
        assert_eq!(q.discount_id, Some(d.id));
        assert_eq!(q.total, Decimal::from(500));
    }

    #[test]
    fn fixed_amount_never_drives_total_negative() {
        let mut d = percentage(0, None);
        d.kind = DiscountType::FixedAmount;
        d.value = Decimal::from(10_000);
        let q = quote(
            vec![(variant(500, 10), 1)],
            "standard",
            Some(&d),
            threshold(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(q.total, Decimal::ZERO);
        assert_eq!(q.total, q.subtotal + q.shipping_total - q.discount_total);
    }

    #[test]
    fn buy_two_get_one_free() {
        let mut d = percentage(0, None);
        d.kind = DiscountType::BuyXGetY;
        d.buy_quantity = Some(2);
        d.get_quantity = Some(1);
        let q = quote(
            vec![(variant(100, 20), 7)],
            "pickup",
            Some(&d),
            threshold(),
            Utc::now(),
        )
        .unwrap();
        // 7 units = 2 full bundles of 3, so 2 free units
        assert_eq!(q.discount_total, Decimal::from(200));
        assert_eq!(q.total, Decimal::from(500));
    }
}

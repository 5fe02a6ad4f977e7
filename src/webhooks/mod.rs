//! Payment webhook reconciliation.
//!
//! Provider deliveries are at-least-once and possibly reordered. The guards:
//! a Payment row per (provider, provider_payment_id), a single stock commit
//! per order, a single discount redemption per order, and `can_transition`
//! checks on the payment status. Handlers always acknowledge the provider
//! once a request is accepted; reconciliation errors are logged, never
//! returned, because providers retry aggressively on failure responses.

pub mod mercadopago;
pub mod stripe;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Order, OrderStatus, PaymentProvider, PaymentStatus};
use crate::store::{
    CommerceStore, NewDiscountUsage, NewPayment, PaymentInsert, PaymentTransition, StoreError,
};

/// Provider status vocabulary mapped onto the transitions we act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSignal {
    Approved,
    StillPending,
    Failed,
    Refunded,
    Unrecognized(String),
}

#[derive(Debug, Clone)]
pub struct PaymentNotice {
    pub provider: PaymentProvider,
    pub provider_payment_id: String,
    pub signal: PaymentSignal,
    /// Provider-side reference resolving to exactly one order: either the
    /// order UUID or the human-readable order number.
    pub external_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub metadata: Value,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Approved side effects applied for the first time.
    Applied,
    /// This provider payment was already recorded; nothing done.
    AlreadyRecorded,
    /// The external reference resolved to no order; acknowledged anyway.
    OrderNotFound,
    /// Signal carried no actionable transition for the order's current state.
    NoChange,
    MarkedFailed,
    MarkedRefunded,
}

async fn resolve_order(
    store: &dyn CommerceStore,
    reference: &str,
) -> Result<Option<Order>, StoreError> {
    if let Ok(id) = Uuid::parse_str(reference) {
        if let Some(order) = store.order_by_id(id).await? {
            return Ok(Some(order));
        }
    }
    store.order_by_number(reference).await
}

pub async fn reconcile(
    store: &dyn CommerceStore,
    notice: PaymentNotice,
) -> Result<ReconcileOutcome, StoreError> {
    let Some(order) = resolve_order(store, &notice.external_reference).await? else {
        warn!(
            provider = %notice.provider,
            payment_id = %notice.provider_payment_id,
            reference = %notice.external_reference,
            "webhook references unknown order, acknowledged without changes"
        );
        return Ok(ReconcileOutcome::OrderNotFound);
    };

    match notice.signal {
        PaymentSignal::Approved => apply_approved(store, order, notice).await,
        PaymentSignal::StillPending => {
            debug!(order = %order.order_number, "payment still pending at provider");
            Ok(ReconcileOutcome::NoChange)
        }
        PaymentSignal::Failed => {
            if !order.payment_status.can_transition(PaymentStatus::Failed) {
                warn!(
                    order = %order.order_number,
                    payment_status = %order.payment_status,
                    "ignoring failure signal for non-pending payment"
                );
                return Ok(ReconcileOutcome::NoChange);
            }
            store
                .apply_payment_transition(
                    order.id,
                    PaymentTransition {
                        payment_status: PaymentStatus::Failed,
                        order_status: None,
                        stamp_confirmed: false,
                        changed_by: format!("webhook:{}", notice.provider),
                        note: format!(
                            "payment {} reported failed by {}",
                            notice.provider_payment_id, notice.provider
                        ),
                    },
                )
                .await?;
            info!(order = %order.order_number, "payment marked failed");
            Ok(ReconcileOutcome::MarkedFailed)
        }
        PaymentSignal::Refunded => {
            if !order.payment_status.can_transition(PaymentStatus::Refunded) {
                warn!(
                    order = %order.order_number,
                    payment_status = %order.payment_status,
                    "ignoring refund signal, not refundable from current state"
                );
                return Ok(ReconcileOutcome::NoChange);
            }
            store
                .apply_payment_transition(
                    order.id,
                    PaymentTransition {
                        payment_status: PaymentStatus::Refunded,
                        order_status: Some(OrderStatus::Refunded),
                        stamp_confirmed: false,
                        changed_by: format!("webhook:{}", notice.provider),
                        note: format!(
                            "payment {} refunded by {}",
                            notice.provider_payment_id, notice.provider
                        ),
                    },
                )
                .await?;
            info!(order = %order.order_number, "order refunded");
            Ok(ReconcileOutcome::MarkedRefunded)
        }
        PaymentSignal::Unrecognized(raw) => {
            // explicit choice: unknown provider vocabulary never mutates state
            warn!(
                provider = %notice.provider,
                status = %raw,
                order = %order.order_number,
                "unrecognized provider payment status, ignored"
            );
            Ok(ReconcileOutcome::NoChange)
        }
    }
}

async fn apply_approved(
    store: &dyn CommerceStore,
    order: Order,
    notice: PaymentNotice,
) -> Result<ReconcileOutcome, StoreError> {
    if store
        .payment_by_provider_id(notice.provider, &notice.provider_payment_id)
        .await?
        .is_some()
    {
        debug!(
            payment_id = %notice.provider_payment_id,
            order = %order.order_number,
            "duplicate approval delivery, already recorded"
        );
        return Ok(ReconcileOutcome::AlreadyRecorded);
    }
    if !order.payment_status.can_transition(PaymentStatus::Paid) {
        warn!(
            order = %order.order_number,
            payment_status = %order.payment_status,
            "approval signal for order not awaiting payment, ignored"
        );
        return Ok(ReconcileOutcome::NoChange);
    }

    match store
        .insert_payment(NewPayment {
            order_id: order.id,
            provider: notice.provider,
            provider_payment_id: notice.provider_payment_id.clone(),
            amount: notice.amount,
            currency: notice.currency.clone(),
            status: "approved".into(),
            metadata: notice.metadata.clone(),
        })
        .await?
    {
        // a concurrent delivery won the insert race
        PaymentInsert::Duplicate => return Ok(ReconcileOutcome::AlreadyRecorded),
        PaymentInsert::Created(_) => {}
    }

    let committed = store.commit_stock(order.id).await?;
    if !committed {
        debug!(order = %order.order_number, "stock already committed for order");
    }

    if let Some(discount_id) = order.discount_id {
        let redeemed = store
            .redeem_discount(NewDiscountUsage {
                discount_id,
                order_id: order.id,
                user_id: order.user_id,
                amount_saved: order.discount_total,
            })
            .await?;
        if !redeemed {
            debug!(order = %order.order_number, "discount already redeemed for order");
        }
    }

    store
        .apply_payment_transition(
            order.id,
            PaymentTransition {
                payment_status: PaymentStatus::Paid,
                order_status: Some(OrderStatus::Processing),
                stamp_confirmed: true,
                changed_by: format!("webhook:{}", notice.provider),
                note: format!(
                    "payment {} confirmed by {}",
                    notice.provider_payment_id, notice.provider
                ),
            },
        )
        .await?;

    info!(
        order = %order.order_number,
        payment_id = %notice.provider_payment_id,
        provider = %notice.provider,
        "payment confirmed"
    );
    Ok(ReconcileOutcome::Applied)
}

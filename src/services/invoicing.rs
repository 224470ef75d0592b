use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::AuthContext;
use crate::db::{transact_with_retry, DbPool};
use crate::entities::{
    customer::Entity as Customer,
    invoice::{self, Entity as Invoice, InvoiceStatus},
    invoice_item,
    payment::{self, Entity as Payment, PaymentStatus},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Invoice number prefix fixed by the deployment's fiscal numbering.
const NUMBER_PREFIX: &str = "FAC-";

/// One invoice line as supplied by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub variant_id: Option<i64>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub customer_id: i64,
    pub sales_order_id: Option<i64>,
    pub items: Vec<InvoiceLine>,
    /// Fiscal snapshot overrides; the customer row fills the gaps.
    pub tax_id: Option<String>,
    pub legal_name: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordPayment {
    pub customer_id: i64,
    pub invoice_id: Option<i64>,
    pub sales_order_id: Option<i64>,
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub method: String,
    pub receipt: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// CONFIRMED unless the caller says otherwise.
    pub status: Option<PaymentStatus>,
}

/// Header amounts derived from the lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Rounds money half-away-from-zero to 2 decimals.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Line subtotal: qty * unit price - discount.
pub fn line_subtotal(line: &InvoiceLine) -> Decimal {
    round_money(line.quantity * line.unit_price - line.discount)
}

/// Header totals. The subtotal already nets line discounts, so the header
/// discount column is informational: total = subtotal + tax, no second
/// subtraction. This mirrors the historical billing behavior and must not be
/// "fixed" silently.
pub fn compute_totals(items: &[InvoiceLine], tax_rate: Decimal) -> InvoiceTotals {
    let subtotal = round_money(items.iter().map(line_subtotal).sum());
    let discount = round_money(items.iter().map(|l| l.discount).sum());
    let tax = round_money(subtotal * tax_rate);
    let total = round_money(subtotal + tax);
    InvoiceTotals {
        subtotal,
        discount,
        tax,
        total,
    }
}

fn parse_number_seq(number: &str) -> Option<u32> {
    number.strip_prefix(NUMBER_PREFIX)?.parse().ok()
}

fn format_number(seq: u32) -> String {
    format!("{}{:06}", NUMBER_PREFIX, seq)
}

/// Allocates the next invoice number under an exclusive lock on the current
/// maximum; the unique index on `number` backstops any race.
pub(crate) async fn next_invoice_number<C: ConnectionTrait>(
    conn: &C,
) -> Result<String, ServiceError> {
    let last = Invoice::find()
        .order_by_desc(invoice::Column::Number)
        .lock_exclusive()
        .one(conn)
        .await?;

    let next_seq = match last {
        Some(inv) => parse_number_seq(&inv.number).ok_or_else(|| {
            ServiceError::Internal(format!("malformed invoice number '{}'", inv.number))
        })? + 1,
        None => 1,
    };
    Ok(format_number(next_seq))
}

fn validate_lines(items: &[InvoiceLine]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::InvalidInput("invoice has no items".into()));
    }
    for line in items {
        if line.quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "invoice line '{}' must have a positive quantity",
                line.description
            )));
        }
        if line.unit_price < Decimal::ZERO || line.discount < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "invoice line '{}' must not carry negative amounts",
                line.description
            )));
        }
    }
    Ok(())
}

/// Issues an invoice inside the caller's transaction. Used directly by the
/// sales workflow so the order transition, the invoice and the payment land
/// atomically.
pub(crate) async fn issue_invoice_in_txn<C: ConnectionTrait>(
    conn: &C,
    command: &IssueInvoice,
    tax_rate: Decimal,
) -> Result<invoice::Model, ServiceError> {
    validate_lines(&command.items)?;

    let cust = Customer::find_by_id(command.customer_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("customer {} not found", command.customer_id))
        })?;

    let totals = compute_totals(&command.items, tax_rate);
    let number = next_invoice_number(conn).await?;
    let now = Utc::now();

    let header = invoice::ActiveModel {
        number: Set(number),
        sales_order_id: Set(command.sales_order_id),
        customer_id: Set(cust.id),
        tax_id: Set(command.tax_id.clone().or(cust.tax_id)),
        legal_name: Set(command.legal_name.clone().or(Some(cust.name))),
        issued_at: Set(now),
        due_at: Set(command.due_at),
        subtotal: Set(totals.subtotal),
        discount: Set(totals.discount),
        tax: Set(totals.tax),
        total: Set(totals.total),
        status: Set(InvoiceStatus::Issued.to_string()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|e| {
        if e.to_string().to_ascii_lowercase().contains("unique") {
            ServiceError::Conflict("invoice number already allocated".into())
        } else {
            ServiceError::DatabaseError(e)
        }
    })?;

    for line in &command.items {
        invoice_item::ActiveModel {
            invoice_id: Set(header.id),
            variant_id: Set(line.variant_id),
            description: Set(line.description.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            discount: Set(line.discount),
            subtotal: Set(line_subtotal(line)),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }

    Ok(header)
}

/// Appends a payment row inside the caller's transaction.
pub(crate) async fn record_payment_in_txn<C: ConnectionTrait>(
    conn: &C,
    command: &RecordPayment,
    actor_id: i64,
) -> Result<payment::Model, ServiceError> {
    if command.amount <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "payment amount must be positive".into(),
        ));
    }
    Customer::find_by_id(command.customer_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("customer {} not found", command.customer_id))
        })?;
    if let Some(invoice_id) = command.invoice_id {
        Invoice::find_by_id(invoice_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("invoice {} not found", invoice_id)))?;
    }

    let now = Utc::now();
    let model = payment::ActiveModel {
        customer_id: Set(command.customer_id),
        invoice_id: Set(command.invoice_id),
        sales_order_id: Set(command.sales_order_id),
        amount: Set(round_money(command.amount)),
        method: Set(command.method.clone()),
        receipt: Set(command.receipt.clone()),
        paid_at: Set(command.paid_at.unwrap_or(now)),
        status: Set(command.status.unwrap_or(PaymentStatus::Confirmed).to_string()),
        actor_id: Set(actor_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// Invoice issuing and payment posting. The only emitter of invoice numbers.
#[derive(Clone)]
pub struct InvoicingService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
}

impl InvoicingService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, tax_rate: Decimal) -> Self {
        Self {
            db,
            event_sender,
            tax_rate,
        }
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// Issues a standalone invoice in its own transaction.
    #[instrument(skip(self, command, actor), fields(customer_id = command.customer_id, actor_id = actor.user_id))]
    pub async fn issue_invoice(
        &self,
        command: IssueInvoice,
        actor: &AuthContext,
    ) -> Result<invoice::Model, ServiceError> {
        let tax_rate = self.tax_rate;
        let issued = transact_with_retry(&self.db, move |txn| {
            let command = command.clone();
            Box::pin(async move { issue_invoice_in_txn(txn, &command, tax_rate).await })
        })
        .await?;

        info!(invoice_id = issued.id, number = %issued.number, "invoice issued");
        if let Err(e) = self
            .event_sender
            .send(Event::InvoiceIssued {
                invoice_id: issued.id,
                number: issued.number.clone(),
            })
            .await
        {
            warn!(error = %e, "failed to send invoice event");
        }
        Ok(issued)
    }

    /// Records a payment in its own transaction. Never mutates the invoice.
    #[instrument(skip(self, command, actor), fields(customer_id = command.customer_id, actor_id = actor.user_id))]
    pub async fn record_payment(
        &self,
        command: RecordPayment,
        actor: &AuthContext,
    ) -> Result<payment::Model, ServiceError> {
        command.validate()?;
        let actor_id = actor.user_id;
        let recorded = transact_with_retry(&self.db, move |txn| {
            let command = command.clone();
            Box::pin(async move { record_payment_in_txn(txn, &command, actor_id).await })
        })
        .await?;

        info!(payment_id = recorded.id, "payment recorded");
        if let Err(e) = self
            .event_sender
            .send(Event::PaymentRecorded {
                payment_id: recorded.id,
                invoice_id: recorded.invoice_id,
            })
            .await
        {
            warn!(error = %e, "failed to send payment event");
        }
        Ok(recorded)
    }

    /// Sum of CONFIRMED payments against an invoice.
    #[instrument(skip(self))]
    pub async fn total_paid(&self, invoice_id: i64) -> Result<Decimal, ServiceError> {
        let payments = Payment::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Confirmed.to_string()))
            .all(&*self.db)
            .await?;
        Ok(payments.iter().map(|p| p.amount).sum())
    }

    /// Flips an ISSUED invoice to VOID. The only mutation an invoice admits.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn void_invoice(
        &self,
        invoice_id: i64,
        actor: &AuthContext,
    ) -> Result<invoice::Model, ServiceError> {
        transact_with_retry(&self.db, move |txn| {
            Box::pin(async move {
                let inv = Invoice::find_by_id(invoice_id)
                    .lock_exclusive()
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("invoice {} not found", invoice_id))
                    })?;
                if InvoiceStatus::from_db(&inv.status)? == InvoiceStatus::Void {
                    return Err(ServiceError::InvalidState(format!(
                        "invoice {} is already void",
                        inv.number
                    )));
                }
                let mut active: invoice::ActiveModel = inv.into();
                active.status = Set(InvoiceStatus::Void.to_string());
                Ok(active.update(txn).await?)
            })
        })
        .await
    }

    pub async fn get_invoice(&self, invoice_id: i64) -> Result<Option<invoice::Model>, ServiceError> {
        Ok(Invoice::find_by_id(invoice_id).one(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line(qty: Decimal, price: Decimal, discount: Decimal) -> InvoiceLine {
        InvoiceLine {
            variant_id: None,
            description: "line".into(),
            quantity: qty,
            unit_price: price,
            discount,
        }
    }

    #[test]
    fn totals_for_cod_scenario() {
        // 2 @ 10.00 + 1 @ 5.00 at 13% IVA
        let totals = compute_totals(
            &[line(dec!(2), dec!(10.00), dec!(0)), line(dec!(1), dec!(5.00), dec!(0))],
            dec!(0.13),
        );
        assert_eq!(totals.subtotal, dec!(25.00));
        assert_eq!(totals.tax, dec!(3.25));
        assert_eq!(totals.total, dec!(28.25));
    }

    #[test]
    fn discount_nets_lines_but_not_the_header_total() {
        let totals = compute_totals(&[line(dec!(1), dec!(100.00), dec!(10.00))], dec!(0.13));
        assert_eq!(totals.subtotal, dec!(90.00));
        assert_eq!(totals.discount, dec!(10.00));
        assert_eq!(totals.tax, dec!(11.70));
        // subtotal + tax, discount not subtracted a second time
        assert_eq!(totals.total, dec!(101.70));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_money(dec!(2.674999)), dec!(2.67));
    }

    #[test]
    fn number_formatting_round_trips() {
        assert_eq!(format_number(1), "FAC-000001");
        assert_eq!(format_number(123456), "FAC-123456");
        assert_eq!(parse_number_seq("FAC-000042"), Some(42));
        assert_eq!(parse_number_seq("INV-000042"), None);
        assert_eq!(parse_number_seq("FAC-xyz"), None);
    }

    proptest! {
        #[test]
        fn invoice_totals_follow_source_convention(
            lines in proptest::collection::vec(
                (1u32..100, 0u32..500_00, 0u32..50_00),
                1..12,
            )
        ) {
            let items: Vec<InvoiceLine> = lines
                .into_iter()
                .map(|(qty, price_cents, discount_cents)| line(
                    Decimal::from(qty),
                    Decimal::from(price_cents) / dec!(100),
                    Decimal::from(discount_cents) / dec!(100),
                ))
                .collect();
            let totals = compute_totals(&items, dec!(0.13));

            let expected_subtotal: Decimal =
                round_money(items.iter().map(line_subtotal).sum());
            prop_assert_eq!(totals.subtotal, expected_subtotal);
            prop_assert_eq!(totals.tax, round_money(totals.subtotal * dec!(0.13)));
            prop_assert_eq!(totals.total, round_money(totals.subtotal + totals.tax));
        }
    }
}

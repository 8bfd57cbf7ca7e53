//! Customer ledger: payment history, outstanding balance and available credit.
//!
//! `customers.outstanding_balance` is the balance of record. It only moves
//! through single-document atomic writes, so concurrent payments cannot lose
//! updates. The sum over open invoices is a projection used for reporting and
//! explicit reconciliation.

use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection,
};
use serde::Serialize;
use service_core::error::AppError;

use crate::models::{
    available_credit, checked_money, round_money, Customer, Invoice, PaymentRecord, PaymentStatus,
    MAX_MONEY,
};
use crate::services::MongoDb;

/// Ledger balance next to the invoice-derived projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub customer_id: String,
    pub outstanding_balance: f64,
    pub invoice_outstanding: f64,
    pub discrepancy: f64,
    pub credit_limit: f64,
    pub available_credit: f64,
    pub open_invoices: u64,
}

#[derive(Clone)]
pub struct CustomerLedger {
    customers: Collection<Customer>,
    invoices: Collection<Invoice>,
}

impl CustomerLedger {
    pub fn new(db: &MongoDb) -> Self {
        Self {
            customers: db.customers(),
            invoices: db.invoices(),
        }
    }

    /// Append `payment` and lower the balance by its amount, clamped at zero.
    pub async fn record_payment(
        &self,
        customer_id: &str,
        payment: &PaymentRecord,
    ) -> Result<Customer, AppError> {
        let update = payment_update(payment)?;
        self.customers
            .find_one_and_update(doc! { "_id": customer_id }, update, return_after())
            .await?
            .ok_or_else(|| AppError::not_found("Customer not found"))
    }

    /// Append a history entry without touching the balance.
    pub async fn append_history(
        &self,
        customer_id: &str,
        payment: &PaymentRecord,
    ) -> Result<(), AppError> {
        let entry = bson::to_bson(payment)?;
        self.customers
            .update_one(
                doc! { "_id": customer_id },
                doc! {
                    "$push": { "payments": entry },
                    "$inc": { "version": 1_i64 },
                },
                None,
            )
            .await?;
        Ok(())
    }

    /// Raise the balance by `amount` (the unpaid part of a new invoice).
    pub async fn charge(&self, customer_id: &str, amount: f64) -> Result<(), AppError> {
        if amount <= 0.0 {
            return Ok(());
        }

        let update = vec![doc! {
            "$set": {
                "outstanding_balance": clamped_balance(amount),
                "version": next_version(),
                "updated_at": bson::DateTime::from_chrono(Utc::now()),
            }
        }];

        let result = self
            .customers
            .update_one(doc! { "_id": customer_id }, update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::not_found("Customer not found"));
        }
        Ok(())
    }

    pub async fn balance(&self, customer: &Customer) -> Result<BalanceSummary, AppError> {
        let open = self.open_invoices(&customer.id).await?;
        let projected = invoice_outstanding(&open);

        Ok(BalanceSummary {
            customer_id: customer.id.clone(),
            outstanding_balance: customer.outstanding_balance,
            invoice_outstanding: projected,
            discrepancy: round_money(customer.outstanding_balance - projected),
            credit_limit: customer.credit_limit,
            available_credit: customer.available_credit(),
            open_invoices: open.len() as u64,
        })
    }

    /// Overwrite the ledger balance with the invoice projection.
    pub async fn reconcile(&self, customer: &Customer) -> Result<BalanceSummary, AppError> {
        let open = self.open_invoices(&customer.id).await?;
        let projected = invoice_outstanding(&open);

        let result = self
            .customers
            .update_one(
                doc! { "_id": &customer.id, "version": customer.version },
                doc! {
                    "$set": {
                        "outstanding_balance": projected,
                        "updated_at": bson::DateTime::from_chrono(Utc::now()),
                    },
                    "$inc": { "version": 1_i64 },
                },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::conflict(
                "Customer was modified concurrently, retry the reconciliation",
            ));
        }

        tracing::info!(
            customer_id = %customer.id,
            previous = customer.outstanding_balance,
            reconciled = projected,
            "Reconciled customer balance"
        );

        Ok(BalanceSummary {
            customer_id: customer.id.clone(),
            outstanding_balance: projected,
            invoice_outstanding: projected,
            discrepancy: 0.0,
            credit_limit: customer.credit_limit,
            available_credit: available_credit(customer.credit_limit, projected),
            open_invoices: open.len() as u64,
        })
    }

    pub async fn update_credit_limit(
        &self,
        customer_id: &str,
        credit_limit: f64,
    ) -> Result<Customer, AppError> {
        let credit_limit = checked_money(credit_limit).ok_or_else(|| {
            AppError::bad_request(format!("Credit limit must be between 0 and {}", MAX_MONEY))
        })?;

        self.customers
            .find_one_and_update(
                doc! { "_id": customer_id },
                doc! {
                    "$set": {
                        "credit_limit": credit_limit,
                        "updated_at": bson::DateTime::from_chrono(Utc::now()),
                    },
                    "$inc": { "version": 1_i64 },
                },
                return_after(),
            )
            .await?
            .ok_or_else(|| AppError::not_found("Customer not found"))
    }

    async fn open_invoices(&self, customer_id: &str) -> Result<Vec<Invoice>, AppError> {
        let filter = doc! {
            "customer_id": customer_id,
            "payment_status": { "$in": [PaymentStatus::Pending.as_str(), PaymentStatus::Partial.as_str()] },
        };
        let cursor = self.invoices.find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }
}

/// Sum of `final_total - paid_amount` over pending and partial invoices.
pub fn invoice_outstanding(invoices: &[Invoice]) -> f64 {
    round_money(
        invoices
            .iter()
            .filter(|i| i.payment_status != PaymentStatus::Paid)
            .map(Invoice::unpaid)
            .sum(),
    )
}

/// Pipeline update that appends `payment` and applies it to the balance.
fn payment_update(payment: &PaymentRecord) -> Result<Vec<Document>, AppError> {
    let entry = bson::to_document(payment)?;
    Ok(vec![doc! {
        "$set": {
            "outstanding_balance": clamped_balance(-payment.amount),
            "payments": {
                "$concatArrays": [
                    { "$ifNull": ["$payments", []] },
                    { "$literal": [entry] },
                ]
            },
            "version": next_version(),
            "updated_at": bson::DateTime::from_chrono(Utc::now()),
        }
    }])
}

/// Aggregation expression for `max(0, round(outstanding_balance + delta, 2))`.
fn clamped_balance(delta: f64) -> Document {
    doc! {
        "$max": [
            0.0,
            { "$round": [{ "$add": [{ "$ifNull": ["$outstanding_balance", 0.0] }, Bson::Double(delta)] }, 2] },
        ]
    }
}

fn next_version() -> Document {
    doc! { "$add": [{ "$ifNull": ["$version", 0_i64] }, 1_i64] }
}

fn return_after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

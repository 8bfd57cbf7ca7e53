//! Invoice creation with stock movements, and invoice payments.

use chrono::Utc;
use mongodb::{
    bson::{self, doc, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection,
};
use service_core::error::{is_duplicate_key, AppError};

use crate::models::{
    Customer, Invoice, InvoiceItem, PaymentMethod, PaymentRecord, PaymentStatus,
    Product,
};
use crate::services::{metrics, CustomerLedger, MongoDb};

/// One requested invoice line before pricing.
#[derive(Debug, Clone)]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
    pub discount: f64,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub lines: Vec<LineRequest>,
    pub payment_method: PaymentMethod,
    pub paid_amount: f64,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct InvoiceService {
    products: Collection<Product>,
    invoices: Collection<Invoice>,
    ledger: CustomerLedger,
}

impl InvoiceService {
    pub fn new(db: &MongoDb) -> Self {
        Self {
            products: db.products(),
            invoices: db.invoices(),
            ledger: CustomerLedger::new(db),
        }
    }

    /// Price the lines, take the stock, store the invoice and charge the
    /// unpaid part to the customer. Stock already taken is returned if a
    /// later step fails.
    pub async fn create(
        &self,
        customer: &Customer,
        request: NewInvoice,
        created_by: &str,
    ) -> Result<Invoice, AppError> {
        if !customer.is_active {
            return Err(AppError::bad_request("Cannot invoice an inactive customer"));
        }
        if request.lines.is_empty() {
            return Err(AppError::bad_request("An invoice needs at least one item"));
        }

        let mut items = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = self
                .products
                .find_one(doc! { "_id": &line.product_id }, None)
                .await?
                .ok_or_else(|| {
                    AppError::bad_request(format!("Product {} not found", line.product_id))
                })?;
            if !product.is_active {
                return Err(AppError::bad_request(format!(
                    "Product '{}' is not available for sale",
                    product.name
                )));
            }
            items.push(InvoiceItem::priced(
                product.id,
                product.name,
                product.hsn_code,
                line.quantity,
                product.price,
                line.discount,
                product.tax_rate,
            )?);
        }

        let invoice = Invoice::new(
            customer,
            items,
            request.payment_method,
            request.paid_amount,
            request.notes,
            created_by.to_string(),
        )?;

        let mut taken: Vec<(&str, i64)> = Vec::with_capacity(invoice.items.len());
        for item in &invoice.items {
            match self.take_stock(&item.product_id, item.quantity).await {
                Ok(true) => taken.push((&item.product_id, item.quantity)),
                Ok(false) => {
                    self.return_stock(&taken).await;
                    return Err(AppError::bad_request(format!(
                        "Insufficient stock for '{}'",
                        item.product_name
                    )));
                }
                Err(e) => {
                    self.return_stock(&taken).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.invoices.insert_one(&invoice, None).await {
            self.return_stock(&taken).await;
            if is_duplicate_key(&e) {
                return Err(AppError::conflict("Invoice number collision, retry the request"));
            }
            return Err(e.into());
        }

        // The invoice is stored at this point; a failed charge is repaired by reconciliation.
        if let Err(e) = self.ledger.charge(&customer.id, invoice.unpaid()).await {
            tracing::error!(
                invoice_id = %invoice.id,
                customer_id = %customer.id,
                error = %e,
                "Failed to charge invoice to customer ledger"
            );
        }

        if invoice.paid_amount > 0.0 {
            let payment = PaymentRecord::new(
                invoice.paid_amount,
                invoice.payment_method,
                Some(invoice.created_at),
                Some(invoice.invoice_number.clone()),
                Some("Paid at invoicing".to_string()),
                created_by.to_string(),
            )?;
            // History entry only; the charge above was already net of this payment.
            if let Err(e) = self.ledger.append_history(&customer.id, &payment).await {
                tracing::warn!(
                    customer_id = %customer.id,
                    error = %e,
                    "Failed to append payment history"
                );
            }
        }

        metrics::record_invoice_created(invoice.final_total);
        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            customer_id = %customer.id,
            final_total = invoice.final_total,
            status = invoice.payment_status.as_str(),
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Add `amount` to the invoice's paid amount without exceeding its final
    /// total, then lower the customer's balance by the same amount.
    pub async fn record_payment(
        &self,
        invoice: &Invoice,
        amount: f64,
        method: PaymentMethod,
        recorded_by: &str,
    ) -> Result<Invoice, AppError> {
        let payment = PaymentRecord::new(
            amount,
            method,
            None,
            Some(invoice.invoice_number.clone()),
            None,
            recorded_by.to_string(),
        )?;
        let amount = payment.amount;

        let filter = doc! {
            "_id": &invoice.id,
            "$expr": {
                "$lte": [
                    { "$round": [{ "$add": ["$paid_amount", amount] }, 2] },
                    "$final_total",
                ]
            },
        };
        let update = vec![
            doc! {
                "$set": {
                    "paid_amount": { "$round": [{ "$add": ["$paid_amount", amount] }, 2] },
                    "version": { "$add": [{ "$ifNull": ["$version", 0_i64] }, 1_i64] },
                    "updated_at": bson::DateTime::from_chrono(Utc::now()),
                }
            },
            doc! { "$set": { "payment_status": status_expression() } },
        ];

        let updated = self
            .invoices
            .find_one_and_update(
                filter,
                update,
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?;

        let updated = match updated {
            Some(invoice) => invoice,
            None => {
                let current = self
                    .invoices
                    .find_one(doc! { "_id": &invoice.id }, None)
                    .await?
                    .ok_or_else(|| AppError::not_found("Invoice not found"))?;
                return Err(AppError::bad_request(format!(
                    "Payment of {:.2} exceeds the remaining {:.2}",
                    amount,
                    current.unpaid()
                )));
            }
        };

        if let Err(e) = self.ledger.record_payment(&updated.customer_id, &payment).await {
            tracing::error!(
                invoice_id = %updated.id,
                customer_id = %updated.customer_id,
                error = %e,
                "Invoice payment stored but customer ledger update failed"
            );
        }

        metrics::record_payment("invoice", method.as_str(), amount);
        tracing::info!(
            invoice_id = %updated.id,
            amount = amount,
            paid_amount = updated.paid_amount,
            status = updated.payment_status.as_str(),
            "Invoice payment recorded"
        );

        Ok(updated)
    }

    /// Conditional decrement. `false` when the product lacks the stock.
    async fn take_stock(&self, product_id: &str, quantity: i64) -> Result<bool, AppError> {
        let result = self
            .products
            .update_one(
                doc! { "_id": product_id, "stock": { "$gte": quantity } },
                stock_delta(-quantity),
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn return_stock(&self, taken: &[(&str, i64)]) {
        for (product_id, quantity) in taken {
            if let Err(e) = self
                .products
                .update_one(doc! { "_id": *product_id }, stock_delta(*quantity), None)
                .await
            {
                tracing::error!(
                    product_id = %product_id,
                    quantity = quantity,
                    error = %e,
                    "Failed to return stock after aborted invoice"
                );
            }
        }
    }
}

fn stock_delta(delta: i64) -> Document {
    doc! {
        "$inc": { "stock": delta, "version": 1_i64 },
        "$set": { "updated_at": bson::DateTime::from_chrono(Utc::now()) },
    }
}

/// `pending` at zero, `paid` at or above the final total, `partial` between.
fn status_expression() -> Document {
    doc! {
        "$switch": {
            "branches": [
                { "case": { "$lte": ["$paid_amount", 0.0] }, "then": PaymentStatus::Pending.as_str() },
                { "case": { "$gte": ["$paid_amount", "$final_total"] }, "then": PaymentStatus::Paid.as_str() },
            ],
            "default": PaymentStatus::Partial.as_str(),
        }
    }
}

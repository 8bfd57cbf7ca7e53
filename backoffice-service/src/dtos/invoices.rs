use serde::{Deserialize, Serialize};
use service_core::query::{Field, FieldKind, QuerySchema};
use validator::Validate;

use crate::models::{CustomerSnapshot, Invoice, InvoiceItem, PaymentMethod, PaymentStatus};
use crate::services::{LineRequest, NewInvoice};

const INVOICE_FIELDS: &[Field] = &[
    Field::new("id", FieldKind::Text),
    Field::new("invoice_number", FieldKind::Text),
    Field::new("customer_id", FieldKind::Text),
    Field::new("customer", FieldKind::Embedded),
    Field::new("items", FieldKind::Embedded),
    Field::new("subtotal", FieldKind::Number),
    Field::new("tax_amount", FieldKind::Number),
    Field::new("total", FieldKind::Number),
    Field::new("final_total", FieldKind::Number),
    Field::new("round_off", FieldKind::Number),
    Field::new("payment_status", FieldKind::Text),
    Field::new("payment_method", FieldKind::Text),
    Field::new("paid_amount", FieldKind::Number),
    Field::new("created_by", FieldKind::Text),
    Field::new("created_at", FieldKind::DateTime),
    Field::new("updated_at", FieldKind::DateTime),
];

pub const INVOICE_QUERY: QuerySchema = QuerySchema::new(INVOICE_FIELDS);

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct InvoiceLineRequest {
    #[validate(length(min = 1, message = "Product is required"))]
    pub product_id: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i64,
    #[validate(range(min = 0.0, message = "Discount cannot be negative"))]
    #[serde(default)]
    pub discount: f64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, message = "Customer is required"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "At least one item is required"))]
    #[validate(nested)]
    pub items: Vec<InvoiceLineRequest>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    #[validate(range(min = 0.0, message = "Paid amount cannot be negative"))]
    #[serde(default)]
    pub paid_amount: f64,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Cash
}

impl CreateInvoiceRequest {
    pub fn into_parts(self) -> (String, NewInvoice) {
        let lines = self
            .items
            .into_iter()
            .map(|line| LineRequest {
                product_id: line.product_id,
                quantity: line.quantity,
                discount: line.discount,
            })
            .collect();

        (
            self.customer_id,
            NewInvoice {
                lines,
                payment_method: self.payment_method,
                paid_amount: self.paid_amount,
                notes: self.notes,
            },
        )
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InvoicePaymentRequest {
    #[validate(range(exclusive_min = 0.0, message = "Amount must be greater than zero"))]
    pub amount: f64,
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct InvoiceView {
    pub id: String,
    pub invoice_number: String,
    pub customer_id: String,
    pub customer: CustomerSnapshot,
    pub items: Vec<InvoiceItem>,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub final_total: f64,
    pub round_off: f64,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub paid_amount: f64,
    pub balance_due: f64,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Invoice> for InvoiceView {
    fn from(invoice: Invoice) -> Self {
        let balance_due = invoice.unpaid();
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            customer_id: invoice.customer_id,
            customer: invoice.customer,
            items: invoice.items,
            subtotal: invoice.subtotal,
            tax_amount: invoice.tax_amount,
            total: invoice.total,
            final_total: invoice.final_total,
            round_off: invoice.round_off,
            payment_status: invoice.payment_status,
            payment_method: invoice.payment_method,
            paid_amount: invoice.paid_amount,
            balance_due,
            notes: invoice.notes,
            created_by: invoice.created_by,
            created_at: invoice.created_at.to_rfc3339(),
            updated_at: invoice.updated_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_item_list_fails_validation() {
        let req: CreateInvoiceRequest = serde_json::from_value(serde_json::json!({
            "customer_id": "c-1",
            "items": []
        }))
        .expect("deserializes");
        assert!(req.validate().is_err());
    }

    #[test]
    fn zero_quantity_line_fails_nested_validation() {
        let req: CreateInvoiceRequest = serde_json::from_value(serde_json::json!({
            "customer_id": "c-1",
            "items": [{ "product_id": "p-1", "quantity": 0 }]
        }))
        .expect("deserializes");
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_splits_into_customer_and_lines() {
        let req: CreateInvoiceRequest = serde_json::from_value(serde_json::json!({
            "customer_id": "c-1",
            "items": [{ "product_id": "p-1", "quantity": 2, "discount": 10.0 }],
            "payment_method": "upi",
            "paid_amount": 100.0
        }))
        .expect("deserializes");
        assert!(req.validate().is_ok());

        let (customer_id, invoice) = req.into_parts();
        assert_eq!(customer_id, "c-1");
        assert_eq!(invoice.lines.len(), 1);
        assert_eq!(invoice.lines[0].discount, 10.0);
        assert_eq!(invoice.payment_method, PaymentMethod::Upi);
    }
}

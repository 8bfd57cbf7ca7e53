use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use super::{checked_money, round_money, Address, Customer, PaymentMethod};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Status implied by how much of `final_total` has been paid.
    pub fn derive(paid_amount: f64, final_total: f64) -> Self {
        if paid_amount <= 0.0 {
            PaymentStatus::Pending
        } else if paid_amount >= final_total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

/// Customer details frozen at invoice time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerSnapshot {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gstin: Option<String>,
}

impl From<&Customer> for CustomerSnapshot {
    fn from(customer: &Customer) -> Self {
        Self {
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            email: customer.email.clone(),
            address: customer.address.clone(),
            gstin: customer.gstin.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub product_id: String,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsn_code: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    /// Absolute amount off the line, not a percentage.
    pub discount: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub line_total: f64,
}

impl InvoiceItem {
    /// Price a line. The totals are fixed here and never recomputed.
    pub fn priced(
        product_id: String,
        product_name: String,
        hsn_code: Option<String>,
        quantity: i64,
        unit_price: f64,
        discount: f64,
        tax_rate: f64,
    ) -> Result<Self, AppError> {
        if quantity <= 0 {
            return Err(AppError::bad_request(format!(
                "Quantity for '{}' must be greater than zero",
                product_name
            )));
        }
        let Some(discount) = checked_money(discount) else {
            return Err(AppError::bad_request(format!(
                "Discount for '{}' must be a non-negative amount",
                product_name
            )));
        };
        if checked_money(unit_price).is_none() {
            return Err(AppError::bad_request(format!(
                "Price of '{}' is out of range",
                product_name
            )));
        }

        let gross = unit_price * quantity as f64 - discount;
        let line_total = checked_money(gross.max(0.0));
        let tax_amount = line_total.and_then(|total| checked_money(total * tax_rate / 100.0));
        let (Some(line_total), Some(tax_amount)) = (line_total, tax_amount) else {
            return Err(AppError::bad_request(format!(
                "Line total for '{}' is out of range",
                product_name
            )));
        };

        Ok(Self {
            product_id,
            product_name,
            hsn_code,
            quantity,
            unit_price,
            discount,
            tax_rate,
            tax_amount,
            line_total,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub final_total: f64,
    pub round_off: f64,
}

impl InvoiceTotals {
    pub fn from_items(items: &[InvoiceItem]) -> Self {
        let subtotal = round_money(items.iter().map(|i| i.line_total).sum());
        let tax_amount = round_money(items.iter().map(|i| i.tax_amount).sum());
        let total = round_money(subtotal + tax_amount);
        let final_total = total.round();

        Self {
            subtotal,
            tax_amount,
            total,
            final_total,
            round_off: round_money(final_total - total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id")]
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: String,
    #[serde(default)]
    pub version: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        customer: &Customer,
        items: Vec<InvoiceItem>,
        payment_method: PaymentMethod,
        paid_amount: f64,
        notes: Option<String>,
        created_by: String,
    ) -> Result<Self, AppError> {
        if items.is_empty() {
            return Err(AppError::bad_request("An invoice needs at least one item"));
        }

        let totals = InvoiceTotals::from_items(&items);
        let paid_amount = checked_money(paid_amount)
            .ok_or_else(|| AppError::bad_request("Paid amount must be a non-negative amount"))?;
        if paid_amount > totals.final_total {
            return Err(AppError::bad_request(format!(
                "Paid amount {:.2} exceeds invoice total {:.2}",
                paid_amount, totals.final_total
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            invoice_number: invoice_number(now),
            customer_id: customer.id.clone(),
            customer: CustomerSnapshot::from(customer),
            items,
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            total: totals.total,
            final_total: totals.final_total,
            round_off: totals.round_off,
            payment_status: PaymentStatus::derive(paid_amount, totals.final_total),
            payment_method,
            paid_amount,
            notes,
            created_by,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Amount still owed on this invoice.
    pub fn unpaid(&self) -> f64 {
        round_money((self.final_total - self.paid_amount).max(0.0))
    }
}

/// `INV-YYYYMMDD-XXXXXXXX`, the suffix taken from a random UUID.
pub fn invoice_number(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("INV-{}-{}", at.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::customer::{CustomerType, NewCustomer};

    fn item(quantity: i64, unit_price: f64, discount: f64, tax_rate: f64) -> InvoiceItem {
        InvoiceItem::priced(
            "p-1".to_string(),
            "Urea 45kg".to_string(),
            None,
            quantity,
            unit_price,
            discount,
            tax_rate,
        )
        .expect("valid line")
    }

    fn customer() -> Customer {
        Customer::new(
            NewCustomer {
                name: "Sita Devi".to_string(),
                phone: "9123456780".to_string(),
                email: None,
                address: Address::default(),
                gstin: None,
                customer_type: CustomerType::Retail,
                credit_limit: 5_000.0,
                outstanding_balance: 0.0,
                notes: None,
            },
            "staff-1".to_string(),
        )
    }

    #[test]
    fn line_total_subtracts_absolute_discount() {
        let line = item(2, 450.0, 50.0, 5.0);
        assert_eq!(line.line_total, 850.0);
        assert_eq!(line.tax_amount, 42.5);
    }

    #[test]
    fn line_total_never_goes_negative() {
        let line = item(1, 100.0, 250.0, 18.0);
        assert_eq!(line.line_total, 0.0);
        assert_eq!(line.tax_amount, 0.0);
    }

    #[test]
    fn invalid_lines_are_rejected() {
        assert!(InvoiceItem::priced("p".into(), "x".into(), None, 0, 10.0, 0.0, 5.0).is_err());
        assert!(InvoiceItem::priced("p".into(), "x".into(), None, 1, 10.0, -1.0, 5.0).is_err());
    }

    #[test]
    fn lines_that_overflow_money_are_rejected() {
        assert!(InvoiceItem::priced("p".into(), "x".into(), None, 1, 1e308, 0.0, 5.0).is_err());
        assert!(InvoiceItem::priced("p".into(), "x".into(), None, 1, 10.0, 1e308, 5.0).is_err());
        assert!(
            InvoiceItem::priced("p".into(), "x".into(), None, i64::MAX, 1e6, 0.0, 5.0).is_err()
        );
    }

    #[test]
    fn totals_round_to_whole_units() {
        let items = vec![item(2, 450.0, 50.0, 5.0), item(1, 1200.4, 0.0, 18.0)];
        let totals = InvoiceTotals::from_items(&items);

        assert_eq!(totals.subtotal, 2050.4);
        assert_eq!(totals.tax_amount, 258.57);
        assert_eq!(totals.total, 2308.97);
        assert_eq!(totals.final_total, 2309.0);
        assert_eq!(totals.round_off, 0.03);
    }

    #[test]
    fn status_follows_paid_amount() {
        assert_eq!(PaymentStatus::derive(0.0, 1000.0), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::derive(400.0, 1000.0), PaymentStatus::Partial);
        assert_eq!(PaymentStatus::derive(1000.0, 1000.0), PaymentStatus::Paid);
    }

    #[test]
    fn new_invoice_snapshots_customer_and_derives_status() {
        let customer = customer();
        let invoice = Invoice::new(
            &customer,
            vec![item(1, 1000.0, 0.0, 0.0)],
            PaymentMethod::Cash,
            400.0,
            None,
            "staff-1".to_string(),
        )
        .expect("valid invoice");

        assert_eq!(invoice.customer.name, "Sita Devi");
        assert_eq!(invoice.customer_id, customer.id);
        assert_eq!(invoice.payment_status, PaymentStatus::Partial);
        assert_eq!(invoice.unpaid(), 600.0);
    }

    #[test]
    fn overpaid_or_empty_invoices_are_rejected() {
        let customer = customer();
        assert!(Invoice::new(
            &customer,
            vec![item(1, 100.0, 0.0, 0.0)],
            PaymentMethod::Cash,
            150.0,
            None,
            "s".to_string(),
        )
        .is_err());
        assert!(Invoice::new(&customer, vec![], PaymentMethod::Cash, 0.0, None, "s".into()).is_err());
    }

    #[test]
    fn invoice_number_has_date_and_suffix() {
        let at = DateTime::parse_from_rfc3339("2024-03-09T10:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        let number = invoice_number(at);
        assert!(number.starts_with("INV-20240309-"));
        assert_eq!(number.len(), "INV-20240309-".len() + 8);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::query::{Field, FieldKind, QuerySchema};
use validator::Validate;

use crate::models::{Address, Customer, CustomerType, NewCustomer, PaymentMethod, PaymentRecord};

const CUSTOMER_FIELDS: &[Field] = &[
    Field::new("id", FieldKind::Text),
    Field::new("name", FieldKind::Text),
    Field::new("phone", FieldKind::Text),
    Field::new("email", FieldKind::Text),
    Field::new("gstin", FieldKind::Text),
    Field::new("customer_type", FieldKind::Text),
    Field::new("credit_limit", FieldKind::Number),
    Field::new("outstanding_balance", FieldKind::Number),
    Field::new("is_active", FieldKind::Bool),
    Field::new("owner_id", FieldKind::Text),
    Field::new("address", FieldKind::Embedded),
    Field::new("payments", FieldKind::Embedded),
    Field::new("notes", FieldKind::Text),
    Field::new("created_at", FieldKind::DateTime),
    Field::new("updated_at", FieldKind::DateTime),
];

pub const CUSTOMER_QUERY: QuerySchema = QuerySchema::new(CUSTOMER_FIELDS);

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(max = 200))]
    pub street: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    pub pincode: Option<String>,
}

impl From<AddressRequest> for Address {
    fn from(req: AddressRequest) -> Self {
        Self {
            street: req.street,
            city: req.city,
            state: req.state,
            pincode: req.pincode,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub phone: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(nested)]
    #[serde(default)]
    pub address: AddressRequest,
    pub gstin: Option<String>,
    #[serde(default = "default_customer_type")]
    pub customer_type: CustomerType,
    #[validate(range(min = 0.0, message = "Credit limit cannot be negative"))]
    #[serde(default)]
    pub credit_limit: f64,
    #[validate(range(min = 0.0, message = "Outstanding balance cannot be negative"))]
    #[serde(default)]
    pub outstanding_balance: f64,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

fn default_customer_type() -> CustomerType {
    CustomerType::Retail
}

impl From<CreateCustomerRequest> for NewCustomer {
    fn from(req: CreateCustomerRequest) -> Self {
        Self {
            name: req.name.trim().to_string(),
            phone: req.phone.trim().to_string(),
            email: req.email,
            address: req.address.into(),
            gstin: req.gstin,
            customer_type: req.customer_type,
            credit_limit: req.credit_limit,
            outstanding_balance: req.outstanding_balance,
            notes: req.notes,
        }
    }
}

/// Partial update. The balance moves only through payments and invoices.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(nested)]
    pub address: Option<AddressRequest>,
    pub gstin: Option<String>,
    pub customer_type: Option<CustomerType>,
    #[validate(range(min = 0.0, message = "Credit limit cannot be negative"))]
    pub credit_limit: Option<f64>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateCustomerRequest {
    pub fn merge_into(self, customer: &mut Customer) {
        if let Some(name) = self.name {
            customer.name = name.trim().to_string();
        }
        if let Some(phone) = self.phone {
            customer.phone = phone.trim().to_string();
        }
        if let Some(email) = self.email {
            customer.email = Some(email.trim().to_lowercase());
        }
        if let Some(address) = self.address {
            // Nested fields merge one level deep.
            let current = &mut customer.address;
            if address.street.is_some() {
                current.street = address.street;
            }
            if address.city.is_some() {
                current.city = address.city;
            }
            if address.state.is_some() {
                current.state = address.state;
            }
            if address.pincode.is_some() {
                current.pincode = address.pincode;
            }
        }
        if let Some(gstin) = self.gstin {
            customer.gstin = Some(gstin.trim().to_uppercase());
        }
        if let Some(customer_type) = self.customer_type {
            customer.customer_type = customer_type;
        }
        if let Some(credit_limit) = self.credit_limit {
            customer.credit_limit = credit_limit;
        }
        if let Some(notes) = self.notes {
            customer.notes = Some(notes);
        }
        if let Some(is_active) = self.is_active {
            customer.is_active = is_active;
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(range(exclusive_min = 0.0, message = "Amount must be greater than zero"))]
    pub amount: f64,
    pub method: PaymentMethod,
    pub date: Option<DateTime<Utc>>,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreditLimitRequest {
    #[validate(range(min = 0.0, message = "Credit limit cannot be negative"))]
    pub credit_limit: f64,
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub date: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
}

impl From<PaymentRecord> for PaymentView {
    fn from(payment: PaymentRecord) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            method: payment.method,
            date: payment.date.to_rfc3339(),
            reference: payment.reference,
            notes: payment.notes,
            recorded_by: payment.recorded_by,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerView {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Address,
    pub gstin: Option<String>,
    pub customer_type: CustomerType,
    pub credit_limit: f64,
    pub outstanding_balance: f64,
    pub available_credit: f64,
    pub payments: Vec<PaymentView>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Customer> for CustomerView {
    fn from(customer: Customer) -> Self {
        let available_credit = customer.available_credit();
        Self {
            id: customer.id,
            name: customer.name,
            phone: customer.phone,
            email: customer.email,
            address: customer.address,
            gstin: customer.gstin,
            customer_type: customer.customer_type,
            credit_limit: customer.credit_limit,
            outstanding_balance: customer.outstanding_balance,
            available_credit,
            payments: customer.payments.into_iter().map(PaymentView::from).collect(),
            notes: customer.notes,
            is_active: customer.is_active,
            owner_id: customer.owner_id,
            created_at: customer.created_at.to_rfc3339(),
            updated_at: customer.updated_at.to_rfc3339(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use super::{checked_money, round_money, MAX_MONEY};
use crate::utils::formats::{is_valid_gstin, is_valid_phone, is_valid_pincode};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    Retail,
    Wholesale,
    Farmer,
    Dealer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Upi,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
}

/// One entry of the append-only payment history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_by: String,
}

impl PaymentRecord {
    pub fn new(
        amount: f64,
        method: PaymentMethod,
        date: Option<DateTime<Utc>>,
        reference: Option<String>,
        notes: Option<String>,
        recorded_by: String,
    ) -> Result<Self, AppError> {
        let amount = checked_money(amount)
            .filter(|amount| *amount > 0.0)
            .ok_or_else(|| {
                AppError::bad_request(format!(
                    "Payment amount must be greater than zero and at most {}",
                    MAX_MONEY
                ))
            })?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            amount,
            method,
            date: date.unwrap_or_else(Utc::now),
            reference,
            notes,
            recorded_by,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub phone: String,
    /// Omitted when unset so the partial unique index on email ignores it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gstin: Option<String>,
    pub customer_type: CustomerType,
    pub credit_limit: f64,
    pub outstanding_balance: f64,
    #[serde(default)]
    pub payments: Vec<PaymentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub is_active: bool,
    pub owner_id: String,
    #[serde(default)]
    pub version: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when creating a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Address,
    pub gstin: Option<String>,
    pub customer_type: CustomerType,
    pub credit_limit: f64,
    pub outstanding_balance: f64,
    pub notes: Option<String>,
}

impl Customer {
    pub fn new(input: NewCustomer, owner_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            phone: input.phone,
            email: input.email.map(|e| e.trim().to_lowercase()),
            address: input.address,
            gstin: input.gstin.map(|g| g.trim().to_uppercase()),
            customer_type: input.customer_type,
            credit_limit: round_money(input.credit_limit),
            outstanding_balance: round_money(input.outstanding_balance),
            payments: Vec::new(),
            notes: input.notes,
            is_active: true,
            owner_id,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived, never persisted. Negative when the customer is over limit.
    pub fn available_credit(&self) -> f64 {
        available_credit(self.credit_limit, self.outstanding_balance)
    }

    /// Cross-field rules, checked on create and again after every merge.
    pub fn check(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("Customer name is required"));
        }
        if !is_valid_phone(&self.phone) {
            return Err(AppError::bad_request(
                "Phone must be a valid 10-digit Indian mobile number",
            ));
        }
        if let Some(pincode) = &self.address.pincode {
            if !is_valid_pincode(pincode) {
                return Err(AppError::bad_request("Pincode must be 6 digits"));
            }
        }
        if let Some(gstin) = &self.gstin {
            if !is_valid_gstin(gstin) {
                return Err(AppError::bad_request("Invalid GSTIN format"));
            }
        }
        if checked_money(self.credit_limit).is_none() {
            return Err(AppError::bad_request(format!(
                "Credit limit must be between 0 and {}",
                MAX_MONEY
            )));
        }
        if checked_money(self.outstanding_balance).is_none() {
            return Err(AppError::bad_request(format!(
                "Outstanding balance must be between 0 and {}",
                MAX_MONEY
            )));
        }
        Ok(())
    }
}

pub fn available_credit(credit_limit: f64, outstanding_balance: f64) -> f64 {
    round_money(credit_limit - outstanding_balance)
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use super::{checked_money, MAX_MONEY};

/// GST slabs a product may be taxed at, in percent.
pub const GST_SLABS: [f64; 5] = [0.0, 5.0, 12.0, 18.0, 28.0];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Seeds,
    Fertilizers,
    Pesticides,
    Herbicides,
    Fungicides,
    Tools,
    Equipment,
    Irrigation,
    AnimalFeed,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Kg,
    G,
    L,
    Ml,
    Piece,
    Packet,
    Bag,
    Box,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: ProductCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsn_code: Option<String>,
    pub unit: Unit,
    pub price: f64,
    pub cost_price: f64,
    pub mrp: f64,
    pub tax_rate: f64,
    pub stock: i64,
    pub min_stock_level: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    /// Blob key of the product image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub is_active: bool,
    pub created_by: String,
    #[serde(default)]
    pub version: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub brand: Option<String>,
    pub hsn_code: Option<String>,
    pub unit: Unit,
    pub price: f64,
    pub cost_price: f64,
    pub mrp: f64,
    pub tax_rate: f64,
    pub stock: i64,
    pub min_stock_level: i64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl Product {
    pub fn new(input: NewProduct, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            category: input.category,
            brand: input.brand,
            hsn_code: input.hsn_code,
            unit: input.unit,
            price: input.price,
            cost_price: input.cost_price,
            mrp: input.mrp,
            tax_rate: input.tax_rate,
            stock: input.stock,
            min_stock_level: input.min_stock_level,
            batch_number: input.batch_number,
            expiry_date: input.expiry_date,
            image: None,
            is_active: true,
            created_by,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cross-field rules, checked on create and again after every merge.
    pub fn check(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("Product name is required"));
        }
        if self.stock < 0 {
            return Err(AppError::bad_request("Stock cannot be negative"));
        }
        if self.min_stock_level < 0 {
            return Err(AppError::bad_request("Minimum stock level cannot be negative"));
        }
        for (label, amount) in [
            ("Price", self.price),
            ("Cost price", self.cost_price),
            ("MRP", self.mrp),
        ] {
            if checked_money(amount).is_none() {
                return Err(AppError::bad_request(format!(
                    "{} must be between 0 and {}",
                    label, MAX_MONEY
                )));
            }
        }
        if self.mrp > 0.0 && self.price > self.mrp {
            return Err(AppError::bad_request("Price cannot exceed MRP"));
        }
        if !is_gst_slab(self.tax_rate) {
            return Err(AppError::bad_request(
                "Tax rate must be one of 0, 5, 12, 18 or 28",
            ));
        }
        Ok(())
    }
}

pub fn is_gst_slab(rate: f64) -> bool {
    GST_SLABS.iter().any(|slab| (slab - rate).abs() < f64::EPSILON)
}

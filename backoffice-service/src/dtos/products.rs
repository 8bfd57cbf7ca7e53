use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use service_core::query::{Field, FieldKind, QuerySchema};
use validator::Validate;

use crate::models::{NewProduct, Product, ProductCategory, Unit};

const PRODUCT_FIELDS: &[Field] = &[
    Field::new("id", FieldKind::Text),
    Field::new("name", FieldKind::Text),
    Field::new("category", FieldKind::Text),
    Field::new("brand", FieldKind::Text),
    Field::new("hsn_code", FieldKind::Text),
    Field::new("unit", FieldKind::Text),
    Field::new("price", FieldKind::Number),
    Field::new("cost_price", FieldKind::Number),
    Field::new("mrp", FieldKind::Number),
    Field::new("tax_rate", FieldKind::Number),
    Field::new("stock", FieldKind::Number),
    Field::new("min_stock_level", FieldKind::Number),
    Field::new("batch_number", FieldKind::Text),
    Field::new("expiry_date", FieldKind::Text),
    Field::new("is_active", FieldKind::Bool),
    Field::new("created_by", FieldKind::Text),
    Field::new("created_at", FieldKind::DateTime),
    Field::new("updated_at", FieldKind::DateTime),
];

pub const PRODUCT_QUERY: QuerySchema = QuerySchema::new(PRODUCT_FIELDS);

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub category: ProductCategory,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[validate(length(min = 4, max = 8, message = "HSN code must be 4-8 characters"))]
    pub hsn_code: Option<String>,
    pub unit: Unit,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    #[validate(range(min = 0.0, message = "Cost price cannot be negative"))]
    pub cost_price: f64,
    #[validate(range(min = 0.0, message = "MRP cannot be negative"))]
    #[serde(default)]
    pub mrp: f64,
    #[serde(default)]
    pub tax_rate: f64,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    #[serde(default)]
    pub stock: i64,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub min_stock_level: i64,
    #[validate(length(max = 50))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(req: CreateProductRequest) -> Self {
        Self {
            name: req.name.trim().to_string(),
            description: req.description,
            category: req.category,
            brand: req.brand,
            hsn_code: req.hsn_code,
            unit: req.unit,
            price: req.price,
            cost_price: req.cost_price,
            mrp: req.mrp,
            tax_rate: req.tax_rate,
            stock: req.stock,
            min_stock_level: req.min_stock_level,
            batch_number: req.batch_number,
            expiry_date: req.expiry_date,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub category: Option<ProductCategory>,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[validate(length(min = 4, max = 8, message = "HSN code must be 4-8 characters"))]
    pub hsn_code: Option<String>,
    pub unit: Option<Unit>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: Option<f64>,
    #[validate(range(min = 0.0, message = "Cost price cannot be negative"))]
    pub cost_price: Option<f64>,
    #[validate(range(min = 0.0, message = "MRP cannot be negative"))]
    pub mrp: Option<f64>,
    pub tax_rate: Option<f64>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i64>,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i64>,
    #[validate(length(max = 50))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

impl UpdateProductRequest {
    pub fn merge_into(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(brand) = self.brand {
            product.brand = Some(brand);
        }
        if let Some(hsn_code) = self.hsn_code {
            product.hsn_code = Some(hsn_code);
        }
        if let Some(unit) = self.unit {
            product.unit = unit;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(cost_price) = self.cost_price {
            product.cost_price = cost_price;
        }
        if let Some(mrp) = self.mrp {
            product.mrp = mrp;
        }
        if let Some(tax_rate) = self.tax_rate {
            product.tax_rate = tax_rate;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(min_stock_level) = self.min_stock_level {
            product.min_stock_level = min_stock_level;
        }
        if let Some(batch_number) = self.batch_number {
            product.batch_number = Some(batch_number);
        }
        if let Some(expiry_date) = self.expiry_date {
            product.expiry_date = Some(expiry_date);
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: String,
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
    pub image: Option<String>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            category: product.category,
            brand: product.brand,
            hsn_code: product.hsn_code,
            unit: product.unit,
            price: product.price,
            cost_price: product.cost_price,
            mrp: product.mrp,
            tax_rate: product.tax_rate,
            stock: product.stock,
            min_stock_level: product.min_stock_level,
            batch_number: product.batch_number,
            expiry_date: product.expiry_date,
            image: product.image,
            is_active: product.is_active,
            created_by: product.created_by,
            created_at: product.created_at.to_rfc3339(),
            updated_at: product.updated_at.to_rfc3339(),
        }
    }
}

//! Grouped statistics computed server-side with `$group` pipelines.

use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    options::FindOptions,
    Collection,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::{round_money, Product};
use crate::services::MongoDb;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    #[serde(rename(deserialize = "_id"))]
    pub category: String,
    pub count: i64,
    pub total_stock: i64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub inventory_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerTypeStats {
    #[serde(rename(deserialize = "_id"))]
    pub customer_type: String,
    pub count: i64,
    pub total_outstanding: f64,
    pub total_credit_limit: f64,
    pub avg_outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleStats {
    #[serde(rename(deserialize = "_id"))]
    pub role: String,
    pub count: i64,
    pub active: i64,
}

#[derive(Clone)]
pub struct StatsService {
    db: MongoDb,
}

impl StatsService {
    pub fn new(db: &MongoDb) -> Self {
        Self { db: db.clone() }
    }

    pub async fn products_by_category(&self) -> Result<Vec<CategoryStats>, AppError> {
        let mut stats: Vec<CategoryStats> =
            aggregate(&self.db.products(), product_pipeline()).await?;
        for entry in &mut stats {
            entry.avg_price = round_money(entry.avg_price);
            entry.inventory_value = round_money(entry.inventory_value);
        }
        Ok(stats)
    }

    /// `owner_id` restricts the report to one owner's customers.
    pub async fn customers_by_type(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<CustomerTypeStats>, AppError> {
        let mut stats: Vec<CustomerTypeStats> =
            aggregate(&self.db.customers(), customer_pipeline(owner_id)).await?;
        for entry in &mut stats {
            entry.total_outstanding = round_money(entry.total_outstanding);
            entry.total_credit_limit = round_money(entry.total_credit_limit);
            entry.avg_outstanding = round_money(entry.avg_outstanding);
        }
        Ok(stats)
    }

    pub async fn users_by_role(&self) -> Result<Vec<RoleStats>, AppError> {
        aggregate(&self.db.users(), user_pipeline()).await
    }

    /// Active products at or below `threshold`, lowest stock first.
    pub async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "stock": 1, "_id": 1 })
            .build();
        let cursor = self
            .db
            .products()
            .find(low_stock_filter(threshold), options)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

/// Active products at or below `threshold` units.
pub fn low_stock_filter(threshold: i64) -> Document {
    doc! { "is_active": true, "stock": { "$lte": threshold } }
}

async fn aggregate<C, T>(collection: &Collection<C>, pipeline: Vec<Document>) -> Result<Vec<T>, AppError>
where
    C: Send + Sync,
    T: DeserializeOwned,
{
    let cursor = collection.aggregate(pipeline, None).await?;
    let documents: Vec<Document> = cursor.try_collect().await?;
    documents
        .into_iter()
        .map(|document| bson::from_document(document).map_err(AppError::from))
        .collect()
}

fn product_pipeline() -> Vec<Document> {
    vec![
        doc! {
            "$group": {
                "_id": "$category",
                "count": { "$sum": 1_i64 },
                "total_stock": { "$sum": "$stock" },
                "avg_price": { "$avg": "$price" },
                "min_price": { "$min": "$price" },
                "max_price": { "$max": "$price" },
                "inventory_value": { "$sum": { "$multiply": ["$price", "$stock"] } },
            }
        },
        doc! { "$sort": { "avg_price": 1, "_id": 1 } },
    ]
}

fn customer_pipeline(owner_id: Option<&str>) -> Vec<Document> {
    let mut pipeline = Vec::with_capacity(2);
    if let Some(owner_id) = owner_id {
        pipeline.push(doc! { "$match": { "owner_id": owner_id } });
    }
    pipeline.push(doc! {
        "$group": {
            "_id": "$customer_type",
            "count": { "$sum": 1_i64 },
            "total_outstanding": { "$sum": "$outstanding_balance" },
            "total_credit_limit": { "$sum": "$credit_limit" },
            "avg_outstanding": { "$avg": "$outstanding_balance" },
        }
    });
    pipeline
}

fn user_pipeline() -> Vec<Document> {
    vec![doc! {
        "$group": {
            "_id": "$role",
            "count": { "$sum": 1_i64 },
            "active": { "$sum": { "$cond": ["$is_active", 1_i64, 0_i64] } },
        }
    }]
}

use crate::models::{Customer, Invoice, Product, User};
use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to MongoDB");
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for backoffice-service");

        self.create_index(
            &self.users(),
            "users",
            doc! { "email": 1 },
            IndexOptions::builder()
                .name("email_unique".to_string())
                .unique(true)
                .build(),
        )
        .await?;

        self.create_index(
            &self.customers(),
            "customers",
            doc! { "owner_id": 1, "phone": 1 },
            IndexOptions::builder()
                .name("owner_phone_unique".to_string())
                .unique(true)
                .build(),
        )
        .await?;

        // Email is optional, so only documents that carry one take part.
        self.create_index(
            &self.customers(),
            "customers",
            doc! { "owner_id": 1, "email": 1 },
            IndexOptions::builder()
                .name("owner_email_unique".to_string())
                .unique(true)
                .partial_filter_expression(doc! { "email": { "$type": "string" } })
                .build(),
        )
        .await?;

        self.create_index(
            &self.products(),
            "products",
            doc! { "category": 1, "price": 1 },
            IndexOptions::builder()
                .name("category_price_lookup".to_string())
                .build(),
        )
        .await?;

        self.create_index(
            &self.products(),
            "products",
            doc! { "stock": 1 },
            IndexOptions::builder()
                .name("stock_lookup".to_string())
                .build(),
        )
        .await?;

        self.create_index(
            &self.invoices(),
            "invoices",
            doc! { "invoice_number": 1 },
            IndexOptions::builder()
                .name("invoice_number_unique".to_string())
                .unique(true)
                .build(),
        )
        .await?;

        self.create_index(
            &self.invoices(),
            "invoices",
            doc! { "customer_id": 1, "payment_status": 1 },
            IndexOptions::builder()
                .name("customer_status_lookup".to_string())
                .build(),
        )
        .await?;

        Ok(())
    }

    async fn create_index<T>(
        &self,
        collection: &Collection<T>,
        collection_name: &str,
        keys: Document,
        options: IndexOptions,
    ) -> Result<(), AppError>
    where
        T: Send + Sync,
    {
        let index_name = options.name.clone().unwrap_or_default();
        let index = IndexModel::builder().keys(keys).options(options).build();

        collection.create_index(index, None).await.map_err(|e| {
            tracing::error!(
                collection = %collection_name,
                index = %index_name,
                error = %e,
                "Failed to create index"
            );
            AppError::from(e)
        })?;
        tracing::info!(collection = %collection_name, index = %index_name, "Created index");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn products(&self) -> Collection<Product> {
        self.db.collection("products")
    }

    pub fn customers(&self) -> Collection<Customer> {
        self.db.collection("customers")
    }

    pub fn invoices(&self) -> Collection<Invoice> {
        self.db.collection("invoices")
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

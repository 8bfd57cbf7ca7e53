#![allow(dead_code)]

use backoffice_service::config::{BackofficeConfig, BootstrapAdmin};
use backoffice_service::services::MongoDb;
use backoffice_service::startup::Application;
use reqwest::{Client, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@agri.test";
pub const ADMIN_PASSWORD: &str = "admin-password-1";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub db: MongoDb,
    pub storage_path: String,
    pub client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        std::env::set_var("MONGODB_URI", "mongodb://localhost:27017");

        let db_name = format!("backoffice_test_{}", Uuid::new_v4().simple());
        let storage_path = format!("target/test-storage-{}", Uuid::new_v4());

        let mut config = BackofficeConfig::load().expect("Failed to load configuration");
        config.common.port = 0;
        config.mongodb.database = db_name;
        config.storage.local_path = storage_path.clone();
        config.security.login_attempts = 1000;
        config.bootstrap = Some(BootstrapAdmin {
            name: "Store Admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: Secret::new(ADMIN_PASSWORD.to_string()),
        });

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let db = app.db().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            db,
            storage_path,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn admin_token(&self) -> String {
        let body: Value = self
            .login(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .json()
            .await
            .expect("Failed to parse login response");
        body["token"]
            .as_str()
            .expect("login response carries a token")
            .to_string()
    }

    /// Create a staff user as admin and return `(id, token)`.
    pub async fn create_staff(&self, admin_token: &str, email: &str) -> (String, String) {
        let body: Value = self
            .client
            .post(self.url("/users"))
            .bearer_auth(admin_token)
            .json(&json!({
                "name": "Counter Staff",
                "email": email,
                "password": "staff-password-1",
                "role": "staff",
            }))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Failed to parse JSON");

        (
            body["data"]["id"].as_str().expect("user id").to_string(),
            body["token"].as_str().expect("user token").to_string(),
        )
    }

    pub async fn create_product(&self, token: &str, overrides: Value) -> Value {
        let mut payload = json!({
            "name": "Urea 45kg",
            "category": "fertilizers",
            "unit": "bag",
            "price": 266.5,
            "cost_price": 240.0,
            "mrp": 300.0,
            "stock": 100,
            "min_stock_level": 5,
            "tax_rate": 5.0,
            "hsn_code": "3102",
        });
        merge(&mut payload, overrides);

        let response = self
            .client
            .post(self.url("/products"))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201, "product creation failed");
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["data"].clone()
    }

    pub async fn create_customer(&self, token: &str, phone: &str) -> Value {
        let response = self
            .client
            .post(self.url("/customers"))
            .bearer_auth(token)
            .json(&json!({
                "name": "Ramesh Patil",
                "phone": phone,
                "customer_type": "farmer",
                "credit_limit": 5000.0,
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201, "customer creation failed");
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["data"].clone()
    }

    pub async fn cleanup(&self) {
        let _ = self.db.database().drop(None).await;
        let _ = tokio::fs::remove_dir_all(&self.storage_path).await;
    }
}

fn merge(base: &mut Value, overrides: Value) {
    if let (Some(base), Value::Object(overrides)) = (base.as_object_mut(), overrides) {
        for (key, value) in overrides {
            base.insert(key, value);
        }
    }
}

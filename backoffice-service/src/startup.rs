use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use mongodb::bson::doc;
use secrecy::ExposeSecret;
use service_core::{
    error::AppError,
    middleware::{
        metrics::metrics_middleware,
        rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
        security_headers::security_headers_middleware,
        tracing::request_id_middleware,
    },
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::BackofficeConfig;
use crate::handlers::{auth, customers, health, invoices, products, users};
use crate::middleware::auth_middleware;
use crate::models::{Role, User};
use crate::services::{JwtService, LocalStorage, MongoDb, Storage};
use crate::utils::{hash_password, Password};

#[derive(Clone)]
pub struct AppState {
    pub config: BackofficeConfig,
    pub db: MongoDb,
    pub storage: Arc<dyn Storage>,
    pub jwt: JwtService,
    pub login_rate_limiter: IpRateLimiter,
}

pub struct Application {
    port: u16,
    server: Box<dyn Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: BackofficeConfig) -> Result<Self, AppError> {
        let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;
        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(&config.storage.local_path)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to initialize local storage at {}: {}",
                        config.storage.local_path,
                        e
                    );
                    e
                })?,
        );

        bootstrap_admin(&db, &config).await?;

        let state = AppState {
            jwt: JwtService::new(&config.jwt),
            login_rate_limiter: create_ip_rate_limiter(
                config.security.login_attempts,
                config.security.login_window_seconds,
            ),
            config: config.clone(),
            db,
            storage,
        };

        let app = build_router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn db(&self) -> &MongoDb {
        &self.state.db
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let product_routes = Router::new()
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/products/stats", get(products::product_stats))
        .route("/products/low-stock", get(products::low_stock_products))
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/products/:id/image", put(products::upload_product_image));

    let customer_routes = Router::new()
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route("/customers/stats", get(customers::customer_stats))
        .route(
            "/customers/:id",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route("/customers/:id/invoices", get(customers::customer_invoices))
        .route("/customers/:id/balance", get(customers::customer_balance))
        .route(
            "/customers/:id/balance/reconcile",
            post(customers::reconcile_balance),
        )
        .route(
            "/customers/:id/credit-limit",
            put(customers::update_credit_limit),
        )
        .route("/customers/:id/payments", post(customers::record_payment));

    let invoice_routes = Router::new()
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route("/invoices/:id", get(invoices::get_invoice))
        .route(
            "/invoices/:id/payments",
            post(invoices::record_invoice_payment),
        );

    let user_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/stats", get(users::user_stats))
        .route("/users/me", get(users::me))
        .route("/users/me/update-details", put(users::update_details))
        .route("/users/me/update-password", put(users::update_password))
        .route("/users/me/deactivate", put(users::deactivate))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/photo", put(users::upload_user_photo));

    // Anonymous requests pass; handlers taking `CurrentUser` reject them.
    let api_routes = Router::new()
        .merge(product_routes)
        .merge(customer_routes)
        .merge(invoice_routes)
        .merge(user_routes)
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let body_limit = state.config.storage.max_upload_bytes + 64 * 1024;
    let cors = cors_layer(&state.config.security.allowed_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_endpoint))
        .merge(login_route)
        .merge(api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Seed the first admin when the user collection is empty.
async fn bootstrap_admin(db: &MongoDb, config: &BackofficeConfig) -> Result<(), AppError> {
    let Some(bootstrap) = &config.bootstrap else {
        return Ok(());
    };

    if db.users().count_documents(doc! {}, None).await? > 0 {
        return Ok(());
    }

    let password = Password::parse(bootstrap.password.expose_secret().clone())?;
    let hash = hash_password(&password)?;
    let admin = User::new(
        bootstrap.name.clone(),
        &bootstrap.email,
        None,
        hash.into_string(),
        Role::Admin,
    );
    admin.check()?;

    match db.users().insert_one(&admin, None).await {
        Ok(_) => {
            tracing::info!(user_id = %admin.id, email = %admin.email, "Bootstrap admin created");
            Ok(())
        }
        // Another instance seeded it first.
        Err(e) if service_core::error::is_duplicate_key(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}

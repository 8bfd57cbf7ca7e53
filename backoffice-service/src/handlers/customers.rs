use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use mongodb::bson::doc;
use service_core::{
    error::{is_duplicate_key, AppError},
    query::ListQuery,
    utils::ValidatedJson,
};

use super::{find_by_id, save_versioned};
use crate::dtos::{
    customers::{
        CreateCustomerRequest, CreditLimitRequest, CustomerView, RecordPaymentRequest,
        UpdateCustomerRequest, CUSTOMER_QUERY,
    },
    invoices::{InvoiceView, INVOICE_QUERY},
    ApiResponse, Empty,
};
use crate::middleware::CurrentUser;
use crate::models::{Customer, PaymentRecord};
use crate::services::{metrics, CustomerLedger, StatsService};
use crate::startup::AppState;

const DUPLICATE_CUSTOMER: &str = "A customer with this phone or email already exists";

/// Load a customer the caller may act on: its owner or an admin.
async fn owned_customer(
    state: &AppState,
    user: &CurrentUser,
    id: &str,
) -> Result<Customer, AppError> {
    user.require_staff()?;
    let customer = find_by_id(&state.db.customers(), id, "Customer").await?;
    user.ensure_owner_or_admin(&customer.owner_id)?;
    Ok(customer)
}

pub async fn list_customers(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;

    let mut query = ListQuery::parse(&params, &CUSTOMER_QUERY)?;
    if !user.is_admin() {
        query = query.scoped(doc! { "owner_id": &user.id });
    }

    let page = query.fetch(&state.db.customers()).await?;
    Ok(Json(page.into_response(&query, CustomerView::from)?))
}

pub async fn get_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let customer = owned_customer(&state, &user, &id).await?;
    Ok(Json(ApiResponse::ok(CustomerView::from(customer))))
}

pub async fn create_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateCustomerRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;

    let customer = Customer::new(req.into(), user.id.clone());
    customer.check()?;

    state
        .db
        .customers()
        .insert_one(&customer, None)
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::conflict(DUPLICATE_CUSTOMER)
            } else {
                AppError::from(e)
            }
        })?;

    tracing::info!(customer_id = %customer.id, owner_id = %user.id, "Customer created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CustomerView::from(customer))),
    ))
}

pub async fn update_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateCustomerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut customer = owned_customer(&state, &user, &id).await?;

    let loaded_version = customer.version;
    req.merge_into(&mut customer);
    customer.check()?;
    customer.version = loaded_version + 1;
    customer.updated_at = Utc::now();

    save_versioned(
        &state.db.customers(),
        &id,
        loaded_version,
        &customer,
        "customer",
        DUPLICATE_CUSTOMER,
    )
    .await?;

    tracing::info!(customer_id = %id, updated_by = %user.id, "Customer updated");
    Ok(Json(ApiResponse::ok(CustomerView::from(customer))))
}

/// Refused while any invoice still references the customer.
pub async fn delete_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    owned_customer(&state, &user, &id).await?;

    let invoices = state
        .db
        .invoices()
        .count_documents(doc! { "customer_id": &id }, None)
        .await?;
    if invoices > 0 {
        return Err(AppError::conflict(format!(
            "Customer has {} invoice(s) and cannot be deleted",
            invoices
        )));
    }

    let result = state
        .db
        .customers()
        .delete_one(doc! { "_id": &id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Customer not found"));
    }

    tracing::info!(customer_id = %id, deleted_by = %user.id, "Customer deleted");
    Ok(Json(ApiResponse::ok(Empty {})))
}

pub async fn customer_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;
    let owner = (!user.is_admin()).then_some(user.id.as_str());
    let stats = StatsService::new(&state.db).customers_by_type(owner).await?;
    Ok(Json(ApiResponse::collection(stats)))
}

pub async fn customer_invoices(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let customer = owned_customer(&state, &user, &id).await?;

    let query = ListQuery::parse(&params, &INVOICE_QUERY)?
        .scoped(doc! { "customer_id": &customer.id });
    let page = query.fetch(&state.db.invoices()).await?;
    Ok(Json(page.into_response(&query, InvoiceView::from)?))
}

pub async fn customer_balance(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let customer = owned_customer(&state, &user, &id).await?;
    let summary = CustomerLedger::new(&state.db).balance(&customer).await?;

    if summary.discrepancy != 0.0 {
        tracing::warn!(
            customer_id = %id,
            ledger = summary.outstanding_balance,
            invoices = summary.invoice_outstanding,
            "Customer ledger differs from open invoices"
        );
    }

    Ok(Json(ApiResponse::ok(summary)))
}

pub async fn reconcile_balance(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;
    let customer = find_by_id(&state.db.customers(), &id, "Customer").await?;
    let summary = CustomerLedger::new(&state.db).reconcile(&customer).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

pub async fn update_credit_limit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<CreditLimitRequest>,
) -> Result<impl IntoResponse, AppError> {
    owned_customer(&state, &user, &id).await?;

    let customer = CustomerLedger::new(&state.db)
        .update_credit_limit(&id, req.credit_limit)
        .await?;

    tracing::info!(customer_id = %id, credit_limit = customer.credit_limit, "Credit limit updated");
    Ok(Json(ApiResponse::ok(CustomerView::from(customer))))
}

pub async fn record_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<RecordPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let customer = owned_customer(&state, &user, &id).await?;

    let payment = PaymentRecord::new(
        req.amount,
        req.method,
        req.date,
        req.reference,
        req.notes,
        user.id.clone(),
    )?;

    let updated = CustomerLedger::new(&state.db)
        .record_payment(&id, &payment)
        .await?;

    metrics::record_payment("customer", payment.method.as_str(), payment.amount);
    tracing::info!(
        customer_id = %id,
        amount = payment.amount,
        previous_balance = customer.outstanding_balance,
        balance = updated.outstanding_balance,
        "Customer payment recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CustomerView::from(updated))),
    ))
}

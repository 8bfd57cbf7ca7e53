use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use mongodb::bson::doc;
use service_core::{error::AppError, query::ListQuery, utils::ValidatedJson};

use super::find_by_id;
use crate::dtos::{
    invoices::{CreateInvoiceRequest, InvoicePaymentRequest, InvoiceView, INVOICE_QUERY},
    ApiResponse,
};
use crate::middleware::CurrentUser;
use crate::services::InvoiceService;
use crate::startup::AppState;

pub async fn list_invoices(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;

    let mut query = ListQuery::parse(&params, &INVOICE_QUERY)?;
    if !user.is_admin() {
        query = query.scoped(doc! { "created_by": &user.id });
    }

    let page = query.fetch(&state.db.invoices()).await?;
    Ok(Json(page.into_response(&query, InvoiceView::from)?))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;
    let invoice = find_by_id(&state.db.invoices(), &id, "Invoice").await?;
    user.ensure_owner_or_admin(&invoice.created_by)?;
    Ok(Json(ApiResponse::ok(InvoiceView::from(invoice))))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;

    let (customer_id, request) = req.into_parts();
    let customer = find_by_id(&state.db.customers(), &customer_id, "Customer").await?;
    user.ensure_owner_or_admin(&customer.owner_id)?;

    let invoice = InvoiceService::new(&state.db)
        .create(&customer, request, &user.id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(InvoiceView::from(invoice))),
    ))
}

pub async fn record_invoice_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<InvoicePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;
    let invoice = find_by_id(&state.db.invoices(), &id, "Invoice").await?;
    user.ensure_owner_or_admin(&invoice.created_by)?;

    let updated = InvoiceService::new(&state.db)
        .record_payment(&invoice, req.amount, req.method, &user.id)
        .await?;

    Ok(Json(ApiResponse::ok(InvoiceView::from(updated))))
}

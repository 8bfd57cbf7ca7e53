mod common;

use common::TestApp;
use serde_json::{json, Value};

async fn customer_with_balance(app: &TestApp, token: &str, phone: &str, balance: f64) -> String {
    let body: Value = app
        .client
        .post(app.url("/customers"))
        .bearer_auth(token)
        .json(&json!({
            "name": "Suresh Jadhav",
            "phone": phone,
            "credit_limit": 1000.0,
            "outstanding_balance": balance,
        }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    body["data"]["id"].as_str().expect("customer id").to_string()
}

async fn pay(app: &TestApp, token: &str, customer_id: &str, amount: f64) -> reqwest::Response {
    app.client
        .post(app.url(&format!("/customers/{}/payments", customer_id)))
        .bearer_auth(token)
        .json(&json!({ "amount": amount, "method": "upi", "reference": "UPI-7781" }))
        .send()
        .await
        .expect("Failed to execute request")
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn payments_lower_the_balance_and_clamp_at_zero() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    let exact = customer_with_balance(&app, &token, "9876500001", 500.0).await;
    let response = pay(&app, &token, &exact, 500.0).await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["outstanding_balance"], 0.0);
    assert_eq!(body["data"]["payments"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["payments"][0]["reference"], "UPI-7781");

    let over = customer_with_balance(&app, &token, "9876500002", 500.0).await;
    let body: Value = pay(&app, &token, &over, 600.0)
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(body["data"]["outstanding_balance"], 0.0);
    assert_eq!(body["data"]["available_credit"], 1000.0);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn non_positive_payments_are_rejected() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;
    let id = customer_with_balance(&app, &token, "9876500003", 100.0).await;

    for amount in [0.0, -5.0] {
        let response = pay(&app, &token, &id, amount).await;
        assert_eq!(response.status().as_u16(), 400);
    }

    let bad_method = app
        .client
        .post(app.url(&format!("/customers/{}/payments", id)))
        .bearer_auth(&token)
        .json(&json!({ "amount": 10.0, "method": "barter" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(bad_method.status().is_client_error());

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn customer_with_invoices_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    let product = app.create_product(&token, json!({})).await;
    let billed = app.create_customer(&token, "9876500004").await;
    let billed_id = billed["id"].as_str().expect("customer id");

    let invoice = app
        .client
        .post(app.url("/invoices"))
        .bearer_auth(&token)
        .json(&json!({
            "customer_id": billed_id,
            "items": [{ "product_id": product["id"], "quantity": 1 }],
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(invoice.status().as_u16(), 201);

    let blocked = app
        .client
        .delete(app.url(&format!("/customers/{}", billed_id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(blocked.status().as_u16(), 400);

    let still_there = app
        .client
        .get(app.url(&format!("/customers/{}", billed_id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(still_there.status().as_u16(), 200);

    let fresh = app.create_customer(&token, "9876500005").await;
    let deleted = app
        .client
        .delete(app.url(&format!("/customers/{}", fresh["id"].as_str().expect("id"))))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(deleted.status().as_u16(), 200);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn duplicate_phone_for_the_same_owner_conflicts() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let (_, staff) = app.create_staff(&admin, "counter@agri.test").await;

    app.create_customer(&staff, "9876500006").await;
    let duplicate = app
        .client
        .post(app.url("/customers"))
        .bearer_auth(&staff)
        .json(&json!({ "name": "Someone Else", "phone": "9876500006" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(duplicate.status().as_u16(), 400);

    // A different owner may keep the same phone number.
    app.create_customer(&admin, "9876500006").await;

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn staff_only_see_and_touch_their_own_customers() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let (_, first) = app.create_staff(&admin, "first@agri.test").await;
    let (_, second) = app.create_staff(&admin, "second@agri.test").await;

    let mine = app.create_customer(&first, "9876500007").await;
    app.create_customer(&second, "9876500008").await;

    let list: Value = app
        .client
        .get(app.url("/customers"))
        .bearer_auth(&first)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(list["total"], 1);
    assert_eq!(list["data"][0]["id"], mine["id"]);

    let everything: Value = app
        .client
        .get(app.url("/customers"))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(everything["total"], 2);

    let foreign_update = app
        .client
        .put(app.url(&format!("/customers/{}", mine["id"].as_str().expect("id"))))
        .bearer_auth(&second)
        .json(&json!({ "name": "Hijacked" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(foreign_update.status().as_u16(), 403);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn balance_reports_ledger_and_invoice_projection() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    let product = app
        .create_product(&token, json!({ "price": 1000.0, "mrp": 1000.0, "tax_rate": 0.0 }))
        .await;
    let customer = app.create_customer(&token, "9876500009").await;
    let id = customer["id"].as_str().expect("customer id");

    app.client
        .post(app.url("/invoices"))
        .bearer_auth(&token)
        .json(&json!({
            "customer_id": id,
            "items": [{ "product_id": product["id"], "quantity": 1 }],
            "paid_amount": 400.0,
        }))
        .send()
        .await
        .expect("Failed to execute request");

    let balance: Value = app
        .client
        .get(app.url(&format!("/customers/{}/balance", id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(balance["data"]["outstanding_balance"], 600.0);
    assert_eq!(balance["data"]["invoice_outstanding"], 600.0);
    assert_eq!(balance["data"]["discrepancy"], 0.0);
    assert_eq!(balance["data"]["open_invoices"], 1);
    assert_eq!(balance["data"]["available_credit"], 4400.0);

    // Settle on the customer ledger only, then reconcile back to the invoices.
    pay(&app, &token, id, 600.0).await;
    let reconciled: Value = app
        .client
        .post(app.url(&format!("/customers/{}/balance/reconcile", id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(reconciled["data"]["outstanding_balance"], 600.0);
    assert_eq!(reconciled["data"]["discrepancy"], 0.0);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn customer_stats_group_by_type() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    app.create_customer(&token, "9876500010").await;
    app.create_customer(&token, "9876500011").await;

    let body: Value = app
        .client
        .get(app.url("/customers/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");

    let farmers = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .find(|group| group["customer_type"] == "farmer")
        .expect("farmer group");
    assert_eq!(farmers["count"], 2);
    assert_eq!(farmers["total_credit_limit"], 10000.0);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn money_that_overflows_when_rounded_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;
    let id = customer_with_balance(&app, &token, "9876500012", 100.0).await;

    let payment = pay(&app, &token, &id, 1e308).await;
    assert_eq!(payment.status().as_u16(), 400);

    let limit = app
        .client
        .put(app.url(&format!("/customers/{}/credit-limit", id)))
        .bearer_auth(&token)
        .json(&json!({ "credit_limit": 1e308 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(limit.status().as_u16(), 400);

    let customer: Value = app
        .client
        .get(app.url(&format!("/customers/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(customer["data"]["outstanding_balance"], 100.0);
    assert_eq!(customer["data"]["credit_limit"], 1000.0);

    app.cleanup().await;
}

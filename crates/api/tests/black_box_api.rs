use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use stockledger_auth::{JwtClaims, Role};
use stockledger_core::UserId;
use stockledger_infra::AppConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Same router as prod (no database url, so the in-memory store), on an ephemeral port.
        let mut config = AppConfig::default();
        config.auth.jwt_secret = jwt_secret.to_string();

        let app = stockledger_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, username: &str, role: Role) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        username: username.to_string(),
        role,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_product(
    client: &reqwest::Client,
    server: &TestServer,
    token: &str,
    body: serde_json::Value,
) -> serde_json::Value {
    let res = client
        .post(server.url("/products"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn update_stock(
    client: &reqwest::Client,
    server: &TestServer,
    token: &str,
    body: serde_json::Value,
) -> reqwest::Response {
    client
        .post(server.url("/inventory/update"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let server = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/inventory/stats")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = mint_jwt("other-secret", "mallory", Role::Admin);
    let res = client
        .get(server.url("/inventory/stats"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn actor_is_derived_from_token() {
    let secret = "test-secret";
    let server = TestServer::spawn(secret).await;
    let client = reqwest::Client::new();

    let token = mint_jwt(secret, "sam", Role::Staff);
    let res = client
        .get(server.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["username"], "sam");
    assert_eq!(body["role"], "staff");
    assert_eq!(body["permissions"], json!(["inventory.read", "inventory.stock.update"]));
}

#[tokio::test]
async fn staff_cannot_manage_products() {
    let secret = "test-secret";
    let server = TestServer::spawn(secret).await;
    let client = reqwest::Client::new();

    let token = mint_jwt(secret, "sam", Role::Staff);
    let res = client
        .post(server.url("/products"))
        .bearer_auth(&token)
        .json(&json!({ "sku": "W-1", "name": "Widget", "category": "Parts" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(server.url("/reports/value"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stock_lifecycle_create_move_query() {
    let secret = "test-secret";
    let server = TestServer::spawn(secret).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(secret, "ada", Role::Admin);
    let staff = mint_jwt(secret, "sam", Role::Staff);

    let product = create_product(
        &client,
        &server,
        &admin,
        json!({
            "sku": "W-1",
            "name": "Widget",
            "category": "Parts",
            "stock": 50,
            "threshold": 10,
            "price": "2.50"
        }),
    )
    .await;
    let product_id = product["id"].as_str().unwrap().to_string();
    assert_eq!(product["stock"], 50);

    let res = update_stock(
        &client,
        &server,
        &staff,
        json!({ "productId": product_id, "action": "Add", "quantity": 20, "notes": "delivery" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let entry: serde_json::Value = res.json().await.unwrap();
    assert_eq!(entry["action"], "Add");
    assert_eq!(entry["previousStock"], 50);
    assert_eq!(entry["newStock"], 70);
    assert_eq!(entry["Product"]["sku"], "W-1");
    assert_eq!(entry["User"]["username"], "sam");

    let res = update_stock(
        &client,
        &server,
        &staff,
        json!({ "productId": product_id, "action": "Remove", "quantity": 80 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["currentStock"], 70);
    assert_eq!(body["requestedQuantity"], 80);

    let res = update_stock(
        &client,
        &server,
        &staff,
        json!({ "productId": product_id, "action": "Update", "quantity": 5 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(server.url(&format!("/inventory/logs?productId={product_id}&limit=2")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    // Initial stock entry, Add, Update. The failed Remove left no trace.
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["page"], 1);
    assert_eq!(page["logs"][0]["action"], "Update");
    assert_eq!(page["logs"][0]["newStock"], 5);

    let res = client
        .get(server.url("/inventory/stats"))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stats: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stats["totalProducts"], 1);
    assert_eq!(stats["lowStockCount"], 1);
    assert_eq!(stats["outOfStockCount"], 0);
    assert_eq!(stats["recentActivity"].as_array().unwrap().len(), 3);

    let res = client
        .get(server.url("/inventory/low-stock"))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    let low: serde_json::Value = res.json().await.unwrap();
    assert_eq!(low.as_array().unwrap().len(), 1);
    assert_eq!(low[0]["sku"], "W-1");
    assert_eq!(low[0]["status"], "LowStock");

    let res = client
        .get(server.url(&format!("/inventory/audit/{product_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let audit: serde_json::Value = res.json().await.unwrap();
    assert_eq!(audit["consistent"], true);
    assert_eq!(audit["replayedStock"], 5);
}

#[tokio::test]
async fn invalid_movements_are_rejected() {
    let secret = "test-secret";
    let server = TestServer::spawn(secret).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(secret, "ada", Role::Admin);

    let product = create_product(
        &client,
        &server,
        &admin,
        json!({ "sku": "G-1", "name": "Gadget", "category": "Parts", "stock": 3 }),
    )
    .await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let res = update_stock(
        &client,
        &server,
        &admin,
        json!({ "productId": product_id, "action": "Steal", "quantity": 1 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_action");

    let res = update_stock(
        &client,
        &server,
        &admin,
        json!({ "productId": product_id, "action": "Add", "quantity": 0 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_quantity");

    let res = update_stock(
        &client,
        &server,
        &admin,
        json!({ "productId": UserId::new().to_string(), "action": "Add", "quantity": 1 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(server.url(&format!("/products/{product_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let current: serde_json::Value = res.json().await.unwrap();
    assert_eq!(current["stock"], 3);
}

#[tokio::test]
async fn product_lifecycle_and_reports() {
    let secret = "test-secret";
    let server = TestServer::spawn(secret).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(secret, "ada", Role::Admin);

    let bolt = create_product(
        &client,
        &server,
        &admin,
        json!({ "sku": "B-1", "name": "Bolt", "category": "Hardware", "stock": 100, "price": 1 }),
    )
    .await;
    create_product(
        &client,
        &server,
        &admin,
        json!({ "sku": "N-1", "name": "Nut", "category": "Hardware", "stock": 40, "price": "0.5" }),
    )
    .await;

    let res = client
        .post(server.url("/products"))
        .bearer_auth(&admin)
        .json(&json!({ "sku": "B-1", "name": "Other bolt", "category": "Hardware" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let bolt_id = bolt["id"].as_str().unwrap().to_string();
    let res = client
        .patch(server.url(&format!("/products/{bolt_id}")))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Hex bolt", "threshold": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let patched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(patched["name"], "Hex bolt");
    assert_eq!(patched["stock"], 100);

    let res = client
        .get(server.url("/products/categories"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let categories: serde_json::Value = res.json().await.unwrap();
    assert_eq!(categories, json!(["Hardware"]));

    let res = client
        .get(server.url("/reports/value"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let value: serde_json::Value = res.json().await.unwrap();
    assert_eq!(value["categories"][0]["productCount"], 2);
    assert_eq!(value["categories"][0]["totalStock"], 140);

    let res = client
        .get(server.url("/reports/movements"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["byAction"][0]["action"], "Add");
    assert_eq!(report["byAction"][0]["count"], 2);

    let res = client
        .delete(server.url(&format!("/products/{bolt_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(server.url(&format!("/products/{bolt_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(server.url("/products?search=nut"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let listed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["sku"], "N-1");
}

#[tokio::test]
async fn expiry_report_and_price_bounds() {
    let secret = "test-secret";
    let server = TestServer::spawn(secret).await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(secret, "ada", Role::Admin);

    let now = Utc::now();
    for (sku, days, stock) in [("MILK", -3, 4), ("EGGS", 10, 12), ("JAM", 90, 2), ("OLD", -40, 0)] {
        create_product(
            &client,
            &server,
            &admin,
            json!({
                "sku": sku,
                "name": sku,
                "category": "Food",
                "stock": stock,
                "price": "2.00",
                "expiryDate": (now + ChronoDuration::days(days)).to_rfc3339(),
            }),
        )
        .await;
    }

    let res = client
        .get(server.url("/reports/expiry"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["summary"], json!({ "totalExpired": 1, "totalExpiringSoon": 1 }));
    assert_eq!(report["expiredProducts"][0]["sku"], "MILK");
    assert_eq!(report["expiringProducts"][0]["sku"], "EGGS");
    let stocked: u64 = report["expiryByMonth"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["totalStock"].as_u64().unwrap())
        .sum();
    assert_eq!(stocked, 18);

    let res = client
        .post(server.url("/products"))
        .bearer_auth(&admin)
        .json(&json!({
            "sku": "GOLD",
            "name": "Gold bar",
            "category": "Vault",
            "stock": 1,
            "price": "100000000000000000000",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(server.url("/inventory/stats"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stats: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stats["totalProducts"], 4);
}

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;

type Params = Query<HashMap<String, String>>;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Healthy provider: spot 155, rate 5% (as a percentage), no dividend, and
/// one call chain at 145/150/160 with 25% IV for any requested expiration.
pub fn healthy_provider() -> Router {
    Router::new()
        .route(
            "/quote",
            get(|Query(q): Params| async move {
                match q.get("symbol").map(String::as_str) {
                    Some("AAPL") => {
                        Json(serde_json::json!({ "c": 155.0, "pc": 153.2 })).into_response()
                    }
                    _ => Json(serde_json::json!({ "c": 0, "pc": null })).into_response(),
                }
            }),
        )
        .route(
            "/economic",
            get(|| async {
                Json(serde_json::json!({
                    "observations": [
                        { "date": "2024-05-01", "value": "5.10" },
                        { "date": "2024-05-02", "value": "5.00" }
                    ]
                }))
            }),
        )
        .route(
            "/stock/profile",
            get(|| async { Json(serde_json::json!({ "dividendYield": 0 })) }),
        )
        .route(
            "/stock/option-chain",
            get(|Query(q): Params| async move {
                let expiration = q.get("expiration").cloned().unwrap_or_default();
                Json(serde_json::json!({
                    "data": [{
                        "expirationDate": expiration,
                        "options": {
                            "CALL": [
                                {
                                    "contractName": "AAPL-C145",
                                    "strike": 145,
                                    "impliedVolatility": 27.0
                                },
                                {
                                    "contractName": "AAPL-C150",
                                    "strike": 150,
                                    "impliedVolatility": 25.0,
                                    "lastPrice": 12.1
                                },
                                {
                                    "contractName": "AAPL-C160",
                                    "strike": 160,
                                    "impliedVolatility": 23.5
                                }
                            ],
                            "PUT": []
                        }
                    }]
                }))
            }),
        )
}

/// Provider whose secondary endpoints all fail; only the quote works.
pub fn degraded_provider() -> Router {
    Router::new()
        .route(
            "/quote",
            get(|| async { Json(serde_json::json!({ "c": 155.0 })) }),
        )
        .route(
            "/economic",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                Json(serde_json::json!({ "observations": [{ "value": 4.0 }] }))
            }),
        )
        .route(
            "/stock/profile",
            get(|| async { (StatusCode::NOT_FOUND, "no profile") }),
        )
        .route(
            "/stock/option-chain",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "chain offline") }),
        )
}

/// PDE endpoint that always answers HTTP 500.
pub fn failing_pde() -> Router {
    Router::new().route(
        "/pde/price",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "solver crashed") }),
    )
}

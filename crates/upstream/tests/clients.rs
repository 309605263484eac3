use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use api_types::{
    balance::{AdjustBalanceRequest, AdjustBalanceResponse, GetBalanceRequest, GetBalanceResponse},
    pos::{AdjustTotalRequest, AdjustTotalResponse, Pos, PosDetailRequest, PosDetailResponse},
};
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use engine::{BalanceService, PaymentType, PosService, UpstreamError};
use upstream::{
    BALANCE_ADJUST_PATH, BALANCE_GET_PATH, HttpBalanceClient, HttpPosClient, POS_ADJUST_PATH,
    POS_DETAIL_PATH,
};

#[derive(Clone, Default)]
struct Fake {
    pos_total: Arc<Mutex<i64>>,
    keys: Arc<Mutex<Vec<String>>>,
}

async fn pos_detail(
    State(fake): State<Fake>,
    Json(req): Json<PosDetailRequest>,
) -> Json<PosDetailResponse> {
    if req.id != 10 {
        return Json(PosDetailResponse {
            status: 404,
            error: "pos-not-found".to_string(),
            pos: None,
        });
    }
    let total = *fake.pos_total.lock().unwrap();
    Json(PosDetailResponse {
        status: 200,
        error: String::new(),
        pos: Some(Pos {
            id: 10,
            user_id: 1,
            name: "Groceries".to_string(),
            pos_type: 1,
            total,
            color: "#ffaa00".to_string(),
        }),
    })
}

async fn adjust_total(
    State(fake): State<Fake>,
    Json(req): Json<AdjustTotalRequest>,
) -> Json<AdjustTotalResponse> {
    let mut keys = fake.keys.lock().unwrap();
    let mut total = fake.pos_total.lock().unwrap();
    if !keys.contains(&req.idempotency_key) {
        keys.push(req.idempotency_key);
        *total += req.amount;
    }
    Json(AdjustTotalResponse {
        status: 200,
        error: String::new(),
        total: *total,
    })
}

async fn adjust_balance(Json(req): Json<AdjustBalanceRequest>) -> Json<AdjustBalanceResponse> {
    if req.payment_type == 1 {
        return Json(AdjustBalanceResponse {
            status: 423,
            error: "balance-locked".to_string(),
            ..AdjustBalanceResponse::default()
        });
    }
    Json(AdjustBalanceResponse {
        status: 200,
        error: String::new(),
        id: 3,
        total: req.amount,
    })
}

async fn get_balance(Json(req): Json<GetBalanceRequest>) -> (StatusCode, Json<GetBalanceResponse>) {
    if req.user_id == 500 {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(GetBalanceResponse::default()),
        );
    }
    if req.user_id == 600 {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    (
        StatusCode::OK,
        Json(GetBalanceResponse {
            status: 200,
            error: String::new(),
            total: 4200,
        }),
    )
}

async fn spawn_fake() -> SocketAddr {
    let app = Router::new()
        .route(POS_DETAIL_PATH, post(pos_detail))
        .route(POS_ADJUST_PATH, post(adjust_total))
        .route(BALANCE_ADJUST_PATH, post(adjust_balance))
        .route(BALANCE_GET_PATH, post(get_balance))
        .with_state(Fake::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn base_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

#[tokio::test]
async fn pos_detail_maps_payload() {
    let addr = spawn_fake().await;
    let client = HttpPosClient::new(&base_url(addr), Duration::from_secs(1)).unwrap();

    let pos = client.pos_detail(10).await.unwrap();
    assert_eq!(pos.name, "Groceries");
    assert_eq!(pos.pos_type, 1);
    assert_eq!(pos.user_id, 1);

    assert_eq!(
        client.pos_detail(9_999_999).await,
        Err(UpstreamError::Rejected {
            status: 404,
            error: "pos-not-found".to_string(),
        })
    );
}

#[tokio::test]
async fn adjust_total_sends_idempotency_key() {
    let addr = spawn_fake().await;
    let client = HttpPosClient::new(&base_url(addr), Duration::from_secs(1)).unwrap();

    assert_eq!(client.adjust_total(10, 2000, "tx-1-create-pos").await, Ok(2000));
    assert_eq!(client.adjust_total(10, 2000, "tx-1-create-pos").await, Ok(2000));
    assert_eq!(client.adjust_total(10, -500, "tx-2-create-pos").await, Ok(1500));
}

#[tokio::test]
async fn embedded_failure_is_a_rejection() {
    let addr = spawn_fake().await;
    let client = HttpBalanceClient::new(&base_url(addr), Duration::from_secs(1)).unwrap();

    let adjusted = client
        .adjust_balance(1, PaymentType::Cash, 700, "tx-1-create-balance")
        .await
        .unwrap();
    assert_eq!((adjusted.id, adjusted.total), (3, 700));

    let err = client
        .adjust_balance(1, PaymentType::Transfer, 700, "tx-2-create-balance")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        UpstreamError::Rejected {
            status: 423,
            error: "balance-locked".to_string(),
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_errors_and_timeouts_are_retryable() {
    let addr = spawn_fake().await;
    let client = HttpBalanceClient::new(&base_url(addr), Duration::from_millis(300)).unwrap();

    assert_eq!(client.balance(1, PaymentType::Cash).await, Ok(4200));
    assert!(
        client
            .balance(500, PaymentType::Cash)
            .await
            .unwrap_err()
            .is_retryable()
    );
    assert!(
        client
            .balance(600, PaymentType::Cash)
            .await
            .unwrap_err()
            .is_retryable()
    );
}

#[tokio::test]
async fn unreachable_service_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpPosClient::new(&base_url(addr), Duration::from_secs(1)).unwrap();
    assert!(matches!(
        client.pos_detail(10).await,
        Err(UpstreamError::Unavailable(_))
    ));
}

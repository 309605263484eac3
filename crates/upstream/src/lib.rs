//! HTTP clients for the pos and balance services.
//!
//! Both services speak JSON over `POST` and embed the outcome in the payload
//! as `status`/`error`. Transport failures and timeouts surface as
//! [`UpstreamError::Unavailable`]; any non-success status, embedded or on the
//! transport, surfaces as [`UpstreamError::Rejected`].

use std::time::Duration;

use api_types::{
    balance::{AdjustBalanceRequest, AdjustBalanceResponse, GetBalanceRequest, GetBalanceResponse},
    pos::{AdjustTotalRequest, AdjustTotalResponse, PosDetailRequest, PosDetailResponse},
};
use async_trait::async_trait;
use engine::{BalanceAdjusted, BalanceService, PaymentType, PosService, PosSnapshot, UpstreamError};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub const POS_DETAIL_PATH: &str = "/pos/detail";
pub const POS_ADJUST_PATH: &str = "/pos/adjust-total";
pub const BALANCE_ADJUST_PATH: &str = "/balance/adjust";
pub const BALANCE_GET_PATH: &str = "/balance/get";

/// Outcome fields every collaborator payload carries.
trait Envelope {
    fn status(&self) -> u16;
    fn error(&self) -> &str;
}

macro_rules! envelope {
    ($($ty:ty),+ $(,)?) => {
        $(impl Envelope for $ty {
            fn status(&self) -> u16 {
                self.status
            }

            fn error(&self) -> &str {
                &self.error
            }
        })+
    };
}

envelope!(
    PosDetailResponse,
    AdjustTotalResponse,
    AdjustBalanceResponse,
    GetBalanceResponse,
);

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Clone, Debug)]
struct JsonClient {
    client: Client,
    base_url: String,
}

impl JsonClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_json<TReq, TResp>(&self, path: &str, body: &TReq) -> Result<TResp, UpstreamError>
    where
        TReq: Serialize + ?Sized,
        TResp: DeserializeOwned + Envelope,
    {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|err| {
                tracing::debug!("request to {path} failed: {err}");
                UpstreamError::Unavailable(err.to_string())
            })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(UpstreamError::Unavailable(format!("{path} answered {status}")));
        }
        if !status.is_success() {
            let error = match resp.json::<ErrorBody>().await {
                Ok(body) if !body.error.is_empty() => body.error,
                _ => status
                    .canonical_reason()
                    .unwrap_or("upstream-error")
                    .to_lowercase()
                    .replace(' ', "-"),
            };
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                error,
            });
        }

        let payload = resp
            .json::<TResp>()
            .await
            .map_err(|err| UpstreamError::Unavailable(format!("malformed {path} response: {err}")))?;
        if !(200..300).contains(&payload.status()) {
            return Err(UpstreamError::Rejected {
                status: payload.status(),
                error: payload.error().to_string(),
            });
        }
        Ok(payload)
    }
}

/// [`PosService`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpPosClient {
    inner: JsonClient,
}

impl HttpPosClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            inner: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl PosService for HttpPosClient {
    async fn pos_detail(&self, pos_id: i64) -> Result<PosSnapshot, UpstreamError> {
        let resp: PosDetailResponse = self
            .inner
            .post_json(POS_DETAIL_PATH, &PosDetailRequest { id: pos_id })
            .await?;
        let pos = resp.pos.ok_or_else(|| UpstreamError::Rejected {
            status: 404,
            error: "pos-not-found".to_string(),
        })?;
        Ok(PosSnapshot {
            id: pos.id,
            user_id: pos.user_id,
            name: pos.name,
            pos_type: pos.pos_type,
            total: pos.total,
            color: pos.color,
        })
    }

    async fn adjust_total(
        &self,
        pos_id: i64,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<i64, UpstreamError> {
        let resp: AdjustTotalResponse = self
            .inner
            .post_json(
                POS_ADJUST_PATH,
                &AdjustTotalRequest {
                    id: pos_id,
                    amount,
                    idempotency_key: idempotency_key.to_string(),
                },
            )
            .await?;
        Ok(resp.total)
    }
}

/// [`BalanceService`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBalanceClient {
    inner: JsonClient,
}

impl HttpBalanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            inner: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl BalanceService for HttpBalanceClient {
    async fn adjust_balance(
        &self,
        user_id: i64,
        payment_type: PaymentType,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<BalanceAdjusted, UpstreamError> {
        let resp: AdjustBalanceResponse = self
            .inner
            .post_json(
                BALANCE_ADJUST_PATH,
                &AdjustBalanceRequest {
                    user_id,
                    payment_type: payment_type.as_i32(),
                    amount,
                    idempotency_key: idempotency_key.to_string(),
                },
            )
            .await?;
        Ok(BalanceAdjusted {
            id: resp.id,
            total: resp.total,
        })
    }

    async fn balance(&self, user_id: i64, payment_type: PaymentType) -> Result<i64, UpstreamError> {
        let resp: GetBalanceResponse = self
            .inner
            .post_json(
                BALANCE_GET_PATH,
                &GetBalanceRequest {
                    user_id,
                    payment_type: payment_type.as_i32(),
                },
            )
            .await?;
        Ok(resp.total)
    }
}

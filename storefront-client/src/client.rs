use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use shared::{
    CancelReservationRequest, CancelReservationResponse, CompleteReservationRequest,
    CompleteReservationResponse, CreateReservationRequest, CreateReservationResponse,
    ErrorResponse, ReservationStatusResponse, UpdateShareCountRequest, UpdateShareCountResponse,
};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error payload; `message` is what the UI
    /// shows in its toast (generic fallback when the body was unreadable).
    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Thin wrapper over the reservation endpoints.
#[derive(Debug, Clone)]
pub struct ReservationClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReservationClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        ReservationClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn create_reservation(
        &self,
        request: &CreateReservationRequest,
    ) -> Result<CreateReservationResponse, ClientError> {
        self.post("/api/create-reservation", request).await
    }

    pub async fn update_share_count(
        &self,
        request: &UpdateShareCountRequest,
    ) -> Result<UpdateShareCountResponse, ClientError> {
        self.post("/api/update-share-count", request).await
    }

    pub async fn cancel_reservation(
        &self,
        transaction_id: &str,
    ) -> Result<CancelReservationResponse, ClientError> {
        let request = CancelReservationRequest {
            transaction_id: Some(transaction_id.to_string()),
        };
        self.post("/api/cancel-reservation", &request).await
    }

    pub async fn expire_reservation(
        &self,
        transaction_id: &str,
    ) -> Result<CancelReservationResponse, ClientError> {
        let request = CancelReservationRequest {
            transaction_id: Some(transaction_id.to_string()),
        };
        self.post("/api/expire-reservation", &request).await
    }

    pub async fn complete_reservation(
        &self,
        request: &CompleteReservationRequest,
    ) -> Result<CompleteReservationResponse, ClientError> {
        self.post("/api/complete-reservation", request).await
    }

    pub async fn check_status(
        &self,
        transaction_id: &str,
    ) -> Result<ReservationStatusResponse, ClientError> {
        let url = format!("{}/api/check-reservation-status", self.base_url);
        let response = self
            .http
            .get(url)
            .query(&[("transaction_id", transaction_id)])
            .send()
            .await?;
        Self::read_response(response).await
    }

    /// Fire-and-forget cancel for page unload and refresh. Spawned onto the
    /// runtime and never awaited; delivery is not confirmed.
    pub fn send_cancel_beacon(&self, transaction_id: String) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.cancel_reservation(&transaction_id).await {
                debug!("cancel beacon for {} not delivered: {}", transaction_id, e);
            }
        });
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(url).json(body).send().await?;
        Self::read_response(response).await
    }

    async fn read_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => "request failed, please try again".to_string(),
        };
        Err(ClientError::Api { status: status.as_u16(), message })
    }
}

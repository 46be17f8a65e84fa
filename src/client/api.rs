// src/client/api.rs

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{
    catalog::CatalogDocument,
    models::{
        response::{ResponseAck, ResponseSubmission},
        session::{AdvanceRequest, AdvanceResponse, StartResponse, StatusResponse},
    },
};

/// Failures seen by the test-taker's client.
#[derive(Debug)]
pub enum ClientError {
    /// Network failure or server-side 5xx; retried on the next tick.
    Transient(String),

    /// The session id is unknown to the server; the flow has to restart.
    NotFound(String),

    /// Advance on a completed session.
    InvalidState(String),

    /// Anything the client cannot interpret.
    UnexpectedResponse(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transient(msg) => write!(f, "transient failure: {}", msg),
            ClientError::NotFound(msg) => write!(f, "session not found: {}", msg),
            ClientError::InvalidState(msg) => write!(f, "invalid session state: {}", msg),
            ClientError::UnexpectedResponse(msg) => write!(f, "unexpected response: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::UnexpectedResponse(err.to_string())
        } else {
            ClientError::Transient(err.to_string())
        }
    }
}

/// The session endpoints as seen from the client.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn config(&self) -> Result<CatalogDocument, ClientError>;

    async fn start(&self) -> Result<StartResponse, ClientError>;

    async fn status(&self, user_id: &str) -> Result<StatusResponse, ClientError>;

    async fn advance(&self, request: &AdvanceRequest) -> Result<AdvanceResponse, ClientError>;

    /// Saves an answer. The server accepts any number per question.
    async fn submit_response(
        &self,
        submission: &ResponseSubmission,
    ) -> Result<ResponseAck, ClientError>;
}

/// `SessionApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionApi {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }
}

/// Maps the server's status codes onto the client error taxonomy.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(body),
        StatusCode::CONFLICT => ClientError::InvalidState(body),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            ClientError::Transient(format!("{}: {}", s, body))
        }
        s => ClientError::UnexpectedResponse(format!("{}: {}", s, body)),
    })
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn config(&self) -> Result<CatalogDocument, ClientError> {
        let response = self.client.get(self.url("config")).send().await?;
        decode(response).await
    }

    async fn start(&self) -> Result<StartResponse, ClientError> {
        let response = self.client.post(self.url("start")).send().await?;
        decode(response).await
    }

    async fn status(&self, user_id: &str) -> Result<StatusResponse, ClientError> {
        let response = self
            .client
            .get(self.url("status"))
            .query(&[("userId", user_id)])
            .send()
            .await?;
        decode(response).await
    }

    async fn advance(&self, request: &AdvanceRequest) -> Result<AdvanceResponse, ClientError> {
        let response = self
            .client
            .post(self.url("advance"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    async fn submit_response(
        &self,
        submission: &ResponseSubmission,
    ) -> Result<ResponseAck, ClientError> {
        let mut form = reqwest::multipart::Form::new()
            .text("userId", submission.user_id.clone())
            .text("section", submission.section.clone())
            .text("questionId", submission.question_id.clone())
            .text("responseType", submission.response_type.clone())
            .text("autoSubmitted", submission.auto_submitted.to_string());
        if let Some(millis) = submission.time_taken_ms {
            form = form.text("timeTaken", millis.to_string());
        }
        if let Some(data) = &submission.response_data {
            form = form.text("responseData", data.clone());
        }

        let response = self
            .client
            .post(self.url("response"))
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }
}

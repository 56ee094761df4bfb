//! CLI Commands

use ballot_core::{ElectionId, Hash};
use ballot_election::SignedCall;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// API Client for interacting with a Ballot node
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn unwrap_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let resp: ApiResponse<T> = response.json().await?;

        if resp.success {
            resp.data.ok_or(ApiError::EmptyResponse)
        } else {
            Err(ApiError::Server(resp.error.unwrap_or_default()))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::unwrap_response(response).await
    }

    /// Get node status
    pub async fn status(&self) -> Result<NodeStatus, ApiError> {
        self.get("/status").await
    }

    /// Get election parameters
    pub async fn election(&self) -> Result<ElectionInfo, ApiError> {
        self.get("/election").await
    }

    /// Election id parsed from `/election`
    pub async fn election_id(&self) -> Result<ElectionId, ApiError> {
        let info = self.election().await?;
        Hash::from_hex(&info.election_id)
            .map_err(|e| ApiError::Server(format!("bad election id: {}", e)))
    }

    /// Get the current tally
    pub async fn results(&self) -> Result<ResultsInfo, ApiError> {
        self.get("/results").await
    }

    /// Get the current leader
    pub async fn winner(&self) -> Result<CandidateInfo, ApiError> {
        self.get("/winner").await
    }

    /// Look up a voter record
    pub async fn voter(&self, voter_id: &str) -> Result<VoterInfo, ApiError> {
        let response = self
            .client
            .get(self.url("/voter"))
            .query(&[("voter_id", voter_id)])
            .send()
            .await?;
        Self::unwrap_response(response).await
    }

    /// Submit a signed call
    pub async fn submit_call(&self, call: &SignedCall) -> Result<CallReceiptInfo, ApiError> {
        let response = self.client.post(self.url("/call")).json(call).send().await?;
        Self::unwrap_response(response).await
    }
}

/// API response wrapper
#[derive(Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Node status
#[derive(Debug, Deserialize)]
pub struct NodeStatus {
    pub node_name: String,
    pub node_address: String,
    pub election_id: String,
    pub state_version: u64,
    pub state_root: String,
}

/// Election parameters
#[derive(Debug, Deserialize)]
pub struct ElectionInfo {
    pub title: String,
    pub owner: String,
    pub election_id: String,
    pub candidate_count: usize,
    pub voter_count: usize,
    pub total_votes: u64,
}

#[derive(Debug, Deserialize)]
pub struct CandidateInfo {
    pub index: usize,
    pub name: String,
    pub image: String,
    pub vote_count: u64,
}

/// Current tally
#[derive(Debug, Deserialize)]
pub struct ResultsInfo {
    pub candidates: Vec<CandidateInfo>,
    pub total_votes: u64,
}

/// Voter record
#[derive(Debug, Deserialize)]
pub struct VoterInfo {
    pub voter_id: String,
    pub delegate: String,
    pub voted: bool,
    pub registered: bool,
}

/// Receipt for an accepted call
#[derive(Debug, Deserialize)]
pub struct CallReceiptInfo {
    pub call_id: String,
    pub call: String,
    pub transition: serde_json::Value,
    pub state_version: u64,
}

/// API Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Empty response")]
    EmptyResponse,
}

/// Percentage of `total` held by `count`, for result tables
pub fn share(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

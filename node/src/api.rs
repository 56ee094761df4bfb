//! HTTP API for the Ballot node

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ballot_core::{BallotError, VoterId};
use ballot_election::SignedCall;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::runtime::{CallReceipt, NodeRuntime};

/// API state containing node runtime
pub type ApiState = Arc<NodeRuntime>;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Node status response
#[derive(Serialize)]
pub struct NodeStatusResponse {
    pub node_name: String,
    pub node_address: String,
    pub election_id: String,
    pub state_version: u64,
    pub state_root: String,
}

/// Election response
#[derive(Serialize)]
pub struct ElectionResponse {
    pub title: String,
    pub owner: String,
    pub election_id: String,
    pub candidate_count: usize,
    pub voter_count: usize,
    pub total_votes: u64,
}

#[derive(Serialize)]
pub struct CandidateResponse {
    pub index: usize,
    pub name: String,
    pub image: String,
    pub vote_count: u64,
}

/// Results response
#[derive(Serialize)]
pub struct ResultsResponse {
    pub candidates: Vec<CandidateResponse>,
    pub total_votes: u64,
}

/// Voter lookup query
#[derive(Deserialize)]
pub struct VoterQuery {
    pub voter_id: String,
}

/// Voter response
#[derive(Serialize)]
pub struct VoterResponse {
    pub voter_id: String,
    pub delegate: String,
    pub voted: bool,
    pub registered: bool,
}

/// HTTP status for a failed call
pub fn error_status(error: &BallotError) -> StatusCode {
    match error {
        BallotError::Unauthorized | BallotError::AddressMismatch(_) => StatusCode::FORBIDDEN,
        BallotError::UnknownVoter(_) | BallotError::NoCandidates => StatusCode::NOT_FOUND,
        BallotError::AlreadyVoted | BallotError::ReplayedCall(_) => StatusCode::CONFLICT,
        BallotError::InvalidCandidate { .. }
        | BallotError::ElectionMismatch { .. }
        | BallotError::CallExpired
        | BallotError::InvalidCall(_) => StatusCode::BAD_REQUEST,
        BallotError::InvalidSignature
        | BallotError::InvalidPublicKey
        | BallotError::InvalidAddress(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let api = &state.config().api;
    let cors = if api.enable_cors {
        Some(cors_layer(&api.cors_origins))
    } else {
        None
    };

    let router = Router::new()
        // Health
        .route("/health", get(health))
        .route("/status", get(status))
        // Election
        .route("/election", get(election))
        .route("/results", get(results))
        .route("/winner", get(winner))
        .route("/voter", get(voter))
        // Calls
        .route("/call", post(submit_call))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Node status
async fn status(State(runtime): State<ApiState>) -> impl IntoResponse {
    let (state_version, state_root) = runtime.state();
    let status = NodeStatusResponse {
        node_name: runtime.config().name.clone(),
        node_address: runtime.node_address().to_hex(),
        election_id: runtime.election_id().to_hex(),
        state_version: state_version.0,
        state_root: state_root.to_hex(),
    };

    Json(ApiResponse::ok(status))
}

/// Election parameters
async fn election(State(runtime): State<ApiState>) -> impl IntoResponse {
    let summary = runtime.summary();
    let response = ElectionResponse {
        title: summary.title,
        owner: summary.owner.to_hex(),
        election_id: runtime.election_id().to_hex(),
        candidate_count: summary.candidate_count,
        voter_count: summary.voter_count,
        total_votes: summary.total_votes,
    };

    Json(ApiResponse::ok(response))
}

/// Current tally
async fn results(State(runtime): State<ApiState>) -> impl IntoResponse {
    let results = runtime.results();
    let response = ResultsResponse {
        candidates: results
            .candidates
            .into_iter()
            .enumerate()
            .map(|(index, c)| CandidateResponse {
                index,
                name: c.name,
                image: c.image,
                vote_count: c.vote_count,
            })
            .collect(),
        total_votes: results.total_votes,
    };

    Json(ApiResponse::ok(response))
}

/// Current leader
async fn winner(State(runtime): State<ApiState>) -> impl IntoResponse {
    match runtime.winner() {
        Ok((index, c)) => {
            let response = CandidateResponse {
                index,
                name: c.name,
                image: c.image,
                vote_count: c.vote_count,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response)))
        }
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::<CandidateResponse>::err(e)),
        ),
    }
}

/// Voter record lookup. Unregistered ids return the default record.
async fn voter(
    State(runtime): State<ApiState>,
    Query(query): Query<VoterQuery>,
) -> impl IntoResponse {
    let voter_id = VoterId::new(query.voter_id);
    let registration = runtime.registration(&voter_id);
    let record = registration.unwrap_or_default();

    let response = VoterResponse {
        registered: registration.is_some(),
        voter_id: voter_id.0,
        delegate: record.delegate.to_hex(),
        voted: record.voted,
    };

    Json(ApiResponse::ok(response))
}

/// Submit a signed call
async fn submit_call(
    State(runtime): State<ApiState>,
    Json(call): Json<SignedCall>,
) -> impl IntoResponse {
    match runtime.submit_call(call).await {
        Ok(receipt) => (StatusCode::OK, Json(ApiResponse::ok(receipt))),
        Err(e) => (error_status(&e), Json(ApiResponse::<CallReceipt>::err(e))),
    }
}

/// Start API server
pub async fn start_api_server(runtime: Arc<NodeRuntime>, listen_addr: &str) -> anyhow::Result<()> {
    let router = create_router(runtime);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("API server listening on {}", listen_addr);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ballot_core::NodeConfig;
    use ballot_crypto::keys::KeyPair;
    use ballot_election::{BallotCall, ElectionGenesis};
    use serde_json::Value;
    use tower::ServiceExt;

    struct Fixture {
        runtime: Arc<NodeRuntime>,
        owner: KeyPair,
        voter: KeyPair,
    }

    async fn fixture() -> Fixture {
        let owner = KeyPair::generate();
        let voter = KeyPair::generate();
        let genesis =
            ElectionGenesis::devnet(owner.address()).add_voter("SCII/00721/2017", voter.address());

        let runtime = NodeRuntime::initialize(NodeConfig::default(), KeyPair::generate(), genesis)
            .await
            .unwrap();

        Fixture {
            runtime: Arc::new(runtime),
            owner,
            voter,
        }
    }

    async fn get_json(runtime: &ApiState, uri: &str) -> (StatusCode, Value) {
        let response = create_router(runtime.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_call(runtime: &ApiState, call: &SignedCall) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/call")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(call).unwrap()))
            .unwrap();
        let response = create_router(runtime.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn vote(f: &Fixture, candidate_index: usize) -> SignedCall {
        SignedCall::new(
            BallotCall::Vote {
                voter_id: VoterId::from("SCII/00721/2017"),
                candidate_index,
            },
            f.runtime.election_id(),
            &f.voter,
        )
    }

    #[tokio::test]
    async fn test_health_and_election() {
        let f = fixture().await;

        let (status, body) = get_json(&f.runtime, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(&f.runtime, "/election").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["title"], "Ballot Devnet");
        assert_eq!(body["data"]["owner"], f.owner.address().to_hex());
        assert_eq!(body["data"]["candidate_count"], 3);
    }

    #[tokio::test]
    async fn test_vote_and_results() {
        let f = fixture().await;

        let (status, body) = post_call(&f.runtime, &vote(&f, 1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["call"], "vote");
        assert_eq!(body["data"]["transition"]["type"], "vote_cast");

        let (_, body) = get_json(&f.runtime, "/results").await;
        assert_eq!(body["data"]["total_votes"], 1);
        assert_eq!(body["data"]["candidates"][1]["name"], "Rust");
        assert_eq!(body["data"]["candidates"][1]["vote_count"], 1);

        let (_, body) = get_json(&f.runtime, "/winner").await;
        assert_eq!(body["data"]["name"], "Rust");
    }

    #[tokio::test]
    async fn test_double_vote_conflict() {
        let f = fixture().await;

        post_call(&f.runtime, &vote(&f, 0)).await;
        let (status, body) = post_call(&f.runtime, &vote(&f, 2)).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "You have already voted.");
    }

    #[tokio::test]
    async fn test_rejection_statuses() {
        let f = fixture().await;

        // Non-owner registration
        let rogue = SignedCall::new(
            BallotCall::RegisterProposal {
                name: "Go".into(),
                image: String::new(),
            },
            f.runtime.election_id(),
            &f.voter,
        );
        let (status, _) = post_call(&f.runtime, &rogue).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Out of range candidate
        let (status, _) = post_call(&f.runtime, &vote(&f, 9)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Tampered signature
        let mut tampered = vote(&f, 0);
        tampered.signature.0[0] ^= 0xff;
        let (status, _) = post_call(&f.runtime, &tampered).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_voter_lookup_with_slashes() {
        let f = fixture().await;

        let (status, body) = get_json(&f.runtime, "/voter?voter_id=SCII%2F00721%2F2017").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["voter_id"], "SCII/00721/2017");
        assert_eq!(body["data"]["delegate"], f.voter.address().to_hex());
        assert_eq!(body["data"]["registered"], true);
        assert_eq!(body["data"]["voted"], false);

        let (_, body) = get_json(&f.runtime, "/voter?voter_id=nobody").await;
        assert_eq!(body["data"]["registered"], false);
        assert_eq!(body["data"]["delegate"], "00".repeat(32));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(error_status(&BallotError::AlreadyVoted), StatusCode::CONFLICT);
        assert_eq!(error_status(&BallotError::NoCandidates), StatusCode::NOT_FOUND);
        assert_eq!(
            error_status(&BallotError::StorageError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

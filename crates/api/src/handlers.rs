use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use heirloom_storage::{KvStore, SnapshotStore};
use heirloom_types::{EntityType, Network, PairId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub struct ApiState {
    pub store: Arc<dyn KvStore>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    pub module: Option<String>,
    pub chain: Option<String>,
}

/// Maps the `module` parameter to an entity type. Absent means attesters.
pub fn resolve_module(module: Option<&str>) -> Option<EntityType> {
    match module {
        Some(raw) => EntityType::from_module(&raw.trim().to_lowercase()),
        None => Some(EntityType::Attester),
    }
}

/// `sepolia` and `testnet` select the testnet; anything else is mainnet.
pub fn resolve_network(chain: Option<&str>) -> Network {
    match chain.map(|raw| raw.trim().to_lowercase()).as_deref() {
        Some("sepolia") | Some("testnet") => Network::Testnet,
        _ => Network::Mainnet,
    }
}

fn text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// Every stored snapshot of one module on one network, one JSON document per
/// line.
pub async fn get_snapshots(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    let Some(entity) = resolve_module(query.module.as_deref()) else {
        return text(
            StatusCode::BAD_REQUEST,
            "Invalid module. Use ?module=attesters or ?module=safes or ?module=claims".to_string(),
        );
    };
    let network = resolve_network(query.chain.as_deref());
    let pair = PairId::new(entity, network);

    let values = match SnapshotStore::new(state.store.clone()).raw_values(pair).await {
        Ok(values) => values,
        Err(e) => {
            error!(entity = %entity, network = %network, "failed to read snapshots: {}", e);
            return text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error reading store: {}", e),
            );
        }
    };

    if values.is_empty() {
        return text(
            StatusCode::NOT_FOUND,
            format!("No data found for {} on {}", entity.module_name(), network),
        );
    }

    let mut body = String::new();
    for value in values {
        body.push_str(&value);
        body.push('\n');
    }
    text(StatusCode::OK, body)
}

/// Store reachability.
pub async fn health_check(
    State(state): State<Arc<ApiState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    use serde_json::json;

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "store": "reachable" })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "store": e.to_string() })),
        ),
    }
}

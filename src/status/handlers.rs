use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{ClusterResponse, NodeResponse};
use crate::cluster::LiveCluster;

pub async fn handle_list_members(
    Extension(cluster): Extension<Arc<LiveCluster>>,
) -> (StatusCode, Json<ClusterResponse>) {
    let nodes = cluster.snapshots().await;
    (
        StatusCode::OK,
        Json(ClusterResponse {
            running: cluster.running(),
            nodes,
        }),
    )
}

pub async fn handle_get_member(
    Extension(cluster): Extension<Arc<LiveCluster>>,
    Path(id_str): Path<String>,
) -> (StatusCode, Json<NodeResponse>) {
    let id: u32 = match id_str.parse() {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to parse node id {:?}: {}", id_str, e);
            return (StatusCode::BAD_REQUEST, Json(NodeResponse { node: None }));
        }
    };

    match cluster.snapshot(id).await {
        Some(node) => (StatusCode::OK, Json(NodeResponse { node: Some(node) })),
        None => (StatusCode::NOT_FOUND, Json(NodeResponse { node: None })),
    }
}

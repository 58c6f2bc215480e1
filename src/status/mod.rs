//! Status API
//!
//! Read-only HTTP view of a live cluster:
//!
//! - `GET /members`: every node's snapshot (group flag, heartbeat, table).
//! - `GET /members/:id`: one node's snapshot, 404 if the id is unknown.

pub mod handlers;
pub mod protocol;

use axum::{Router, extract::Extension, routing::get};
use std::sync::Arc;

use crate::cluster::LiveCluster;
use handlers::{handle_get_member, handle_list_members};

pub fn router(cluster: Arc<LiveCluster>) -> Router {
    Router::new()
        .route("/members", get(handle_list_members))
        .route("/members/:id", get(handle_get_member))
        .layer(Extension(cluster))
}

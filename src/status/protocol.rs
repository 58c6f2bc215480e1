use crate::membership::node::NodeSnapshot;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub running: usize,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub node: Option<NodeSnapshot>,
}

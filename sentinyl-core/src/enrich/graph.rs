//! Investigation-graph ingestion.
//!
//! Findings become nodes and edges in a property graph:
//!
//! ```text
//! (Domain)-[RESOLVES_TO]->(IpAddress)
//! (Domain)-[HAS_NAMESERVER]->(Nameserver)
//! (Repository)-[EXPOSES]->(Secret)
//! ```
//!
//! The graph is an optional collaborator: when the service is unreachable
//! at startup the whole capability degrades to a no-op behind one warning
//! and the rest of the pipeline keeps running.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, SentinylError};

/// A node to merge by `(label, id)`.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub label: &'static str,
    pub id: String,
    pub properties: BTreeMap<String, Value>,
}

impl GraphNode {
    pub fn new(label: &'static str, id: impl Into<String>) -> Self {
        Self {
            label,
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// An outgoing edge from the primary node of an ingestion.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub rel_type: &'static str,
    pub to: GraphNode,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge the primary node and each outgoing edge (and its far node).
    async fn ingest(&self, node: GraphNode, edges: Vec<GraphEdge>) -> Result<()>;

    fn is_available(&self) -> bool;
}

/// Stand-in used when no graph service is configured or reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGraph;

#[async_trait]
impl GraphStore for NoopGraph {
    async fn ingest(&self, _node: GraphNode, _edges: Vec<GraphEdge>) -> Result<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Graph service client speaking the HTTP transaction endpoint.
#[derive(Debug, Clone)]
pub struct HttpGraphStore {
    client: reqwest::Client,
    tx_url: String,
    user: Option<String>,
    password: Option<String>,
}

impl HttpGraphStore {
    /// Probe the service and return a live client, or `None` (with a
    /// single warning) when it cannot be reached.
    pub async fn connect(
        base_url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Option<Self> {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Graph client construction failed - graph features disabled: {e}");
                return None;
            }
        };

        let store = Self {
            client,
            tx_url: format!("{}/db/neo4j/tx/commit", base_url.trim_end_matches('/')),
            user: user.map(str::to_string),
            password: password.map(str::to_string),
        };

        match store.run_statements(vec![("RETURN 1".to_string(), Value::Null)]).await {
            Ok(()) => {
                info!("Connected to graph service at {base_url}");
                Some(store)
            }
            Err(e) => {
                warn!("Graph service unavailable at {base_url} - graph features disabled: {e}");
                None
            }
        }
    }

    async fn run_statements(&self, statements: Vec<(String, Value)>) -> Result<()> {
        let body = serde_json::json!({
            "statements": statements
                .into_iter()
                .map(|(statement, parameters)| {
                    if parameters.is_null() {
                        serde_json::json!({ "statement": statement })
                    } else {
                        serde_json::json!({ "statement": statement, "parameters": parameters })
                    }
                })
                .collect::<Vec<_>>(),
        });

        let mut request = self.client.post(&self.tx_url).json(&body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SentinylError::Transport(format!(
                "graph service returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(SentinylError::Transport(format!(
                    "graph statement failed: {}",
                    errors[0]
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    async fn ingest(&self, node: GraphNode, edges: Vec<GraphEdge>) -> Result<()> {
        let mut statements = vec![merge_node_statement(&node)];

        for edge in &edges {
            statements.push(merge_node_statement(&edge.to));
            statements.push(merge_edge_statement(&node, edge));
        }

        self.run_statements(statements).await?;
        debug!("Ingested {} node {} into graph", node.label, node.id);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn merge_node_statement(node: &GraphNode) -> (String, Value) {
    let statement = format!(
        "MERGE (n:{} {{id: $id}}) SET n += $props",
        node.label
    );
    let params = serde_json::json!({
        "id": node.id,
        "props": node.properties,
    });
    (statement, params)
}

fn merge_edge_statement(from: &GraphNode, edge: &GraphEdge) -> (String, Value) {
    let statement = format!(
        "MATCH (a:{} {{id: $from_id}}) MATCH (b:{} {{id: $to_id}}) MERGE (a)-[:{}]->(b)",
        from.label, edge.to.label, edge.rel_type
    );
    let params = serde_json::json!({
        "from_id": from.id,
        "to_id": edge.to.id,
    });
    (statement, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_graph_accepts_everything_silently() {
        let graph = NoopGraph;
        assert!(!graph.is_available());
        let node = GraphNode::new("Domain", "evil.com").property("malicious", true);
        graph.ingest(node, Vec::new()).await.unwrap();
    }

    #[test]
    fn merge_statements_address_nodes_by_id() {
        let node = GraphNode::new("Domain", "examp1ebank.com").property("malicious", true);
        let (statement, params) = merge_node_statement(&node);
        assert!(statement.starts_with("MERGE (n:Domain {id: $id})"));
        assert_eq!(params["id"], "examp1ebank.com");
        assert_eq!(params["props"]["malicious"], true);

        let edge = GraphEdge {
            rel_type: "RESOLVES_TO",
            to: GraphNode::new("IpAddress", "203.0.113.9"),
        };
        let (statement, params) = merge_edge_statement(&node, &edge);
        assert!(statement.contains("MERGE (a)-[:RESOLVES_TO]->(b)"));
        assert_eq!(params["from_id"], "examp1ebank.com");
        assert_eq!(params["to_id"], "203.0.113.9");
    }
}

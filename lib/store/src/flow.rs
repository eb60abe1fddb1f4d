//! Postgres repository for flows.
//!
//! The graph lives in a JSONB column; the execution counters live in
//! dedicated columns so the engine can bump them with single atomic UPDATE
//! statements instead of rewriting the document.

use crate::error::RepositoryError;
use async_trait::async_trait;
use chatflow_core::{AccountId, FlowId};
use chatflow_engine::{FlowStore, StoreError};
use chatflow_flow::{Flow, FlowGraph, FlowStats, FlowStatus};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for flow queries.
#[derive(FromRow)]
struct FlowRow {
    id: String,
    account_id: String,
    name: String,
    description: Option<String>,
    status: String,
    graph_data: serde_json::Value,
    total_executions: i64,
    successful_executions: i64,
    failed_executions: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FlowRow {
    fn try_into_flow(self) -> Result<Flow, sqlx::Error> {
        let id = FlowId::from_str(&self.id).map_err(|e| decode_error("flow id", &self.id, &e))?;
        let account_id = AccountId::from_str(&self.account_id)
            .map_err(|e| decode_error("account id", &self.account_id, &e))?;
        let status = FlowStatus::from_str(&self.status)
            .map_err(|e| decode_error("flow status", &self.status, &e))?;

        let mut graph: FlowGraph = serde_json::from_value(self.graph_data)
            .map_err(|e| decode_error("flow graph", &self.id, &e))?;
        graph.rebuild_index_map();

        Ok(Flow {
            id,
            account_id,
            name: self.name,
            description: self.description,
            status,
            graph,
            stats: FlowStats {
                total_executions: self.total_executions.max(0) as u64,
                successful_executions: self.successful_executions.max(0) as u64,
                failed_executions: self.failed_executions.max(0) as u64,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn decode_error(what: &str, value: &str, source: &dyn std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {what} '{value}': {source}"),
    )))
}

const FLOW_COLUMNS: &str = "id, account_id, name, description, status, graph_data, \
     total_executions, successful_executions, failed_executions, created_at, updated_at";

/// Repository for flow operations.
pub struct FlowRepository {
    pool: PgPool,
}

impl FlowRepository {
    /// Creates a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds a flow by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or row decoding fails.
    pub async fn find_by_id(&self, id: FlowId) -> Result<Option<Flow>, sqlx::Error> {
        let row: Option<FlowRow> = sqlx::query_as(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into_flow()?)),
            None => Ok(None),
        }
    }

    /// Lists all of an account's flows, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or row decoding fails.
    pub async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Flow>, sqlx::Error> {
        let rows: Vec<FlowRow> = sqlx::query_as(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE account_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_flow()).collect()
    }

    /// Lists an account's active flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or row decoding fails.
    pub async fn list_active_flows(&self, account_id: AccountId) -> Result<Vec<Flow>, sqlx::Error> {
        let rows: Vec<FlowRow> = sqlx::query_as(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE account_id = $1 AND status = 'active'"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_flow()).collect()
    }

    /// Creates a new flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph fails validation or the insert fails.
    pub async fn create(&self, flow: &Flow) -> Result<(), RepositoryError> {
        // A draft may be saved without a trigger, but cycles are never
        // allowed in.
        flow.graph
            .validate_acyclic()
            .map_err(chatflow_flow::FlowError::from)?;

        let graph_json = serde_json::to_value(&flow.graph)
            .map_err(|e| RepositoryError::Database(decode_error("flow graph", "new", &e)))?;

        sqlx::query(
            r#"
            INSERT INTO flows
                (id, account_id, name, description, status, graph_data,
                 total_executions, successful_executions, failed_executions,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(flow.id.to_string())
        .bind(flow.account_id.to_string())
        .bind(&flow.name)
        .bind(&flow.description)
        .bind(flow.status.as_str())
        .bind(&graph_json)
        .bind(flow.stats.total_executions as i64)
        .bind(flow.stats.successful_executions as i64)
        .bind(flow.stats.failed_executions as i64)
        .bind(flow.created_at)
        .bind(flow.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a flow's metadata and graph. Counters are not written here;
    /// they only move through the record_* methods.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph fails validation or the update fails.
    pub async fn update(&self, flow: &Flow) -> Result<(), RepositoryError> {
        flow.graph
            .validate_acyclic()
            .map_err(chatflow_flow::FlowError::from)?;

        let graph_json = serde_json::to_value(&flow.graph).map_err(|e| {
            RepositoryError::Database(decode_error("flow graph", &flow.id.to_string(), &e))
        })?;

        sqlx::query(
            r#"
            UPDATE flows
            SET name = $2, description = $3, status = $4, graph_data = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(flow.id.to_string())
        .bind(&flow.name)
        .bind(&flow.description)
        .bind(flow.status.as_str())
        .bind(&graph_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes a flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: FlowId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM flows WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Activates a flow, refusing when the account is already at its
    /// active-flow quota.
    ///
    /// The read and the status flip run in one transaction so two
    /// concurrent activations cannot both slip under the quota.
    ///
    /// # Errors
    ///
    /// Returns an error when the flow does not exist, its graph fails
    /// validation, the quota is reached, or the database fails.
    pub async fn activate(&self, id: FlowId, max_active: u32) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<FlowRow> = sqlx::query_as(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let flow = row
            .ok_or(RepositoryError::Flow(chatflow_flow::FlowError::NotFound {
                flow_id: id,
            }))?
            .try_into_flow()?;

        flow.validate().map_err(chatflow_flow::FlowError::from)?;

        if !flow.is_active() {
            let (active_count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM flows WHERE account_id = $1 AND status = 'active'",
            )
            .bind(flow.account_id.to_string())
            .fetch_one(&mut *tx)
            .await?;

            if active_count >= i64::from(max_active) {
                return Err(RepositoryError::Flow(
                    chatflow_flow::FlowError::QuotaExceeded {
                        account_id: flow.account_id,
                        limit: max_active,
                    },
                ));
            }
        }

        sqlx::query("UPDATE flows SET status = 'active', updated_at = NOW() WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Sets a flow's status without quota checks (pause, back to draft).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_status(&self, id: FlowId, status: FlowStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE flows SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.to_string())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn increment(&self, id: FlowId, column: &str) -> Result<(), sqlx::Error> {
        // column comes from the three fixed callers below, never from input
        sqlx::query(&format!(
            "UPDATE flows SET {column} = {column} + 1 WHERE id = $1"
        ))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl FlowStore for FlowRepository {
    async fn get(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError> {
        self.find_by_id(flow_id).await.map_err(into_store_error)
    }

    async fn list_active(&self, account_id: AccountId) -> Result<Vec<Flow>, StoreError> {
        self.list_active_flows(account_id)
            .await
            .map_err(into_store_error)
    }

    async fn record_trigger(&self, flow_id: FlowId) -> Result<(), StoreError> {
        self.increment(flow_id, "total_executions")
            .await
            .map_err(into_store_error)
    }

    async fn record_success(&self, flow_id: FlowId) -> Result<(), StoreError> {
        self.increment(flow_id, "successful_executions")
            .await
            .map_err(into_store_error)
    }

    async fn record_failure(&self, flow_id: FlowId) -> Result<(), StoreError> {
        self.increment(flow_id, "failed_executions")
            .await
            .map_err(into_store_error)
    }
}

pub(crate) fn into_store_error(e: sqlx::Error) -> StoreError {
    StoreError::Backend {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_flow::{Edge, Node, TriggerData, TriggerType};

    fn sample_graph_json() -> serde_json::Value {
        let mut graph = FlowGraph::new();
        graph
            .add_node(Node::trigger(
                "entry",
                TriggerData::new(TriggerType::InstagramDm),
            ))
            .unwrap();
        graph
            .add_node(Node::action(
                "greet",
                chatflow_flow::ActionConfig::SendDm {
                    message: "Hi!".to_string(),
                },
            ))
            .unwrap();
        graph.add_edge(Edge::new("e1", "entry", "greet")).unwrap();
        serde_json::to_value(&graph).unwrap()
    }

    fn sample_row() -> FlowRow {
        let now = Utc::now();
        FlowRow {
            id: FlowId::new().to_string(),
            account_id: AccountId::new().to_string(),
            name: "Welcome".to_string(),
            description: None,
            status: "active".to_string(),
            graph_data: sample_graph_json(),
            total_executions: 7,
            successful_executions: 5,
            failed_executions: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_flow() {
        let flow = sample_row().try_into_flow().expect("conversion");
        assert_eq!(flow.status, FlowStatus::Active);
        assert_eq!(flow.stats.total_executions, 7);
        assert_eq!(flow.graph.node_count(), 2);
        // The index map was rebuilt: successor lookup works.
        assert_eq!(
            flow.graph
                .successors(&chatflow_flow::NodeId::new("entry"), None)
                .len(),
            1
        );
    }

    #[test]
    fn row_with_bad_id_fails_to_convert() {
        let mut row = sample_row();
        row.id = "not-a-flow-id".to_string();
        assert!(row.try_into_flow().is_err());
    }

    #[test]
    fn row_with_unknown_status_fails_to_convert() {
        let mut row = sample_row();
        row.status = "archived".to_string();
        assert!(row.try_into_flow().is_err());
    }
}

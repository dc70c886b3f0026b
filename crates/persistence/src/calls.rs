//! Call record persistence using ScyllaDB

use std::collections::HashMap;

use async_trait::async_trait;
use callbridge_core::{CallMetadata, CallRecord, CallStatus, CostBreakdown, TranscriptEntry};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{PersistenceError, ScyllaClient};

fn status_from_str(s: &str) -> CallStatus {
    match s {
        "completed" => CallStatus::Completed,
        "billing_pending" => CallStatus::BillingPending,
        _ => CallStatus::Aborted,
    }
}

/// Call record store trait
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    /// Persist the final record for a call. Records are written once at
    /// call end and never updated.
    async fn record(&self, record: &CallRecord) -> Result<(), PersistenceError>;

    /// Fetch a call record by its telephony call identifier
    async fn get(&self, call_sid: &str) -> Result<Option<CallRecord>, PersistenceError>;
}

/// ScyllaDB implementation of the call record store
#[derive(Clone)]
pub struct ScyllaCallStore {
    client: ScyllaClient,
}

impl ScyllaCallStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallRecordStore for ScyllaCallStore {
    async fn record(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        let transcript_json = serde_json::to_string(&record.transcript)?;
        let costs_json = serde_json::to_string(&record.costs)?;

        let query = format!(
            "INSERT INTO {}.calls (
                call_sid, stream_sid, user_id, campaign_id, prompt_id,
                phone_number, customer_name, status, duration_secs,
                transcript_json, summary, costs_json, pipeline_id, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &record.metadata.call_sid,
                    &record.metadata.stream_sid,
                    &record.metadata.user_id,
                    &record.metadata.campaign_id,
                    &record.metadata.prompt_id,
                    &record.metadata.phone_number,
                    &record.metadata.customer_name,
                    record.status.as_str(),
                    record.duration_secs,
                    &transcript_json,
                    &record.summary,
                    &costs_json,
                    &record.pipeline_id,
                    record.ended_at.timestamp_millis(),
                ),
            )
            .await?;

        let by_user = format!(
            "INSERT INTO {}.calls_by_user (
                user_id, ended_at, call_sid, status, duration_secs, charged
            ) VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                by_user,
                (
                    &record.metadata.user_id,
                    record.ended_at.timestamp_millis(),
                    &record.metadata.call_sid,
                    record.status.as_str(),
                    record.duration_secs,
                    record.costs.charged,
                ),
            )
            .await?;

        tracing::info!(
            call_sid = %record.metadata.call_sid,
            user_id = %record.metadata.user_id,
            status = %record.status.as_str(),
            duration_secs = record.duration_secs,
            charged = record.costs.charged,
            "Call record persisted"
        );

        Ok(())
    }

    async fn get(&self, call_sid: &str) -> Result<Option<CallRecord>, PersistenceError> {
        let query = format!(
            "SELECT call_sid, stream_sid, user_id, campaign_id, prompt_id,
                    phone_number, customer_name, status, duration_secs,
                    transcript_json, summary, costs_json, pipeline_id, ended_at
             FROM {}.calls WHERE call_sid = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (call_sid,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(row_to_record(row)?));
            }
        }

        Ok(None)
    }
}

fn row_to_record(
    row: scylla::frame::response::result::Row,
) -> Result<CallRecord, PersistenceError> {
    let (
        call_sid,
        stream_sid,
        user_id,
        campaign_id,
        prompt_id,
        phone_number,
        customer_name,
        status,
        duration_secs,
        transcript_json,
        summary,
        costs_json,
        pipeline_id,
        ended_at,
    ): (
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        f64,
        String,
        String,
        String,
        String,
        i64,
    ) = row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

    let transcript: Vec<TranscriptEntry> = serde_json::from_str(&transcript_json)?;
    let costs: CostBreakdown = serde_json::from_str(&costs_json)?;

    Ok(CallRecord {
        metadata: CallMetadata {
            call_sid,
            stream_sid,
            user_id,
            campaign_id,
            prompt_id,
            phone_number,
            customer_name,
        },
        status: status_from_str(&status),
        duration_secs,
        transcript,
        summary,
        costs,
        pipeline_id,
        ended_at: DateTime::from_timestamp_millis(ended_at).unwrap_or_else(Utc::now),
    })
}

/// In-memory call record store, used when persistence is disabled and in tests
#[derive(Default)]
pub struct InMemoryCallStore {
    records: RwLock<HashMap<String, CallRecord>>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl CallRecordStore for InMemoryCallStore {
    async fn record(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        self.records.write().insert(record.metadata.call_sid.clone(), record.clone());
        tracing::debug!(call_sid = %record.metadata.call_sid, "Call record stored in memory");
        Ok(())
    }

    async fn get(&self, call_sid: &str) -> Result<Option<CallRecord>, PersistenceError> {
        Ok(self.records.read().get(call_sid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::TurnRole;

    fn sample_record() -> CallRecord {
        CallRecord {
            metadata: CallMetadata {
                call_sid: "CA123".to_string(),
                stream_sid: "MZ456".to_string(),
                user_id: "user-1".to_string(),
                campaign_id: "camp-1".to_string(),
                prompt_id: "prompt-1".to_string(),
                phone_number: "+15551234567".to_string(),
                customer_name: "Ada".to_string(),
            },
            status: CallStatus::Completed,
            duration_secs: 42.5,
            transcript: vec![TranscriptEntry {
                speaker: TurnRole::User,
                text: "hello".to_string(),
                timestamp: Utc::now(),
            }],
            summary: "Short greeting call".to_string(),
            costs: CostBreakdown { charged: 0.71, ..Default::default() },
            pipeline_id: "pipe-1".to_string(),
            ended_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemoryCallStore::new();
        let record = sample_record();

        store.record(&record).await.unwrap();
        assert_eq!(store.len(), 1);

        let fetched = store.get("CA123").await.unwrap().unwrap();
        assert_eq!(fetched.metadata.stream_sid, "MZ456");
        assert_eq!(fetched.status, CallStatus::Completed);
        assert_eq!(fetched.transcript.len(), 1);

        assert!(store.get("CA999").await.unwrap().is_none());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(status_from_str("completed"), CallStatus::Completed);
        assert_eq!(status_from_str("billing_pending"), CallStatus::BillingPending);
        assert_eq!(status_from_str("aborted"), CallStatus::Aborted);
        assert_eq!(status_from_str("garbage"), CallStatus::Aborted);
    }
}

//! ScyllaDB schema creation

use scylla::Session;

use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Call records, one row per finished call
    let calls_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.calls (
            call_sid TEXT,
            stream_sid TEXT,
            user_id TEXT,
            campaign_id TEXT,
            prompt_id TEXT,
            phone_number TEXT,
            customer_name TEXT,
            status TEXT,
            duration_secs DOUBLE,
            transcript_json TEXT,
            summary TEXT,
            costs_json TEXT,
            pipeline_id TEXT,
            ended_at TIMESTAMP,
            PRIMARY KEY (call_sid)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(calls_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create calls table: {}", e)))?;

    // Per-user call history, newest first
    let calls_by_user_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.calls_by_user (
            user_id TEXT,
            ended_at TIMESTAMP,
            call_sid TEXT,
            status TEXT,
            duration_secs DOUBLE,
            charged DOUBLE,
            PRIMARY KEY ((user_id), ended_at, call_sid)
        ) WITH CLUSTERING ORDER BY (ended_at DESC, call_sid DESC)
    "#,
        keyspace
    );

    session.query_unpaged(calls_by_user_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create calls_by_user table: {}", e))
    })?;

    // Prompt and voice configurations
    let prompts_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.prompts (
            prompt_id TEXT,
            system_prompt TEXT,
            greeting TEXT,
            voice_id TEXT,
            updated_at TIMESTAMP,
            PRIMARY KEY (prompt_id)
        )
    "#,
        keyspace
    );

    session.query_unpaged(prompts_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create prompts table: {}", e))
    })?;

    tracing::info!("All tables created successfully");
    Ok(())
}

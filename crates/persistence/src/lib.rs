//! Persistence layer for the call bridge
//!
//! Provides persistent storage for:
//! - Call records (transcript, summary, cost breakdown, final status)
//! - Prompt/voice configurations resolved at call start
//! - The billing RPC that deducts the charged amount from a user balance
//!
//! Every store is a trait with a ScyllaDB implementation and an in-memory
//! implementation, so the server runs without a database when persistence
//! is disabled.

pub mod billing;
pub mod calls;
pub mod client;
pub mod error;
pub mod prompts;
pub mod schema;

pub use billing::{
    BillingConfig, BillingService, HttpBillingService, InMemoryBillingService, NoopBillingService,
};
pub use calls::{CallRecordStore, InMemoryCallStore, ScyllaCallStore};
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use prompts::{InMemoryPromptStore, PromptStore, ScyllaPromptStore};

/// Initialize the persistence layer against ScyllaDB
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        calls: ScyllaCallStore::new(client.clone()),
        prompts: ScyllaPromptStore::new(client),
    })
}

/// Combined persistence layer with all ScyllaDB-backed stores
pub struct PersistenceLayer {
    pub calls: ScyllaCallStore,
    pub prompts: ScyllaPromptStore,
}

//! Billing RPC that deducts the charged amount from a user balance
//!
//! The deduction carries the call identifier as an idempotency reference so
//! retries after a timeout cannot double-charge.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::PersistenceError;

/// Billing service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Billing endpoint
    pub url: String,
    /// Bearer token
    pub api_key: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8084/v1/deduct".to_string(),
            api_key: String::new(),
            timeout_ms: 5_000,
        }
    }
}

/// Billing service trait
#[async_trait]
pub trait BillingService: Send + Sync {
    /// Deduct `amount` from the user's balance. `reference` is the call
    /// identifier, used as the idempotency key on the billing side.
    async fn deduct(
        &self,
        user_id: &str,
        amount: f64,
        reference: &str,
    ) -> Result<(), PersistenceError>;
}

#[derive(Debug, Serialize)]
struct DeductRequest<'a> {
    user_id: &'a str,
    amount: f64,
    reference: &'a str,
}

/// HTTP billing client
pub struct HttpBillingService {
    config: BillingConfig,
    client: Client,
}

impl HttpBillingService {
    pub fn new(config: BillingConfig) -> Result<Self, PersistenceError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PersistenceError::Billing(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl BillingService for HttpBillingService {
    async fn deduct(
        &self,
        user_id: &str,
        amount: f64,
        reference: &str,
    ) -> Result<(), PersistenceError> {
        let request = DeductRequest { user_id, amount, reference };

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PersistenceError::Billing(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Billing(format!("HTTP {}: {}", status, body)));
        }

        tracing::info!(user_id = %user_id, amount, reference = %reference, "Billing deduction applied");
        Ok(())
    }
}

/// Billing service that accepts every deduction without side effects.
/// Used when billing is disabled.
pub struct NoopBillingService;

#[async_trait]
impl BillingService for NoopBillingService {
    async fn deduct(
        &self,
        user_id: &str,
        amount: f64,
        reference: &str,
    ) -> Result<(), PersistenceError> {
        tracing::debug!(user_id = %user_id, amount, reference = %reference, "Billing disabled, deduction skipped");
        Ok(())
    }
}

/// A recorded deduction
#[derive(Debug, Clone, PartialEq)]
pub struct Deduction {
    pub user_id: String,
    pub amount: f64,
    pub reference: String,
}

/// In-memory billing service for tests. Records deductions and can be
/// switched into a failing mode to exercise the billing-pending path.
#[derive(Default)]
pub struct InMemoryBillingService {
    deductions: RwLock<Vec<Deduction>>,
    fail: RwLock<bool>,
}

impl InMemoryBillingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent deduct call fail
    pub fn set_failing(&self, fail: bool) {
        *self.fail.write() = fail;
    }

    pub fn deductions(&self) -> Vec<Deduction> {
        self.deductions.read().clone()
    }
}

#[async_trait]
impl BillingService for InMemoryBillingService {
    async fn deduct(
        &self,
        user_id: &str,
        amount: f64,
        reference: &str,
    ) -> Result<(), PersistenceError> {
        if *self.fail.read() {
            return Err(PersistenceError::Billing("simulated billing failure".to_string()));
        }
        self.deductions.write().push(Deduction {
            user_id: user_id.to_string(),
            amount,
            reference: reference.to_string(),
        });
        Ok(())
    }
}

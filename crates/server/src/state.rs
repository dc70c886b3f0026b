//! Shared application state

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use callbridge_config::Settings;
use callbridge_persistence::PromptStore;
use callbridge_pipeline::PipelineContext;

use crate::registry::SessionRegistry;

/// State shared by every HTTP and WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub pipeline: Arc<PipelineContext>,
    pub prompts: Arc<dyn PromptStore>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<SessionRegistry>,
        pipeline: Arc<PipelineContext>,
        prompts: Arc<dyn PromptStore>,
    ) -> Self {
        Self { settings, registry, pipeline, prompts, metrics: None }
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}

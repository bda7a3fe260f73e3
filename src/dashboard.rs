//! Public surface of the refresher
//!
//! `SmartDashboard` wires the state cache, projector, evaluator and poll
//! scheduler around one host document. Hosts integrate against `start`,
//! `stop` and `evaluate`.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::StateCache;
use crate::condition::ConditionEvaluator;
use crate::config::RefresherConfig;
use crate::dom::Document;
use crate::poll::{PollScheduler, RefreshOutcome, StatesClient};
use crate::projection::DomProjector;
use crate::types::Result;

pub struct SmartDashboard<D: Document> {
    cache: Arc<StateCache>,
    projector: Arc<DomProjector<D>>,
    evaluator: ConditionEvaluator,
    scheduler: Arc<PollScheduler<D>>,
}

impl<D: Document> SmartDashboard<D> {
    /// Create a refresher with default options
    pub fn new(base_url: &str, token: &str, document: Arc<D>) -> Result<Self> {
        Self::with_config(RefresherConfig::new(base_url, token), document)
    }

    pub fn with_config(config: RefresherConfig, document: Arc<D>) -> Result<Self> {
        let client = StatesClient::new(&config.base_url, config.token.as_str(), config.request_timeout())?;
        let cache = Arc::new(StateCache::new());
        let projector = Arc::new(DomProjector::with_options(
            document,
            Arc::clone(&cache),
            config.lazy_threshold,
            config.root_margin_px,
        ));
        let scheduler = Arc::new(
            PollScheduler::new(client, Arc::clone(&cache), Arc::clone(&projector))
                .with_stale_discard(config.discard_stale_responses),
        );
        let evaluator = ConditionEvaluator::new(Arc::clone(&cache));

        Ok(Self {
            cache,
            projector,
            evaluator,
            scheduler,
        })
    }

    /// Fetch now and then every `interval`
    pub fn start(&self, interval: Duration) {
        self.scheduler.start(interval);
    }

    /// Cancel future polls; idempotent
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Evaluate a condition expression; failures yield `false`
    pub fn evaluate(&self, expression: &str, user: Option<&serde_json::Value>) -> bool {
        self.evaluator.evaluate(expression, user)
    }

    /// Run one fetch-and-refresh cycle
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        self.scheduler.refresh().await
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    pub fn projector(&self) -> &Arc<DomProjector<D>> {
        &self.projector
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    pub fn scheduler(&self) -> &Arc<PollScheduler<D>> {
        &self.scheduler
    }
}

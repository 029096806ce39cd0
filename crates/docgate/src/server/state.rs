//! Shared application state

use std::sync::Arc;

use crate::config::GateConfig;
use crate::error::Result;
use crate::exec::{AdmissionQueue, JobDispatcher, ProcessRunner};
use crate::history::HistoryStore;
use crate::processing::DocumentProcessor;
use crate::scripts::ScriptRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: GateConfig,
    queue: AdmissionQueue,
    processor: DocumentProcessor,
    history: Arc<HistoryStore>,
    scripts: ScriptRegistry,
}

impl AppState {
    pub fn new(config: GateConfig) -> Result<Self> {
        let queue = AdmissionQueue::new(&config.queue);
        let runner = Arc::new(ProcessRunner::new(&config.scripts));
        let history = Arc::new(HistoryStore::new(&config.history.path)?);
        let scripts = ScriptRegistry::new(&config.scripts);
        let processor = DocumentProcessor::new(
            runner,
            JobDispatcher::new(queue.clone()),
            Arc::clone(&history),
            scripts.clone(),
        );

        tracing::info!(
            "application state initialized ({} explicit programs, scripts dir {})",
            config.scripts.programs.len(),
            config.scripts.dir.display()
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                queue,
                processor,
                history,
                scripts,
            }),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.inner.queue
    }

    pub fn processor(&self) -> &DocumentProcessor {
        &self.inner.processor
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.inner.history
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.inner.scripts
    }
}

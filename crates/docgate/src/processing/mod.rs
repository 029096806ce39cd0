//! Builds and dispatches units of work for incoming documents
//!
//! The external program contract is `program <folder> <filename> <metadata>`
//! with exit code 0 signalling success; everything the program does with
//! the document beyond that is its own business.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::exec::{JobDispatcher, ProcessRunner};
use crate::history::{HistoryRecord, HistoryStore, IntakeSource};
use crate::scripts::ScriptRegistry;

/// Ticket returned to the submitter once a document is queued.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueuedJob {
    pub job_id: String,
    pub client: String,
    pub filename: String,
}

/// Glue between the intake surfaces and the execution core.
///
/// For each document it resolves the client's program, wraps the
/// invocation plus the history write into one unit of work, and submits
/// it. Invocation failures settle inside the unit; only admission problems
/// (unknown client, full queue) surface to the caller.
#[derive(Clone)]
pub struct DocumentProcessor {
    runner: Arc<ProcessRunner>,
    dispatcher: JobDispatcher,
    history: Arc<HistoryStore>,
    scripts: ScriptRegistry,
}

impl DocumentProcessor {
    pub fn new(
        runner: Arc<ProcessRunner>,
        dispatcher: JobDispatcher,
        history: Arc<HistoryStore>,
        scripts: ScriptRegistry,
    ) -> Self {
        Self {
            runner,
            dispatcher,
            history,
            scripts,
        }
    }

    /// Queue one document for the client's program.
    ///
    /// Returns the job ticket on admission; `Error::QueueFull` when the
    /// queue turned it away (the caller decides whether to resubmit).
    pub fn submit_document(
        &self,
        client: &str,
        filename: &str,
        metadata: serde_json::Value,
        source: IntakeSource,
    ) -> Result<QueuedJob> {
        let program = self
            .scripts
            .resolve(client)
            .ok_or_else(|| Error::UnknownClient(client.to_string()))?;

        let ticket = QueuedJob {
            job_id: Uuid::new_v4().to_string(),
            client: client.to_string(),
            filename: filename.to_string(),
        };
        let args = vec![
            client.to_string(),
            filename.to_string(),
            metadata.to_string(),
        ];

        let runner = Arc::clone(&self.runner);
        let history = Arc::clone(&self.history);
        let job = ticket.clone();

        let accepted = self.dispatcher.dispatch(move || async move {
            tracing::info!(
                job_id = %job.job_id,
                client = %job.client,
                filename = %job.filename,
                "starting document job"
            );

            let record = match runner.run(&program, &args, &job.job_id).await {
                Ok(output) if output.succeeded() => {
                    tracing::info!(
                        job_id = %job.job_id,
                        program = %output.program,
                        duration_ms = output.duration.as_millis() as u64,
                        "document processed"
                    );
                    HistoryRecord::success(
                        job.job_id,
                        job.client,
                        job.filename,
                        source,
                        output.duration.as_millis() as u64,
                    )
                }
                Ok(output) => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        program = %output.program,
                        exit_code = ?output.exit_code,
                        timed_out = output.timed_out,
                        "document processing failed"
                    );
                    let error = if output.timed_out {
                        format!("killed after timeout; stderr: {}", output.stderr.trim())
                    } else {
                        output.stderr.trim().to_string()
                    };
                    HistoryRecord::failure(
                        job.job_id,
                        job.client,
                        job.filename,
                        source,
                        output.exit_code,
                        output.timed_out,
                        output.duration.as_millis() as u64,
                        error,
                    )
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job.job_id,
                        client = %job.client,
                        "invocation failed: {}",
                        e
                    );
                    HistoryRecord {
                        id: Uuid::new_v4(),
                        job_id: job.job_id,
                        client: job.client,
                        filename: job.filename,
                        source,
                        success: false,
                        exit_code: None,
                        timed_out: false,
                        duration_ms: 0,
                        error: Some(e.to_string()),
                        created_at: Utc::now(),
                    }
                }
            };

            if let Err(e) = history.append(&record) {
                tracing::error!(job_id = %record.job_id, "failed to append history record: {}", e);
            }
        });

        if !accepted {
            return Err(Error::QueueFull);
        }
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QueueConfig, ScriptsConfig};
    use crate::exec::AdmissionQueue;
    use crate::history::HistoryFilter;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", body).unwrap();
        drop(file);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn build_processor(dir: &TempDir, program: PathBuf) -> (DocumentProcessor, Arc<HistoryStore>) {
        let mut scripts_config = ScriptsConfig::default();
        scripts_config
            .programs
            .insert("acmegas".to_string(), program);

        let queue = AdmissionQueue::new(&QueueConfig::default());
        let runner = Arc::new(ProcessRunner::new(&scripts_config));
        let history = Arc::new(HistoryStore::new(dir.path().join("history.jsonl")).unwrap());
        let processor = DocumentProcessor::new(
            runner,
            JobDispatcher::new(queue),
            Arc::clone(&history),
            ScriptRegistry::new(&scripts_config),
        );
        (processor, history)
    }

    async fn wait_for_records(history: &HistoryStore, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let page = history.query(&HistoryFilter::default()).unwrap();
                if page.total >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("history record never appeared");
    }

    #[tokio::test]
    async fn successful_run_is_recorded() {
        let dir = TempDir::new().unwrap();
        let program = write_script(&dir, "acme.sh", "exit 0");
        let (processor, history) = build_processor(&dir, program);

        let job = processor
            .submit_document(
                "acmegas",
                "delivery.pdf",
                serde_json::json!({}),
                IntakeSource::Upload,
            )
            .unwrap();
        assert_eq!(job.client, "acmegas");

        wait_for_records(&history, 1).await;
        let page = history.query(&HistoryFilter::default()).unwrap();
        let record = &page.records[0];
        assert!(record.success);
        assert_eq!(record.exit_code, Some(0));
        assert_eq!(record.job_id, job.job_id);
    }

    #[tokio::test]
    async fn failed_run_records_stderr() {
        let dir = TempDir::new().unwrap();
        let program = write_script(&dir, "acme.sh", "echo 'split failed' >&2\nexit 2");
        let (processor, history) = build_processor(&dir, program);

        processor
            .submit_document(
                "acmegas",
                "delivery.pdf",
                serde_json::json!({}),
                IntakeSource::Folder,
            )
            .unwrap();

        wait_for_records(&history, 1).await;
        let page = history.query(&HistoryFilter::default()).unwrap();
        let record = &page.records[0];
        assert!(!record.success);
        assert_eq!(record.exit_code, Some(2));
        assert_eq!(record.error.as_deref(), Some("split failed"));
    }

    #[tokio::test]
    async fn unknown_client_is_rejected_up_front() {
        let dir = TempDir::new().unwrap();
        let program = write_script(&dir, "acme.sh", "exit 0");
        let (processor, _history) = build_processor(&dir, program);

        let err = processor
            .submit_document(
                "ghost",
                "delivery.pdf",
                serde_json::json!({}),
                IntakeSource::Upload,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownClient(_)));
    }

    #[tokio::test]
    async fn spawn_failure_lands_in_history() {
        let dir = TempDir::new().unwrap();
        let (processor, history) = build_processor(&dir, PathBuf::from("/nonexistent/ghost.sh"));

        processor
            .submit_document(
                "acmegas",
                "delivery.pdf",
                serde_json::json!({}),
                IntakeSource::Automation,
            )
            .unwrap();

        wait_for_records(&history, 1).await;
        let page = history.query(&HistoryFilter::default()).unwrap();
        let record = &page.records[0];
        assert!(!record.success);
        assert!(record.error.as_deref().unwrap().contains("spawn"));
    }
}

//! Batch orchestration
//!
//! Drives the pipeline run: drain the dead letter queue, measure the work
//! queue, then process batches in instant or bulk mode. Each batch is
//! embedded item by item, partitioned into successes and failures, written
//! to the sinks as one unit, and only the successful subset is marked
//! processed. A batch is never all-or-nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::config::{BatchConfig, RunMode};
use crate::embedder::{Embedder, EmbedOutcome, EngineStats};
use crate::sink::SinkWriter;
use crate::store::{now_timestamp, VectorRecord, WorkItem, WorkQueue, TEXT_PREVIEW_CHARS};
use crate::text;

/// Outcome of one processed batch.
#[derive(Debug, Default)]
struct BatchOutcome {
    succeeded: usize,
    failed: usize,
}

/// Report for a completed run.
#[derive(Debug)]
pub struct RunSummary {
    /// Mode that actually ran
    pub mode: RunMode,

    /// Work items embedded and marked processed
    pub total_processed: usize,

    /// Unprocessed items left in the queue
    pub queue_remaining: usize,

    /// Dead letters recovered by the pre-run drain
    pub dlq_recovered: usize,

    /// Dead letters still waiting (inert ones included)
    pub dlq_remaining: usize,

    /// Rows accepted by the relational sink
    pub relational_writes: usize,

    /// Points accepted by the vector sink
    pub vector_writes: usize,

    /// Engine counters at the end of the run
    pub stats: EngineStats,

    /// Circuit breaker trips during the run
    pub circuit_trips: u32,
}

/// Orchestrates one vectorization run over the work queue.
pub struct Orchestrator {
    queue: WorkQueue,
    embedder: Embedder,
    sinks: SinkWriter,
    model: String,
    batch: BatchConfig,
    shutdown: Arc<AtomicBool>,
    relational_writes: usize,
    vector_writes: usize,
}

impl Orchestrator {
    /// Assemble an orchestrator. `shutdown` is checked at the top of every
    /// per-item loop; an in-flight inference call finishes on its own
    /// timeout.
    pub fn new(
        queue: WorkQueue,
        embedder: Embedder,
        sinks: SinkWriter,
        model: String,
        batch: BatchConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue,
            embedder,
            sinks,
            model,
            batch,
            shutdown,
            relational_writes: 0,
            vector_writes: 0,
        }
    }

    /// Run the pipeline in the requested mode and report what happened.
    pub async fn run(&mut self, mode: RunMode) -> RunSummary {
        let dlq_recovered = self.drain_dlq().await;

        let queue_depth = self.queue_depth().await;
        let resolved = self.resolve_mode(mode, queue_depth);

        let total_processed = if queue_depth == 0 {
            info!("no unprocessed work items in queue");
            0
        } else {
            info!(mode = %resolved, queue_depth, "starting run");
            match resolved {
                RunMode::Instant => self.run_instant().await,
                RunMode::Bulk => self.run_bulk().await,
                RunMode::Auto => unreachable!("auto resolves to instant or bulk"),
            }
        };

        let dlq_remaining = match self.embedder.dead_letters().count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "failed to count dead letters");
                0
            }
        };

        RunSummary {
            mode: resolved,
            total_processed,
            queue_remaining: self.queue_depth().await,
            dlq_recovered,
            dlq_remaining,
            relational_writes: self.relational_writes,
            vector_writes: self.vector_writes,
            stats: self.embedder.stats().clone(),
            circuit_trips: self.embedder.circuit_trips(),
        }
    }

    /// Auto selects instant below the queue-depth threshold, bulk above it.
    fn resolve_mode(&self, mode: RunMode, queue_depth: usize) -> RunMode {
        match mode {
            RunMode::Auto => {
                if queue_depth < self.batch.instant_threshold {
                    RunMode::Instant
                } else {
                    RunMode::Bulk
                }
            }
            other => other,
        }
    }

    /// Retry dead letters before touching fresh work, bounded per run to
    /// avoid retry storms. A recovered entry leaves the DLQ; its work item
    /// is still unprocessed and will be picked up by the batch loop as a
    /// cache hit.
    async fn drain_dlq(&mut self) -> usize {
        let entries = match self
            .embedder
            .dead_letters()
            .list_retryable(self.batch.dlq_drain_limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "dead letter drain skipped");
                return 0;
            }
        };

        if entries.is_empty() {
            return 0;
        }

        info!(count = entries.len(), "retrying dead letters");
        let mut recovered = 0;
        for entry in entries {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            if self.embedder.embed(&entry.text).await.is_success() {
                if let Err(e) = self.embedder.dead_letters().remove(&entry.key).await {
                    warn!(error = %e, "failed to remove recovered dead letter");
                } else {
                    recovered += 1;
                    info!(key = text::key_prefix(&entry.key), "dead letter recovered");
                }
            }
        }

        info!(recovered, "dead letter drain complete");
        recovered
    }

    async fn queue_depth(&self) -> usize {
        match self.queue.count_unprocessed().await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "cannot read queue depth");
                0
            }
        }
    }

    /// Instant mode: keep pulling batches until the queue is empty or a
    /// batch yields zero successes (the guard against a persistently broken
    /// item looping forever).
    async fn run_instant(&mut self) -> usize {
        let mut total = 0;
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, stopping instant run");
                break;
            }

            let outcome = self.process_batch().await;
            if outcome.succeeded == 0 {
                break;
            }
            total += outcome.succeeded;

            if self.queue_depth().await == 0 {
                break;
            }
        }
        info!(total, "instant run complete");
        total
    }

    /// Bulk mode: a bounded number of batches with a short inter-batch
    /// delay, reporting remaining depth so the next invocation resumes.
    async fn run_bulk(&mut self) -> usize {
        let max_batches = self.batch.bulk_max_batches;
        let bar = ProgressBar::new(max_batches as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );

        let mut total = 0;
        for batch_num in 0..max_batches {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, stopping bulk run");
                break;
            }

            let outcome = self.process_batch().await;
            if outcome.succeeded == 0 {
                break;
            }
            total += outcome.succeeded;

            let remaining = self.queue_depth().await;
            bar.inc(1);
            bar.set_message(format!("{} remaining", remaining));
            info!(
                batch = batch_num + 1,
                max_batches,
                remaining,
                vectorized = outcome.succeeded,
                "bulk batch complete"
            );

            if remaining == 0 {
                break;
            }

            // Brief pause between batches for downstream stability.
            tokio::time::sleep(Duration::from_secs(self.batch.inter_batch_delay_s)).await;
        }
        bar.finish_and_clear();

        let remaining = self.queue_depth().await;
        if remaining > 0 {
            info!(remaining, "bulk run paused, will continue next invocation");
        } else {
            info!(total, "bulk run complete");
        }
        total
    }

    /// Process one batch: embed each item, partition, write successes to the
    /// sinks, mark only the successful subset processed.
    ///
    /// Marking is driven by embedding success, not sink success: a sink
    /// failure after a successful embedding leaves the item processed with
    /// no row in that sink (at-least-once for embeddings, best-effort for
    /// sinks).
    async fn process_batch(&mut self) -> BatchOutcome {
        let items = match self.queue.fetch_unprocessed(self.batch.batch_size).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "failed to read work queue");
                return BatchOutcome::default();
            }
        };
        if items.is_empty() {
            return BatchOutcome::default();
        }

        info!(size = items.len(), "processing batch");

        let mut records = Vec::new();
        let mut succeeded_ids = Vec::new();
        let mut failed = 0;

        for item in &items {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.embedder.embed(&item.text).await {
                EmbedOutcome::Vector(vector) => {
                    records.push(self.to_record(item, vector));
                    succeeded_ids.push(item.record_id.clone());
                }
                EmbedOutcome::Empty | EmbedOutcome::Failed => {
                    failed += 1;
                }
            }
        }

        let report = self.sinks.write_batch(&records).await;
        self.relational_writes += report.relational;
        self.vector_writes += report.vector;

        if !succeeded_ids.is_empty() {
            if let Err(e) = self.queue.mark_processed(&succeeded_ids).await {
                // Successes will be re-embedded next run (cache hits), but
                // stop the mode loop rather than spin on the same slice.
                error!(error = %e, "failed to mark batch processed");
                return BatchOutcome { succeeded: 0, failed };
            }
            info!(processed = succeeded_ids.len(), "batch marked processed");
        }

        if failed > 0 {
            warn!(failed, "batch had failures, items left unprocessed");
        }

        BatchOutcome {
            succeeded: succeeded_ids.len(),
            failed,
        }
    }

    fn to_record(&self, item: &WorkItem, vector: Vec<f32>) -> VectorRecord {
        let dims = vector.len();
        VectorRecord {
            record_id: item.record_id.clone(),
            session_id: item.session_id.clone(),
            created_at: item.created_at.clone(),
            text_preview: item.text.chars().take(TEXT_PREVIEW_CHARS).collect(),
            kind: item.kind.clone(),
            vector,
            model: self.model.clone(),
            dims,
            written_at: now_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CircuitBreakerConfig, QdrantConfig, RateLimitConfig, RetryPolicy, SinkTarget,
        VectorizerConfig,
    };
    use crate::inference::InferenceClient;
    use crate::sink::{QdrantSink, RelationalSink};
    use crate::store::{connect, initialize_schema, DeadLetterStore, EmbeddingCache};
    use mockito::{Server, ServerGuard};
    use tempfile::tempdir;

    fn fast_config() -> VectorizerConfig {
        VectorizerConfig {
            rate_limit: RateLimitConfig {
                min_interval_ms: 1,
                bucket_capacity: 2.0,
            },
            retry_policy: RetryPolicy {
                attempts: 3,
                base_ms: 1,
                max_ms: 5,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 100,
                pause_duration_s: 1,
            },
            ..VectorizerConfig::default()
        }
    }

    fn work_item(id: &str, text: &str) -> WorkItem {
        WorkItem {
            record_id: id.to_string(),
            session_id: Some("sess-1".to_string()),
            created_at: "2025-11-05T08:47:00.000Z".to_string(),
            text: text.to_string(),
            kind: "note".to_string(),
            processed: false,
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        queue: WorkQueue,
        relational: RelationalSink,
        dlq: DeadLetterStore,
        _tmp: tempfile::TempDir,
    }

    async fn setup(server: &ServerGuard, items: &[WorkItem], target: SinkTarget) -> Fixture {
        let temp_dir = tempdir().unwrap();
        let queue_path = temp_dir.path().join("queue.db");
        let store_path = temp_dir.path().join("store.db");

        let queue = WorkQueue::seed(queue_path.to_str().unwrap(), items)
            .await
            .unwrap();
        let conn = connect(store_path.to_str().unwrap()).await.unwrap();
        initialize_schema(&conn).await.unwrap();

        let mut config = fast_config();
        config.batch.inter_batch_delay_s = 0;
        config.qdrant = QdrantConfig {
            url: server.url(),
            collection: "text_vectors".to_string(),
            distance: "Cosine".to_string(),
        };

        let inference = InferenceClient::new(&server.url(), "nomic-embed-text").unwrap();
        let embedder = Embedder::new(
            inference,
            EmbeddingCache::new(conn.clone()),
            DeadLetterStore::new(conn.clone()),
            &config,
        );

        let relational = RelationalSink::new(conn.clone());
        let vector = QdrantSink::new(&config.qdrant).unwrap();
        let sinks = SinkWriter::new(
            target.includes_relational().then(|| relational.clone()),
            target.includes_vector().then(|| vector),
        );

        let orchestrator = Orchestrator::new(
            queue.clone(),
            embedder,
            sinks,
            "nomic-embed-text".to_string(),
            config.batch.clone(),
            Arc::new(AtomicBool::new(false)),
        );

        Fixture {
            orchestrator,
            queue,
            relational,
            dlq: DeadLetterStore::new(conn),
            _tmp: temp_dir,
        }
    }

    fn mock_embedding(
        server: &mut ServerGuard,
        prompt: &str,
        vector: &str,
    ) -> mockito::Mock {
        server
            .mock("POST", "/api/embeddings")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "prompt": prompt
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("{{\"embedding\": {}}}", vector))
    }

    #[tokio::test]
    async fn test_auto_mode_selection() {
        let server = Server::new_async().await;
        let fixture = setup(&server, &[], SinkTarget::Relational).await;

        // Default instant threshold is 100.
        assert_eq!(
            fixture.orchestrator.resolve_mode(RunMode::Auto, 50),
            RunMode::Instant
        );
        assert_eq!(
            fixture.orchestrator.resolve_mode(RunMode::Auto, 150),
            RunMode::Bulk
        );
        assert_eq!(
            fixture.orchestrator.resolve_mode(RunMode::Bulk, 5),
            RunMode::Bulk
        );
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_clean_noop() {
        let server = Server::new_async().await;
        let mut fixture = setup(&server, &[], SinkTarget::Relational).await;

        let summary = fixture.orchestrator.run(RunMode::Auto).await;
        assert_eq!(summary.total_processed, 0);
        assert_eq!(summary.queue_remaining, 0);
        assert_eq!(summary.mode, RunMode::Instant);
    }

    #[tokio::test]
    async fn test_partial_failure_marks_only_successes() {
        let mut server = Server::new_async().await;
        let ok_a = mock_embedding(&mut server, "alpha text", "[1.0, 0.0]")
            .expect(1)
            .create_async()
            .await;
        let broken = server
            .mock("POST", "/api/embeddings")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "prompt": "broken text"
            })))
            .with_status(500)
            .with_body("always fails")
            .expect(3)
            .create_async()
            .await;
        let ok_c = mock_embedding(&mut server, "gamma text", "[0.0, 1.0]")
            .expect(1)
            .create_async()
            .await;
        let upsert = server
            .mock("PUT", "/collections/text_vectors/points?wait=true")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{\"result\": {\"status\": \"acknowledged\"}, \"status\": \"ok\"}")
            .expect(1)
            .create_async()
            .await;

        let items = [
            work_item("a", "alpha text"),
            work_item("b", "broken text"),
            work_item("c", "gamma text"),
        ];
        let mut fixture = setup(&server, &items, SinkTarget::Both).await;

        // One batch of size 10 covers all three items.
        let outcome = fixture.orchestrator.process_batch().await;

        // Two successes marked processed, the failure stays queued.
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        let remaining = fixture.queue.fetch_unprocessed(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record_id, "b");

        // Both sinks received the two vector records.
        assert_eq!(fixture.orchestrator.relational_writes, 2);
        assert_eq!(fixture.orchestrator.vector_writes, 2);
        assert_eq!(fixture.relational.count().await.unwrap(), 2);

        // The failure landed in the DLQ with a single entry.
        let letters = fixture.dlq.list_retryable(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 1);
        assert_eq!(letters[0].text, "broken text");

        assert_eq!(fixture.orchestrator.embedder.stats().embeddings_generated, 2);

        ok_a.assert_async().await;
        broken.assert_async().await;
        ok_c.assert_async().await;
        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn test_dlq_drain_recovers_before_run() {
        let mut server = Server::new_async().await;
        mock_embedding(&mut server, "recovered text", "[0.5]")
            .create_async()
            .await;

        let fixture = setup(&server, &[], SinkTarget::Relational).await;
        fixture
            .dlq
            .upsert_failure(
                &text::content_key("recovered text"),
                "recovered text",
                "old error",
            )
            .await
            .unwrap();

        let mut orchestrator = fixture.orchestrator;
        let summary = orchestrator.run(RunMode::Instant).await;

        assert_eq!(summary.dlq_recovered, 1);
        assert_eq!(summary.dlq_remaining, 0);
        assert_eq!(fixture.dlq.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_instant_stops_on_zero_success_batch() {
        let mut server = Server::new_async().await;
        // Every prompt fails; instant mode must stop after one batch rather
        // than loop forever on the same broken items.
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .with_body("down")
            .expect(3)
            .create_async()
            .await;

        let items = [work_item("a", "stuck text")];
        let mut fixture = setup(&server, &items, SinkTarget::Relational).await;

        let summary = fixture.orchestrator.run(RunMode::Instant).await;
        assert_eq!(summary.total_processed, 0);
        assert_eq!(summary.queue_remaining, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bulk_mode_respects_batch_bound() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{\"embedding\": [0.1]}")
            .create_async()
            .await;

        // 3 items, batch size 1, bulk bound 2: one batch's worth remains.
        let items = [
            work_item("a", "first text"),
            work_item("b", "second text"),
            work_item("c", "third text"),
        ];
        let mut fixture = setup(&server, &items, SinkTarget::Relational).await;
        fixture.orchestrator.batch.batch_size = 1;
        fixture.orchestrator.batch.bulk_max_batches = 2;

        let summary = fixture.orchestrator.run(RunMode::Bulk).await;
        assert_eq!(summary.total_processed, 2);
        assert_eq!(summary.queue_remaining, 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_block_marking() {
        let mut server = Server::new_async().await;
        mock_embedding(&mut server, "good text", "[0.9]")
            .create_async()
            .await;
        // The vector sink rejects the upsert; the item must still be marked.
        server
            .mock("PUT", "/collections/text_vectors/points?wait=true")
            .with_status(500)
            .with_body("storage full")
            .create_async()
            .await;

        let items = [work_item("a", "good text")];
        let mut fixture = setup(&server, &items, SinkTarget::Both).await;

        let summary = fixture.orchestrator.run(RunMode::Instant).await;
        assert_eq!(summary.total_processed, 1);
        assert_eq!(summary.queue_remaining, 0);
        assert_eq!(summary.vector_writes, 0);
        assert_eq!(summary.relational_writes, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_next_item() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{\"embedding\": [0.1]}")
            .expect(0)
            .create_async()
            .await;

        let items = [work_item("a", "never reached")];
        let mut fixture = setup(&server, &items, SinkTarget::Relational).await;
        fixture
            .orchestrator
            .shutdown
            .store(true, Ordering::Relaxed);

        let summary = fixture.orchestrator.run(RunMode::Instant).await;
        assert_eq!(summary.total_processed, 0);
        assert_eq!(summary.queue_remaining, 1);
    }
}

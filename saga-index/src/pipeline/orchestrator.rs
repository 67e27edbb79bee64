//! The indexing orchestrator: sequences pipeline stages per task, persists
//! progress after each, retries retryable failures with backoff, and honors
//! cooperative cancellation.
//!
//! One task runs per `(project, task kind)` at a time, guarded by the
//! [`TaskRegistry`]. Different projects, or different kinds on the same
//! project, proceed in parallel. Cancellation is a status transition: the
//! pipeline checks the persisted status between stages and stops writing
//! once it observes `CANCELLED`; in-flight model calls are not interrupted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, OrchestratorConfig, SupersedePolicy};
use crate::error::{IndexError, Result};
use crate::graph::discovery::{DiscoveryConfig, RelationshipDiscoverer};
use crate::graph::extractor::EntityExtractor;
use crate::graph::ner::NerModel;
use crate::pipeline::registry::TaskRegistry;
use crate::pipeline::{
    FailureCounts, TaskKind, TaskOutcome, TaskProgress, TaskRecord, TaskStatus,
};
use crate::store::{ChunkRecord, SqliteStore, StoreStats};
use saga_embed::EmbeddingEngine;
use saga_segment::{ChunkConfig, Chunker, PositionIndexer, SceneDetector};

/// Aggregate statistics for a project.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProjectStatistics {
    pub store: StoreStats,
    pub total_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    /// Non-terminal tasks older than the configured maximum age.
    pub stalled_tasks: usize,
    /// Mean STARTED→terminal duration of completed tasks, seconds.
    pub average_task_duration_secs: Option<f64>,
}

/// Coordinates segmentation, embedding, entity extraction, and relationship
/// discovery per file or project.
#[derive(Clone)]
pub struct IndexingOrchestrator {
    store: SqliteStore,
    embed: EmbeddingEngine,
    chunker: Arc<Chunker>,
    scene_detector: Arc<SceneDetector>,
    extractor: Arc<EntityExtractor>,
    discoverer: Arc<RelationshipDiscoverer>,
    registry: Arc<TaskRegistry>,
    config: OrchestratorConfig,
}

impl IndexingOrchestrator {
    pub fn new(
        store: SqliteStore,
        embed: EmbeddingEngine,
        ner: Arc<dyn NerModel>,
        engine_config: EngineConfig,
        config: OrchestratorConfig,
    ) -> Self {
        let chunker = Chunker::new(
            ChunkConfig::default()
                .with_target_len(engine_config.chunk_target_len)
                .with_overlap_fraction(engine_config.chunk_overlap_fraction),
        );
        let extractor = EntityExtractor::new(ner, &engine_config);
        let discoverer = RelationshipDiscoverer::new(DiscoveryConfig {
            max_snippets: engine_config.max_relationship_snippets,
            ..DiscoveryConfig::default()
        });

        Self {
            store,
            embed,
            chunker: Arc::new(chunker),
            scene_detector: Arc::new(SceneDetector::default()),
            extractor: Arc::new(extractor),
            discoverer: Arc::new(discoverer),
            registry: Arc::new(TaskRegistry::new()),
            config,
        }
    }

    /// Kick off the full pipeline for one file. Returns the trackable task
    /// record; the pipeline itself runs asynchronously.
    pub async fn index_file(
        &self,
        file_id: &str,
        project_id: &str,
        text: &str,
    ) -> Result<TaskRecord> {
        self.index_file_opts(file_id, project_id, text, false).await
    }

    /// Like [`index_file`](Self::index_file), but re-indexes even when the
    /// file content is unchanged.
    pub async fn index_file_force(
        &self,
        file_id: &str,
        project_id: &str,
        text: &str,
    ) -> Result<TaskRecord> {
        self.index_file_opts(file_id, project_id, text, true).await
    }

    async fn index_file_opts(
        &self,
        file_id: &str,
        project_id: &str,
        text: &str,
        force: bool,
    ) -> Result<TaskRecord> {
        if file_id.trim().is_empty() || project_id.trim().is_empty() {
            return Err(IndexError::invalid_input("file_id and project_id are required"));
        }

        let task = self
            .claim_and_insert(project_id, TaskKind::FullIndex)
            .await?;

        let this = self.clone();
        let task_id = task.task_id.clone();
        let file_id = file_id.to_string();
        let project_id = project_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            let result = this
                .run_index_pipeline(&task_id, &file_id, &project_id, &text, force)
                .await;
            if let Err(e) = result {
                this.mark_failed(&task_id, &e).await;
            }
            this.registry
                .release(&project_id, TaskKind::FullIndex, &task_id);
        });

        Ok(task)
    }

    /// Kick off relationship discovery over a project's current chunks.
    pub async fn start_discovery(&self, project_id: &str) -> Result<TaskRecord> {
        if project_id.trim().is_empty() {
            return Err(IndexError::invalid_input("project_id is required"));
        }

        let task = self
            .claim_and_insert(project_id, TaskKind::RelationshipDiscovery)
            .await?;

        let this = self.clone();
        let task_id = task.task_id.clone();
        let project_id = project_id.to_string();
        tokio::spawn(async move {
            let result = this.run_discovery_pipeline(&task_id, &project_id).await;
            if let Err(e) = result {
                this.mark_failed(&task_id, &e).await;
            }
            this.registry
                .release(&project_id, TaskKind::RelationshipDiscovery, &task_id);
        });

        Ok(task)
    }

    /// Task status lookup for collaborators.
    pub async fn get_task_status(&self, task_id: &str) -> Result<TaskRecord> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| IndexError::invalid_input(format!("unknown task id {task_id}")))
    }

    /// Cancel every active task of a project. Returns how many were
    /// transitioned. Cancellation is cooperative: running pipelines stop at
    /// their next stage boundary.
    pub async fn cancel_project_tasks(&self, project_id: &str) -> Result<usize> {
        let mut cancelled = 0;
        for mut task in self.store.active_tasks(project_id).await? {
            if !task.status.can_transition_to(TaskStatus::Cancelled) {
                continue;
            }
            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(Utc::now());
            if self.store.update_task(&task).await? {
                info!("Cancelled task {}", task.task_id);
                self.registry.release(project_id, task.kind, &task.task_id);
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// Aggregate store and task statistics for a project.
    pub async fn project_statistics(&self, project_id: &str) -> Result<ProjectStatistics> {
        let tasks = self.store.project_tasks(project_id).await?;
        let now = Utc::now();

        let mut stats = ProjectStatistics {
            store: self.store.stats(project_id).await?,
            total_tasks: tasks.len(),
            active_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            cancelled_tasks: 0,
            stalled_tasks: 0,
            average_task_duration_secs: None,
        };

        let mut durations: Vec<f64> = Vec::new();
        for task in &tasks {
            match task.status {
                TaskStatus::Completed => {
                    stats.completed_tasks += 1;
                    if let Some(duration) = task.duration() {
                        durations.push(duration.num_milliseconds() as f64 / 1000.0);
                    }
                }
                TaskStatus::Failed => stats.failed_tasks += 1,
                TaskStatus::Cancelled => stats.cancelled_tasks += 1,
                _ => {
                    stats.active_tasks += 1;
                    let age = (now - task.created_at).num_seconds();
                    if age > self.config.stalled_after_secs {
                        stats.stalled_tasks += 1;
                    }
                }
            }
        }
        if !durations.is_empty() {
            stats.average_task_duration_secs =
                Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }

        Ok(stats)
    }

    // ── internals ──────────────────────────────────────────────────────

    /// Claim the registry slot (applying the supersede policy) and persist a
    /// PENDING task record.
    async fn claim_and_insert(&self, project_id: &str, kind: TaskKind) -> Result<TaskRecord> {
        let task = TaskRecord::new(project_id, kind);

        if let Err(e) = self.registry.try_claim(project_id, kind, &task.task_id) {
            match (self.config.supersede_policy, &e) {
                (SupersedePolicy::Supersede, IndexError::TaskAlreadyActive { existing, .. }) => {
                    let existing = existing.clone();
                    warn!("Superseding active task {existing} for {project_id}/{}", kind.as_str());
                    if let Some(mut old) = self.store.get_task(&existing).await? {
                        if old.status.can_transition_to(TaskStatus::Cancelled) {
                            old.status = TaskStatus::Cancelled;
                            old.completed_at = Some(Utc::now());
                            self.store.update_task(&old).await?;
                        }
                    }
                    self.registry.release(project_id, kind, &existing);
                    self.registry.try_claim(project_id, kind, &task.task_id)?;
                }
                _ => return Err(e),
            }
        }

        if let Err(e) = self.store.insert_task(&task).await {
            self.registry.release(project_id, kind, &task.task_id);
            return Err(e);
        }
        Ok(task)
    }

    async fn run_index_pipeline(
        &self,
        task_id: &str,
        file_id: &str,
        project_id: &str,
        text: &str,
        force: bool,
    ) -> Result<()> {
        if !self.transition_started(task_id).await? {
            return Ok(());
        }

        let content_hash = *blake3::hash(text.as_bytes()).as_bytes();
        if !force && self.store.file_hash(file_id).await? == Some(content_hash) {
            debug!("File {file_id} unchanged, skipping pipeline");
            let outcome = TaskOutcome {
                skipped_unchanged: true,
                ..TaskOutcome::default()
            };
            return self.complete(task_id, outcome).await;
        }

        // Stage 1: structure. Chunk windows, scene boundaries, and the line
        // index all come from one pass over the text.
        let scenes = self.scene_detector.detect(text);
        let windows = self.chunker.chunk(text);
        let lines = PositionIndexer::index(text, &scenes);

        let mut records: Vec<ChunkRecord> = windows
            .iter()
            .map(|w| ChunkRecord {
                id: None,
                file_id: file_id.to_string(),
                project_id: project_id.to_string(),
                chunk_index: w.sequence,
                start_offset: w.start,
                end_offset: w.end,
                word_count: w.word_count(),
                content: w.text.clone(),
                entity_ids: Vec::new(),
                embedding: None,
            })
            .collect();

        let store = &self.store;
        let records_ref = &records;
        let lines_ref = &lines;
        let ids = self
            .retrying("persist structure", move || async move {
                store.upsert_file(file_id, project_id, &content_hash).await?;
                let ids = store.replace_file_chunks(file_id, records_ref).await?;
                let version = store.next_position_version(file_id).await?;
                store
                    .insert_position_entries(file_id, version, lines_ref)
                    .await?;
                Ok(ids)
            })
            .await?;
        for (record, id) in records.iter_mut().zip(ids) {
            record.id = Some(id);
        }

        let total_stages = 4u64;
        if !self
            .progress(task_id, TaskProgress::new(1, total_stages,
                format!("segmented {} chunks, {} scenes", records.len(), scenes.len())))
            .await?
        {
            return Ok(());
        }

        // Stage 2: embeddings, batched through the engine's cache.
        let mut embeddings_generated = 0usize;
        if !records.is_empty() {
            let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
            let embed = &self.embed;
            let texts_ref = &texts;
            let vectors = self
                .retrying("embed chunks", move || async move {
                    embed.embed_batch(texts_ref).await.map_err(IndexError::from)
                })
                .await?;
            for (record, vector) in records.iter_mut().zip(vectors) {
                if let Some(id) = record.id {
                    self.store.set_chunk_embedding(id, &vector).await?;
                }
                record.embedding = Some(vector);
                embeddings_generated += 1;
            }
        }

        if !self
            .progress(task_id, TaskProgress::new(2, total_stages,
                format!("embedded {embeddings_generated} chunks")))
            .await?
        {
            return Ok(());
        }

        // Stage 3: entity extraction. Per-chunk failures are tolerated up to
        // the policy threshold.
        let extraction = self.extractor.extract_file(&self.store, &records).await?;
        let failed_fraction = if records.is_empty() {
            0.0
        } else {
            extraction.chunks_failed as f32 / records.len() as f32
        };
        if failed_fraction > self.config.failure_threshold {
            return Err(IndexError::inconsistent(format!(
                "entity extraction failed for {} of {} chunks",
                extraction.chunks_failed,
                records.len()
            )));
        }

        if !self
            .progress(task_id, TaskProgress::new(3, total_stages,
                format!(
                    "extracted entities ({} new, {} updated)",
                    extraction.entities_created, extraction.entities_updated
                )))
            .await?
        {
            return Ok(());
        }

        // Stage 4: relationship discovery over the whole project.
        let discovery = self
            .discoverer
            .discover_project(&self.store, project_id)
            .await?;

        let outcome = TaskOutcome {
            chunks_indexed: records.len(),
            embeddings_generated,
            entities_created: extraction.entities_created,
            entities_updated: extraction.entities_updated,
            relationships_written: discovery.relationships_written,
            failures: FailureCounts {
                chunk_failures: 0,
                entity_failures: extraction.chunks_failed,
                relationship_failures: 0,
            },
            skipped_unchanged: false,
        };
        self.complete(task_id, outcome).await
    }

    async fn run_discovery_pipeline(&self, task_id: &str, project_id: &str) -> Result<()> {
        if !self.transition_started(task_id).await? {
            return Ok(());
        }

        let summary = self
            .discoverer
            .discover_project(&self.store, project_id)
            .await?;

        let outcome = TaskOutcome {
            relationships_written: summary.relationships_written,
            ..TaskOutcome::default()
        };
        self.complete(task_id, outcome).await
    }

    /// Move a PENDING task to STARTED. Returns false when the task was
    /// cancelled before it began.
    async fn transition_started(&self, task_id: &str) -> Result<bool> {
        let mut task = self.get_task_status(task_id).await?;
        if !task.status.can_transition_to(TaskStatus::Started) {
            debug!("Task {task_id} not startable from {:?}", task.status);
            return Ok(false);
        }
        task.status = TaskStatus::Started;
        task.started_at = Some(Utc::now());
        Ok(self.store.update_task(&task).await?)
    }

    /// Persist a progress update. Returns false when the task has reached a
    /// terminal status (cooperative cancellation point).
    async fn progress(&self, task_id: &str, progress: TaskProgress) -> Result<bool> {
        let mut task = self.get_task_status(task_id).await?;
        if !task.status.can_transition_to(TaskStatus::Progress) {
            debug!("Task {task_id} is {:?}, stopping pipeline", task.status);
            return Ok(false);
        }
        task.status = TaskStatus::Progress;
        task.progress = progress;
        Ok(self.store.update_task(&task).await?)
    }

    async fn complete(&self, task_id: &str, outcome: TaskOutcome) -> Result<()> {
        let mut task = self.get_task_status(task_id).await?;
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return Ok(());
        }
        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.progress.message = "completed".to_string();
        task.progress.current = task.progress.total.max(task.progress.current);
        task.result = Some(outcome);
        self.store.update_task(&task).await?;
        info!("Task {task_id} completed");
        Ok(())
    }

    async fn mark_failed(&self, task_id: &str, error: &IndexError) {
        warn!("Task {task_id} failed: {error}");
        let Ok(mut task) = self.get_task_status(task_id).await else {
            return;
        };
        if !task.status.can_transition_to(TaskStatus::Failed) {
            return;
        }
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        task.error = Some(error.to_string());
        if let Err(e) = self.store.update_task(&task).await {
            warn!("Could not persist failure for {task_id}: {e}");
        }
    }

    /// Run an operation, retrying retryable failures with exponential
    /// backoff up to the configured attempt count.
    async fn retrying<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.retry_attempts => {
                    let backoff =
                        Duration::from_millis(self.config.retry_backoff_ms << attempt.min(8));
                    warn!("{operation} failed (attempt {attempt}): {e}; retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

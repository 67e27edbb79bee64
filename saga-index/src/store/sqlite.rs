//! SQLite implementation of the document store.
//!
//! Connection options follow the same profile as the rest of the stack: WAL
//! journal for read/write concurrency, a busy timeout instead of immediate
//! lock errors, and foreign keys on. Embeddings are stored as f16 blobs via
//! `bytemuck`. [`open_memory`](SqliteStore::open_memory) backs tests with an
//! in-memory database.

use chrono::{DateTime, Utc};
use half::f16;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::error::Result;
use crate::graph::{Entity, EntityId, EntityKind, Mention, Relationship, RelationshipKind};
use crate::pipeline::{TaskKind, TaskProgress, TaskRecord, TaskStatus};
use crate::store::{ChunkId, ChunkRecord, StoreStats};
use saga_segment::LineEntry;

/// SQLite-backed document store for the narrative index.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a file-backed store.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory store, for tests.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                content_hash BLOB NOT NULL,
                indexed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                word_count INTEGER NOT NULL,
                content TEXT NOT NULL,
                entity_ids TEXT NOT NULL DEFAULT '[]',
                embedding BLOB,
                CONSTRAINT unique_chunk UNIQUE(file_id, chunk_index)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS position_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                line_number INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                paragraph_number INTEGER NOT NULL,
                scene_number INTEGER,
                chapter_number INTEGER,
                content TEXT NOT NULL,
                is_empty INTEGER NOT NULL,
                is_dialogue INTEGER NOT NULL,
                CONSTRAINT unique_line UNIQUE(file_id, version, line_number)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                aliases TEXT NOT NULL DEFAULT '[]',
                confidence REAL NOT NULL,
                mention_count INTEGER NOT NULL,
                first_mention TEXT,
                last_mention TEXT,
                CONSTRAINT unique_entity UNIQUE(project_id, kind, name)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                strength REAL NOT NULL,
                cooccurrence_count INTEGER NOT NULL,
                snippets TEXT NOT NULL DEFAULT '[]',
                CONSTRAINT unique_edge UNIQUE(source_id, target_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                progress_current INTEGER NOT NULL DEFAULT 0,
                progress_total INTEGER NOT NULL DEFAULT 0,
                progress_message TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                result TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                error TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_project ON chunks(project_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_project ON entities(project_id)")
            .execute(pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_relationships_project ON relationships(project_id)",
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id)")
            .execute(pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ── files ──────────────────────────────────────────────────────────

    /// Insert or update a file fingerprint.
    pub async fn upsert_file(
        &self,
        file_id: &str,
        project_id: &str,
        content_hash: &[u8; 32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (file_id, project_id, content_hash, indexed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_id) DO UPDATE SET
                project_id = excluded.project_id,
                content_hash = excluded.content_hash,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(file_id)
        .bind(project_id)
        .bind(&content_hash[..])
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stored content hash for a file, if indexed before.
    pub async fn file_hash(&self, file_id: &str) -> Result<Option<[u8; 32]>> {
        let row = sqlx::query("SELECT content_hash FROM files WHERE file_id = ?1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let bytes: Vec<u8> = r.get("content_hash");
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[..32]);
            hash
        }))
    }

    /// File ids belonging to a project.
    pub async fn project_files(&self, project_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT file_id FROM files WHERE project_id = ?1 ORDER BY file_id")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("file_id")).collect())
    }

    // ── chunks ─────────────────────────────────────────────────────────

    /// Replace all chunks of a file with a fresh set, returning new ids in
    /// input order.
    pub async fn replace_file_chunks(
        &self,
        file_id: &str,
        chunks: &[ChunkRecord],
    ) -> Result<Vec<ChunkId>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE file_id = ?1")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding_bytes = chunk
                .embedding
                .as_ref()
                .map(|e| bytemuck::cast_slice::<f16, u8>(e));
            let entity_ids = serde_json::to_string(&chunk.entity_ids)?;

            let result = sqlx::query(
                r#"
                INSERT INTO chunks
                (file_id, project_id, chunk_index, start_offset, end_offset, word_count, content, entity_ids, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&chunk.file_id)
            .bind(&chunk.project_id)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_offset as i64)
            .bind(chunk.end_offset as i64)
            .bind(chunk.word_count as i64)
            .bind(&chunk.content)
            .bind(entity_ids)
            .bind(embedding_bytes)
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    pub async fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(chunk_from_row).transpose()
    }

    /// All chunks for a file, ordered by chunk index.
    pub async fn file_chunks(&self, file_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE file_id = ?1 ORDER BY chunk_index")
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(chunk_from_row).collect()
    }

    /// All chunks across a set of projects, ordered by file then index.
    pub async fn project_chunks(&self, project_ids: &[String]) -> Result<Vec<ChunkRecord>> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = placeholders(project_ids.len());
        let query = format!(
            "SELECT * FROM chunks WHERE project_id IN ({placeholders}) ORDER BY file_id, chunk_index"
        );
        let mut q = sqlx::query(&query);
        for project_id in project_ids {
            q = q.bind(project_id);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(chunk_from_row).collect()
    }

    /// Store an embedding for one chunk.
    pub async fn set_chunk_embedding(&self, id: ChunkId, embedding: &[f16]) -> Result<()> {
        sqlx::query("UPDATE chunks SET embedding = ?1 WHERE id = ?2")
            .bind(bytemuck::cast_slice::<f16, u8>(embedding))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store the entity-id list for one chunk.
    pub async fn set_chunk_entities(&self, id: ChunkId, entity_ids: &[EntityId]) -> Result<()> {
        sqlx::query("UPDATE chunks SET entity_ids = ?1 WHERE id = ?2")
            .bind(serde_json::to_string(entity_ids)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── position entries ───────────────────────────────────────────────

    /// Next position-index version for a file. Re-indexing writes a new
    /// version; prior versions are superseded, never mutated.
    pub async fn next_position_version(&self, file_id: &str) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM position_entries WHERE file_id = ?1",
        )
        .bind(file_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0) + 1)
    }

    pub async fn insert_position_entries(
        &self,
        file_id: &str,
        version: i64,
        entries: &[LineEntry],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO position_entries
                (file_id, version, line_number, start_offset, end_offset, paragraph_number,
                 scene_number, chapter_number, content, is_empty, is_dialogue)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(file_id)
            .bind(version)
            .bind(entry.line_number as i64)
            .bind(entry.start_offset as i64)
            .bind(entry.end_offset as i64)
            .bind(entry.paragraph_number as i64)
            .bind(entry.scene_number.map(|n| n as i64))
            .bind(entry.chapter_number.map(|n| n as i64))
            .bind(&entry.content)
            .bind(entry.is_empty)
            .bind(entry.is_dialogue)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Latest-version position entries for a file, ordered by line number.
    pub async fn position_entries(&self, file_id: &str) -> Result<Vec<LineEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM position_entries
            WHERE file_id = ?1
              AND version = (SELECT MAX(version) FROM position_entries WHERE file_id = ?1)
            ORDER BY line_number
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LineEntry {
                line_number: row.get::<i64, _>("line_number") as u32,
                start_offset: row.get::<i64, _>("start_offset") as usize,
                end_offset: row.get::<i64, _>("end_offset") as usize,
                paragraph_number: row.get::<i64, _>("paragraph_number") as u32,
                scene_number: row.get::<Option<i64>, _>("scene_number").map(|n| n as u32),
                chapter_number: row.get::<Option<i64>, _>("chapter_number").map(|n| n as u32),
                content: row.get("content"),
                is_empty: row.get("is_empty"),
                is_dialogue: row.get("is_dialogue"),
            })
            .collect())
    }

    // ── entities ───────────────────────────────────────────────────────

    /// Insert or replace an entity by its `(project, kind, name)` key,
    /// returning its id.
    pub async fn upsert_entity(&self, entity: &Entity) -> Result<EntityId> {
        sqlx::query(
            r#"
            INSERT INTO entities
            (project_id, kind, name, aliases, confidence, mention_count, first_mention, last_mention)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(project_id, kind, name) DO UPDATE SET
                aliases = excluded.aliases,
                confidence = excluded.confidence,
                mention_count = excluded.mention_count,
                first_mention = excluded.first_mention,
                last_mention = excluded.last_mention
            "#,
        )
        .bind(&entity.project_id)
        .bind(entity.kind.as_str())
        .bind(&entity.name)
        .bind(serde_json::to_string(&entity.aliases)?)
        .bind(entity.confidence as f64)
        .bind(entity.mention_count as i64)
        .bind(entity.first_mention.as_ref().map(serde_json::to_string).transpose()?)
        .bind(entity.last_mention.as_ref().map(serde_json::to_string).transpose()?)
        .execute(&self.pool)
        .await?;

        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM entities WHERE project_id = ?1 AND kind = ?2 AND name = ?3",
        )
        .bind(&entity.project_id)
        .bind(entity.kind.as_str())
        .bind(&entity.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_entity(
        &self,
        project_id: &str,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<Entity>> {
        let row = sqlx::query(
            "SELECT * FROM entities WHERE project_id = ?1 AND kind = ?2 AND name = ?3",
        )
        .bind(project_id)
        .bind(kind.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(entity_from_row).transpose()
    }

    pub async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        let row = sqlx::query("SELECT * FROM entities WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(entity_from_row).transpose()
    }

    /// All entities of a project, most-mentioned first.
    pub async fn project_entities(&self, project_id: &str) -> Result<Vec<Entity>> {
        let rows = sqlx::query(
            "SELECT * FROM entities WHERE project_id = ?1 ORDER BY mention_count DESC, name",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(entity_from_row).collect()
    }

    // ── relationships ──────────────────────────────────────────────────

    /// Atomically replace the relationship for an entity pair. Strength and
    /// count are written together, so readers never observe one without the
    /// other.
    pub async fn replace_relationship(&self, relationship: &Relationship) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO relationships
            (project_id, source_id, target_id, kind, strength, cooccurrence_count, snippets)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(source_id, target_id) DO UPDATE SET
                project_id = excluded.project_id,
                kind = excluded.kind,
                strength = excluded.strength,
                cooccurrence_count = excluded.cooccurrence_count,
                snippets = excluded.snippets
            "#,
        )
        .bind(&relationship.project_id)
        .bind(relationship.source_id)
        .bind(relationship.target_id)
        .bind(relationship.kind.as_str())
        .bind(relationship.strength as f64)
        .bind(relationship.cooccurrence_count as i64)
        .bind(serde_json::to_string(&relationship.snippets)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn project_relationships(&self, project_id: &str) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(
            "SELECT * FROM relationships WHERE project_id = ?1 ORDER BY strength DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(relationship_from_row).collect()
    }

    /// Relationships with either endpoint in `entity_ids`.
    pub async fn relationships_touching(
        &self,
        entity_ids: &[EntityId],
    ) -> Result<Vec<Relationship>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let marks = placeholders(entity_ids.len());
        let query = format!(
            "SELECT * FROM relationships WHERE source_id IN ({marks}) OR target_id IN ({marks2})",
            marks2 = placeholders_from(entity_ids.len(), entity_ids.len())
        );
        let mut q = sqlx::query(&query);
        for id in entity_ids.iter().chain(entity_ids.iter()) {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(relationship_from_row).collect()
    }

    // ── tasks ──────────────────────────────────────────────────────────

    pub async fn insert_task(&self, task: &TaskRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks
            (task_id, project_id, kind, status, progress_current, progress_total,
             progress_message, created_at, started_at, completed_at, result, metadata, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.project_id)
        .bind(task.kind.as_str())
        .bind(task.status.as_str())
        .bind(task.progress.current as i64)
        .bind(task.progress.total as i64)
        .bind(&task.progress.message)
        .bind(task.created_at.timestamp())
        .bind(task.started_at.map(|t| t.timestamp()))
        .bind(task.completed_at.map(|t| t.timestamp()))
        .bind(task.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(serde_json::to_string(&task.metadata)?)
        .bind(task.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update a task row unless it has already reached a terminal status.
    ///
    /// Returns false when no update happened: the row is terminal (the
    /// state machine forbids further writes) or missing.
    pub async fn update_task(&self, task: &TaskRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = ?1, progress_current = ?2, progress_total = ?3, progress_message = ?4,
                started_at = ?5, completed_at = ?6, result = ?7, metadata = ?8, error = ?9
            WHERE task_id = ?10
              AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')
            "#,
        )
        .bind(task.status.as_str())
        .bind(task.progress.current as i64)
        .bind(task.progress.total as i64)
        .bind(&task.progress.message)
        .bind(task.started_at.map(|t| t.timestamp()))
        .bind(task.completed_at.map(|t| t.timestamp()))
        .bind(task.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(serde_json::to_string(&task.metadata)?)
        .bind(task.error.as_deref())
        .bind(&task.task_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(task_from_row).transpose()
    }

    /// All tasks for a project, newest first.
    pub async fn project_tasks(&self, project_id: &str) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE project_id = ?1 ORDER BY created_at DESC, task_id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(task_from_row).collect()
    }

    /// Non-terminal tasks for a project.
    pub async fn active_tasks(&self, project_id: &str) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE project_id = ?1
              AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')
            ORDER BY created_at
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(task_from_row).collect()
    }

    // ── statistics ─────────────────────────────────────────────────────

    pub async fn stats(&self, project_id: &str) -> Result<StoreStats> {
        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE project_id = ?1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE project_id = ?1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        let embedded: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks WHERE project_id = ?1 AND embedding IS NOT NULL",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        let entities: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE project_id = ?1")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await?;
        let relationships: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM relationships WHERE project_id = ?1")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreStats {
            files: files as usize,
            chunks: chunks as usize,
            embedded_chunks: embedded as usize,
            entities: entities as usize,
            relationships: relationships as usize,
        })
    }
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders_from(start: usize, count: usize) -> String {
    (start + 1..=start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn chunk_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ChunkRecord> {
    let entity_ids: String = row.get("entity_ids");
    let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
    Ok(ChunkRecord {
        id: Some(row.get("id")),
        file_id: row.get("file_id"),
        project_id: row.get("project_id"),
        chunk_index: row.get::<i64, _>("chunk_index") as usize,
        start_offset: row.get::<i64, _>("start_offset") as usize,
        end_offset: row.get::<i64, _>("end_offset") as usize,
        word_count: row.get::<i64, _>("word_count") as usize,
        content: row.get("content"),
        entity_ids: serde_json::from_str(&entity_ids)?,
        embedding: embedding_bytes.map(|bytes| bytemuck::cast_slice::<u8, f16>(&bytes).to_vec()),
    })
}

fn entity_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Entity> {
    let kind: String = row.get("kind");
    let aliases: String = row.get("aliases");
    let first: Option<String> = row.get("first_mention");
    let last: Option<String> = row.get("last_mention");
    Ok(Entity {
        id: Some(row.get("id")),
        project_id: row.get("project_id"),
        kind: EntityKind::parse(&kind)
            .ok_or_else(|| crate::error::IndexError::inconsistent(format!("entity kind {kind}")))?,
        name: row.get("name"),
        aliases: serde_json::from_str(&aliases)?,
        confidence: row.get::<f64, _>("confidence") as f32,
        mention_count: row.get::<i64, _>("mention_count") as u32,
        first_mention: first.map(|s| serde_json::from_str::<Mention>(&s)).transpose()?,
        last_mention: last.map(|s| serde_json::from_str::<Mention>(&s)).transpose()?,
    })
}

fn relationship_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Relationship> {
    let kind: String = row.get("kind");
    let snippets: String = row.get("snippets");
    Ok(Relationship {
        id: Some(row.get("id")),
        project_id: row.get("project_id"),
        source_id: row.get("source_id"),
        target_id: row.get("target_id"),
        kind: RelationshipKind::parse(&kind).ok_or_else(|| {
            crate::error::IndexError::inconsistent(format!("relationship kind {kind}"))
        })?,
        strength: row.get::<f64, _>("strength") as f32,
        cooccurrence_count: row.get::<i64, _>("cooccurrence_count") as u32,
        snippets: serde_json::from_str(&snippets)?,
    })
}

fn task_from_row(row: sqlx::sqlite::SqliteRow) -> Result<TaskRecord> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let result: Option<String> = row.get("result");
    let metadata: String = row.get("metadata");
    Ok(TaskRecord {
        task_id: row.get("task_id"),
        project_id: row.get("project_id"),
        kind: TaskKind::parse(&kind)
            .ok_or_else(|| crate::error::IndexError::inconsistent(format!("task kind {kind}")))?,
        status: TaskStatus::parse(&status).ok_or_else(|| {
            crate::error::IndexError::inconsistent(format!("task status {status}"))
        })?,
        progress: TaskProgress {
            current: row.get::<i64, _>("progress_current") as u64,
            total: row.get::<i64, _>("progress_total") as u64,
            message: row.get("progress_message"),
        },
        created_at: timestamp(row.get("created_at")),
        started_at: row.get::<Option<i64>, _>("started_at").map(timestamp),
        completed_at: row.get::<Option<i64>, _>("completed_at").map(timestamp),
        result: result.map(|s| serde_json::from_str(&s)).transpose()?,
        metadata: serde_json::from_str(&metadata)?,
        error: row.get("error"),
    })
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

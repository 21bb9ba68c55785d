//! SQLite Database
//!
//! Embedded database for prompts, graders, runs and grader results, using
//! rusqlite with r2d2 connection pooling.

use std::collections::HashMap;
use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use incito_graders::{builtin_graders, Grader, GraderError, GraderResult, GraderResultSink, GradingResult};
use incito_llm::UsageStats;
use incito_prompt::VariableValue;

use crate::models::prompt::PromptDocument;
use crate::models::run::{RunRecord, RunStatus};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{database_path, ensure_dir};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a database from an existing connection pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create an in-memory database for testing.
    ///
    /// A single pooled connection keeps every caller on the same in-memory
    /// database.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open the database at `~/.incito/data.db`
    pub fn new() -> AppResult<Self> {
        Self::open(&database_path()?)
    }

    /// Open (or create) a database file at `path`
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        debug!("[Storage] opened database at {}", path.display());
        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                template TEXT NOT NULL,
                variables TEXT NOT NULL DEFAULT '[]',
                grader_ids TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS graders (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                definition TEXT NOT NULL,
                is_builtin INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL,
                prompt_id TEXT,
                provider_id TEXT NOT NULL,
                model TEXT,
                status TEXT NOT NULL,
                rendered_prompt TEXT NOT NULL,
                output TEXT,
                error TEXT,
                duration_ms INTEGER,
                input_tokens INTEGER,
                output_tokens INTEGER,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS run_variables (
                run_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (run_id, key),
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS grader_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                grader_id TEXT NOT NULL,
                score REAL NOT NULL,
                passed INTEGER NOT NULL,
                reason TEXT,
                raw_score REAL,
                execution_time_ms INTEGER NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_runs_batch ON runs(batch_id);
            CREATE INDEX IF NOT EXISTS idx_runs_prompt ON runs(prompt_id);
            CREATE INDEX IF NOT EXISTS idx_grader_results_run ON grader_results(run_id);",
        )?;

        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        if let Ok(conn) = self.pool.get() {
            conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
        } else {
            false
        }
    }

    // ========================================================================
    // Prompt Operations
    // ========================================================================

    /// Insert or update a prompt document
    pub fn upsert_prompt(&self, prompt: &PromptDocument) -> AppResult<()> {
        prompt.validate()?;

        let conn = self.get_connection()?;
        let result = conn.execute(
            "INSERT INTO prompts (id, name, description, template, variables, grader_ids, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = ?2, description = ?3, template = ?4, variables = ?5,
                grader_ids = ?6, tags = ?7, updated_at = CURRENT_TIMESTAMP",
            params![
                prompt.id,
                prompt.name,
                prompt.description,
                prompt.template,
                serde_json::to_string(&prompt.variables)?,
                serde_json::to_string(&prompt.grader_ids)?,
                serde_json::to_string(&prompt.tags)?,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AppError::validation(format!(
                    "A prompt named '{}' already exists",
                    prompt.name
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_prompt(&self, id: &str) -> AppResult<Option<PromptDocument>> {
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                "SELECT id, name, description, template, variables, grader_ids, tags,
                        created_at, updated_at
                 FROM prompts WHERE id = ?1",
                params![id],
                PromptRow::from_row,
            )
            .optional()?;
        row.map(PromptRow::into_document).transpose()
    }

    /// List prompts ordered by name
    pub fn list_prompts(&self) -> AppResult<Vec<PromptDocument>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, template, variables, grader_ids, tags,
                    created_at, updated_at
             FROM prompts ORDER BY name COLLATE NOCASE",
        )?;
        let rows = stmt
            .query_map([], PromptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(PromptRow::into_document).collect()
    }

    /// Delete a prompt; returns whether a row was removed
    pub fn delete_prompt(&self, id: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let affected = conn.execute("DELETE FROM prompts WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // ========================================================================
    // Grader Operations
    // ========================================================================

    pub fn upsert_grader(&self, grader: &Grader) -> AppResult<()> {
        if grader.name.trim().is_empty() {
            return Err(AppError::validation("Grader name must not be empty"));
        }

        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO graders (id, name, definition, is_builtin, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = ?2, definition = ?3, is_builtin = ?4, enabled = ?5,
                updated_at = CURRENT_TIMESTAMP",
            params![
                grader.id,
                grader.name,
                serde_json::to_string(grader)?,
                grader.is_builtin,
                grader.enabled,
            ],
        )?;
        Ok(())
    }

    pub fn get_grader(&self, id: &str) -> AppResult<Option<Grader>> {
        let conn = self.get_connection()?;
        let definition: Option<String> = conn
            .query_row(
                "SELECT definition FROM graders WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        definition
            .map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    /// List graders, built-ins first
    pub fn list_graders(&self) -> AppResult<Vec<Grader>> {
        let conn = self.get_connection()?;
        let mut stmt =
            conn.prepare("SELECT definition FROM graders ORDER BY is_builtin DESC, name COLLATE NOCASE")?;
        let definitions = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        definitions
            .iter()
            .map(|json| serde_json::from_str(json).map_err(AppError::from))
            .collect()
    }

    /// Graders with the given ids, in the order requested. Unknown ids are skipped.
    pub fn get_graders_by_ids(&self, ids: &[String]) -> AppResult<Vec<Grader>> {
        let mut graders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(grader) = self.get_grader(id)? {
                graders.push(grader);
            }
        }
        Ok(graders)
    }

    /// Delete a user grader. Built-in graders cannot be deleted.
    pub fn delete_grader(&self, id: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let is_builtin: Option<bool> = conn
            .query_row(
                "SELECT is_builtin FROM graders WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match is_builtin {
            None => Ok(false),
            Some(true) => Err(AppError::validation(format!(
                "Built-in grader '{}' cannot be deleted",
                id
            ))),
            Some(false) => {
                conn.execute("DELETE FROM graders WHERE id = ?1", params![id])?;
                Ok(true)
            }
        }
    }

    /// Insert the built-in graders that are not stored yet.
    ///
    /// Existing rows are left alone so a user's enabled flag survives restarts.
    pub fn seed_builtin_graders(&self) -> AppResult<usize> {
        let conn = self.get_connection()?;
        let mut inserted = 0;
        for grader in builtin_graders() {
            inserted += conn.execute(
                "INSERT OR IGNORE INTO graders (id, name, definition, is_builtin, enabled)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![
                    grader.id,
                    grader.name,
                    serde_json::to_string(&grader)?,
                    grader.enabled
                ],
            )?;
        }
        if inserted > 0 {
            debug!("[Storage] seeded {} built-in grader(s)", inserted);
        }
        Ok(inserted)
    }

    // ========================================================================
    // Run Operations
    // ========================================================================

    pub fn insert_run(&self, run: &RunRecord) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO runs (id, batch_id, prompt_id, provider_id, model, status,
                               rendered_prompt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id,
                run.batch_id,
                run.prompt_id,
                run.provider_id,
                run.model,
                run.status.as_str(),
                run.rendered_prompt,
                run.created_at,
            ],
        )?;
        Ok(())
    }

    /// Write the outcome fields of a run
    pub fn update_run(&self, run: &RunRecord) -> AppResult<()> {
        let conn = self.get_connection()?;
        let affected = conn.execute(
            "UPDATE runs SET model = ?2, status = ?3, output = ?4, error = ?5,
                    duration_ms = ?6, input_tokens = ?7, output_tokens = ?8, completed_at = ?9
             WHERE id = ?1",
            params![
                run.id,
                run.model,
                run.status.as_str(),
                run.output,
                run.error,
                run.duration_ms.map(|ms| ms as i64),
                run.usage.map(|u| u.input_tokens),
                run.usage.map(|u| u.output_tokens),
                run.completed_at,
            ],
        )?;
        if affected == 0 {
            return Err(AppError::not_found(format!("run {}", run.id)));
        }
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> AppResult<Option<RunRecord>> {
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![id],
                RunRow::from_row,
            )
            .optional()?;
        row.map(RunRow::into_record).transpose()
    }

    /// Runs started together, ordered by provider
    pub fn list_runs_for_batch(&self, batch_id: &str) -> AppResult<Vec<RunRecord>> {
        self.query_runs(
            &format!(
                "SELECT {} FROM runs WHERE batch_id = ?1 ORDER BY provider_id",
                RUN_COLUMNS
            ),
            batch_id,
        )
    }

    /// Runs of a prompt, newest first
    pub fn list_runs_for_prompt(&self, prompt_id: &str) -> AppResult<Vec<RunRecord>> {
        self.query_runs(
            &format!(
                "SELECT {} FROM runs WHERE prompt_id = ?1 ORDER BY created_at DESC",
                RUN_COLUMNS
            ),
            prompt_id,
        )
    }

    fn query_runs(&self, sql: &str, param: &str) -> AppResult<Vec<RunRecord>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![param], RunRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RunRow::into_record).collect()
    }

    pub fn delete_run(&self, id: &str) -> AppResult<bool> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM grader_results WHERE run_id = ?1", params![id])?;
        tx.execute("DELETE FROM run_variables WHERE run_id = ?1", params![id])?;
        let affected = tx.execute("DELETE FROM runs WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    // ========================================================================
    // Run Variables
    // ========================================================================

    /// Replace the variable values saved for a run
    pub fn save_run_variables(
        &self,
        run_id: &str,
        values: &HashMap<String, VariableValue>,
    ) -> AppResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM run_variables WHERE run_id = ?1", params![run_id])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO run_variables (run_id, key, value) VALUES (?1, ?2, ?3)")?;
            for (key, value) in values {
                stmt.execute(params![run_id, key, serde_json::to_string(value)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_run_variables(&self, run_id: &str) -> AppResult<HashMap<String, VariableValue>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare("SELECT key, value FROM run_variables WHERE run_id = ?1")?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, json)| -> AppResult<(String, VariableValue)> {
                Ok((key, serde_json::from_str(&json)?))
            })
            .collect()
    }

    // ========================================================================
    // Grader Results
    // ========================================================================

    /// Insert all results for a run in one transaction
    pub fn insert_grader_results(&self, run_id: &str, results: &[GraderResult]) -> AppResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO grader_results
                    (run_id, grader_id, score, passed, reason, raw_score, execution_time_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for result in results {
                stmt.execute(params![
                    run_id,
                    result.grader_id,
                    result.score,
                    result.passed,
                    result.reason,
                    result.raw_score,
                    result.execution_time_ms as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Results of a run in insertion order
    pub fn get_grader_results(&self, run_id: &str) -> AppResult<Vec<GraderResult>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT grader_id, score, passed, reason, raw_score, execution_time_ms
             FROM grader_results WHERE run_id = ?1 ORDER BY id",
        )?;
        let results = stmt
            .query_map(params![run_id], |row| {
                Ok(GraderResult {
                    grader_id: row.get(0)?,
                    score: row.get(1)?,
                    passed: row.get(2)?,
                    reason: row.get(3)?,
                    raw_score: row.get(4)?,
                    execution_time_ms: row.get::<_, i64>(5)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }
}

impl GraderResultSink for Database {
    fn save_grader_results(&self, run_id: &str, results: &[GraderResult]) -> GradingResult<()> {
        self.insert_grader_results(run_id, results)
            .map_err(|e| GraderError::Persist(e.to_string()))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

struct PromptRow {
    id: String,
    name: String,
    description: Option<String>,
    template: String,
    variables: String,
    grader_ids: String,
    tags: String,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl PromptRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            template: row.get(3)?,
            variables: row.get(4)?,
            grader_ids: row.get(5)?,
            tags: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_document(self) -> AppResult<PromptDocument> {
        Ok(PromptDocument {
            id: self.id,
            name: self.name,
            description: self.description,
            template: self.template,
            variables: serde_json::from_str(&self.variables)?,
            grader_ids: serde_json::from_str(&self.grader_ids)?,
            tags: serde_json::from_str(&self.tags)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const RUN_COLUMNS: &str = "id, batch_id, prompt_id, provider_id, model, status, rendered_prompt, \
     output, error, duration_ms, input_tokens, output_tokens, created_at, completed_at";

struct RunRow {
    id: String,
    batch_id: String,
    prompt_id: Option<String>,
    provider_id: String,
    model: Option<String>,
    status: String,
    rendered_prompt: String,
    output: Option<String>,
    error: Option<String>,
    duration_ms: Option<i64>,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    created_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            batch_id: row.get(1)?,
            prompt_id: row.get(2)?,
            provider_id: row.get(3)?,
            model: row.get(4)?,
            status: row.get(5)?,
            rendered_prompt: row.get(6)?,
            output: row.get(7)?,
            error: row.get(8)?,
            duration_ms: row.get(9)?,
            input_tokens: row.get(10)?,
            output_tokens: row.get(11)?,
            created_at: row.get(12)?,
            completed_at: row.get(13)?,
        })
    }

    fn into_record(self) -> AppResult<RunRecord> {
        let status = RunStatus::parse(&self.status).ok_or_else(|| {
            AppError::database(format!("Unknown run status '{}' for {}", self.status, self.id))
        })?;
        let usage = match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (input, output) => Some(UsageStats {
                input_tokens: input.unwrap_or(0),
                output_tokens: output.unwrap_or(0),
            }),
        };
        Ok(RunRecord {
            id: self.id,
            batch_id: self.batch_id,
            prompt_id: self.prompt_id,
            provider_id: self.provider_id,
            model: self.model,
            status,
            rendered_prompt: self.rendered_prompt,
            output: self.output,
            error: self.error,
            duration_ms: self.duration_ms.map(|ms| ms as u64),
            usage,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use incito_graders::{AssertionLogic, AssertionOperator};
    use incito_prompt::Variable;

    fn create_test_db() -> Database {
        Database::new_in_memory().unwrap()
    }

    #[test]
    fn test_database_health() {
        let db = create_test_db();
        assert!(db.is_healthy());
    }

    #[test]
    fn test_prompt_crud() {
        let db = create_test_db();
        let mut prompt = PromptDocument::new("p1", "Email", "Dear {{name}}");
        prompt.variables[0] = Variable::text("name").required(true);
        db.upsert_prompt(&prompt).unwrap();

        let loaded = db.get_prompt("p1").unwrap().unwrap();
        assert_eq!(loaded.template, "Dear {{name}}");
        assert!(loaded.variables[0].required);
        assert!(loaded.created_at.is_some());

        prompt.set_template("Hello {{name}}");
        db.upsert_prompt(&prompt).unwrap();
        assert_eq!(db.list_prompts().unwrap().len(), 1);
        assert_eq!(db.get_prompt("p1").unwrap().unwrap().template, "Hello {{name}}");

        assert!(db.delete_prompt("p1").unwrap());
        assert!(!db.delete_prompt("p1").unwrap());
        assert!(db.get_prompt("p1").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_prompt_name_rejected() {
        let db = create_test_db();
        db.upsert_prompt(&PromptDocument::new("p1", "Email", "x")).unwrap();
        let err = db
            .upsert_prompt(&PromptDocument::new("p2", "Email", "y"))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_seed_builtins_is_idempotent() {
        let db = create_test_db();
        assert_eq!(db.seed_builtin_graders().unwrap(), 3);
        assert_eq!(db.seed_builtin_graders().unwrap(), 0);

        let graders = db.list_graders().unwrap();
        assert_eq!(graders.len(), 3);
        assert!(graders.iter().all(|g| g.is_builtin));
    }

    #[test]
    fn test_builtin_grader_cannot_be_deleted() {
        let db = create_test_db();
        db.seed_builtin_graders().unwrap();
        let err = db.delete_grader("builtin-not-empty").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let custom = Grader::assertion(
            "g1",
            "Mentions refund",
            AssertionLogic::new(AssertionOperator::Contains, "refund"),
        );
        db.upsert_grader(&custom).unwrap();
        assert_eq!(db.get_grader("g1").unwrap(), Some(custom));
        assert!(db.delete_grader("g1").unwrap());
        assert!(!db.delete_grader("g1").unwrap());
    }

    #[test]
    fn test_graders_by_ids_keeps_request_order() {
        let db = create_test_db();
        db.seed_builtin_graders().unwrap();
        let ids = vec![
            "builtin-valid-json".to_string(),
            "missing".to_string(),
            "builtin-not-empty".to_string(),
        ];
        let graders = db.get_graders_by_ids(&ids).unwrap();
        let got: Vec<&str> = graders.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(got, vec!["builtin-valid-json", "builtin-not-empty"]);
    }

    #[test]
    fn test_run_lifecycle() {
        let db = create_test_db();
        let mut run = RunRecord::started("batch-1", Some("p1".to_string()), "claude", "Hi");
        db.insert_run(&run).unwrap();

        let loaded = db.get_run(&run.id).unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert!(loaded.usage.is_none());

        run.status = RunStatus::Completed;
        run.output = Some("Hello".to_string());
        run.duration_ms = Some(120);
        run.usage = Some(UsageStats {
            input_tokens: 10,
            output_tokens: 3,
        });
        db.update_run(&run).unwrap();

        let loaded = db.get_run(&run.id).unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(db.list_runs_for_batch("batch-1").unwrap().len(), 1);
        assert_eq!(db.list_runs_for_prompt("p1").unwrap().len(), 1);
    }

    #[test]
    fn test_update_missing_run() {
        let db = create_test_db();
        let run = RunRecord::started("b", None, "claude", "x");
        assert!(matches!(db.update_run(&run), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_run_variables_round_trip() {
        let db = create_test_db();
        let run = RunRecord::started("b", None, "claude", "x");
        db.insert_run(&run).unwrap();

        let mut values = HashMap::new();
        values.insert("topic".to_string(), VariableValue::from("rust"));
        values.insert("count".to_string(), VariableValue::Number(3.0));
        values.insert("tags".to_string(), VariableValue::from(vec!["a", "b"]));
        db.save_run_variables(&run.id, &values).unwrap();
        assert_eq!(db.get_run_variables(&run.id).unwrap(), values);

        values.remove("tags");
        db.save_run_variables(&run.id, &values).unwrap();
        assert_eq!(db.get_run_variables(&run.id).unwrap().len(), 2);
    }

    #[test]
    fn test_grader_results_via_sink() {
        let db = create_test_db();
        let run = RunRecord::started("b", None, "claude", "x");
        db.insert_run(&run).unwrap();

        let results = vec![
            GraderResult {
                grader_id: "a".to_string(),
                score: 1.0,
                passed: true,
                reason: Some("ok".to_string()),
                raw_score: None,
                execution_time_ms: 1,
            },
            GraderResult {
                grader_id: "b".to_string(),
                score: 0.0,
                passed: false,
                reason: None,
                raw_score: Some(2.5),
                execution_time_ms: 7,
            },
        ];
        db.save_grader_results(&run.id, &results).unwrap();
        assert_eq!(db.get_grader_results(&run.id).unwrap(), results);

        assert!(db.delete_run(&run.id).unwrap());
        assert!(db.get_grader_results(&run.id).unwrap().is_empty());
    }
}

//! SQLite-backed survey store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::Semaphore;

use super::{now_epoch, StoreError, SurveyStore};
use crate::model::{
    Category, CategoryId, CategoryUpdate, Competency, CompetencyId, CompetencyUpdate, Evaluator,
    EvaluatorId, EvaluatorUpdate, Group, GroupId, GroupStage, GroupUpdate, NewCompetency,
    Participant, ParticipantId, ParticipantUpdate, Response, Scores, Template, TemplateId,
    TemplateUpdate,
};

const TEMPLATE_COLUMNS: &str = "id, name, description, active, created_at";
const CATEGORY_COLUMNS: &str = "id, template_id, name, position";
const COMPETENCY_SELECT: &str = "SELECT c.id, c.category_id, cat.name, c.self_text, \
     c.feedback_text, c.position FROM competencies c JOIN categories cat ON cat.id = c.category_id";
const GROUP_COLUMNS: &str = "id, name, company, template_id, stage, created_at";
const PARTICIPANT_COLUMNS: &str = "id, group_id, seq, name, email, self_assessment_completed, \
     self_invitation_sent, self_invited_at, feedback_invitation_sent, created_at";
const EVALUATOR_COLUMNS: &str = "id, participant_id, name, email, completed, invited_at, created_at";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    /// Only one blocking thread waits on the connection mutex at a time.
    sem: Arc<Semaphore>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sem: Arc::new(Semaphore::new(1)),
        })
    }

    /// `FEEDBACK360_DB`, else `feedback360.sqlite` in the working directory.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("FEEDBACK360_DB") {
            return PathBuf::from(path);
        }
        PathBuf::from("feedback360.sqlite")
    }

    /// Run `f` on the blocking pool with the connection locked.
    /// A poisoned mutex is recovered; the connection is still usable.
    async fn run<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let _permit = self.sem.acquire().await.map_err(|_| StoreError::Closed)?;
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    fn create_tables(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id INTEGER NOT NULL REFERENCES templates(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_categories_template ON categories(template_id);

            CREATE TABLE IF NOT EXISTS competencies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                self_text TEXT NOT NULL,
                feedback_text TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_competencies_category ON competencies(category_id);

            CREATE TABLE IF NOT EXISTS survey_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                company TEXT NOT NULL DEFAULT '',
                template_id INTEGER NOT NULL REFERENCES templates(id),
                stage TEXT NOT NULL DEFAULT 'created',
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS participants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES survey_groups(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                self_assessment_completed INTEGER NOT NULL DEFAULT 0,
                self_invitation_sent INTEGER NOT NULL DEFAULT 0,
                self_invited_at INTEGER,
                feedback_invitation_sent INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_participants_group ON participants(group_id);

            CREATE TABLE IF NOT EXISTS evaluators (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                invited_at INTEGER,
                created_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_evaluators_email
                ON evaluators(participant_id, email COLLATE NOCASE);

            -- No foreign key on competency_id: responses outlive deleted competencies.
            CREATE TABLE IF NOT EXISTS responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
                competency_id INTEGER NOT NULL,
                evaluator_id INTEGER REFERENCES evaluators(id) ON DELETE CASCADE,
                score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
                created_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_responses_self
                ON responses(participant_id, competency_id) WHERE evaluator_id IS NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_responses_feedback
                ON responses(participant_id, evaluator_id, competency_id)
                WHERE evaluator_id IS NOT NULL;",
        )?;
        Ok(())
    }
}

fn not_found(what: &str, id: i64) -> impl FnOnce(rusqlite::Error) -> StoreError + '_ {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("{what} {id}")),
        other => StoreError::Sqlite(other),
    }
}

fn ensure_changed(rows: usize, what: &str, id: i64) -> Result<(), StoreError> {
    if rows == 0 {
        return Err(StoreError::NotFound(format!("{what} {id}")));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Row readers (shared by the trait impl)
// -----------------------------------------------------------------------------

fn read_template(conn: &Connection, id: TemplateId) -> Result<Template, StoreError> {
    conn.query_row(
        &format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"),
        params![id],
        row_to_template,
    )
    .map_err(not_found("template", id))
}

fn read_category(conn: &Connection, id: CategoryId) -> Result<Category, StoreError> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
        params![id],
        row_to_category,
    )
    .map_err(not_found("category", id))
}

fn read_competency(conn: &Connection, id: CompetencyId) -> Result<Competency, StoreError> {
    conn.query_row(
        &format!("{COMPETENCY_SELECT} WHERE c.id = ?1"),
        params![id],
        row_to_competency,
    )
    .map_err(not_found("competency", id))
}

fn read_group(conn: &Connection, id: GroupId) -> Result<Group, StoreError> {
    conn.query_row(
        &format!("SELECT {GROUP_COLUMNS} FROM survey_groups WHERE id = ?1"),
        params![id],
        row_to_group,
    )
    .map_err(not_found("group", id))
}

fn read_participant(conn: &Connection, id: ParticipantId) -> Result<Participant, StoreError> {
    conn.query_row(
        &format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?1"),
        params![id],
        row_to_participant,
    )
    .map_err(not_found("participant", id))
}

fn read_evaluator(conn: &Connection, id: EvaluatorId) -> Result<Evaluator, StoreError> {
    conn.query_row(
        &format!("SELECT {EVALUATOR_COLUMNS} FROM evaluators WHERE id = ?1"),
        params![id],
        row_to_evaluator,
    )
    .map_err(not_found("evaluator", id))
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(map(row)?);
    }
    Ok(out)
}

#[async_trait]
impl SurveyStore for SqliteStore {
    // -------------------------------------------------------------------------
    // Templates
    // -------------------------------------------------------------------------

    async fn create_template(&self, name: &str, description: &str) -> Result<Template, StoreError> {
        let name = name.to_string();
        let description = description.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO templates (name, description, active, created_at) \
                 VALUES (?1, ?2, 1, ?3)",
                params![name, description, now_epoch()],
            )?;
            read_template(conn, conn.last_insert_rowid())
        })
        .await
    }

    async fn get_template(&self, id: TemplateId) -> Result<Template, StoreError> {
        self.run(move |conn| read_template(conn, id)).await
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY id"),
                [],
                row_to_template,
            )
        })
        .await
    }

    async fn update_template(
        &self,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template, StoreError> {
        self.run(move |conn| {
            let rows = conn.execute(
                "UPDATE templates SET name = COALESCE(?1, name), \
                 description = COALESCE(?2, description), active = COALESCE(?3, active) \
                 WHERE id = ?4",
                params![update.name, update.description, update.active, id],
            )?;
            ensure_changed(rows, "template", id)?;
            read_template(conn, id)
        })
        .await
    }

    async fn delete_template(&self, id: TemplateId) -> Result<(), StoreError> {
        self.run(move |conn| {
            let rows = conn
                .execute("DELETE FROM templates WHERE id = ?1", params![id])
                .map_err(StoreError::from)
                .map_err(|e| {
                    if e.is_constraint_violation() {
                        StoreError::Conflict(format!("template {id} is used by a group"))
                    } else {
                        e
                    }
                })?;
            ensure_changed(rows, "template", id)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    async fn create_category(
        &self,
        template_id: TemplateId,
        name: &str,
        position: i64,
    ) -> Result<Category, StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            read_template(conn, template_id)?;
            conn.execute(
                "INSERT INTO categories (template_id, name, position) VALUES (?1, ?2, ?3)",
                params![template_id, name, position],
            )?;
            read_category(conn, conn.last_insert_rowid())
        })
        .await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Category, StoreError> {
        self.run(move |conn| read_category(conn, id)).await
    }

    async fn list_categories(&self, template_id: TemplateId) -> Result<Vec<Category>, StoreError> {
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {CATEGORY_COLUMNS} FROM categories WHERE template_id = ?1 \
                     ORDER BY position, id"
                ),
                params![template_id],
                row_to_category,
            )
        })
        .await
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, StoreError> {
        self.run(move |conn| {
            let rows = conn.execute(
                "UPDATE categories SET name = COALESCE(?1, name), \
                 position = COALESCE(?2, position) WHERE id = ?3",
                params![update.name, update.position, id],
            )?;
            ensure_changed(rows, "category", id)?;
            read_category(conn, id)
        })
        .await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        self.run(move |conn| {
            let rows = conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
            ensure_changed(rows, "category", id)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Competencies
    // -------------------------------------------------------------------------

    async fn create_competency(
        &self,
        category_id: CategoryId,
        competency: NewCompetency,
    ) -> Result<Competency, StoreError> {
        self.run(move |conn| {
            read_category(conn, category_id)?;
            conn.execute(
                "INSERT INTO competencies (category_id, self_text, feedback_text, position) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    category_id,
                    competency.self_text,
                    competency.feedback_text,
                    competency.position
                ],
            )?;
            read_competency(conn, conn.last_insert_rowid())
        })
        .await
    }

    async fn get_competency(&self, id: CompetencyId) -> Result<Competency, StoreError> {
        self.run(move |conn| read_competency(conn, id)).await
    }

    async fn list_competencies(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<Competency>, StoreError> {
        self.run(move |conn| {
            query_all(
                conn,
                &format!("{COMPETENCY_SELECT} WHERE c.category_id = ?1 ORDER BY c.position, c.id"),
                params![category_id],
                row_to_competency,
            )
        })
        .await
    }

    async fn list_competencies_by_template(
        &self,
        template_id: TemplateId,
    ) -> Result<Vec<Competency>, StoreError> {
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "{COMPETENCY_SELECT} WHERE cat.template_id = ?1 \
                     ORDER BY cat.position, cat.id, c.position, c.id"
                ),
                params![template_id],
                row_to_competency,
            )
        })
        .await
    }

    async fn update_competency(
        &self,
        id: CompetencyId,
        update: CompetencyUpdate,
    ) -> Result<Competency, StoreError> {
        self.run(move |conn| {
            let rows = conn.execute(
                "UPDATE competencies SET self_text = COALESCE(?1, self_text), \
                 feedback_text = COALESCE(?2, feedback_text), \
                 position = COALESCE(?3, position) WHERE id = ?4",
                params![update.self_text, update.feedback_text, update.position, id],
            )?;
            ensure_changed(rows, "competency", id)?;
            read_competency(conn, id)
        })
        .await
    }

    async fn delete_competency(&self, id: CompetencyId) -> Result<(), StoreError> {
        self.run(move |conn| {
            let rows = conn.execute("DELETE FROM competencies WHERE id = ?1", params![id])?;
            ensure_changed(rows, "competency", id)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Groups
    // -------------------------------------------------------------------------

    async fn create_group(
        &self,
        name: &str,
        company: &str,
        template_id: TemplateId,
    ) -> Result<Group, StoreError> {
        let name = name.to_string();
        let company = company.to_string();
        self.run(move |conn| {
            read_template(conn, template_id)?;
            conn.execute(
                "INSERT INTO survey_groups (name, company, template_id, stage, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    name,
                    company,
                    template_id,
                    GroupStage::Created.as_str(),
                    now_epoch()
                ],
            )?;
            read_group(conn, conn.last_insert_rowid())
        })
        .await
    }

    async fn get_group(&self, id: GroupId) -> Result<Group, StoreError> {
        self.run(move |conn| read_group(conn, id)).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {GROUP_COLUMNS} FROM survey_groups ORDER BY id"),
                [],
                row_to_group,
            )
        })
        .await
    }

    async fn update_group(&self, id: GroupId, update: GroupUpdate) -> Result<Group, StoreError> {
        self.run(move |conn| {
            if let Some(template_id) = update.template_id {
                read_template(conn, template_id)?;
            }
            let rows = conn.execute(
                "UPDATE survey_groups SET name = COALESCE(?1, name), company = COALESCE(?2, company), \
                 template_id = COALESCE(?3, template_id), stage = COALESCE(?4, stage) \
                 WHERE id = ?5",
                params![
                    update.name,
                    update.company,
                    update.template_id,
                    update.stage.map(GroupStage::as_str),
                    id
                ],
            )?;
            ensure_changed(rows, "group", id)?;
            read_group(conn, id)
        })
        .await
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        self.run(move |conn| {
            let rows = conn.execute("DELETE FROM survey_groups WHERE id = ?1", params![id])?;
            ensure_changed(rows, "group", id)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Participants
    // -------------------------------------------------------------------------

    async fn create_participant(
        &self,
        group_id: GroupId,
        name: &str,
        email: &str,
    ) -> Result<Participant, StoreError> {
        let name = name.to_string();
        let email = email.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            read_group(&tx, group_id)?;
            let seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM participants WHERE group_id = ?1",
                params![group_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO participants (group_id, seq, name, email, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![group_id, seq, name, email, now_epoch()],
            )?;
            let participant = read_participant(&tx, tx.last_insert_rowid())?;
            tx.commit()?;
            Ok(participant)
        })
        .await
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        self.run(move |conn| read_participant(conn, id)).await
    }

    async fn list_participants(&self, group_id: GroupId) -> Result<Vec<Participant>, StoreError> {
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE group_id = ?1 \
                     ORDER BY seq, id"
                ),
                params![group_id],
                row_to_participant,
            )
        })
        .await
    }

    async fn update_participant(
        &self,
        id: ParticipantId,
        update: ParticipantUpdate,
    ) -> Result<Participant, StoreError> {
        self.run(move |conn| {
            let rows = conn.execute(
                "UPDATE participants SET name = COALESCE(?1, name), email = COALESCE(?2, email), \
                 self_assessment_completed = COALESCE(?3, self_assessment_completed), \
                 self_invitation_sent = COALESCE(?4, self_invitation_sent), \
                 self_invited_at = COALESCE(?5, self_invited_at), \
                 feedback_invitation_sent = COALESCE(?6, feedback_invitation_sent) \
                 WHERE id = ?7",
                params![
                    update.name,
                    update.email,
                    update.self_assessment_completed,
                    update.self_invitation_sent,
                    update.self_invited_at,
                    update.feedback_invitation_sent,
                    id
                ],
            )?;
            ensure_changed(rows, "participant", id)?;
            read_participant(conn, id)
        })
        .await
    }

    async fn delete_participant(&self, id: ParticipantId) -> Result<(), StoreError> {
        self.run(move |conn| {
            let rows = conn.execute("DELETE FROM participants WHERE id = ?1", params![id])?;
            ensure_changed(rows, "participant", id)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Evaluators
    // -------------------------------------------------------------------------

    async fn create_evaluator(
        &self,
        participant_id: ParticipantId,
        name: &str,
        email: &str,
    ) -> Result<Evaluator, StoreError> {
        let name = name.to_string();
        let email = email.to_string();
        self.run(move |conn| {
            read_participant(conn, participant_id)?;
            conn.execute(
                "INSERT INTO evaluators (participant_id, name, email, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![participant_id, name, email, now_epoch()],
            )
            .map_err(StoreError::from)
            .map_err(|e| {
                if e.is_constraint_violation() {
                    StoreError::Conflict(format!(
                        "participant {participant_id} already has an evaluator with e-mail {email}"
                    ))
                } else {
                    e
                }
            })?;
            read_evaluator(conn, conn.last_insert_rowid())
        })
        .await
    }

    async fn get_evaluator(&self, id: EvaluatorId) -> Result<Evaluator, StoreError> {
        self.run(move |conn| read_evaluator(conn, id)).await
    }

    async fn list_evaluators(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Evaluator>, StoreError> {
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {EVALUATOR_COLUMNS} FROM evaluators WHERE participant_id = ?1 \
                     ORDER BY id"
                ),
                params![participant_id],
                row_to_evaluator,
            )
        })
        .await
    }

    async fn find_evaluator_by_email(
        &self,
        participant_id: ParticipantId,
        email: &str,
    ) -> Result<Option<Evaluator>, StoreError> {
        let email = email.trim().to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {EVALUATOR_COLUMNS} FROM evaluators \
                     WHERE participant_id = ?1 AND email = ?2 COLLATE NOCASE"
                ),
                params![participant_id, email],
                row_to_evaluator,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_evaluator(
        &self,
        id: EvaluatorId,
        update: EvaluatorUpdate,
    ) -> Result<Evaluator, StoreError> {
        self.run(move |conn| {
            let rows = conn
                .execute(
                    "UPDATE evaluators SET name = COALESCE(?1, name), \
                     email = COALESCE(?2, email), completed = COALESCE(?3, completed), \
                     invited_at = COALESCE(?4, invited_at) WHERE id = ?5",
                    params![
                        update.name,
                        update.email,
                        update.completed,
                        update.invited_at,
                        id
                    ],
                )
                .map_err(StoreError::from)
                .map_err(|e| {
                    if e.is_constraint_violation() {
                        StoreError::Conflict(format!("duplicate evaluator e-mail for evaluator {id}"))
                    } else {
                        e
                    }
                })?;
            ensure_changed(rows, "evaluator", id)?;
            read_evaluator(conn, id)
        })
        .await
    }

    async fn delete_evaluator(&self, id: EvaluatorId) -> Result<(), StoreError> {
        self.run(move |conn| {
            let rows = conn.execute("DELETE FROM evaluators WHERE id = ?1", params![id])?;
            ensure_changed(rows, "evaluator", id)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Responses
    // -------------------------------------------------------------------------

    async fn list_responses_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Response>, StoreError> {
        self.run(move |conn| {
            query_all(
                conn,
                "SELECT participant_id, competency_id, evaluator_id, score FROM responses \
                 WHERE participant_id = ?1 ORDER BY evaluator_id IS NOT NULL, evaluator_id, \
                 competency_id",
                params![participant_id],
                row_to_response,
            )
        })
        .await
    }

    async fn replace_responses(
        &self,
        participant_id: ParticipantId,
        evaluator_id: Option<EvaluatorId>,
        scores: &Scores,
    ) -> Result<(), StoreError> {
        let scores = scores.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            read_participant(&tx, participant_id)?;

            match evaluator_id {
                Some(evaluator_id) => {
                    let evaluator = read_evaluator(&tx, evaluator_id)?;
                    if evaluator.participant_id != participant_id {
                        return Err(StoreError::NotFound(format!(
                            "evaluator {evaluator_id} for participant {participant_id}"
                        )));
                    }
                    tx.execute(
                        "DELETE FROM responses WHERE participant_id = ?1 AND evaluator_id = ?2",
                        params![participant_id, evaluator_id],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM responses WHERE participant_id = ?1 AND evaluator_id IS NULL",
                        params![participant_id],
                    )?;
                }
            }

            let now = now_epoch();
            {
                let mut insert = tx.prepare(
                    "INSERT INTO responses (participant_id, competency_id, evaluator_id, score, \
                     created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (&competency_id, &score) in &scores {
                    insert.execute(params![participant_id, competency_id, evaluator_id, score, now])?;
                }
            }

            match evaluator_id {
                Some(evaluator_id) => tx.execute(
                    "UPDATE evaluators SET completed = 1 WHERE id = ?1",
                    params![evaluator_id],
                )?,
                None => tx.execute(
                    "UPDATE participants SET self_assessment_completed = 1 WHERE id = ?1",
                    params![participant_id],
                )?,
            };

            tx.commit()?;
            Ok(())
        })
        .await
    }
}

// =============================================================================
// Row converters
// =============================================================================

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
    })
}

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        template_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
    })
}

fn row_to_competency(row: &rusqlite::Row<'_>) -> rusqlite::Result<Competency> {
    Ok(Competency {
        id: row.get(0)?,
        category_id: row.get(1)?,
        category_name: row.get(2)?,
        self_text: row.get(3)?,
        feedback_text: row.get(4)?,
        position: row.get(5)?,
    })
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        company: row.get(2)?,
        template_id: row.get(3)?,
        stage: GroupStage::from_str(&row.get::<_, String>(4)?),
        created_at: row.get(5)?,
    })
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        group_id: row.get(1)?,
        seq: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        self_assessment_completed: row.get::<_, i64>(5)? != 0,
        self_invitation_sent: row.get::<_, i64>(6)? != 0,
        self_invited_at: row.get(7)?,
        feedback_invitation_sent: row.get::<_, i64>(8)? != 0,
        created_at: row.get(9)?,
    })
}

fn row_to_evaluator(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evaluator> {
    Ok(Evaluator {
        id: row.get(0)?,
        participant_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        completed: row.get::<_, i64>(4)? != 0,
        invited_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<Response> {
    Ok(Response {
        participant_id: row.get(0)?,
        competency_id: row.get(1)?,
        evaluator_id: row.get(2)?,
        score: row.get(3)?,
    })
}

//! Survey data store.
//!
//! [`SurveyStore`] is the persistence boundary: record CRUD, list-by-parent
//! queries and the atomic response replacement used by submissions.
//! [`SqliteStore`] is the shipped adapter; [`RetryingStore`] wraps any store
//! and retries transient failures.

pub mod retry;
pub mod sqlite;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::ErrorCode;

use crate::model::{
    Category, CategoryId, CategoryUpdate, Competency, CompetencyId, CompetencyUpdate, Evaluator,
    EvaluatorId, EvaluatorUpdate, Group, GroupId, GroupUpdate, NewCompetency, Participant,
    ParticipantId, ParticipantUpdate, Response, Scores, Template, TemplateId, TemplateUpdate,
};

pub use retry::{RetryingStore, StoreRetryConfig};
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(String),
    #[error("store closed")]
    Closed,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Busy/locked database and I/O failures may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure
            ),
            Self::Io(_) => true,
            _ => false,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
        )
    }
}

pub(crate) fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
pub trait SurveyStore: Send + Sync {
    // Templates
    async fn create_template(&self, name: &str, description: &str) -> Result<Template, StoreError>;
    async fn get_template(&self, id: TemplateId) -> Result<Template, StoreError>;
    async fn list_templates(&self) -> Result<Vec<Template>, StoreError>;
    async fn update_template(
        &self,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template, StoreError>;
    async fn delete_template(&self, id: TemplateId) -> Result<(), StoreError>;

    // Categories
    async fn create_category(
        &self,
        template_id: TemplateId,
        name: &str,
        position: i64,
    ) -> Result<Category, StoreError>;
    async fn get_category(&self, id: CategoryId) -> Result<Category, StoreError>;
    async fn list_categories(&self, template_id: TemplateId) -> Result<Vec<Category>, StoreError>;
    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, StoreError>;
    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError>;

    // Competencies
    async fn create_competency(
        &self,
        category_id: CategoryId,
        competency: NewCompetency,
    ) -> Result<Competency, StoreError>;
    async fn get_competency(&self, id: CompetencyId) -> Result<Competency, StoreError>;
    async fn list_competencies(&self, category_id: CategoryId)
        -> Result<Vec<Competency>, StoreError>;
    /// Category-joined, ordered by category position then competency position.
    async fn list_competencies_by_template(
        &self,
        template_id: TemplateId,
    ) -> Result<Vec<Competency>, StoreError>;
    async fn update_competency(
        &self,
        id: CompetencyId,
        update: CompetencyUpdate,
    ) -> Result<Competency, StoreError>;
    /// Historical responses to the competency are kept.
    async fn delete_competency(&self, id: CompetencyId) -> Result<(), StoreError>;

    // Groups
    async fn create_group(
        &self,
        name: &str,
        company: &str,
        template_id: TemplateId,
    ) -> Result<Group, StoreError>;
    async fn get_group(&self, id: GroupId) -> Result<Group, StoreError>;
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;
    async fn update_group(&self, id: GroupId, update: GroupUpdate) -> Result<Group, StoreError>;
    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError>;

    // Participants
    /// Assigns the next sequence number within the group.
    async fn create_participant(
        &self,
        group_id: GroupId,
        name: &str,
        email: &str,
    ) -> Result<Participant, StoreError>;
    async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError>;
    async fn list_participants(&self, group_id: GroupId) -> Result<Vec<Participant>, StoreError>;
    async fn update_participant(
        &self,
        id: ParticipantId,
        update: ParticipantUpdate,
    ) -> Result<Participant, StoreError>;
    async fn delete_participant(&self, id: ParticipantId) -> Result<(), StoreError>;

    // Evaluators
    /// Fails with [`StoreError::Conflict`] when the participant already has an
    /// evaluator with this e-mail (case-insensitive).
    async fn create_evaluator(
        &self,
        participant_id: ParticipantId,
        name: &str,
        email: &str,
    ) -> Result<Evaluator, StoreError>;
    async fn get_evaluator(&self, id: EvaluatorId) -> Result<Evaluator, StoreError>;
    async fn list_evaluators(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Evaluator>, StoreError>;
    async fn find_evaluator_by_email(
        &self,
        participant_id: ParticipantId,
        email: &str,
    ) -> Result<Option<Evaluator>, StoreError>;
    async fn update_evaluator(
        &self,
        id: EvaluatorId,
        update: EvaluatorUpdate,
    ) -> Result<Evaluator, StoreError>;
    async fn delete_evaluator(&self, id: EvaluatorId) -> Result<(), StoreError>;

    // Responses
    async fn list_responses_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Response>, StoreError>;

    /// Atomically purge the previous responses of this respondent, insert
    /// `scores`, and mark the self-assessment (or the evaluator) completed.
    async fn replace_responses(
        &self,
        participant_id: ParticipantId,
        evaluator_id: Option<EvaluatorId>,
        scores: &Scores,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_locked_are_transient() {
        let busy = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());

        let constraint = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        ));
        assert!(!constraint.is_transient());
        assert!(constraint.is_constraint_violation());

        assert!(!StoreError::NotFound("template 1".into()).is_transient());
    }
}

//! Retrying decorator over any [`SurveyStore`].
//!
//! Every method goes through the same loop: transient failures (busy/locked
//! database, I/O) are retried after a fixed delay, everything else returns
//! immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use super::{StoreError, SurveyStore};
use crate::model::{
    Category, CategoryId, CategoryUpdate, Competency, CompetencyId, CompetencyUpdate, Evaluator,
    EvaluatorId, EvaluatorUpdate, Group, GroupId, GroupUpdate, NewCompetency, Participant,
    ParticipantId, ParticipantUpdate, Response, Scores, Template, TemplateId, TemplateUpdate,
};

#[derive(Debug, Clone)]
pub struct StoreRetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct RetryingStore<S> {
    inner: S,
    config: StoreRetryConfig,
}

impl<S: SurveyStore> RetryingStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, StoreRetryConfig::default())
    }

    pub fn with_config(inner: S, config: StoreRetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f().await {
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    warn!(
                        op,
                        attempt,
                        delay_ms = self.config.delay.as_millis() as u64,
                        "transient store error, retrying: {err}"
                    );
                    sleep(self.config.delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S: SurveyStore> SurveyStore for RetryingStore<S> {
    async fn create_template(&self, name: &str, description: &str) -> Result<Template, StoreError> {
        self.retry("create_template", || self.inner.create_template(name, description))
            .await
    }

    async fn get_template(&self, id: TemplateId) -> Result<Template, StoreError> {
        self.retry("get_template", || self.inner.get_template(id)).await
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        self.retry("list_templates", || self.inner.list_templates()).await
    }

    async fn update_template(
        &self,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template, StoreError> {
        self.retry("update_template", || self.inner.update_template(id, update.clone()))
            .await
    }

    async fn delete_template(&self, id: TemplateId) -> Result<(), StoreError> {
        self.retry("delete_template", || self.inner.delete_template(id)).await
    }

    async fn create_category(
        &self,
        template_id: TemplateId,
        name: &str,
        position: i64,
    ) -> Result<Category, StoreError> {
        self.retry("create_category", || {
            self.inner.create_category(template_id, name, position)
        })
        .await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Category, StoreError> {
        self.retry("get_category", || self.inner.get_category(id)).await
    }

    async fn list_categories(&self, template_id: TemplateId) -> Result<Vec<Category>, StoreError> {
        self.retry("list_categories", || self.inner.list_categories(template_id))
            .await
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, StoreError> {
        self.retry("update_category", || self.inner.update_category(id, update.clone()))
            .await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        self.retry("delete_category", || self.inner.delete_category(id)).await
    }

    async fn create_competency(
        &self,
        category_id: CategoryId,
        competency: NewCompetency,
    ) -> Result<Competency, StoreError> {
        self.retry("create_competency", || {
            self.inner.create_competency(category_id, competency.clone())
        })
        .await
    }

    async fn get_competency(&self, id: CompetencyId) -> Result<Competency, StoreError> {
        self.retry("get_competency", || self.inner.get_competency(id)).await
    }

    async fn list_competencies(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<Competency>, StoreError> {
        self.retry("list_competencies", || self.inner.list_competencies(category_id))
            .await
    }

    async fn list_competencies_by_template(
        &self,
        template_id: TemplateId,
    ) -> Result<Vec<Competency>, StoreError> {
        self.retry("list_competencies_by_template", || {
            self.inner.list_competencies_by_template(template_id)
        })
        .await
    }

    async fn update_competency(
        &self,
        id: CompetencyId,
        update: CompetencyUpdate,
    ) -> Result<Competency, StoreError> {
        self.retry("update_competency", || {
            self.inner.update_competency(id, update.clone())
        })
        .await
    }

    async fn delete_competency(&self, id: CompetencyId) -> Result<(), StoreError> {
        self.retry("delete_competency", || self.inner.delete_competency(id))
            .await
    }

    async fn create_group(
        &self,
        name: &str,
        company: &str,
        template_id: TemplateId,
    ) -> Result<Group, StoreError> {
        self.retry("create_group", || {
            self.inner.create_group(name, company, template_id)
        })
        .await
    }

    async fn get_group(&self, id: GroupId) -> Result<Group, StoreError> {
        self.retry("get_group", || self.inner.get_group(id)).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        self.retry("list_groups", || self.inner.list_groups()).await
    }

    async fn update_group(&self, id: GroupId, update: GroupUpdate) -> Result<Group, StoreError> {
        self.retry("update_group", || self.inner.update_group(id, update.clone()))
            .await
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        self.retry("delete_group", || self.inner.delete_group(id)).await
    }

    async fn create_participant(
        &self,
        group_id: GroupId,
        name: &str,
        email: &str,
    ) -> Result<Participant, StoreError> {
        self.retry("create_participant", || {
            self.inner.create_participant(group_id, name, email)
        })
        .await
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        self.retry("get_participant", || self.inner.get_participant(id)).await
    }

    async fn list_participants(&self, group_id: GroupId) -> Result<Vec<Participant>, StoreError> {
        self.retry("list_participants", || self.inner.list_participants(group_id))
            .await
    }

    async fn update_participant(
        &self,
        id: ParticipantId,
        update: ParticipantUpdate,
    ) -> Result<Participant, StoreError> {
        self.retry("update_participant", || {
            self.inner.update_participant(id, update.clone())
        })
        .await
    }

    async fn delete_participant(&self, id: ParticipantId) -> Result<(), StoreError> {
        self.retry("delete_participant", || self.inner.delete_participant(id))
            .await
    }

    async fn create_evaluator(
        &self,
        participant_id: ParticipantId,
        name: &str,
        email: &str,
    ) -> Result<Evaluator, StoreError> {
        self.retry("create_evaluator", || {
            self.inner.create_evaluator(participant_id, name, email)
        })
        .await
    }

    async fn get_evaluator(&self, id: EvaluatorId) -> Result<Evaluator, StoreError> {
        self.retry("get_evaluator", || self.inner.get_evaluator(id)).await
    }

    async fn list_evaluators(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Evaluator>, StoreError> {
        self.retry("list_evaluators", || self.inner.list_evaluators(participant_id))
            .await
    }

    async fn find_evaluator_by_email(
        &self,
        participant_id: ParticipantId,
        email: &str,
    ) -> Result<Option<Evaluator>, StoreError> {
        self.retry("find_evaluator_by_email", || {
            self.inner.find_evaluator_by_email(participant_id, email)
        })
        .await
    }

    async fn update_evaluator(
        &self,
        id: EvaluatorId,
        update: EvaluatorUpdate,
    ) -> Result<Evaluator, StoreError> {
        self.retry("update_evaluator", || {
            self.inner.update_evaluator(id, update.clone())
        })
        .await
    }

    async fn delete_evaluator(&self, id: EvaluatorId) -> Result<(), StoreError> {
        self.retry("delete_evaluator", || self.inner.delete_evaluator(id)).await
    }

    async fn list_responses_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Response>, StoreError> {
        self.retry("list_responses_by_participant", || {
            self.inner.list_responses_by_participant(participant_id)
        })
        .await
    }

    async fn replace_responses(
        &self,
        participant_id: ParticipantId,
        evaluator_id: Option<EvaluatorId>,
        scores: &Scores,
    ) -> Result<(), StoreError> {
        self.retry("replace_responses", || {
            self.inner.replace_responses(participant_id, evaluator_id, scores)
        })
        .await
    }
}

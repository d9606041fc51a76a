//! Service facade for the presentation layer.
//!
//! Stateless between calls. The only context that survives a call is the
//! caller-held [`ReportDraft`], which keeps computed scores so the narrative
//! step can be retried alone.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::invitations::{self, InvitationOutcome, Notifier};
use crate::model::{
    Competency, CompetencyId, Evaluator, EvaluatorId, GroupId, Participant, ParticipantId, Scores,
    TemplateId,
};
use crate::narrative::{NarrativeBundle, NarrativeGenerationError, NarrativeSynthesizer};
use crate::ordering;
use crate::report::{self, Report};
use crate::scoring::{self, DataIntegrityError, Scorecard};
use crate::store::{StoreError, SurveyStore};
use crate::submission::{self, SubmissionError};
use crate::tracking::{self, GroupTracking};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),
    #[error(transparent)]
    Narrative(#[from] NarrativeGenerationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("no narrative generator configured")]
    NarrativeDisabled,
}

/// Scores for one participant, with the narrative once it is available.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub participant: Participant,
    pub scorecard: Scorecard,
    pub narrative: Option<NarrativeBundle>,
    /// Message of the last failed narrative attempt.
    pub narrative_error: Option<String>,
}

impl ReportDraft {
    pub fn new(participant: Participant, scorecard: Scorecard) -> Self {
        Self {
            participant,
            scorecard,
            narrative: None,
            narrative_error: None,
        }
    }

    pub fn has_narrative(&self) -> bool {
        self.narrative.is_some()
    }

    /// Assemble the report from whatever the draft holds.
    pub fn report(&self) -> Report {
        match &self.narrative {
            Some(bundle) => report::assemble(&self.participant, &self.scorecard, bundle),
            None => report::assemble(
                &self.participant,
                &self.scorecard,
                &NarrativeBundle::unavailable(),
            ),
        }
    }
}

#[derive(Clone)]
pub struct FeedbackService {
    store: Arc<dyn SurveyStore>,
    narrative: Option<NarrativeSynthesizer>,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn SurveyStore>, narrative: Option<NarrativeSynthesizer>) -> Self {
        Self { store, narrative }
    }

    pub fn store(&self) -> &dyn SurveyStore {
        self.store.as_ref()
    }

    // -------------------------------------------------------------------------
    // Forms and scoring
    // -------------------------------------------------------------------------

    pub fn presentation_order(&self, seed: u64, competencies: &[Competency]) -> Vec<Competency> {
        ordering::presentation_order(seed, competencies)
    }

    /// Competencies in the order shown on every form about this participant.
    pub async fn form(&self, participant_id: ParticipantId) -> Result<Vec<Competency>, ServiceError> {
        let participant = self.store.get_participant(participant_id).await?;
        let group = self.store.get_group(participant.group_id).await?;
        let competencies = self
            .store
            .list_competencies_by_template(group.template_id)
            .await?;
        Ok(ordering::presentation_order(
            participant.order_seed(),
            &competencies,
        ))
    }

    pub async fn score_participant(
        &self,
        participant_id: ParticipantId,
        template_id: TemplateId,
    ) -> Result<Scorecard, ServiceError> {
        let competencies = self.store.list_competencies_by_template(template_id).await?;
        let known: HashSet<CompetencyId> = competencies.iter().map(|c| c.id).collect();
        let mut responses = self
            .store
            .list_responses_by_participant(participant_id)
            .await?;
        // Answers to deleted competencies stay in the store but are not scored.
        let before = responses.len();
        responses.retain(|r| known.contains(&r.competency_id));
        let orphaned = before - responses.len();
        if orphaned > 0 {
            warn!(
                participant_id,
                template_id,
                orphaned,
                "ignoring responses to deleted competencies"
            );
        }
        Ok(scoring::compute(&responses, &competencies)?)
    }

    /// Scores against the template of the participant's group.
    pub async fn score(
        &self,
        participant_id: ParticipantId,
    ) -> Result<(Participant, Scorecard), ServiceError> {
        let participant = self.store.get_participant(participant_id).await?;
        let group = self.store.get_group(participant.group_id).await?;
        let scorecard = self
            .score_participant(participant_id, group.template_id)
            .await?;
        Ok((participant, scorecard))
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    fn synthesizer(&self) -> Result<&NarrativeSynthesizer, ServiceError> {
        self.narrative.as_ref().ok_or(ServiceError::NarrativeDisabled)
    }

    /// Full report. Fails if the narrative cannot be produced.
    pub async fn generate_report(
        &self,
        participant: &Participant,
        scorecard: &Scorecard,
    ) -> Result<Report, ServiceError> {
        let bundle = self
            .synthesizer()?
            .synthesize(&participant.name, scorecard)
            .await?;
        Ok(report::assemble(participant, scorecard, &bundle))
    }

    /// Score the participant and make one narrative attempt. A narrative
    /// failure is kept on the draft instead of failing the call.
    pub async fn draft_report(
        &self,
        participant_id: ParticipantId,
    ) -> Result<ReportDraft, ServiceError> {
        let (participant, scorecard) = self.score(participant_id).await?;
        let mut draft = ReportDraft::new(participant, scorecard);
        if self.narrative.is_some() {
            if let Err(err) = self.retry_narrative(&mut draft).await {
                warn!(participant_id, "narrative unavailable, draft keeps scores only: {err}");
            }
        }
        Ok(draft)
    }

    /// Run the narrative step again for a draft. Scores are not recomputed.
    pub async fn retry_narrative(&self, draft: &mut ReportDraft) -> Result<(), ServiceError> {
        let synthesizer = self.synthesizer()?;
        match synthesizer
            .synthesize(&draft.participant.name, &draft.scorecard)
            .await
        {
            Ok(bundle) => {
                info!(participant_id = draft.participant.id, "narrative attached to draft");
                draft.narrative = Some(bundle);
                draft.narrative_error = None;
                Ok(())
            }
            Err(err) => {
                draft.narrative_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Report without calling the narrative generator.
    pub async fn scoring_only_report(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Report, ServiceError> {
        let (participant, scorecard) = self.score(participant_id).await?;
        Ok(ReportDraft::new(participant, scorecard).report())
    }

    // -------------------------------------------------------------------------
    // Submissions
    // -------------------------------------------------------------------------

    pub async fn submit_self_assessment(
        &self,
        participant_id: ParticipantId,
        scores: &Scores,
    ) -> Result<(), ServiceError> {
        submission::submit_self_assessment(self.store(), participant_id, scores).await?;
        Ok(())
    }

    pub async fn submit_feedback(
        &self,
        participant_id: ParticipantId,
        evaluator_id: EvaluatorId,
        scores: &Scores,
    ) -> Result<(), ServiceError> {
        submission::submit_feedback(self.store(), participant_id, evaluator_id, scores).await?;
        Ok(())
    }

    pub async fn submit_feedback_by_email(
        &self,
        participant_id: ParticipantId,
        name: &str,
        email: &str,
        scores: &Scores,
    ) -> Result<Evaluator, ServiceError> {
        Ok(
            submission::submit_feedback_by_email(self.store(), participant_id, name, email, scores)
                .await?,
        )
    }

    pub async fn add_evaluator(
        &self,
        participant_id: ParticipantId,
        name: &str,
        email: &str,
    ) -> Result<Evaluator, ServiceError> {
        Ok(submission::add_evaluator(self.store(), participant_id, name, email).await?)
    }

    // -------------------------------------------------------------------------
    // Tracking and invitations
    // -------------------------------------------------------------------------

    pub async fn group_tracking(
        &self,
        group_id: GroupId,
        now: i64,
    ) -> Result<GroupTracking, ServiceError> {
        Ok(tracking::group_tracking(self.store(), group_id, now).await?)
    }

    pub async fn send_self_assessment_invitations(
        &self,
        notifier: &dyn Notifier,
        group_id: GroupId,
        now: i64,
    ) -> Result<InvitationOutcome, ServiceError> {
        Ok(invitations::send_self_assessment_invitations(self.store(), notifier, group_id, now).await?)
    }

    pub async fn send_feedback_invitations(
        &self,
        notifier: &dyn Notifier,
        group_id: GroupId,
        now: i64,
    ) -> Result<InvitationOutcome, ServiceError> {
        Ok(invitations::send_feedback_invitations(self.store(), notifier, group_id, now).await?)
    }
}

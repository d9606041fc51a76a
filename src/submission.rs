//! Response submission: validated, atomic self-assessment and feedback writes.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
    is_valid_score, CompetencyId, Evaluator, EvaluatorId, ParticipantId, Scores,
};
use crate::store::{StoreError, SurveyStore};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("score {score} for competency {competency_id} is outside 1-5")]
    InvalidScore { competency_id: CompetencyId, score: i64 },

    #[error("competency {0} is not part of this participant's survey")]
    UnknownCompetency(CompetencyId),

    #[error("submission contains no answers")]
    Empty,

    #[error("evaluator {evaluator_id} does not evaluate participant {participant_id}")]
    EvaluatorMismatch {
        evaluator_id: EvaluatorId,
        participant_id: ParticipantId,
    },

    #[error("{0} must not be blank")]
    BlankField(&'static str),

    #[error("invalid e-mail address: {0}")]
    InvalidEmail(String),

    #[error("participant {participant_id} already has an evaluator with e-mail {email}")]
    DuplicateEvaluator {
        participant_id: ParticipantId,
        email: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Check every score against the participant's template. Nothing is written.
async fn validate(
    store: &dyn SurveyStore,
    participant_id: ParticipantId,
    scores: &Scores,
) -> Result<(), SubmissionError> {
    if scores.is_empty() {
        return Err(SubmissionError::Empty);
    }
    let participant = store.get_participant(participant_id).await?;
    let group = store.get_group(participant.group_id).await?;
    let allowed: HashSet<CompetencyId> = store
        .list_competencies_by_template(group.template_id)
        .await?
        .iter()
        .map(|c| c.id)
        .collect();

    for (&competency_id, &score) in scores {
        if !is_valid_score(score) {
            return Err(SubmissionError::InvalidScore {
                competency_id,
                score,
            });
        }
        if !allowed.contains(&competency_id) {
            return Err(SubmissionError::UnknownCompetency(competency_id));
        }
    }
    Ok(())
}

/// Replace the participant's self-assessment and mark it completed.
pub async fn submit_self_assessment(
    store: &dyn SurveyStore,
    participant_id: ParticipantId,
    scores: &Scores,
) -> Result<(), SubmissionError> {
    validate(store, participant_id, scores).await?;
    store.replace_responses(participant_id, None, scores).await?;
    info!(participant_id, answers = scores.len(), "self-assessment submitted");
    Ok(())
}

/// Replace one evaluator's feedback for a participant and mark it completed.
pub async fn submit_feedback(
    store: &dyn SurveyStore,
    participant_id: ParticipantId,
    evaluator_id: EvaluatorId,
    scores: &Scores,
) -> Result<(), SubmissionError> {
    let evaluator = store.get_evaluator(evaluator_id).await?;
    if evaluator.participant_id != participant_id {
        return Err(SubmissionError::EvaluatorMismatch {
            evaluator_id,
            participant_id,
        });
    }
    validate(store, participant_id, scores).await?;
    store
        .replace_responses(participant_id, Some(evaluator_id), scores)
        .await?;
    info!(
        participant_id,
        evaluator_id,
        answers = scores.len(),
        "feedback submitted"
    );
    Ok(())
}

/// Record feedback from an evaluator identified by e-mail, registering the
/// evaluator when the participant has none with that address. An evaluator
/// registered here is removed again if the responses cannot be written.
pub async fn submit_feedback_by_email(
    store: &dyn SurveyStore,
    participant_id: ParticipantId,
    name: &str,
    email: &str,
    scores: &Scores,
) -> Result<Evaluator, SubmissionError> {
    validate(store, participant_id, scores).await?;
    let (evaluator, created) = match store
        .find_evaluator_by_email(participant_id, email.trim())
        .await?
    {
        Some(existing) => (existing, false),
        None => match add_evaluator(store, participant_id, name, email).await {
            Ok(evaluator) => (evaluator, true),
            // A concurrent submission registered the same address first.
            Err(err @ SubmissionError::DuplicateEvaluator { .. }) => {
                let existing = store
                    .find_evaluator_by_email(participant_id, email.trim())
                    .await?
                    .ok_or(err)?;
                (existing, false)
            }
            Err(err) => return Err(err),
        },
    };
    if let Err(err) = store
        .replace_responses(participant_id, Some(evaluator.id), scores)
        .await
    {
        if created {
            if let Err(cleanup) = store.delete_evaluator(evaluator.id).await {
                warn!(
                    participant_id,
                    evaluator_id = evaluator.id,
                    "could not remove evaluator after failed submission: {cleanup}"
                );
            }
        }
        return Err(err.into());
    }
    info!(
        participant_id,
        evaluator_id = evaluator.id,
        answers = scores.len(),
        "feedback submitted by e-mail"
    );
    store.get_evaluator(evaluator.id).await.map_err(Into::into)
}

/// Register an evaluator for a participant.
pub async fn add_evaluator(
    store: &dyn SurveyStore,
    participant_id: ParticipantId,
    name: &str,
    email: &str,
) -> Result<Evaluator, SubmissionError> {
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() {
        return Err(SubmissionError::BlankField("name"));
    }
    if email.is_empty() {
        return Err(SubmissionError::BlankField("email"));
    }
    if !email.contains('@') {
        return Err(SubmissionError::InvalidEmail(email.to_string()));
    }
    let duplicate = || SubmissionError::DuplicateEvaluator {
        participant_id,
        email: email.to_string(),
    };
    if store
        .find_evaluator_by_email(participant_id, email)
        .await?
        .is_some()
    {
        return Err(duplicate());
    }
    match store.create_evaluator(participant_id, name, email).await {
        Ok(evaluator) => Ok(evaluator),
        Err(StoreError::Conflict(_)) => Err(duplicate()),
        Err(e) => Err(e.into()),
    }
}

//! Invitation workflow.
//!
//! Sends self-assessment and feedback invitations through a [`Notifier`],
//! records who was invited, and advances the group stage. A failed send is
//! counted and logged; the rest of the batch still goes out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
    EvaluatorUpdate, Group, GroupId, GroupStage, GroupUpdate, ParticipantUpdate,
};
use crate::store::{StoreError, SurveyStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationKind {
    SelfAssessment,
    Feedback,
}

/// Template parameters for one invitation e-mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub kind: InvitationKind,
    pub recipient_name: String,
    pub recipient_email: String,
    /// The person being evaluated.
    pub participant_name: String,
    pub group_name: String,
    pub company: String,
}

#[derive(Debug, Error)]
#[error("could not notify {recipient}: {message}")]
pub struct NotifyError {
    pub recipient: String,
    pub message: String,
}

impl NotifyError {
    pub fn new(recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            message: message.into(),
        }
    }
}

/// E-mail delivery boundary.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, invitation: &Invitation) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationOutcome {
    pub sent: usize,
    pub failed: usize,
    /// Group stage after the batch.
    pub stage: GroupStage,
}

async fn advance_stage(
    store: &dyn SurveyStore,
    group: &Group,
    target: GroupStage,
) -> Result<GroupStage, StoreError> {
    if group.stage >= target {
        return Ok(group.stage);
    }
    let updated = store
        .update_group(
            group.id,
            GroupUpdate {
                stage: Some(target),
                ..GroupUpdate::default()
            },
        )
        .await?;
    info!(group_id = group.id, stage = updated.stage.as_str(), "group stage advanced");
    Ok(updated.stage)
}

/// Invite every participant who has not completed their self-assessment.
pub async fn send_self_assessment_invitations(
    store: &dyn SurveyStore,
    notifier: &dyn Notifier,
    group_id: GroupId,
    now: i64,
) -> Result<InvitationOutcome, StoreError> {
    let group = store.get_group(group_id).await?;
    let (mut sent, mut failed) = (0, 0);

    for p in store.list_participants(group_id).await? {
        if p.self_assessment_completed {
            continue;
        }
        let invitation = Invitation {
            kind: InvitationKind::SelfAssessment,
            recipient_name: p.name.clone(),
            recipient_email: p.email.clone(),
            participant_name: p.name.clone(),
            group_name: group.name.clone(),
            company: group.company.clone(),
        };
        match notifier.send(&invitation).await {
            Ok(()) => {
                store
                    .update_participant(
                        p.id,
                        ParticipantUpdate {
                            self_invitation_sent: Some(true),
                            self_invited_at: Some(now),
                            ..ParticipantUpdate::default()
                        },
                    )
                    .await?;
                sent += 1;
            }
            Err(err) => {
                warn!(group_id, participant_id = p.id, "self-assessment invitation failed: {err}");
                failed += 1;
            }
        }
    }

    let stage = if sent > 0 {
        advance_stage(store, &group, GroupStage::SelfAssessment).await?
    } else {
        group.stage
    };
    info!(group_id, sent, failed, "self-assessment invitations processed");
    Ok(InvitationOutcome {
        sent,
        failed,
        stage,
    })
}

/// Invite every pending evaluator of participants who completed their
/// self-assessment.
pub async fn send_feedback_invitations(
    store: &dyn SurveyStore,
    notifier: &dyn Notifier,
    group_id: GroupId,
    now: i64,
) -> Result<InvitationOutcome, StoreError> {
    let group = store.get_group(group_id).await?;
    let (mut sent, mut failed) = (0, 0);

    for p in store.list_participants(group_id).await? {
        if !p.self_assessment_completed {
            continue;
        }
        let mut sent_for_participant = 0;
        for e in store.list_evaluators(p.id).await? {
            if e.completed {
                continue;
            }
            let invitation = Invitation {
                kind: InvitationKind::Feedback,
                recipient_name: e.name.clone(),
                recipient_email: e.email.clone(),
                participant_name: p.name.clone(),
                group_name: group.name.clone(),
                company: group.company.clone(),
            };
            match notifier.send(&invitation).await {
                Ok(()) => {
                    store
                        .update_evaluator(
                            e.id,
                            EvaluatorUpdate {
                                invited_at: Some(now),
                                ..EvaluatorUpdate::default()
                            },
                        )
                        .await?;
                    sent_for_participant += 1;
                }
                Err(err) => {
                    warn!(
                        group_id,
                        participant_id = p.id,
                        evaluator_id = e.id,
                        "feedback invitation failed: {err}"
                    );
                    failed += 1;
                }
            }
        }
        if sent_for_participant > 0 {
            store
                .update_participant(
                    p.id,
                    ParticipantUpdate {
                        feedback_invitation_sent: Some(true),
                        ..ParticipantUpdate::default()
                    },
                )
                .await?;
            sent += sent_for_participant;
        }
    }

    let stage = if sent > 0 {
        advance_stage(store, &group, GroupStage::Feedback).await?
    } else {
        group.stage
    };
    info!(group_id, sent, failed, "feedback invitations processed");
    Ok(InvitationOutcome {
        sent,
        failed,
        stage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scores;
    use crate::store::SqliteStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Invitation>>,
        reject: Option<&'static str>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, invitation: &Invitation) -> Result<(), NotifyError> {
            if Some(invitation.recipient_email.as_str()) == self.reject {
                return Err(NotifyError::new(&invitation.recipient_email, "mailbox full"));
            }
            self.sent.lock().unwrap().push(invitation.clone());
            Ok(())
        }
    }

    async fn group_with_two(store: &SqliteStore) -> GroupId {
        let template = store.create_template("T", "").await.unwrap();
        let group = store.create_group("Cohort", "Acme", template.id).await.unwrap();
        store
            .create_participant(group.id, "Ana", "ana@example.com")
            .await
            .unwrap();
        store
            .create_participant(group.id, "Luis", "luis@example.com")
            .await
            .unwrap();
        group.id
    }

    #[tokio::test]
    async fn self_invitations_mark_participants_and_advance_stage() {
        let store = SqliteStore::in_memory().unwrap();
        let group_id = group_with_two(&store).await;
        let notifier = Recorder {
            reject: Some("luis@example.com"),
            ..Recorder::default()
        };

        let outcome = send_self_assessment_invitations(&store, &notifier, group_id, 1_000)
            .await
            .unwrap();
        assert_eq!((outcome.sent, outcome.failed), (1, 1));
        assert_eq!(outcome.stage, GroupStage::SelfAssessment);

        let participants = store.list_participants(group_id).await.unwrap();
        assert!(participants[0].self_invitation_sent);
        assert_eq!(participants[0].self_invited_at, Some(1_000));
        assert!(!participants[1].self_invitation_sent);
        assert_eq!(store.get_group(group_id).await.unwrap().stage, GroupStage::SelfAssessment);
    }

    #[tokio::test]
    async fn no_successful_send_keeps_stage() {
        let store = SqliteStore::in_memory().unwrap();
        let template = store.create_template("T", "").await.unwrap();
        let group = store.create_group("Empty", "Acme", template.id).await.unwrap();
        let outcome = send_self_assessment_invitations(&store, &Recorder::default(), group.id, 0)
            .await
            .unwrap();
        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.stage, GroupStage::Created);
    }

    #[tokio::test]
    async fn feedback_invitations_only_cover_completed_self_assessments() {
        let store = SqliteStore::in_memory().unwrap();
        let group_id = group_with_two(&store).await;
        let participants = store.list_participants(group_id).await.unwrap();
        let (ana, luis) = (&participants[0], &participants[1]);

        store
            .update_participant(
                ana.id,
                ParticipantUpdate {
                    self_assessment_completed: Some(true),
                    ..ParticipantUpdate::default()
                },
            )
            .await
            .unwrap();
        let pending = store.create_evaluator(ana.id, "Eva", "eva@example.com").await.unwrap();
        let done = store.create_evaluator(ana.id, "Tom", "tom@example.com").await.unwrap();
        store
            .replace_responses(ana.id, Some(done.id), &Scores::new())
            .await
            .unwrap();
        store.create_evaluator(luis.id, "Zoe", "zoe@example.com").await.unwrap();

        let notifier = Recorder::default();
        let outcome = send_feedback_invitations(&store, &notifier, group_id, 5_000)
            .await
            .unwrap();
        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.stage, GroupStage::Feedback);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_email, "eva@example.com");
        assert_eq!(sent[0].participant_name, "Ana");
        assert_eq!(sent[0].kind, InvitationKind::Feedback);
        drop(sent);

        assert_eq!(store.get_evaluator(pending.id).await.unwrap().invited_at, Some(5_000));
        assert!(store.get_participant(ana.id).await.unwrap().feedback_invitation_sent);
        assert!(!store.get_participant(luis.id).await.unwrap().feedback_invitation_sent);
    }

    #[tokio::test]
    async fn stage_never_moves_backwards() {
        let store = SqliteStore::in_memory().unwrap();
        let group_id = group_with_two(&store).await;
        store
            .update_group(
                group_id,
                GroupUpdate {
                    stage: Some(GroupStage::Feedback),
                    ..GroupUpdate::default()
                },
            )
            .await
            .unwrap();
        let outcome = send_self_assessment_invitations(&store, &Recorder::default(), group_id, 0)
            .await
            .unwrap();
        assert_eq!(outcome.sent, 2);
        assert_eq!(outcome.stage, GroupStage::Feedback);
    }
}

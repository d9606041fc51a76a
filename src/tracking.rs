//! Process tracking: who has answered, who is pending, who is late.

use serde::{Deserialize, Serialize};

use crate::model::{Evaluator, EvaluatorId, Group, GroupId, GroupStage, Participant, ParticipantId};
use crate::store::{StoreError, SurveyStore};

/// Pending respondents become overdue after this many whole days.
pub const OVERDUE_AFTER_DAYS: i64 = 7;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    NotInvited,
    InProgress,
    Overdue,
    Completed,
}

impl TrackingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInvited => "not_invited",
            Self::InProgress => "in_progress",
            Self::Overdue => "overdue",
            Self::Completed => "completed",
        }
    }
}

fn whole_days(since: i64, now: i64) -> i64 {
    (now - since).max(0) / SECONDS_PER_DAY
}

fn pending_status(days: i64) -> TrackingStatus {
    if days > OVERDUE_AFTER_DAYS {
        TrackingStatus::Overdue
    } else {
        TrackingStatus::InProgress
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfAssessmentTracking {
    pub participant_id: ParticipantId,
    pub seq: i64,
    pub name: String,
    pub email: String,
    pub status: TrackingStatus,
    /// Set for invited participants who have not completed.
    pub days_since_invitation: Option<i64>,
}

pub fn self_assessment_status(p: &Participant, now: i64) -> SelfAssessmentTracking {
    let (status, days) = if p.self_assessment_completed {
        (TrackingStatus::Completed, None)
    } else if !p.self_invitation_sent {
        (TrackingStatus::NotInvited, None)
    } else {
        let days = whole_days(p.self_invited_at.unwrap_or(p.created_at), now);
        (pending_status(days), Some(days))
    };
    SelfAssessmentTracking {
        participant_id: p.id,
        seq: p.seq,
        name: p.name.clone(),
        email: p.email.clone(),
        status,
        days_since_invitation: days,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackTracking {
    pub participant_id: ParticipantId,
    pub participant_name: String,
    pub evaluator_id: EvaluatorId,
    pub evaluator_name: String,
    pub evaluator_email: String,
    pub status: TrackingStatus,
    /// Set while the feedback is pending.
    pub days_since_invitation: Option<i64>,
}

pub fn feedback_status(participant: &Participant, e: &Evaluator, now: i64) -> FeedbackTracking {
    let (status, days) = if e.completed {
        (TrackingStatus::Completed, None)
    } else {
        let days = whole_days(e.invited_at.unwrap_or(e.created_at), now);
        (pending_status(days), Some(days))
    };
    FeedbackTracking {
        participant_id: participant.id,
        participant_name: participant.name.clone(),
        evaluator_id: e.id,
        evaluator_name: e.name.clone(),
        evaluator_email: e.email.clone(),
        status,
        days_since_invitation: days,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub not_invited: usize,
    pub in_progress: usize,
    pub overdue: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn from_statuses(statuses: impl IntoIterator<Item = TrackingStatus>) -> Self {
        let mut counts = Self::default();
        for s in statuses {
            match s {
                TrackingStatus::NotInvited => counts.not_invited += 1,
                TrackingStatus::InProgress => counts.in_progress += 1,
                TrackingStatus::Overdue => counts.overdue += 1,
                TrackingStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.not_invited + self.in_progress + self.overdue + self.completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTracking {
    pub group_id: GroupId,
    pub group_name: String,
    pub stage: GroupStage,
    pub self_assessments: Vec<SelfAssessmentTracking>,
    pub feedback: Vec<FeedbackTracking>,
    pub self_assessment_counts: StatusCounts,
    pub feedback_counts: StatusCounts,
}

impl GroupTracking {
    pub fn build(
        group: &Group,
        participants: &[(Participant, Vec<Evaluator>)],
        now: i64,
    ) -> Self {
        let self_assessments: Vec<_> = participants
            .iter()
            .map(|(p, _)| self_assessment_status(p, now))
            .collect();
        let feedback: Vec<_> = participants
            .iter()
            .flat_map(|(p, evaluators)| evaluators.iter().map(move |e| feedback_status(p, e, now)))
            .collect();
        Self {
            group_id: group.id,
            group_name: group.name.clone(),
            stage: group.stage,
            self_assessment_counts: StatusCounts::from_statuses(
                self_assessments.iter().map(|s| s.status),
            ),
            feedback_counts: StatusCounts::from_statuses(feedback.iter().map(|f| f.status)),
            self_assessments,
            feedback,
        }
    }
}

/// Tracking snapshot for a group, read from the store.
pub async fn group_tracking(
    store: &dyn SurveyStore,
    group_id: GroupId,
    now: i64,
) -> Result<GroupTracking, StoreError> {
    let group = store.get_group(group_id).await?;
    let mut rows = Vec::new();
    for p in store.list_participants(group_id).await? {
        let evaluators = store.list_evaluators(p.id).await?;
        rows.push((p, evaluators));
    }
    Ok(GroupTracking::build(&group, &rows, now))
}

//! Survey records: templates, categories, competencies, groups, participants,
//! evaluators and raw Likert responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type TemplateId = i64;
pub type CategoryId = i64;
pub type CompetencyId = i64;
pub type GroupId = i64;
pub type ParticipantId = i64;
pub type EvaluatorId = i64;

/// One submission's answers, keyed by competency.
pub type Scores = BTreeMap<CompetencyId, i64>;

/// Lowest valid Likert score.
pub const MIN_SCORE: i64 = 1;
/// Highest valid Likert score.
pub const MAX_SCORE: i64 = 5;

/// Labels for the five-point frequency scale, indexed by `score - 1`.
pub const SCALE_LABELS: [&str; 5] = ["Never", "Rarely", "Sometimes", "Frequently", "Always"];

pub fn is_valid_score(score: i64) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}

pub fn scale_label(score: i64) -> Option<&'static str> {
    if is_valid_score(score) {
        Some(SCALE_LABELS[(score - MIN_SCORE) as usize])
    } else {
        None
    }
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub template_id: TemplateId,
    pub name: String,
    pub position: i64,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub position: Option<i64>,
}

/// A single survey item. `self_text` is the first-person phrasing shown on the
/// self-assessment; `feedback_text` the third-person phrasing shown to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competency {
    pub id: CompetencyId,
    pub category_id: CategoryId,
    /// Joined from the owning category.
    pub category_name: String,
    pub self_text: String,
    pub feedback_text: String,
    pub position: i64,
}

#[derive(Debug, Clone)]
pub struct NewCompetency {
    pub self_text: String,
    pub feedback_text: String,
    pub position: i64,
}

impl NewCompetency {
    pub fn new(self_text: impl Into<String>, feedback_text: impl Into<String>, position: i64) -> Self {
        Self {
            self_text: self_text.into(),
            feedback_text: feedback_text.into(),
            position,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompetencyUpdate {
    pub self_text: Option<String>,
    pub feedback_text: Option<String>,
    pub position: Option<i64>,
}

// =============================================================================
// Groups, participants, evaluators
// =============================================================================

/// Process phase of a group. Ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStage {
    Created,
    SelfAssessment,
    Feedback,
}

impl GroupStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::SelfAssessment => "self_assessment",
            Self::Feedback => "feedback",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "self_assessment" => Self::SelfAssessment,
            "feedback" => Self::Feedback,
            _ => Self::Created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub company: String,
    pub template_id: TemplateId,
    pub stage: GroupStage,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub company: Option<String>,
    pub template_id: Option<TemplateId>,
    pub stage: Option<GroupStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub group_id: GroupId,
    /// 1-based sequence number within the group.
    pub seq: i64,
    pub name: String,
    pub email: String,
    pub self_assessment_completed: bool,
    pub self_invitation_sent: bool,
    pub self_invited_at: Option<i64>,
    pub feedback_invitation_sent: bool,
    pub created_at: i64,
}

impl Participant {
    /// Seed for the question order shown to this participant and to every
    /// evaluator reviewing them.
    pub fn order_seed(&self) -> u64 {
        self.id as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParticipantUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub self_assessment_completed: Option<bool>,
    pub self_invitation_sent: Option<bool>,
    pub self_invited_at: Option<i64>,
    pub feedback_invitation_sent: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluator {
    pub id: EvaluatorId,
    pub participant_id: ParticipantId,
    pub name: String,
    pub email: String,
    pub completed: bool,
    pub invited_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct EvaluatorUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub completed: Option<bool>,
    pub invited_at: Option<i64>,
}

// =============================================================================
// Responses
// =============================================================================

/// One Likert answer. `evaluator_id == None` marks a self-assessment answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub participant_id: ParticipantId,
    pub competency_id: CompetencyId,
    pub evaluator_id: Option<EvaluatorId>,
    pub score: i64,
}

impl Response {
    pub fn self_assessment(participant_id: ParticipantId, competency_id: CompetencyId, score: i64) -> Self {
        Self {
            participant_id,
            competency_id,
            evaluator_id: None,
            score,
        }
    }

    pub fn feedback(
        participant_id: ParticipantId,
        evaluator_id: EvaluatorId,
        competency_id: CompetencyId,
        score: i64,
    ) -> Self {
        Self {
            participant_id,
            competency_id,
            evaluator_id: Some(evaluator_id),
            score,
        }
    }

    pub fn is_self_assessment(&self) -> bool {
        self.evaluator_id.is_none()
    }
}

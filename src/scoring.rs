//! Scoring engine: self vs. peer averages, gaps and development recommendations.
//!
//! Pure aggregation. Missing data never fails (an unanswered competency
//! scores 0 and is flagged for development); malformed data does.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    is_valid_score, CompetencyId, Competency, EvaluatorId, ParticipantId, Response,
};

/// Reference scores at or above this keep the competency as a strength.
pub const DECISION_THRESHOLD: f64 = 3.5;

/// Round half away from zero to one decimal.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("score {score} for competency {competency_id} is outside 1-5")]
    ScoreOutOfRange { competency_id: CompetencyId, score: i64 },

    #[error("response references unknown competency {0}")]
    UnknownCompetency(CompetencyId),

    #[error("responses belong to more than one participant ({first} and {other})")]
    MixedParticipants {
        first: ParticipantId,
        other: ParticipantId,
    },

    #[error("duplicate self-assessment response for competency {0}")]
    DuplicateSelfResponse(CompetencyId),

    #[error("duplicate feedback response from evaluator {evaluator_id} for competency {competency_id}")]
    DuplicateFeedbackResponse {
        evaluator_id: EvaluatorId,
        competency_id: CompetencyId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Maintain,
    Develop,
}

impl Recommendation {
    pub fn from_reference(reference: f64) -> Self {
        if reference >= DECISION_THRESHOLD {
            Self::Maintain
        } else {
            Self::Develop
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Maintain => "Maintain",
            Self::Develop => "Develop",
        }
    }

    pub fn is_develop(self) -> bool {
        self == Self::Develop
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyResult {
    pub competency_id: CompetencyId,
    pub category: String,
    pub self_text: String,
    pub feedback_text: String,
    /// 0 when the participant has not answered.
    pub self_score: f64,
    /// Peer mean to one decimal, 0 without peer responses.
    pub peer_score: f64,
    pub peer_count: usize,
    /// `peer_score - self_score`, to one decimal.
    pub gap: f64,
    /// Unrounded peer mean when any peer answered, else the self score.
    pub reference_score: f64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub category: String,
    pub self_score: f64,
    pub peer_score: f64,
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub categories: Vec<CategoryResult>,
    pub competencies: Vec<CompetencyResult>,
}

impl Scorecard {
    pub fn develop_items(&self) -> impl Iterator<Item = &CompetencyResult> {
        self.competencies
            .iter()
            .filter(|c| c.recommendation.is_develop())
    }

    pub fn competencies_in<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a CompetencyResult> + 'a {
        self.competencies.iter().filter(move |c| c.category == category)
    }
}

/// Compute the scorecard for one participant.
///
/// Every competency in `competencies` appears in the output, in input order.
/// Categories appear in first-seen order.
pub fn compute(
    responses: &[Response],
    competencies: &[Competency],
) -> Result<Scorecard, DataIntegrityError> {
    let known: HashSet<CompetencyId> = competencies.iter().map(|c| c.id).collect();

    let mut self_scores: HashMap<CompetencyId, i64> = HashMap::new();
    let mut peer_scores: HashMap<CompetencyId, Vec<i64>> = HashMap::new();
    let mut seen_feedback: HashSet<(EvaluatorId, CompetencyId)> = HashSet::new();
    let mut participant: Option<ParticipantId> = None;

    for r in responses {
        match participant {
            None => participant = Some(r.participant_id),
            Some(first) if first != r.participant_id => {
                return Err(DataIntegrityError::MixedParticipants {
                    first,
                    other: r.participant_id,
                });
            }
            Some(_) => {}
        }
        if !is_valid_score(r.score) {
            return Err(DataIntegrityError::ScoreOutOfRange {
                competency_id: r.competency_id,
                score: r.score,
            });
        }
        if !known.contains(&r.competency_id) {
            return Err(DataIntegrityError::UnknownCompetency(r.competency_id));
        }
        match r.evaluator_id {
            None => {
                if self_scores.insert(r.competency_id, r.score).is_some() {
                    return Err(DataIntegrityError::DuplicateSelfResponse(r.competency_id));
                }
            }
            Some(evaluator_id) => {
                if !seen_feedback.insert((evaluator_id, r.competency_id)) {
                    return Err(DataIntegrityError::DuplicateFeedbackResponse {
                        evaluator_id,
                        competency_id: r.competency_id,
                    });
                }
                peer_scores.entry(r.competency_id).or_default().push(r.score);
            }
        }
    }

    let results: Vec<CompetencyResult> = competencies
        .iter()
        .map(|c| {
            let self_score = self_scores.get(&c.id).copied().unwrap_or(0) as f64;
            let peers = peer_scores.get(&c.id).map(Vec::as_slice).unwrap_or(&[]);
            let peer_mean = mean_i64(peers);
            let reference_score = if peers.is_empty() { self_score } else { peer_mean };
            CompetencyResult {
                competency_id: c.id,
                category: c.category_name.clone(),
                self_text: c.self_text.clone(),
                feedback_text: c.feedback_text.clone(),
                self_score,
                peer_score: round1(peer_mean),
                peer_count: peers.len(),
                gap: round1(peer_mean - self_score),
                reference_score,
                recommendation: Recommendation::from_reference(reference_score),
            }
        })
        .collect();

    let mut order: Vec<&str> = Vec::new();
    for r in &results {
        if !order.contains(&r.category.as_str()) {
            order.push(&r.category);
        }
    }

    let categories = order
        .into_iter()
        .map(|name| {
            let members: Vec<&CompetencyResult> =
                results.iter().filter(|r| r.category == name).collect();
            let self_avg = mean_f64(members.iter().map(|r| r.self_score));
            let peer_avg = mean_f64(members.iter().map(|r| r.peer_score));
            CategoryResult {
                category: name.to_string(),
                self_score: round1(self_avg),
                peer_score: round1(peer_avg),
                gap: round1(peer_avg - self_avg),
            }
        })
        .collect();

    Ok(Scorecard {
        categories,
        competencies: results,
    })
}

fn mean_i64(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

fn mean_f64(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn comp(id: i64, category: &str, text: &str) -> Competency {
        Competency {
            id,
            category_id: 0,
            category_name: category.into(),
            self_text: format!("I {text}"),
            feedback_text: text.into(),
            position: id,
        }
    }

    #[test]
    fn listens_actively_is_maintained_on_peer_mean() {
        let comps = vec![comp(1, "Communication", "Listens actively")];
        let responses = vec![
            Response::self_assessment(10, 1, 4),
            Response::feedback(10, 100, 1, 5),
            Response::feedback(10, 101, 1, 5),
            Response::feedback(10, 102, 1, 4),
        ];
        let card = compute(&responses, &comps).unwrap();
        let r = &card.competencies[0];
        assert_eq!(r.self_score, 4.0);
        assert_eq!(r.peer_score, 4.7);
        assert_eq!(r.gap, 0.7);
        assert_eq!(r.peer_count, 3);
        assert_eq!(r.recommendation, Recommendation::Maintain);
    }

    #[test]
    fn self_only_falls_back_to_self_score() {
        let comps = vec![comp(1, "Leadership", "Delegates work")];
        let responses = vec![Response::self_assessment(10, 1, 2)];
        let card = compute(&responses, &comps).unwrap();
        let r = &card.competencies[0];
        assert_eq!(r.self_score, 2.0);
        assert_eq!(r.peer_score, 0.0);
        assert_eq!(r.gap, -2.0);
        assert_eq!(r.reference_score, 2.0);
        assert_eq!(r.recommendation, Recommendation::Develop);
    }

    #[test]
    fn unanswered_competency_is_flagged_for_development() {
        let comps = vec![comp(1, "Leadership", "Delegates work")];
        let card = compute(&[], &comps).unwrap();
        let r = &card.competencies[0];
        assert_eq!((r.self_score, r.peer_score, r.gap), (0.0, 0.0, 0.0));
        assert_eq!(r.recommendation, Recommendation::Develop);
        assert_eq!(card.categories.len(), 1);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(Recommendation::from_reference(3.5), Recommendation::Maintain);
        assert_eq!(Recommendation::from_reference(3.49), Recommendation::Develop);
        assert_eq!(Recommendation::from_reference(0.0), Recommendation::Develop);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round1(0.25), 0.3);
        assert_eq!(round1(-0.25), -0.3);
        assert_eq!(round1(4.666_666), 4.7);
    }

    #[test]
    fn categories_keep_first_seen_order_and_average_members() {
        let comps = vec![
            comp(1, "Teamwork", "Shares credit"),
            comp(2, "Communication", "Listens actively"),
            comp(3, "Teamwork", "Helps peers"),
        ];
        let responses = vec![
            Response::self_assessment(10, 1, 4),
            Response::self_assessment(10, 3, 3),
            Response::feedback(10, 100, 1, 5),
            Response::feedback(10, 100, 3, 2),
        ];
        let card = compute(&responses, &comps).unwrap();
        let names: Vec<_> = card.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, ["Teamwork", "Communication"]);

        let teamwork = &card.categories[0];
        assert_eq!(teamwork.self_score, 3.5);
        assert_eq!(teamwork.peer_score, 3.5);
        assert_eq!(teamwork.gap, 0.0);
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let comps = vec![comp(1, "A", "x")];
        let err = compute(&[Response::self_assessment(10, 1, 6)], &comps).unwrap_err();
        assert!(matches!(err, DataIntegrityError::ScoreOutOfRange { score: 6, .. }));
    }

    #[test]
    fn rejects_unknown_competency() {
        let comps = vec![comp(1, "A", "x")];
        let err = compute(&[Response::feedback(10, 100, 99, 3)], &comps).unwrap_err();
        assert_eq!(err, DataIntegrityError::UnknownCompetency(99));
    }

    #[test]
    fn rejects_duplicates_and_mixed_participants() {
        let comps = vec![comp(1, "A", "x")];
        let dup_self = [
            Response::self_assessment(10, 1, 3),
            Response::self_assessment(10, 1, 4),
        ];
        assert_eq!(
            compute(&dup_self, &comps).unwrap_err(),
            DataIntegrityError::DuplicateSelfResponse(1)
        );

        let dup_peer = [Response::feedback(10, 7, 1, 3), Response::feedback(10, 7, 1, 4)];
        assert!(matches!(
            compute(&dup_peer, &comps).unwrap_err(),
            DataIntegrityError::DuplicateFeedbackResponse { evaluator_id: 7, .. }
        ));

        let mixed = [Response::self_assessment(10, 1, 3), Response::feedback(11, 7, 1, 4)];
        assert!(matches!(
            compute(&mixed, &comps).unwrap_err(),
            DataIntegrityError::MixedParticipants { first: 10, other: 11 }
        ));
    }

    const CATEGORIES: [&str; 3] = ["Communication", "Leadership", "Teamwork"];

    /// Per competency: category index, optional self score, peer scores.
    fn answered_competencies() -> impl Strategy<Value = Vec<(usize, Option<i64>, Vec<i64>)>> {
        proptest::collection::vec(
            (
                0..CATEGORIES.len(),
                proptest::option::of(1i64..=5),
                proptest::collection::vec(1i64..=5, 0..5),
            ),
            1..12,
        )
    }

    proptest! {
        #[test]
        fn scorecard_covers_every_competency_and_averages_categories(
            items in answered_competencies(),
        ) {
            let comps: Vec<_> = items
                .iter()
                .enumerate()
                .map(|(i, (cat, _, _))| comp(i as i64 + 1, CATEGORIES[*cat], "does a thing"))
                .collect();
            let mut responses = Vec::new();
            for (i, (_, own, peers)) in items.iter().enumerate() {
                let id = i as i64 + 1;
                if let Some(score) = own {
                    responses.push(Response::self_assessment(10, id, *score));
                }
                for (j, score) in peers.iter().enumerate() {
                    responses.push(Response::feedback(10, 100 + j as i64, id, *score));
                }
            }

            let card = compute(&responses, &comps).unwrap();
            prop_assert_eq!(card.competencies.len(), comps.len());

            for (result, (_, own, peers)) in card.competencies.iter().zip(&items) {
                let expected_reference = if peers.is_empty() {
                    own.unwrap_or(0) as f64
                } else {
                    peers.iter().sum::<i64>() as f64 / peers.len() as f64
                };
                prop_assert_eq!(result.reference_score, expected_reference);
                prop_assert_eq!(result.peer_count, peers.len());
                prop_assert_eq!(
                    result.recommendation == Recommendation::Maintain,
                    result.reference_score >= DECISION_THRESHOLD
                );
            }

            for category in &card.categories {
                let members: Vec<_> = card.competencies_in(&category.category).collect();
                prop_assert!(!members.is_empty());
                let n = members.len() as f64;
                let self_mean = members.iter().map(|m| m.self_score).sum::<f64>() / n;
                let peer_mean = members.iter().map(|m| m.peer_score).sum::<f64>() / n;
                prop_assert_eq!(category.self_score, round1(self_mean));
                prop_assert_eq!(category.peer_score, round1(peer_mean));
            }
        }
    }
}

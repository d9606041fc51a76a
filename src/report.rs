//! Report assembly.
//!
//! Joins the scorecard with the parsed narrative into an ordered list of prose
//! and table sections. Renderer-agnostic; see [`crate::render`] for Markdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CompetencyId, Participant, ParticipantId};
use crate::narrative::{NarrativeBundle, Practice, Section};
use crate::scoring::{CategoryResult, CompetencyResult, Scorecard, DECISION_THRESHOLD};

pub const NARRATIVE_UNAVAILABLE: &str = "Narrative unavailable.";
pub const PRACTICE_UNAVAILABLE: &str = "No development practice was generated for this competency.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub participant_id: ParticipantId,
    pub participant_name: String,
    pub generated_at: DateTime<Utc>,
    pub narrative_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    /// "Develop" competencies with no matching practice.
    pub practice_misses: Vec<CompetencyId>,
    pub sections: Vec<ReportSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    /// Heading depth, 2 for top-level sections.
    pub level: u8,
    pub content: SectionContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionContent {
    Prose { text: String },
    Table(ReportTable),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<Cell>,
    /// Marks a "develop" recommendation.
    pub highlight: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

fn prose(title: impl Into<String>, level: u8, text: impl Into<String>) -> ReportSection {
    ReportSection {
        title: title.into(),
        level,
        content: SectionContent::Prose { text: text.into() },
    }
}

fn table(title: impl Into<String>, level: u8, table: ReportTable) -> ReportSection {
    ReportSection {
        title: title.into(),
        level,
        content: SectionContent::Table(table),
    }
}

fn narrative_text(bundle: &NarrativeBundle, section: Section) -> String {
    match bundle.sections.get(section) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => NARRATIVE_UNAVAILABLE.to_string(),
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn category_row(c: &CategoryResult) -> TableRow {
    TableRow {
        cells: vec![
            c.category.as_str().into(),
            c.self_score.into(),
            c.peer_score.into(),
            c.gap.into(),
        ],
        highlight: false,
    }
}

fn competency_row(c: &CompetencyResult, with_category: bool) -> TableRow {
    let mut cells = Vec::with_capacity(6);
    if with_category {
        cells.push(c.category.as_str().into());
    }
    cells.extend([
        Cell::from(c.feedback_text.as_str()),
        Cell::from(c.self_score),
        Cell::from(c.peer_score),
        Cell::from(c.gap),
        Cell::from(c.recommendation.label()),
    ]);
    TableRow {
        cells,
        highlight: c.recommendation.is_develop(),
    }
}

pub fn category_table(scorecard: &Scorecard) -> ReportTable {
    ReportTable {
        headers: headers(&["Category", "Self", "Feedback", "Gap"]),
        rows: scorecard.categories.iter().map(category_row).collect(),
    }
}

/// Competency table for one category.
pub fn competency_table(scorecard: &Scorecard, category: &str) -> ReportTable {
    ReportTable {
        headers: headers(&["Competency", "Self", "Feedback", "Gap", "Recommendation"]),
        rows: scorecard
            .competencies_in(category)
            .map(|c| competency_row(c, false))
            .collect(),
    }
}

/// Flat tables for spreadsheet export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorecardTables {
    pub by_category: ReportTable,
    pub by_competency: ReportTable,
}

pub fn scorecard_tables(scorecard: &Scorecard) -> ScorecardTables {
    ScorecardTables {
        by_category: category_table(scorecard),
        by_competency: ReportTable {
            headers: headers(&[
                "Category",
                "Competency",
                "Self",
                "Feedback",
                "Gap",
                "Recommendation",
            ]),
            rows: scorecard
                .competencies
                .iter()
                .map(|c| competency_row(c, true))
                .collect(),
        },
    }
}

fn practice_text(p: &Practice) -> String {
    let field = |v: &str| if v.trim().is_empty() { "-".to_string() } else { v.trim().to_string() };
    format!(
        "Objective: {}\nDescription: {}\nParticipants: {}\nDuration: {}\nKPI: {}",
        field(&p.objective),
        field(&p.description),
        field(&p.participants),
        field(&p.duration),
        field(&p.kpi),
    )
}

pub fn assemble(participant: &Participant, scorecard: &Scorecard, narrative: &NarrativeBundle) -> Report {
    assemble_at(participant, scorecard, narrative, Utc::now())
}

/// [`assemble`] with an explicit timestamp.
pub fn assemble_at(
    participant: &Participant,
    scorecard: &Scorecard,
    narrative: &NarrativeBundle,
    generated_at: DateTime<Utc>,
) -> Report {
    let mut sections = Vec::new();
    let mut practice_misses = Vec::new();

    sections.push(prose(
        "1. Executive Summary",
        2,
        narrative_text(narrative, Section::ExecutiveSummary),
    ));

    sections.push(table("2. Results by Category", 2, category_table(scorecard)));
    sections.push(prose(
        "Category Analysis",
        3,
        narrative_text(narrative, Section::CategoryAnalysis),
    ));

    sections.push(prose(
        "3. Results by Competency",
        2,
        format!(
            "Scores run from 1 (Never) to 5 (Always). Competencies below {DECISION_THRESHOLD:.1} are marked for development."
        ),
    ));
    for category in &scorecard.categories {
        sections.push(table(
            category.category.clone(),
            3,
            competency_table(scorecard, &category.category),
        ));
        for item in scorecard
            .competencies_in(&category.category)
            .filter(|c| c.recommendation.is_develop())
        {
            let text = match narrative.practice_for(&item.feedback_text) {
                Some(p) => practice_text(p),
                None => {
                    practice_misses.push(item.competency_id);
                    PRACTICE_UNAVAILABLE.to_string()
                }
            };
            sections.push(prose(item.feedback_text.clone(), 4, text));
        }
    }

    sections.push(prose(
        "4. Conclusions",
        2,
        narrative_text(narrative, Section::Conclusions),
    ));

    let available = narrative.is_available();
    Report {
        title: format!("360 Feedback Report: {}", participant.name),
        participant_id: participant.id,
        participant_name: participant.name.clone(),
        generated_at,
        narrative_available: available,
        model: available.then(|| narrative.model.clone()),
        prompt_hash: available.then(|| narrative.prompt_hash.clone()),
        practice_misses,
        sections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Competency, Response};
    use crate::scoring::compute;

    fn participant() -> Participant {
        Participant {
            id: 7,
            group_id: 1,
            seq: 1,
            name: "Ana Ruiz".into(),
            email: "ana@example.com".into(),
            self_assessment_completed: true,
            self_invitation_sent: true,
            self_invited_at: Some(0),
            feedback_invitation_sent: true,
            created_at: 0,
        }
    }

    fn scorecard() -> Scorecard {
        let comp = |id, cat: &str, text: &str| Competency {
            id,
            category_id: 0,
            category_name: cat.into(),
            self_text: text.into(),
            feedback_text: text.into(),
            position: id,
        };
        let comps = vec![
            comp(1, "Communication", "Listens actively"),
            comp(2, "Leadership", "Delegates work"),
            comp(3, "Leadership", "Sets clear goals"),
        ];
        let responses = vec![
            Response::self_assessment(7, 1, 4),
            Response::feedback(7, 9, 1, 5),
            Response::self_assessment(7, 2, 2),
            Response::self_assessment(7, 3, 1),
        ];
        compute(&responses, &comps).unwrap()
    }

    fn titles(report: &Report) -> Vec<&str> {
        report.sections.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn scoring_only_report_uses_placeholders() {
        let report = assemble(&participant(), &scorecard(), &NarrativeBundle::unavailable());
        assert!(!report.narrative_available);
        assert!(report.model.is_none());
        assert_eq!(
            titles(&report),
            [
                "1. Executive Summary",
                "2. Results by Category",
                "Category Analysis",
                "3. Results by Competency",
                "Communication",
                "Leadership",
                "Delegates work",
                "Sets clear goals",
                "4. Conclusions",
            ]
        );
        assert_eq!(
            report.sections[0].content,
            SectionContent::Prose {
                text: NARRATIVE_UNAVAILABLE.into()
            }
        );
        assert_eq!(report.practice_misses, vec![2, 3]);
    }

    #[test]
    fn matched_practices_replace_placeholders() {
        let reply = "===EXECUTIVE_SUMMARY===\nSolid.\n===DEVELOPMENT_PRACTICES===\n\
                     COMPETENCY: delegates work\nOBJECTIVE: Hand off two projects\n---";
        let bundle = NarrativeBundle::from_reply(reply, "m", "h").unwrap();
        let report = assemble(&participant(), &scorecard(), &bundle);

        assert!(report.narrative_available);
        assert_eq!(report.practice_misses, vec![3]);
        let delegates = report
            .sections
            .iter()
            .find(|s| s.title == "Delegates work")
            .unwrap();
        match &delegates.content {
            SectionContent::Prose { text } => {
                assert!(text.starts_with("Objective: Hand off two projects"));
                assert!(text.contains("KPI: -"));
            }
            other => panic!("unexpected content {other:?}"),
        }
        let conclusions = report.sections.last().unwrap();
        assert_eq!(
            conclusions.content,
            SectionContent::Prose {
                text: NARRATIVE_UNAVAILABLE.into()
            }
        );
    }

    #[test]
    fn develop_rows_are_highlighted() {
        let tables = scorecard_tables(&scorecard());
        let flags: Vec<bool> = tables.by_competency.rows.iter().map(|r| r.highlight).collect();
        assert_eq!(flags, [false, true, true]);
        assert_eq!(tables.by_competency.headers[0], "Category");
        assert_eq!(tables.by_category.rows.len(), 2);
        assert!(tables.by_category.rows.iter().all(|r| !r.highlight));
    }

    #[test]
    fn sections_serialize_with_kind_tag() {
        let report = assemble(&participant(), &scorecard(), &NarrativeBundle::unavailable());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sections"][0]["content"]["kind"], "prose");
        assert_eq!(json["sections"][1]["content"]["kind"], "table");
        assert_eq!(json["sections"][1]["content"]["rows"][0]["cells"][1], 4.0);
    }
}

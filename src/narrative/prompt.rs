//! Prompt template for the report narrative.
//!
//! Domain logic only: renders the scorecard into a chat prompt. Provider-agnostic.

use crate::generator::Message;
use crate::model::SCALE_LABELS;
use crate::scoring::{Scorecard, DECISION_THRESHOLD};

use super::parse::Section;

/// Rendered prompt ready for the generator.
#[derive(Debug, Clone)]
pub struct NarrativePrompt {
    pub template_slug: &'static str,
    pub system: String,
    pub user: String,
}

impl NarrativePrompt {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }

    /// Stable BLAKE3 hash of the rendered prompt.
    pub fn hash(&self) -> String {
        blake3::hash(format!("{}\n{}", self.system, self.user).as_bytes())
            .to_hex()
            .to_string()
    }
}

/// Break up `===` runs so user text cannot forge a section marker.
pub fn neutralize_markers(s: &str) -> String {
    s.replace("==", "= =")
}

/// Substitute `{key}` placeholders in one left-to-right pass. Inserted values
/// are never rescanned, so user text cannot expand into another placeholder.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn fmt_score(x: f64) -> String {
    format!("{x:.1}")
}

#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    pub fn render(&self, participant_name: &str, scorecard: &Scorecard) -> NarrativePrompt {
        let safe_name = neutralize_markers(participant_name.trim());

        let mut category_table = String::from("Category | Self | Feedback | Gap\n");
        for c in &scorecard.categories {
            category_table.push_str(&format!(
                "{} | {} | {} | {}\n",
                neutralize_markers(&c.category),
                fmt_score(c.self_score),
                fmt_score(c.peer_score),
                fmt_score(c.gap),
            ));
        }

        let mut competency_tables = String::new();
        for c in &scorecard.categories {
            competency_tables.push_str(&format!("\nCategory: {}\n", neutralize_markers(&c.category)));
            competency_tables.push_str("Competency | Self | Feedback | Gap | Recommendation\n");
            for r in scorecard.competencies_in(&c.category) {
                competency_tables.push_str(&format!(
                    "{} | {} | {} | {} | {}\n",
                    neutralize_markers(&r.feedback_text),
                    fmt_score(r.self_score),
                    fmt_score(r.peer_score),
                    fmt_score(r.gap),
                    r.recommendation.label(),
                ));
            }
        }

        let scale = SCALE_LABELS
            .iter()
            .enumerate()
            .map(|(i, label)| format!("{}={}", i + 1, label))
            .collect::<Vec<_>>()
            .join(", ");

        let threshold = fmt_score(DECISION_THRESHOLD);
        let user = fill(
            self.user,
            &[
                ("participant", safe_name.as_str()),
                ("category_table", category_table.trim_end()),
                ("competency_tables", competency_tables.trim()),
                ("scale", scale.as_str()),
                ("threshold", threshold.as_str()),
                ("m_summary", Section::ExecutiveSummary.marker()),
                ("m_categories", Section::CategoryAnalysis.marker()),
                ("m_practices", Section::DevelopmentPractices.marker()),
                ("m_conclusions", Section::Conclusions.marker()),
            ],
        );

        NarrativePrompt {
            template_slug: self.slug,
            system: self.system.trim().to_string(),
            user: user.trim().to_string(),
        }
    }
}

// =============================================================================
// Standard prompts
// =============================================================================

pub const REPORT_V1: PromptTemplate = PromptTemplate {
    slug: "report_v1",
    system: r#"You are an expert consultant in organizational development and 360-degree evaluations. You write professional, direct and constructive reports in the third person. Do not use markdown."#,
    user: r#"Write a complete 360-degree feedback report for {participant} based on these results.

RESULTS BY CATEGORY:
{category_table}

RESULTS BY COMPETENCY:
{competency_tables}

The scale runs from 1 to 5 ({scale}).
The decision threshold is {threshold}: at or above it the competency is consolidated; below it the competency needs active development.
"Gap" = Feedback - Self. A positive gap means peers rate the participant higher than they rate themselves. A negative gap means the participant overestimates themselves.
"Maintain" = score >= {threshold}. "Develop" = score < {threshold}.

Produce EXACTLY the following sections, in this order, each introduced by its marker line:

{m_summary}
Two or three paragraphs summarising the results: main strengths, areas for improvement and the overall picture.

{m_categories}
One or two paragraphs analysing the category results, highlighting the best and worst rated categories.

{m_practices}
For EACH competency recommended "Develop", write one learning practice in exactly this format (one per competency):

COMPETENCY: [exact competency name as given above]
OBJECTIVE: [clear, measurable objective]
DESCRIPTION: [the practice to carry out, 2-3 sentences]
PARTICIPANTS: [who should take part]
DURATION: [estimated time]
KPI: [how progress is measured]
---

{m_conclusions}
Two or three paragraphs with general conclusions and recommended next steps."#,
};

pub const DEFAULT_PROMPT: PromptTemplate = REPORT_V1;

//! Reply parsing: delimited sections and development-practice records.
//!
//! Tolerant by construction. Missing markers yield absent sections, malformed
//! practice blocks are dropped, nothing here returns an error.

use serde::{Deserialize, Serialize};

use super::prompt::neutralize_markers;

/// The four narrative sections, in the order the prompt asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    ExecutiveSummary,
    CategoryAnalysis,
    DevelopmentPractices,
    Conclusions,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::ExecutiveSummary,
        Section::CategoryAnalysis,
        Section::DevelopmentPractices,
        Section::Conclusions,
    ];

    pub fn marker(self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "===EXECUTIVE_SUMMARY===",
            Self::CategoryAnalysis => "===CATEGORY_ANALYSIS===",
            Self::DevelopmentPractices => "===DEVELOPMENT_PRACTICES===",
            Self::Conclusions => "===CONCLUSIONS===",
        }
    }
}

/// Section bodies found in a reply. `None` means the marker was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sections {
    pub executive_summary: Option<String>,
    pub category_analysis: Option<String>,
    pub development_practices: Option<String>,
    pub conclusions: Option<String>,
}

impl Sections {
    pub fn get(&self, section: Section) -> Option<&str> {
        match section {
            Section::ExecutiveSummary => self.executive_summary.as_deref(),
            Section::CategoryAnalysis => self.category_analysis.as_deref(),
            Section::DevelopmentPractices => self.development_practices.as_deref(),
            Section::Conclusions => self.conclusions.as_deref(),
        }
    }

    fn slot(&mut self, section: Section) -> &mut Option<String> {
        match section {
            Section::ExecutiveSummary => &mut self.executive_summary,
            Section::CategoryAnalysis => &mut self.category_analysis,
            Section::DevelopmentPractices => &mut self.development_practices,
            Section::Conclusions => &mut self.conclusions,
        }
    }

    pub fn found(&self) -> usize {
        Section::ALL.iter().filter(|s| self.get(**s).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.found() == 0
    }
}

/// Split a reply into sections.
///
/// Each marker is located by its first occurrence. A section runs from the
/// end of its marker to the nearest other marker that starts after it, or to
/// the end of the text, so reordered replies still parse.
pub fn parse_sections(text: &str) -> Sections {
    let positions: Vec<(Section, usize)> = Section::ALL
        .iter()
        .filter_map(|s| text.find(s.marker()).map(|pos| (*s, pos)))
        .collect();

    let mut sections = Sections::default();
    for &(section, pos) in &positions {
        let start = pos + section.marker().len();
        let end = positions
            .iter()
            .map(|&(_, p)| p)
            .filter(|&p| p >= start)
            .min()
            .unwrap_or(text.len());
        *sections.slot(section) = Some(text[start..end].trim().to_string());
    }
    sections
}

/// One learning practice proposed for a "develop" competency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Practice {
    /// Competency name as written by the model.
    pub competency: String,
    pub objective: String,
    pub description: String,
    pub participants: String,
    pub duration: String,
    pub kpi: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Competency,
    Objective,
    Description,
    Participants,
    Duration,
    Kpi,
}

const LABELS: [(&str, Field); 6] = [
    ("COMPETENCY", Field::Competency),
    ("OBJECTIVE", Field::Objective),
    ("DESCRIPTION", Field::Description),
    ("PARTICIPANTS", Field::Participants),
    ("DURATION", Field::Duration),
    ("KPI", Field::Kpi),
];

impl Practice {
    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Competency => &mut self.competency,
            Field::Objective => &mut self.objective,
            Field::Description => &mut self.description,
            Field::Participants => &mut self.participants,
            Field::Duration => &mut self.duration,
            Field::Kpi => &mut self.kpi,
        }
    }
}

fn is_delimiter(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && t.chars().all(|c| c == '-')
}

/// Match a `LABEL: value` line, tolerating list bullets and `**` emphasis.
fn labelled(line: &str) -> Option<(Field, &str)> {
    let t = line.trim();
    let t = t
        .strip_prefix("- ")
        .or_else(|| t.strip_prefix("* "))
        .unwrap_or(t)
        .trim_start();
    let s = t.trim_start_matches('*');

    for (label, field) in LABELS {
        let Some(head) = s.get(..label.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = s[label.len()..].trim_start_matches('*');
        if let Some(value) = rest.strip_prefix(':') {
            return Some((field, value.trim_start_matches('*').trim()));
        }
    }
    None
}

fn parse_block(lines: &[&str]) -> Option<Practice> {
    let mut practice = Practice::default();
    let mut current: Option<Field> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((field, value)) = labelled(line) {
            *practice.field_mut(field) = value.to_string();
            current = Some(field);
        } else if let Some(field) = current {
            let slot = practice.field_mut(field);
            if !slot.is_empty() {
                slot.push(' ');
            }
            slot.push_str(line);
        }
    }

    if practice.competency.trim().is_empty() {
        None
    } else {
        Some(practice)
    }
}

/// Parse the development-practices section into records.
///
/// Blocks are separated by `---` lines. Blocks without a competency name are
/// dropped.
pub fn parse_practices(text: &str) -> Vec<Practice> {
    let mut practices = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines() {
        if is_delimiter(line) {
            practices.extend(parse_block(&block));
            block.clear();
        } else {
            block.push(line);
        }
    }
    practices.extend(parse_block(&block));
    practices
}

/// Find the practice written for a competency, by its peer-facing text.
///
/// An exact case-insensitive name wins; otherwise the first practice whose
/// name contains the text, or is contained in it. The text is also tried in
/// the marker-neutralised form the prompt showed the model.
pub fn match_practice<'a>(practices: &'a [Practice], feedback_text: &str) -> Option<&'a Practice> {
    let raw = feedback_text.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    let shown = neutralize_markers(&raw);
    let needles: Vec<&str> = if shown == raw {
        vec![raw.as_str()]
    } else {
        vec![raw.as_str(), shown.as_str()]
    };
    let lowered = |p: &Practice| p.competency.trim().to_lowercase();

    practices
        .iter()
        .find(|p| {
            let name = lowered(p);
            needles.iter().any(|n| name == *n)
        })
        .or_else(|| {
            practices.iter().find(|p| {
                let name = lowered(p);
                !name.is_empty()
                    && needles
                        .iter()
                        .any(|n| name.contains(n) || n.contains(name.as_str()))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_REPLY: &str = "\
===EXECUTIVE_SUMMARY===
Strong communicator.
===CATEGORY_ANALYSIS===
Communication leads.
===DEVELOPMENT_PRACTICES===
COMPETENCY: Delegates work
OBJECTIVE: Delegate two projects
DESCRIPTION: Hand off ownership.
PARTICIPANTS: Team leads
DURATION: 3 months
KPI: Projects delegated
---
===CONCLUSIONS===
Keep going.";

    #[test]
    fn parses_all_four_sections() {
        let s = parse_sections(FULL_REPLY);
        assert_eq!(s.executive_summary.as_deref(), Some("Strong communicator."));
        assert_eq!(s.category_analysis.as_deref(), Some("Communication leads."));
        assert!(s.development_practices.as_deref().unwrap().starts_with("COMPETENCY:"));
        assert_eq!(s.conclusions.as_deref(), Some("Keep going."));
        assert_eq!(s.found(), 4);
    }

    #[test]
    fn missing_conclusions_leaves_other_sections_intact() {
        let reply = FULL_REPLY.split("===CONCLUSIONS===").next().unwrap();
        let s = parse_sections(reply);
        assert_eq!(s.found(), 3);
        assert!(s.conclusions.is_none());
        assert_eq!(s.executive_summary.as_deref(), Some("Strong communicator."));
        assert!(s.development_practices.as_deref().unwrap().ends_with("---"));
    }

    #[test]
    fn reordered_sections_end_at_nearest_marker() {
        let reply = "===CONCLUSIONS===\nDone.\n===EXECUTIVE_SUMMARY===\nSummary.";
        let s = parse_sections(reply);
        assert_eq!(s.conclusions.as_deref(), Some("Done."));
        assert_eq!(s.executive_summary.as_deref(), Some("Summary."));
    }

    #[test]
    fn no_markers_is_empty() {
        assert!(parse_sections("I wrote a lovely essay instead.").is_empty());
    }

    #[test]
    fn block_without_competency_is_dropped() {
        let text = "OBJECTIVE: orphan\nKPI: none\n---\nCOMPETENCY: Listens actively\nKPI: 1:1s held";
        let practices = parse_practices(text);
        assert_eq!(practices.len(), 1);
        assert_eq!(practices[0].competency, "Listens actively");
        assert_eq!(practices[0].kpi, "1:1s held");
    }

    #[test]
    fn labels_tolerate_case_emphasis_and_continuations() {
        let text = "- **Competency:** Gives feedback\n**OBJECTIVE**: Weekly feedback\nDescription: Book a slot\nevery Friday.\n";
        let practices = parse_practices(text);
        assert_eq!(practices.len(), 1);
        let p = &practices[0];
        assert_eq!(p.competency, "Gives feedback");
        assert_eq!(p.objective, "Weekly feedback");
        assert_eq!(p.description, "Book a slot every Friday.");
        assert_eq!(p.duration, "");
    }

    #[test]
    fn matching_prefers_exact_then_containment() {
        let practices = vec![
            Practice {
                competency: "Listens actively to the team".into(),
                ..Practice::default()
            },
            Practice {
                competency: "listens actively".into(),
                ..Practice::default()
            },
        ];
        let exact = match_practice(&practices, "Listens actively").unwrap();
        assert_eq!(exact.competency, "listens actively");

        let contained = match_practice(&practices, "Listens actively to the team daily").unwrap();
        assert_eq!(contained.competency, "Listens actively to the team");

        assert!(match_practice(&practices, "Delegates work").is_none());
        assert!(match_practice(&practices, "  ").is_none());
    }

    #[test]
    fn practice_named_as_shown_in_prompt_matches() {
        let practices = vec![Practice {
            competency: "Keeps score == fair".into(),
            ..Practice::default()
        }];
        let shown = neutralize_markers("Keeps score == fair");
        let renamed = vec![Practice {
            competency: shown.clone(),
            ..Practice::default()
        }];
        assert!(match_practice(&practices, "Keeps score == fair").is_some());
        assert_eq!(
            match_practice(&renamed, "Keeps score == fair").map(|p| p.competency.as_str()),
            Some(shown.as_str())
        );
    }
}

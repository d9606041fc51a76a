//! Markdown rendering of a [`Report`].

use crate::report::{Cell, Report, ReportTable, SectionContent};

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Cell::Number(v) => format!("{v:.1}"),
        Cell::Text(s) => escape_cell(s),
    }
}

fn render_table(out: &mut String, table: &ReportTable) {
    out.push_str(&format!("| {} |\n", table.headers.join(" | ")));
    out.push_str(&format!(
        "|{}\n",
        table.headers.iter().map(|_| "---|").collect::<String>()
    ));
    for row in &table.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|c| {
                let text = render_cell(c);
                if row.highlight {
                    format!("**{text}**")
                } else {
                    text
                }
            })
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
}

pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", report.title));
    out.push_str(&format!(
        "- Generated: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    if let Some(model) = &report.model {
        out.push_str(&format!("- Narrative model: {model}\n"));
    }
    if let Some(hash) = &report.prompt_hash {
        out.push_str(&format!("- Prompt hash: `{hash}`\n"));
    }

    for section in &report.sections {
        let level = usize::from(section.level.clamp(1, 6));
        out.push_str(&format!("\n{} {}\n\n", "#".repeat(level), section.title));
        match &section.content {
            SectionContent::Prose { text } => {
                for line in text.lines() {
                    out.push_str(line);
                    out.push_str("  \n");
                }
            }
            SectionContent::Table(table) => render_table(&mut out, table),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ReportSection, TableRow};
    use chrono::{TimeZone, Utc};

    fn report(sections: Vec<ReportSection>) -> Report {
        Report {
            title: "360 Feedback Report: Ana".into(),
            participant_id: 1,
            participant_name: "Ana".into(),
            generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            narrative_available: false,
            model: None,
            prompt_hash: None,
            practice_misses: vec![],
            sections,
        }
    }

    #[test]
    fn renders_headings_and_prose() {
        let md = render_markdown(&report(vec![ReportSection {
            title: "1. Executive Summary".into(),
            level: 2,
            content: SectionContent::Prose {
                text: "Line one\nLine two".into(),
            },
        }]));
        assert!(md.starts_with("# 360 Feedback Report: Ana\n"));
        assert!(md.contains("- Generated: 2026-03-01 09:30 UTC"));
        assert!(md.contains("\n## 1. Executive Summary\n"));
        assert!(md.contains("Line one  \nLine two  \n"));
        assert!(!md.contains("Prompt hash"));
    }

    #[test]
    fn renders_tables_with_highlight_and_escaping() {
        let md = render_markdown(&report(vec![ReportSection {
            title: "Leadership".into(),
            level: 3,
            content: SectionContent::Table(ReportTable {
                headers: vec!["Competency".into(), "Self".into()],
                rows: vec![
                    TableRow {
                        cells: vec![Cell::Text("Sets goals | plans".into()), Cell::Number(4.0)],
                        highlight: false,
                    },
                    TableRow {
                        cells: vec![Cell::Text("Delegates".into()), Cell::Number(2.0)],
                        highlight: true,
                    },
                ],
            }),
        }]));
        assert!(md.contains("| Competency | Self |\n|---|---|\n"));
        assert!(md.contains("| Sets goals \\| plans | 4.0 |"));
        assert!(md.contains("| **Delegates** | **2.0** |"));
    }
}

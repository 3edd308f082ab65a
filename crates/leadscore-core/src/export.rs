//! CSV export of scored results.

use chrono::NaiveDate;

use crate::types::ScoredResult;

pub const EXPORT_HEADER: [&str; 8] = [
    "Name",
    "Role",
    "Company",
    "Industry",
    "Location",
    "Intent",
    "Score",
    "Reasoning",
];

/// Renders results as CSV: the plain header row followed by one fully quoted
/// row per result. Commas in the reasoning text are replaced with `;`.
#[must_use]
pub fn results_to_csv(results: &[ScoredResult]) -> String {
    let mut lines = Vec::with_capacity(results.len() + 1);
    lines.push(EXPORT_HEADER.join(","));

    for result in results {
        let lead = &result.lead;
        let score = result.final_score.to_string();
        let reasoning = result.reasoning.replace(',', ";");
        let cells = [
            lead.name.as_str(),
            lead.role.as_str(),
            lead.company.as_str(),
            lead.industry.as_str(),
            lead.location.as_str(),
            result.ai_intent.as_str(),
            score.as_str(),
            reasoning.as_str(),
        ];
        lines.push(
            cells
                .iter()
                .map(|cell| quote(cell))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    lines.join("\n")
}

/// `lead_qualification_results_<YYYY-MM-DD>.csv`
#[must_use]
pub fn export_file_name(date: NaiveDate) -> String {
    format!("lead_qualification_results_{}.csv", date.format("%Y-%m-%d"))
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

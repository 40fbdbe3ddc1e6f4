//! Implementation of the `autopilot learning` command.

use anyhow::Result;

use crate::cli::commands::open_api;
use crate::cli::output::{list_table, output, truncate, CommandOutput};
use crate::domain::models::{Config, LearningInsight, PatternKind};

impl CommandOutput for LearningInsight {
    fn to_human(&self) -> String {
        let m = &self.metrics;
        let mut out = format!(
            "Concluded improvements: {}\nSuccess rate: {:.1}%\nAuto-approval rate: {:.1}%\nAverage confidence: {:.1}",
            m.total_improvements,
            m.success_rate * 100.0,
            m.auto_approval_rate * 100.0,
            m.average_confidence_score,
        );

        if self.patterns.is_empty() {
            out.push_str("\n\nNo patterns found.");
        } else {
            let mut table = list_table(&["KIND", "SUBJECT", "RATE", "SAMPLES", "CONFIDENCE"]);
            for p in &self.patterns {
                let kind = match p.kind {
                    PatternKind::Success => "success",
                    PatternKind::Failure => "failure",
                };
                table.add_row(vec![
                    kind.to_string(),
                    truncate(&p.subject.to_string(), 40),
                    format!("{:.0}%", p.rate * 100.0),
                    p.occurrences.to_string(),
                    format!("{:.2}", p.confidence),
                ]);
            }
            out.push_str(&format!("\n\n{table}"));
        }

        if !self.recommendations.is_empty() {
            out.push_str("\n\nRecommendations:");
            for r in &self.recommendations {
                out.push_str(&format!("\n  - {r}"));
            }
        }
        out
    }
}

pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let api = open_api(config).await?;
    let insight = api.learning_patterns().await;
    output(&insight, json_mode);
    Ok(())
}

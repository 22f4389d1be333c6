use serde::Serialize;
use std::io::Write as _;
use std::path::Path;

use stampede_core::{RunPlan, RunProgress, RunReport};

use super::OutputFormatter;

/// NDJSON on stdout: one `progress` line per tick, one `summary` line at the end.
pub(crate) struct JsonOutput;

#[derive(Serialize)]
struct JsonLine<'a, T: Serialize> {
    kind: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config_path: &Path, _plan: &RunPlan) {}

    fn print_progress(&self, progress: &RunProgress) {
        emit_json_line(&JsonLine {
            kind: "progress",
            body: progress,
        });
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&JsonLine {
            kind: "summary",
            body: report,
        });
        Ok(())
    }
}

fn emit_json_line<T: Serialize>(value: &T) {
    let Ok(line) = serde_json::to_string(value) else {
        return;
    };
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

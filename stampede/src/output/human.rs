use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use stampede_core::{ExecutorConfig, RunPlan, RunProgress, RunReport, RunStatus};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config_path: &Path, plan: &RunPlan) {
        println!("config: {}", config_path.display());
        for s in &plan.scenarios {
            println!(
                "scenario: {} executor={} exec={} {}",
                s.name,
                s.executor.kind(),
                s.exec,
                describe_executor(&s.executor)
            );
        }
        if !plan.scenarios.is_empty() {
            println!();
        }
    }

    fn print_progress(&self, p: &RunProgress) {
        let mut line = format!(
            "running ({}) vus={}/{}",
            format_duration(p.elapsed),
            p.vus,
            p.vus_max
        );
        if p.paused {
            line.push_str(" paused");
        }
        if p.stopping {
            line.push_str(" stopping");
        }
        for s in &p.scenarios {
            let _ = write!(
                line,
                " | {} {} done={} failed={} dropped={}",
                s.name,
                s.progress.state,
                s.progress.finished(),
                s.progress.failed,
                s.progress.dropped
            );
        }
        eprintln!("{line}");
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        print!("{}", render(report));
        Ok(())
    }
}

fn describe_executor(e: &ExecutorConfig) -> String {
    match e {
        ExecutorConfig::PerVuIterations {
            vus, iterations, ..
        } => format!("vus={vus} iterations={iterations} per VU"),
        ExecutorConfig::SharedIterations {
            vus, iterations, ..
        } => format!("vus={vus} iterations={iterations} shared"),
        ExecutorConfig::ConstantVus { vus, duration } => {
            format!("vus={vus} duration={}", format_duration(*duration))
        }
        ExecutorConfig::RampingVus {
            start_vus, stages, ..
        } => format!("startVUs={start_vus} stages={}", stages.len()),
        ExecutorConfig::ConstantArrivalRate {
            rate,
            time_unit,
            duration,
            max_vus,
            ..
        } => format!(
            "rate={rate}/{} duration={} maxVUs={max_vus}",
            format_duration(*time_unit),
            format_duration(*duration)
        ),
        ExecutorConfig::RampingArrivalRate {
            start_rate,
            time_unit,
            stages,
            max_vus,
            ..
        } => format!(
            "startRate={start_rate}/{} stages={} maxVUs={max_vus}",
            format_duration(*time_unit),
            stages.len()
        ),
        ExecutorConfig::ExternallyControlled {
            vus,
            max_vus,
            duration,
        } => match duration {
            Some(d) => format!("vus={vus} maxVUs={max_vus} duration={}", format_duration(*d)),
            None => format!("vus={vus} maxVUs={max_vus} duration=unbounded"),
        },
    }
}

fn render(report: &RunReport) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "status: {} ({})",
        report.status,
        format_duration(report.duration)
    );
    if let Some(reason) = report.reason.as_deref().filter(|_| report.status != RunStatus::Passed) {
        let _ = writeln!(out, "reason: {reason}");
    }

    if !report.scenarios.is_empty() {
        let _ = writeln!(out, "\nscenarios:");
        for s in &report.scenarios {
            let p = &s.progress;
            let _ = writeln!(
                out,
                "  {} ({}): completed={} failed={} interrupted={} dropped={}",
                s.name, s.executor, p.completed, p.failed, p.interrupted, p.dropped
            );
        }
    }

    if !report.thresholds.is_empty() {
        let _ = writeln!(out, "\nthresholds:");
        for set in &report.thresholds {
            for t in &set.thresholds {
                let mark = if t.ok { "ok  " } else { "FAIL" };
                let observed = t
                    .observed
                    .map_or_else(|| "-".to_string(), format_value);
                let _ = writeln!(
                    out,
                    "  {mark} {} {} (observed {observed})",
                    set.selector, t.expression
                );
            }
        }
    }

    if !report.summary.metrics.is_empty() {
        let _ = writeln!(out, "\nmetrics:");
        let width = report
            .summary
            .metrics
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0);
        for (name, m) in &report.summary.metrics {
            let values = m
                .values
                .iter()
                .map(|(k, v)| format!("{k}={}", format_value(*v)))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "  {name:<width$} {:<7} {values}", m.kind);
        }
    }

    out
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let total = d.as_secs();
    format!("{}m{:02}s", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn values_drop_trailing_zeros_for_integers() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(0.126), "0.13");
    }
}

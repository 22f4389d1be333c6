use anyhow::Context as _;
use std::path::Path;
use std::time::Duration;

use stampede_core::{RunController, RunReport};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::logging;
use crate::output;
use crate::run_error::RunError;
use crate::runtime::SyntheticScript;
use crate::scenario_yaml;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    logging::init(&args.log_level).map_err(RunError::InvalidInput)?;
    let out = output::formatter(args.output);

    let cfg = scenario_yaml::load_config(&args.config)
        .await
        .map_err(RunError::InvalidInput)?;
    let plan = stampede_core::RunPlan::from_options(&cfg.options, &args.shape.run_config())
        .map_err(|e| RunError::from_core("invalid scenario config", e))?;
    cfg.program
        .check_execs(&plan.scenarios)
        .map_err(RunError::InvalidInput)?;
    let script = SyntheticScript::new(cfg.program).map_err(RunError::InvalidInput)?;

    if !args.quiet {
        out.print_header(&args.config, &plan);
    }

    let controller = RunController::new(plan, script)
        .map_err(|e| RunError::from_core("failed to prepare run", e))?;
    let handle = controller.handle();

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut listen = true;
    let mut interrupted = false;
    let mut run = std::pin::pin!(controller.run());
    let report = loop {
        tokio::select! {
            res = &mut run => {
                break res.map_err(|e| RunError::from_core("run failed", e))?;
            }
            res = tokio::signal::ctrl_c(), if listen => {
                if let Err(err) = res {
                    tracing::warn!(error = %err, "failed to listen for ctrl-c");
                    listen = false;
                    continue;
                }
                if interrupted {
                    tracing::warn!("second interrupt; exiting without waiting for in-flight iterations");
                    return Ok(ExitCode::Stopped);
                }
                interrupted = true;
                tracing::warn!("interrupt received; stopping gracefully (interrupt again to exit now)");
                handle.stop();
            }
            _ = ticker.tick() => {
                if !args.quiet {
                    out.print_progress(&handle.progress());
                }
            }
        }
    };

    if let Some(path) = &args.summary_export {
        write_summary(path, &report)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    if !args.quiet {
        out.print_summary(&report).map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_status(report.status))
}

async fn write_summary(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let mut json = serde_json::to_vec_pretty(report).context("failed to encode summary")?;
    json.push(b'\n');
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write summary: {}", path.display()))
}

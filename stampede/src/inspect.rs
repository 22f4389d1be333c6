use stampede_core::RunPlan;

use crate::cli::{InspectArgs, OutputFormat};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::runtime::SyntheticScript;
use crate::scenario_yaml;

/// Resolve the config the same way `run` does and print the plan without running it.
pub async fn inspect(args: InspectArgs) -> Result<ExitCode, RunError> {
    let cfg = scenario_yaml::load_config(&args.config)
        .await
        .map_err(RunError::InvalidInput)?;
    let plan = RunPlan::from_options(&cfg.options, &args.shape.run_config())
        .map_err(|e| RunError::from_core("invalid scenario config", e))?;
    cfg.program
        .check_execs(&plan.scenarios)
        .map_err(RunError::InvalidInput)?;
    SyntheticScript::new(cfg.program).map_err(RunError::InvalidInput)?;

    output::formatter(OutputFormat::HumanReadable).print_header(&args.config, &plan);

    if !plan.thresholds.is_empty() {
        println!("thresholds:");
        for set in &plan.thresholds {
            for t in &set.thresholds {
                let abort = if t.abort_on_fail { " (abort on fail)" } else { "" };
                println!("  {} {}{abort}", set.selector, t.source);
            }
        }
    }

    Ok(ExitCode::Success)
}

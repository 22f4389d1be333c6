use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn write_config(dir: &Path, yaml: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join("load.yaml");
    std::fs::write(&path, yaml).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn run_stampede(args: &[&std::ffi::OsStr]) -> anyhow::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_stampede"))
        .args(args)
        .env_remove("STAMPEDE_VUS")
        .env_remove("STAMPEDE_ITERATIONS")
        .env_remove("STAMPEDE_DURATION")
        .output()
        .context("run stampede binary")
}

fn ensure_exit(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = run_stampede(&[
        "run".as_ref(),
        "./does-not-matter.yaml".as_ref(),
        "--duration".as_ref(),
        "10x".as_ref(),
    ])?;
    ensure_exit(&out, 30)
}

#[test]
fn missing_config_exit_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nope.yaml");
    let out = run_stampede(&["run".as_ref(), missing.as_os_str()])?;
    ensure_exit(&out, 30)
}

#[test]
fn passing_run_exits_0_and_exports_summary() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(
        dir.path(),
        "vus: 2\niterations: 4\nthresholds:\n  iterations: count==4\n",
    )?;
    let export = dir.path().join("out/summary.json");

    let out = run_stampede(&[
        "run".as_ref(),
        config.as_os_str(),
        "--summary-export".as_ref(),
        export.as_os_str(),
        "--quiet".as_ref(),
    ])?;
    ensure_exit(&out, 0)?;

    let raw = std::fs::read_to_string(&export).context("read summary export")?;
    let json: serde_json::Value = serde_json::from_str(&raw).context("parse summary export")?;
    anyhow::ensure!(json["status"] == "passed", "unexpected summary: {raw}");
    anyhow::ensure!(
        json["metrics"]["iterations"]["values"]["count"] == 4.0,
        "unexpected summary: {raw}"
    );
    Ok(())
}

#[test]
fn failed_threshold_exits_11() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(
        dir.path(),
        "iterations: 2\nthresholds:\n  iterations: count>10\n",
    )?;
    let out = run_stampede(&["run".as_ref(), config.as_os_str()])?;
    ensure_exit(&out, 11)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        stdout.contains("thresholds_failed"),
        "expected status line in stdout:\n{stdout}"
    );
    Ok(())
}

#[test]
fn aborting_threshold_exits_12() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(
        dir.path(),
        r"
thresholdInterval: 50ms
scenarios:
  steady:
    executor: constant-vus
    vus: 2
    duration: 30s
thresholds:
  iterations:
    - threshold: count<3
      abortOnFail: true
exec:
  default:
    sleep: 10ms
",
    )?;
    let out = run_stampede(&[
        "run".as_ref(),
        config.as_os_str(),
        "--output".as_ref(),
        "json".as_ref(),
    ])?;
    ensure_exit(&out, 12)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let summary = stdout
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v["kind"] == "summary")
        .context("summary line missing")?;
    anyhow::ensure!(summary["status"] == "thresholds_aborted", "{summary}");
    Ok(())
}

#[test]
fn failing_setup_exits_20() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(dir.path(), "iterations: 1\nsetup:\n  fail: true\n")?;
    let out = run_stampede(&["run".as_ref(), config.as_os_str(), "-q".as_ref()])?;
    ensure_exit(&out, 20)
}

#[test]
fn aborting_workload_exits_20() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(
        dir.path(),
        "iterations: 5\nexec:\n  default:\n    failEvery: 1\n    abortOnFailure: true\n",
    )?;
    let out = run_stampede(&["run".as_ref(), config.as_os_str(), "-q".as_ref()])?;
    ensure_exit(&out, 20)
}

#[test]
fn unknown_exec_exits_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(
        dir.path(),
        "scenarios:\n  main:\n    executor: per-vu-iterations\n    exec: missing\n",
    )?;
    let out = run_stampede(&["inspect".as_ref(), config.as_os_str()])?;
    ensure_exit(&out, 30)?;

    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("missing"), "stderr:\n{stderr}");
    Ok(())
}

#[test]
fn stages_with_duration_override_exits_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = write_config(
        dir.path(),
        "stages:\n  - duration: 1s\n    target: 2\n",
    )?;
    let out = run_stampede(&[
        "run".as_ref(),
        config.as_os_str(),
        "--duration".as_ref(),
        "1s".as_ref(),
    ])?;
    ensure_exit(&out, 30)
}

#[test]
fn inspect_prints_resolved_scenarios() -> anyhow::Result<()> {
    let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/scenario_yaml/full.yaml");
    let out = run_stampede(&["inspect".as_ref(), config.as_os_str()])?;
    ensure_exit(&out, 0)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    for needle in [
        "scenario: browse executor=constant-vus",
        "scenario: spike executor=ramping-arrival-rate",
        "checkout_total{flow:purchase} count<1000 (abort on fail)",
    ] {
        anyhow::ensure!(stdout.contains(needle), "missing `{needle}` in:\n{stdout}");
    }
    Ok(())
}

#[cfg(unix)]
mod interrupts {
    use std::process::{Child, Command, Stdio};
    use std::time::{Duration, Instant};

    use anyhow::Context as _;

    use super::{status_code, write_config};

    const LONG_RUN: &str = r"
scenarios:
  long:
    executor: constant-vus
    vus: 1
    duration: 60s
    gracefulStop: GRACE
exec:
  default:
    sleep: 30s
";

    fn spawn_run(config: &std::path::Path) -> anyhow::Result<Child> {
        Command::new(env!("CARGO_BIN_EXE_stampede"))
            .arg("run")
            .arg(config)
            .arg("-q")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawn stampede binary")
    }

    fn interrupt(child: &Child) -> anyhow::Result<()> {
        let status = Command::new("kill")
            .arg("-INT")
            .arg(child.id().to_string())
            .status()
            .context("run kill")?;
        anyhow::ensure!(status.success(), "kill -INT failed: {status}");
        Ok(())
    }

    fn wait_exit(child: &mut Child, within: Duration) -> anyhow::Result<i32> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().context("poll child")? {
                return Ok(status_code(status));
            }
            if started.elapsed() > within {
                let _ = child.kill();
                anyhow::bail!("stampede still running after {within:?}");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    #[test]
    fn ctrl_c_stops_gracefully_with_exit_41() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = write_config(dir.path(), &LONG_RUN.replace("GRACE", "200ms"))?;
        let mut child = spawn_run(&config)?;

        std::thread::sleep(Duration::from_millis(700));
        interrupt(&child)?;

        let code = wait_exit(&mut child, Duration::from_secs(10))?;
        anyhow::ensure!(code == 41, "expected exit code 41, got {code}");
        Ok(())
    }

    #[test]
    fn second_ctrl_c_skips_the_graceful_window() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = write_config(dir.path(), &LONG_RUN.replace("GRACE", "60s"))?;
        let mut child = spawn_run(&config)?;

        std::thread::sleep(Duration::from_millis(700));
        interrupt(&child)?;
        std::thread::sleep(Duration::from_millis(300));
        interrupt(&child)?;

        let code = wait_exit(&mut child, Duration::from_secs(10))?;
        anyhow::ensure!(code == 41, "expected exit code 41, got {code}");
        Ok(())
    }
}

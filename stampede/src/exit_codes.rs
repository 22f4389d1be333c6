use stampede_core::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed at the end of the run.
    ThresholdsFailed = 11,

    /// A threshold with `abortOnFail` stopped the run early.
    ThresholdsAborted = 12,

    /// The script failed in setup or VU init, or requested an abort.
    ScriptError = 20,

    /// Invalid CLI/config/options (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants, panics caught at top-level).
    RuntimeError = 40,

    /// The run was interrupted from outside (Ctrl-C).
    Stopped = 41,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Passed => Self::Success,
            RunStatus::ThresholdsFailed => Self::ThresholdsFailed,
            RunStatus::ThresholdsAborted => Self::ThresholdsAborted,
            RunStatus::ScriptAborted | RunStatus::SetupFailed => Self::ScriptError,
            RunStatus::Stopped => Self::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_distinct_codes() {
        assert_eq!(ExitCode::from_status(RunStatus::Passed).as_i32(), 0);
        assert_eq!(ExitCode::from_status(RunStatus::ThresholdsFailed).as_i32(), 11);
        assert_eq!(ExitCode::from_status(RunStatus::ThresholdsAborted).as_i32(), 12);
        assert_eq!(ExitCode::from_status(RunStatus::SetupFailed).as_i32(), 20);
        assert_eq!(ExitCode::from_status(RunStatus::Stopped).as_i32(), 41);
    }
}

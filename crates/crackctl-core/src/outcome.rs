//! Outcome classification: worker exit code to semantic result.

use serde::Serialize;

/// Worker exit codes.
pub mod exit_code {
    pub const FOUND: i32 = 0;
    pub const NOT_FOUND: i32 = 1;
    pub const ARGUMENT_ERROR: i32 = 2;
    pub const DEPENDENCY_MISSING: i32 = 3;
    pub const PATH_ERROR: i32 = 4;
    /// Synthesised by the monitor when polling the process fails.
    pub const POLL_FAILURE: i32 = -999;
}

/// Terminal classification of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success { password: String },
    NotFound,
    ArgumentError,
    DependencyMissing,
    PathError,
    UserStopped,
    AbnormalTermination { code: i32 },
}

/// Classify a finished run. Total over every exit code.
///
/// A user stop wins over any code. Exit code 0 without a captured result
/// is treated as abnormal: the worker only exits 0 right after printing
/// its result marker.
pub fn classify(code: i32, found: Option<&str>, user_requested_stop: bool) -> Outcome {
    if user_requested_stop {
        return Outcome::UserStopped;
    }
    match (code, found) {
        (exit_code::FOUND, Some(password)) => Outcome::Success {
            password: password.to_string(),
        },
        (exit_code::NOT_FOUND, _) => Outcome::NotFound,
        (exit_code::ARGUMENT_ERROR, _) => Outcome::ArgumentError,
        (exit_code::DEPENDENCY_MISSING, _) => Outcome::DependencyMissing,
        (exit_code::PATH_ERROR, _) => Outcome::PathError,
        (code, _) => Outcome::AbnormalTermination { code },
    }
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// One-line reason for the worker's exit, suitable for a log line.
    pub fn exit_reason(&self) -> String {
        match self {
            Self::Success { .. } => "completed successfully (found password)".to_string(),
            Self::NotFound => "completed (password not found)".to_string(),
            Self::ArgumentError => "exited with argument error".to_string(),
            Self::DependencyMissing => "exited (archive tool dependency missing)".to_string(),
            Self::PathError => "exited (path error)".to_string(),
            Self::UserStopped => "stopped by user".to_string(),
            Self::AbnormalTermination { code } if *code < 0 => {
                format!("terminated abnormally (signal/error {code})")
            }
            Self::AbnormalTermination { code } => format!("finished with exit code {code}"),
        }
    }

    /// Title and message for a final result dialog or summary.
    pub fn summary(&self) -> (&'static str, String) {
        match self {
            Self::Success { password } => ("Success!", format!("Password found: {password}")),
            Self::NotFound => (
                "Process Finished",
                "Password not found in the specified range.".to_string(),
            ),
            Self::ArgumentError => (
                "Argument Error",
                "Worker reported invalid arguments. Check inputs and log.".to_string(),
            ),
            Self::DependencyMissing => (
                "Dependency Error",
                "Worker could not find the archive extraction tool (7z). Check the installation."
                    .to_string(),
            ),
            Self::PathError => (
                "Path Error",
                "Worker could not determine its own directory or the 7z path. Check the installation."
                    .to_string(),
            ),
            Self::UserStopped => ("Stopped", "Search stopped by user.".to_string()),
            Self::AbnormalTermination { code } => (
                "Runtime Error",
                format!("Worker exited unexpectedly (code {code}). Check the log for details."),
            ),
        }
    }
}

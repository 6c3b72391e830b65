use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

/// Failure of one supervised external command.
///
/// `command` is the short label of the command (program plus subcommand, e.g. `docker exec`).
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("missing program")]
    MissingProgram,
    #[error("{command}: spawn failed: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command}: wait failed: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command}: non-zero exit code: {code}")]
    NonZeroExit { command: String, code: i32 },
    #[error("{command}: killed by signal{}", .signal.map(|s| format!(" {s}")).unwrap_or_default())]
    KilledBySignal { command: String, signal: Option<i32> },
    #[error("{command}: cancelled")]
    Cancelled { command: String },
}

impl ExecError {
    /// Returns `true` if the command stopped because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled { .. })
    }
}

use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

/// How `fanbench` writes its own diagnostics.
///
/// Everything goes to stderr. Stdout carries the forwarded sandbox and fio output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `"info"` or `"fanbench.lifecycle=debug,info"`.
    pub directive: String,
    /// Print event targets (`fanbench.lifecycle`, `fanbench.exec`, ...).
    pub with_targets: bool,
    /// ANSI colors in text output; `None` means only when stderr is a terminal.
    pub color: Option<bool>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            directive: "info".to_string(),
            with_targets: true,
            color: None,
        }
    }
}

impl LoggerConfig {
    pub fn ansi(&self) -> bool {
        self.color
            .unwrap_or_else(|| std::io::stderr().is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_color_wins_over_detection() {
        let cfg = LoggerConfig {
            color: Some(true),
            ..Default::default()
        };
        assert!(cfg.ansi());

        let cfg = LoggerConfig {
            color: Some(false),
            ..Default::default()
        };
        assert!(!cfg.ansi());
    }
}

use std::{io, process::Stdio};

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::debug;

use crate::error::UiError;

/// Verifies the privileged environment is intact. `Ok(false)` means the
/// check ran and reported a broken environment.
pub trait EnvCheck: Send + Sync {
    fn run_check(&self) -> BoxFuture<'_, Result<bool, UiError>>;
}

/// Runs a shell command; exit status zero means the environment is fine.
#[derive(Clone, Debug)]
pub struct ShellEnvCheck {
    command: String,
}

impl ShellEnvCheck {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    async fn exec(&self) -> Result<bool, UiError> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| UiError::CheckFailure("env check command is empty".into()))?;
        let output = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    UiError::CheckFailure(format!("{program} not found"))
                } else {
                    UiError::CheckFailure(format!("failed to run {program}: {e}"))
                }
            })?;
        if !output.status.success() {
            debug!(
                "env check exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }
}

impl EnvCheck for ShellEnvCheck {
    fn run_check(&self) -> BoxFuture<'_, Result<bool, UiError>> {
        Box::pin(self.exec())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_is_success() {
        assert!(ShellEnvCheck::new("true").run_check().await.expect("runs"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        assert!(!ShellEnvCheck::new("false").run_check().await.expect("runs"));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let err = ShellEnvCheck::new("devhub-no-such-binary --flag")
            .run_check()
            .await
            .expect_err("must fail");
        assert!(matches!(err, UiError::CheckFailure(_)));
    }

    #[tokio::test]
    async fn empty_command_is_an_error() {
        assert!(ShellEnvCheck::new("   ").run_check().await.is_err());
    }
}

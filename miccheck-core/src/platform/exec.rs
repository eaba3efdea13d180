//! External program execution for network probes

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::ProbeError;

/// Run `program` with `args`, returning stdout when it exits successfully
///
/// The child is killed when `limit` elapses.
pub async fn execute_program(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<String, ProbeError> {
    let command_line = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    debug!(command = %command_line, ?limit, "executing program");

    let output = tokio::time::timeout(
        limit,
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let output = match output {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProbeError::ProgramNotFound(program.to_string()));
        }
        Ok(Err(e)) => return Err(ProbeError::Io(e)),
        Err(_) => return Err(ProbeError::Timeout(limit)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(command = %command_line, status = ?output.status.code(), %stderr, "program failed");
        return Err(ProbeError::Exec {
            command: command_line,
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_success_returns_stdout() {
        let out = execute_program("echo", &["hello"], LIMIT).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let err = execute_program("false", &[], LIMIT).await.unwrap_err();
        assert!(matches!(err, ProbeError::Exec { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = execute_program("/nonexistent/miccheck-probe", &[], LIMIT)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "/nonexistent/miccheck-probe could not be found in the system"
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = execute_program("sleep", &["5"], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
    }
}

//! Network reachability checks: ping, ssh and the COI daemon

use std::time::Duration;

use async_trait::async_trait;

use crate::check::{CheckContext, Probe};
use crate::error::ProbeError;
use crate::platform::checks::{self, COI, PING, SSH};
use crate::platform::exec::execute_program;

pub const PING_PROGRAM: &str = "/bin/ping";
pub const SSH_PROGRAM: &str = "/usr/bin/ssh";

/// Slack on top of the program's own timeout before the child is killed
const EXEC_GRACE: Duration = Duration::from_secs(2);

// coi_daemon with parent 1, not zombie, stopped, traced or dead
const COI_QUERY: &str = r#"grep -o "(coi_daemon) . 1" /proc/*/stat | grep -v "\s[ZTtXx]\s""#;

fn whole_secs(timeout: Duration) -> u64 {
    timeout.as_secs().max(1)
}

/// Keep "program not found" as is, anything else becomes `message`
fn fail_with(e: ProbeError, message: String) -> ProbeError {
    match e {
        ProbeError::ProgramNotFound(_) => e,
        _ => ProbeError::Failed(message),
    }
}

/// The card answers one ICMP echo request
pub struct PingProbe {
    timeout: Duration,
    program: String,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            program: PING_PROGRAM.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Probe for PingProbe {
    fn describe(&self) -> &str {
        checks::label(&PING)
    }

    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let host = ctx.device()?.alias();
        let deadline = format!("-w{}", whole_secs(self.timeout));
        execute_program(
            &self.program,
            &["-c1", deadline.as_str(), host],
            self.timeout + EXEC_GRACE,
        )
        .await
        .map_err(|e| fail_with(e, format!("{} did not respond to ping request", host)))?;
        Ok(())
    }
}

/// Non-interactive ssh login to the card works
pub struct SshProbe {
    timeout: Duration,
    program: String,
}

impl SshProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            program: SSH_PROGRAM.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run `remote` on `host` over ssh
    async fn remote(&self, host: &str, remote: &[&str]) -> Result<String, ProbeError> {
        let connect_timeout = format!("-oConnectTimeout={}", whole_secs(self.timeout));
        let mut args = vec![
            connect_timeout.as_str(),
            "-oBatchMode=yes",
            "-oStrictHostKeyChecking=no",
            host,
        ];
        args.extend_from_slice(remote);
        execute_program(&self.program, &args, self.timeout + EXEC_GRACE).await
    }

    async fn check(&self, host: &str) -> Result<(), ProbeError> {
        self.remote(host, &["echo", "hello"]).await.map_err(|e| {
            fail_with(e, format!("hostname {} could not be accessed through ssh", host))
        })?;
        Ok(())
    }
}

#[async_trait]
impl Probe for SshProbe {
    fn describe(&self) -> &str {
        checks::label(&SSH)
    }

    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        self.check(ctx.device()?.alias()).await
    }
}

/// ssh works and coi_daemon is alive on the card
pub struct CoiProbe {
    ssh: SshProbe,
}

impl CoiProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ssh: SshProbe::new(timeout),
        }
    }

    pub fn with_program(self, program: impl Into<String>) -> Self {
        Self {
            ssh: self.ssh.with_program(program),
        }
    }
}

#[async_trait]
impl Probe for CoiProbe {
    fn describe(&self) -> &str {
        checks::label(&COI)
    }

    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let host = ctx.device()?.alias();
        self.ssh.check(host).await?;
        self.ssh
            .remote(host, &[COI_QUERY])
            .await
            .map_err(|e| fail_with(e, format!("COI daemon is not running in {}", host)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn card() -> Device {
        Device::new(0).with_alias("node0-mic0")
    }

    #[tokio::test]
    async fn test_ping() {
        let dev = card();
        let ctx = CheckContext::for_device(&dev);

        PingProbe::new(TIMEOUT)
            .with_program("true")
            .probe(&ctx)
            .await
            .unwrap();

        let err = PingProbe::new(TIMEOUT)
            .with_program("false")
            .probe(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "node0-mic0 did not respond to ping request");
    }

    #[tokio::test]
    async fn test_ping_program_missing() {
        let dev = card();
        let err = PingProbe::new(TIMEOUT)
            .with_program("/nonexistent/ping")
            .probe(&CheckContext::for_device(&dev))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "/nonexistent/ping could not be found in the system");
    }

    #[tokio::test]
    async fn test_ssh() {
        let dev = card();
        let ctx = CheckContext::for_device(&dev);

        SshProbe::new(TIMEOUT)
            .with_program("true")
            .probe(&ctx)
            .await
            .unwrap();

        let err = SshProbe::new(TIMEOUT)
            .with_program("false")
            .probe(&ctx)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "hostname node0-mic0 could not be accessed through ssh"
        );
    }

    #[tokio::test]
    async fn test_coi_requires_ssh() {
        let dev = card();
        let ctx = CheckContext::for_device(&dev);

        CoiProbe::new(TIMEOUT)
            .with_program("true")
            .probe(&ctx)
            .await
            .unwrap();

        let err = CoiProbe::new(TIMEOUT)
            .with_program("false")
            .probe(&ctx)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "hostname node0-mic0 could not be accessed through ssh"
        );
    }

    #[test]
    fn test_whole_secs() {
        assert_eq!(whole_secs(Duration::from_millis(200)), 1);
        assert_eq!(whole_secs(Duration::from_secs(5)), 5);
    }
}

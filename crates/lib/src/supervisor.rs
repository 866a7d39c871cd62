//! signal-cli process: spawn in `jsonRpc` mode, expose its stdio as a transport, stop it.

use crate::config::SignalCliConfig;
use crate::rpc::LineTransport;
use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// How long signal-cli gets to exit after its stdin is closed before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Transport over the agent's stdout (frames in) and stdin (requests out).
pub type AgentTransport = LineTransport<BufReader<ChildStdout>, ChildStdin>;

/// Running signal-cli child and its stderr forwarder.
pub struct AgentProcess {
    child: Child,
    stderr_task: Option<JoinHandle<()>>,
}

/// Arguments for `signal-cli -a <phone> [extra...] jsonRpc`.
pub fn agent_args(phone_number: &str, extra_args: &[String]) -> Vec<String> {
    let mut args = vec!["-a".to_string(), phone_number.to_string()];
    args.extend(extra_args.iter().cloned());
    args.push("jsonRpc".to_string());
    args
}

/// Start signal-cli and connect a transport to it. stderr is forwarded to the debug log.
pub fn spawn_agent(
    config: &SignalCliConfig,
    phone_number: &str,
) -> Result<(AgentProcess, AgentTransport)> {
    let args = agent_args(phone_number, &config.extra_args);
    log::info!("starting {} {}", config.binary, args.join(" "));
    let mut child = Command::new(&config.binary)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning {}", config.binary))?;

    let stdin = child.stdin.take().context("signal-cli stdin not captured")?;
    let stdout = child.stdout.take().context("signal-cli stdout not captured")?;
    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("signal-cli: {}", line);
            }
        })
    });

    let transport = LineTransport::new(BufReader::new(stdout), stdin);
    Ok((
        AgentProcess {
            child,
            stderr_task,
        },
        transport,
    ))
}

impl AgentProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Close the agent's stdin, wait for it to exit, and kill it if it lingers.
    ///
    /// signal-cli's `jsonRpc` mode exits on its own when stdin reaches EOF, so no
    /// SIGTERM is sent; a child still running after `SHUTDOWN_GRACE` gets SIGKILL.
    pub async fn shutdown(mut self, mut transport: AgentTransport) -> Result<()> {
        if let Err(e) = transport.close().await {
            log::debug!("closing signal-cli stdin: {}", e);
        }
        drop(transport);

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(status) => {
                let status = status.context("waiting for signal-cli")?;
                log::info!("signal-cli exited ({})", status);
            }
            Err(_) => {
                log::warn!(
                    "signal-cli still running {}s after stdin closed, killing",
                    SHUTDOWN_GRACE.as_secs()
                );
                self.child.kill().await.context("killing signal-cli")?;
            }
        }

        if let Some(task) = self.stderr_task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

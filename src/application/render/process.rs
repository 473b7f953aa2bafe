use std::{io::ErrorKind, path::PathBuf, process::Stdio, time::Instant};

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use super::{RenderEngine, RenderError, RenderOutput, RenderRequest};

/// Development bridge: runs the renderer command once per request, writing the
/// JSON request to stdin and reading the JSON output from stdout.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    command: PathBuf,
    args: Vec<String>,
}

impl ProcessRenderer {
    pub fn new(command: PathBuf, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

#[async_trait]
impl RenderEngine for ProcessRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let started_at = Instant::now();
        let payload =
            serde_json::to_vec(request).map_err(|err| RenderError::Protocol(err.to_string()))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    RenderError::Transport(format!(
                        "render command `{}` not found",
                        self.command.display()
                    ))
                } else {
                    RenderError::Transport(err.to_string())
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|err| RenderError::Transport(err.to_string()))?;
            stdin
                .shutdown()
                .await
                .map_err(|err| RenderError::Transport(err.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| RenderError::Transport(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("render command exited with {}", output.status)
            } else {
                stderr
            };
            return Err(RenderError::engine(message));
        }

        debug!(
            target = "frontgate::application::render::process",
            route = %request.route,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            "development render completed"
        );

        serde_json::from_slice(&output.stdout).map_err(|err| RenderError::Protocol(err.to_string()))
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

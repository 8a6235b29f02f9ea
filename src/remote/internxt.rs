// internxt CLI invocation
// One subprocess per call; arguments are passed as an array, never a shell

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::client::RemoteClient;
use super::parse;
use super::types::{CliAvailability, PercentFn, RemoteListing, TransferOutcome};

/// `RemoteClient` backed by the `internxt` command-line tool.
///
/// The CLI owns authentication and timeouts; this component only interprets
/// its output. Paths are handed to the process API verbatim as individual
/// arguments, so embedded quotes and spaces need no escaping.
pub struct InternxtCli {
    binary: String,
}

impl InternxtCli {
    pub fn new() -> Self {
        Self {
            binary: "internxt".to_string(),
        }
    }

    /// Override the binary name, e.g. for an absolute path or a test stub.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run to completion and return (status ok, combined stdout+stderr).
    async fn run(&self, args: &[&str]) -> std::io::Result<(bool, String)> {
        debug!("invoking {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary).args(args).output().await?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok((output.status.success(), text))
    }

    /// Run with both pipes read line-by-line, forwarding `<digits>%` matches
    /// to `on_percent` as they appear.
    async fn run_streamed(
        &self,
        args: &[&str],
        on_percent: Option<PercentFn>,
    ) -> std::io::Result<(bool, String)> {
        debug!("invoking (streamed) {} {}", self.binary, args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let (stdout_text, stderr_text, status) = tokio::join!(
            read_lines(stdout, on_percent.clone()),
            read_lines(stderr, on_percent),
            child.wait(),
        );

        let mut text = stdout_text;
        if !stderr_text.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr_text);
        }

        Ok((status?.success(), text))
    }

    /// Interpret a finished invocation as a transfer outcome.
    fn outcome(result: std::io::Result<(bool, String)>) -> TransferOutcome {
        match result {
            Ok((status_ok, output)) => {
                if !status_ok || parse::output_indicates_failure(&output) {
                    TransferOutcome::failed(output.trim().to_string())
                } else {
                    TransferOutcome::ok()
                }
            }
            Err(e) => TransferOutcome::failed(e.to_string()),
        }
    }
}

impl Default for InternxtCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain an async pipe line-by-line, emitting progress percentages.
async fn read_lines<R>(reader: R, on_percent: Option<PercentFn>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(ref callback) = on_percent {
            for percent in parse::percents_in(&line) {
                callback(percent);
            }
        }
        collected.push_str(&line);
        collected.push('\n');
    }

    collected
}

#[async_trait]
impl RemoteClient for InternxtCli {
    async fn check_availability(&self) -> CliAvailability {
        let version_output = match self.run(&["--version"]).await {
            Ok((_, output)) => output,
            Err(e) => {
                return CliAvailability {
                    installed: false,
                    authenticated: false,
                    version: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let version = version_output.lines().next().unwrap_or("").trim().to_string();
        if version.is_empty() {
            return CliAvailability {
                installed: false,
                authenticated: false,
                version: None,
                error: Some("no version output".to_string()),
            };
        }

        // A cheap authenticated call distinguishes installed from logged-in
        let listing = self.list_files("/").await;
        match listing.error {
            None => CliAvailability {
                installed: true,
                authenticated: true,
                version: Some(version),
                error: None,
            },
            Some(error) => CliAvailability {
                installed: true,
                authenticated: false,
                version: Some(version),
                error: Some(error),
            },
        }
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> TransferOutcome {
        let local = local.to_string_lossy();
        Self::outcome(self.run(&["upload-file", &local, remote]).await)
    }

    async fn upload_file_streamed(
        &self,
        local: &Path,
        remote: &str,
        on_percent: Option<PercentFn>,
    ) -> TransferOutcome {
        let local = local.to_string_lossy();
        Self::outcome(
            self.run_streamed(&["upload-file", &local, remote], on_percent)
                .await,
        )
    }

    async fn download_file(&self, remote: &str, local: &Path) -> TransferOutcome {
        let local = local.to_string_lossy();
        Self::outcome(self.run(&["download-file", remote, &local]).await)
    }

    async fn download_file_streamed(
        &self,
        remote: &str,
        local: &Path,
        on_percent: Option<PercentFn>,
    ) -> TransferOutcome {
        let local = local.to_string_lossy();
        Self::outcome(
            self.run_streamed(&["download-file", remote, &local], on_percent)
                .await,
        )
    }

    async fn create_folder(&self, remote: &str) -> TransferOutcome {
        match self.run(&["create-folder", remote]).await {
            Ok((status_ok, output)) => {
                if parse::output_indicates_already_exists(&output) {
                    return TransferOutcome::ok();
                }
                if !status_ok || parse::output_indicates_failure(&output) {
                    TransferOutcome::failed(output.trim().to_string())
                } else {
                    TransferOutcome::ok()
                }
            }
            Err(e) => TransferOutcome::failed(e.to_string()),
        }
    }

    async fn list_files(&self, remote: &str) -> RemoteListing {
        match self.run(&["list-files", remote, "--format=json"]).await {
            Ok((status_ok, output)) => {
                if !status_ok || parse::output_indicates_failure(&output) {
                    return RemoteListing {
                        files: Vec::new(),
                        error: Some(output.trim().to_string()),
                    };
                }
                RemoteListing {
                    files: parse::parse_listing(&output, remote),
                    error: None,
                }
            }
            Err(e) => RemoteListing {
                files: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    async fn file_exists(&self, remote: &str) -> bool {
        let parent = parse::remote_parent(remote);
        let name = remote.trim_end_matches('/').rsplit('/').next().unwrap_or(remote);

        let listing = self.list_files(&parent).await;
        if listing.error.is_some() {
            return false;
        }
        listing.files.iter().any(|entry| entry.name == name)
    }

    async fn delete_file(&self, remote: &str) -> bool {
        match self.run(&["delete", remote, "--permanent"]).await {
            Ok((status_ok, output)) => {
                let ok = status_ok && !parse::output_indicates_failure(&output);
                if !ok {
                    warn!("delete of {} failed: {}", remote, output.trim());
                }
                ok
            }
            Err(e) => {
                warn!("delete of {} failed: {}", remote, e);
                false
            }
        }
    }
}

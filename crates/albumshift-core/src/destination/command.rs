//! Destination driven by an external helper program.
//!
//! The helper is started once per unit. It receives the `ImportRequest` as JSON
//! on stdin and answers on stdout with one of:
//!
//! ```text
//! {"status": "imported", "asset_id": "..."}
//! {"status": "duplicate"}
//! {"status": "none"}            (or no output at all)
//! ```
//!
//! A non-zero exit is a fault; exit code 75 (EX_TEMPFAIL) means the
//! destination application is wedged. The child is killed if the call is
//! abandoned, e.g. when its time budget runs out.

use super::{Destination, DestinationError, ImportOutcome, ImportRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Exit code a helper uses to report an unresponsive destination.
pub const EXIT_UNRESPONSIVE: i32 = 75;

/// Longest stderr excerpt carried into an error message.
const STDERR_TAIL_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Reply {
    Imported {
        #[serde(default)]
        asset_id: Option<String>,
    },
    Duplicate,
    #[serde(rename = "none")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct CommandDestination {
    program: String,
    args: Vec<String>,
    recover_program: Option<String>,
}

impl CommandDestination {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            recover_program: None,
        }
    }

    /// Extra arguments passed to the helper on every call.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Program run during a cooldown to restart the destination application.
    pub fn with_recover_program(mut self, program: impl Into<String>) -> Self {
        self.recover_program = Some(program.into());
        self
    }
}

#[async_trait]
impl Destination for CommandDestination {
    fn name(&self) -> &str {
        &self.program
    }

    async fn import_asset(&self, request: &ImportRequest) -> Result<ImportOutcome, DestinationError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| DestinationError::Fault(format!("cannot encode request: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DestinationError::Fault(format!("cannot start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A helper that exits without reading stdin is judged by its exit status.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("Helper closed stdin early: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DestinationError::Fault(format!("lost helper process: {}", e)))?;

        let stderr = stderr_tail(&output.stderr);
        match output.status.code() {
            Some(0) => {}
            Some(EXIT_UNRESPONSIVE) => return Err(DestinationError::Unresponsive(stderr)),
            Some(code) => {
                return Err(DestinationError::Fault(format!(
                    "helper exited with {}: {}",
                    code, stderr
                )))
            }
            None => {
                return Err(DestinationError::Fault(format!(
                    "helper killed by signal: {}",
                    stderr
                )))
            }
        }

        parse_reply(&String::from_utf8_lossy(&output.stdout))
    }

    async fn recover(&self) -> Result<(), DestinationError> {
        let Some(program) = &self.recover_program else {
            return Ok(());
        };
        info!("Running recovery command {}", program);

        let status = Command::new(program)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| DestinationError::Fault(format!("cannot start {}: {}", program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(DestinationError::Fault(format!(
                "recovery command exited with {}",
                status
            )))
        }
    }
}

fn parse_reply(stdout: &str) -> Result<ImportOutcome, DestinationError> {
    let text = stdout.trim();
    if text.is_empty() {
        return Ok(ImportOutcome::NoResult);
    }

    let reply: Reply = serde_json::from_str(text)
        .map_err(|e| DestinationError::Fault(format!("unexpected helper reply {:?}: {}", text, e)))?;

    Ok(match reply {
        Reply::Imported {
            asset_id: Some(asset_id),
        } if !asset_id.trim().is_empty() => ImportOutcome::Imported { asset_id },
        Reply::Imported { .. } | Reply::Empty => ImportOutcome::NoResult,
        Reply::Duplicate => ImportOutcome::AlreadyPresent,
    })
}

fn stderr_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        assert_eq!(
            parse_reply(r#"{"status":"imported","asset_id":"ABC"}"#).unwrap(),
            ImportOutcome::Imported {
                asset_id: "ABC".into()
            }
        );
        assert_eq!(
            parse_reply(r#"{"status":"duplicate"}"#).unwrap(),
            ImportOutcome::AlreadyPresent
        );
        assert_eq!(parse_reply("  \n").unwrap(), ImportOutcome::NoResult);
        assert_eq!(parse_reply(r#"{"status":"none"}"#).unwrap(), ImportOutcome::NoResult);
        assert_eq!(
            parse_reply(r#"{"status":"imported","asset_id":""}"#).unwrap(),
            ImportOutcome::NoResult
        );
        assert!(parse_reply("Traceback (most recent call last)").is_err());
    }

    #[test]
    fn test_stderr_tail_keeps_the_end() {
        let long = "x".repeat(1000) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS);
        assert!(tail.ends_with("END"));
    }

    #[cfg(unix)]
    fn request() -> ImportRequest {
        ImportRequest {
            unit_id: "u1".into(),
            source_path: "/tmp/x.jpg".into(),
            folder_path: vec!["A".into()],
            extra_folder_paths: vec![],
            caption: None,
            tags: vec![],
            captured_at: None,
            location: None,
            license: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_success_reads_request() {
        let destination = CommandDestination::new("sh").with_args([
            "-c",
            r#"read line; case "$line" in *'"unit_id":"u1"'*) echo '{"status":"imported","asset_id":"ok-1"}';; *) exit 3;; esac"#,
        ]);
        let outcome = destination.import_asset(&request()).await.unwrap();
        assert_eq!(
            outcome,
            ImportOutcome::Imported {
                asset_id: "ok-1".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_exit_codes() {
        let faulty = CommandDestination::new("sh").with_args(["-c", "echo broken >&2; exit 2"]);
        match faulty.import_asset(&request()).await {
            Err(DestinationError::Fault(message)) => assert!(message.contains("broken")),
            other => panic!("unexpected {:?}", other),
        }

        let wedged = CommandDestination::new("sh").with_args(["-c", "exit 75"]);
        assert!(matches!(
            wedged.import_asset(&request()).await,
            Err(DestinationError::Unresponsive(_))
        ));

        let silent = CommandDestination::new("sh").with_args(["-c", "cat >/dev/null"]);
        assert_eq!(silent.import_asset(&request()).await.unwrap(), ImportOutcome::NoResult);
    }

    #[tokio::test]
    async fn test_missing_helper_is_a_fault() {
        let destination = CommandDestination::new("/definitely/not/a/helper");
        let request = ImportRequest {
            unit_id: "u".into(),
            source_path: "x".into(),
            folder_path: vec![],
            extra_folder_paths: vec![],
            caption: None,
            tags: vec![],
            captured_at: None,
            location: None,
            license: None,
        };
        assert!(matches!(
            destination.import_asset(&request).await,
            Err(DestinationError::Fault(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recover_runs_program() {
        assert!(CommandDestination::new("sh").recover().await.is_ok());
        let failing = CommandDestination::new("sh").with_recover_program("false");
        assert!(failing.recover().await.is_err());
    }
}

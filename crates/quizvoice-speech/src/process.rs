use crate::error::SpeechError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs `command` to completion and returns its stdout.
///
/// `input` is written to stdin from a separate task so a child that fills
/// its stdout pipe before draining stdin cannot deadlock. The child is
/// killed if `timeout` elapses.
pub(crate) async fn run(
    mut command: Command,
    program: &str,
    input: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<Vec<u8>, SpeechError> {
    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| SpeechError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let write_task = match (child.stdin.take(), input) {
        (Some(mut stdin), Some(input)) => Some(tokio::spawn(async move {
            stdin.write_all(&input).await
            // stdin drops here, signalling EOF
        })),
        _ => None,
    };

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| SpeechError::Timeout {
            program: program.to_string(),
            secs: timeout.as_secs(),
        })??;

    if !output.status.success() {
        return Err(SpeechError::Failed {
            program: program.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    if let Some(task) = write_task {
        match task.await {
            Ok(Ok(())) => {}
            // The child may exit successfully without reading all of stdin.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(SpeechError::Io(e)),
            Err(e) => {
                return Err(SpeechError::Io(std::io::Error::other(format!(
                    "stdin task failed: {}",
                    e
                ))))
            }
        }
    }

    Ok(output.stdout)
}

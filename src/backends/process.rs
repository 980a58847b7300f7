//! Subprocess helpers shared by CLI-backed backends.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Locate an executable by name on PATH, or check an explicit path
pub fn find_executable(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|path| path.is_file())
}

/// Probe helper: fail with a readable reason when a tool is missing
pub fn require_executable(binary: &str) -> Result<PathBuf> {
    find_executable(binary).with_context(|| format!("'{}' not found on PATH", binary))
}

/// Run a command to completion, optionally feeding stdin.
///
/// The child is killed if the returned future is dropped, which is how the
/// orchestrator's timeout reaches the process.
pub async fn run(command: &mut Command, stdin: Option<&[u8]>, label: &str) -> Result<Output> {
    let mut child = command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", label))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input)
            .await
            .with_context(|| format!("Failed to write to {} stdin", label))?;
        // Drop stdin to signal EOF
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("Failed to wait for {}", label))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        anyhow::bail!(
            "{} failed with exit code {}: {}",
            label,
            exit_code,
            stderr.trim()
        );
    }

    Ok(output)
}

/// File extension for an audio MIME type, used to name temp files
pub fn audio_extension(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or("").trim() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        "audio/flac" => "flac",
        "audio/aiff" | "audio/x-aiff" => "aiff",
        _ => "wav",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable() {
        assert!(find_executable("definitely-not-a-real-binary-xyz").is_none());
        assert!(require_executable("/no/such/dir/tool").is_err());
    }

    #[test]
    fn test_audio_extension() {
        assert_eq!(audio_extension("audio/webm;codecs=opus"), "webm");
        assert_eq!(audio_extension("audio/mpeg"), "mp3");
        assert_eq!(audio_extension("application/octet-stream"), "wav");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo boom >&2; exit 3"]);
        let err = run(&mut command, None, "sh").await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("exit code 3"));
        assert!(message.contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let mut command = Command::new("cat");
        let output = run(&mut command, Some(b"hello"), "cat").await.unwrap();
        assert_eq!(output.stdout, b"hello");
    }
}

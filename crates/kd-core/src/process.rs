use std::{
    io::{self, Read, Write},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn max_capture_bytes() -> usize {
    std::env::var("KD_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Execute a program and capture stdout/stderr.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely.
pub fn run_command(program: &str, args: &[String], cwd: &Path) -> Result<RunOutput> {
    run_command_with_input(program, args, cwd, None, None)
}

/// Execute a program, optionally feeding `input` on stdin, and capture its output.
///
/// With a `timeout` the child is killed once it runs past the deadline.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned, does not finish in time, or
/// the I/O streams cannot be read entirely.
pub fn run_command_with_input(
    program: &str,
    args: &[String],
    cwd: &Path,
    input: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<RunOutput> {
    let (code, stdout, stderr) = run_command_bytes(program, args, cwd, input, timeout)?;
    Ok(RunOutput {
        code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr,
    })
}

/// Like [`run_command_with_input`], keeping stdout as raw bytes for binary producers.
pub(crate) fn run_command_bytes(
    program: &str,
    args: &[String],
    cwd: &Path,
    input: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<(i32, Vec<u8>, String)> {
    let mut command = Command::new(program);
    command.args(args).current_dir(cwd);
    command.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let stdin_handle = match (input, child.stdin.take()) {
        (Some(input), Some(mut stdin)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || stdin.write_all(&input)))
        }
        _ => None,
    };
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;
    let stdout_handle = thread::spawn(move || read_all(stdout));
    let limit = max_capture_bytes();
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, limit));

    let status = match timeout {
        Some(limit) => match wait_with_deadline(&mut child, program, limit)? {
            Some(status) => status,
            // reader threads finish on their own once the pipes close
            None => anyhow::bail!("{program} did not finish within {limit:?} and was killed"),
        },
        None => child
            .wait()
            .with_context(|| format!("failed to wait for {program}"))?,
    };
    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(Ok(())) => {}
            // the child may exit before draining stdin
            Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {}
            Ok(Err(err)) => {
                return Err(err).with_context(|| format!("failed to write stdin of {program}"))
            }
            Err(_) => anyhow::bail!("stdin thread panicked"),
        }
    }
    let code = status.code().unwrap_or(-1);
    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let (mut stderr, stderr_truncated) = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;
    if stderr_truncated {
        stderr.push_str("\n[...truncated...]\n");
    }
    Ok((code, stdout, stderr))
}

/// Poll the child until it exits or `limit` passes; `None` means it was killed.
fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    limit: Duration,
) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("failed to wait for {program}"))?
        {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(program, timeout = ?limit, "killing process past its deadline");
            if let Err(err) = child.kill() {
                warn!(program, %err, "failed to kill process");
            }
            child
                .wait()
                .with_context(|| format!("failed to reap {program}"))?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn read_all<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_to_string_limited<R: Read>(mut reader: R, limit: usize) -> io::Result<(String, bool)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining == 0 {
            truncated = true;
            continue;
        }
        let take = remaining.min(read);
        buf.extend_from_slice(&chunk[..take]);
        if take < read {
            truncated = true;
        }
    }
    Ok((String::from_utf8_lossy(&buf).into_owned(), truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_stdout_stderr_and_code() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let output = run_command("sh", &sh("echo out; echo err >&2; exit 3"), temp.path())?;
        assert_eq!(output.code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.success());
        Ok(())
    }

    #[test]
    fn feeds_stdin() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let output =
            run_command_with_input("sh", &sh("cat"), temp.path(), Some(b"piped"), None)?;
        assert!(output.success());
        assert_eq!(output.stdout, "piped");
        Ok(())
    }

    #[test]
    fn hung_program_is_killed_at_the_deadline() {
        let temp = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = run_command_with_input(
            "sh",
            &sh("sleep 5"),
            temp.path(),
            None,
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4), "{:?}", started.elapsed());
        assert!(err.to_string().contains("did not finish within"), "{err}");
    }

    #[test]
    fn deadline_leaves_fast_programs_alone() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let output = run_command_with_input(
            "sh",
            &sh("echo done"),
            temp.path(),
            None,
            Some(Duration::from_secs(10)),
        )?;
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "done");
        Ok(())
    }

    #[test]
    fn missing_program_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = run_command("kd-definitely-missing-binary", &[], temp.path()).unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }

    #[test]
    fn stderr_is_truncated_to_limit() -> Result<()> {
        let data = vec![b'x'; 32];
        let (text, truncated) = read_to_string_limited(&data[..], 8)?;
        assert_eq!(text.len(), 8);
        assert!(truncated);
        Ok(())
    }
}

use std::{
    os::unix::process::CommandExt,
    path::Path,
    process::Stdio,
    time::{Duration, Instant},
};

use nix::{
    sys::signal::{Signal, killpg},
    unistd::Pid,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    task::JoinHandle,
};

use crate::engine::{
    models::ExecutionResult,
    sandbox::{CommandSpec, truncate_chars},
};

// Upper bound on waiting for pipe readers once the process group is gone.
const READER_GRACE: Duration = Duration::from_millis(250);

/// Runs `spec` inside `work_dir` and classifies the outcome.
///
/// The child leads its own process group; on deadline expiry (and after a
/// normal exit) the whole group is killed so nothing it forked survives the
/// call. Spawn failures come back as an unsuccessful result, never an error.
pub async fn supervise(
    spec: &CommandSpec,
    work_dir: &Path,
    stdin: Option<&str>,
    deadline: Duration,
    max_output_chars: usize,
) -> ExecutionResult {
    let mut std_cmd = std::process::Command::new(&spec.program);
    std_cmd
        .args(&spec.args)
        .current_dir(work_dir)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);
    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    let started = Instant::now();
    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::debug!(command = %spec, error = %err, "spawn failed");
            return ExecutionResult::spawn_failure(format!(
                "failed to start {}: {err}",
                spec.program.to_string_lossy()
            ));
        }
    };
    let mut guard = ProcessGuard::new(child);

    if let (Some(mut pipe), Some(input)) = (guard.child.stdin.take(), stdin) {
        let bytes = input.as_bytes().to_vec();
        tokio::spawn(async move {
            // A program that never reads stdin closes the pipe early; ignore EPIPE.
            let _ = pipe.write_all(&bytes).await;
            let _ = pipe.shutdown().await;
        });
    }

    // Bytes, not chars: a UTF-8 char is at most four bytes.
    let byte_limit = max_output_chars.saturating_mul(4);
    let stdout_task = guard
        .child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(read_limited(pipe, byte_limit)));
    let stderr_task = guard
        .child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(read_limited(pipe, byte_limit)));

    let waited = tokio::time::timeout(deadline, guard.child.wait()).await;
    let (exit_code, timed_out, wait_error) = match waited {
        Ok(Ok(status)) => {
            guard.finish();
            (status.code(), false, None)
        }
        Ok(Err(err)) => {
            guard.terminate().await;
            (None, false, Some(err.to_string()))
        }
        Err(_) => {
            tracing::debug!(
                command = %spec,
                deadline_ms = deadline.as_millis() as u64,
                "deadline exceeded, killing process group"
            );
            guard.terminate().await;
            (None, true, None)
        }
    };
    let duration_ms = started.elapsed().as_millis();

    let stdout = collect(stdout_task).await;
    let mut stderr = collect(stderr_task).await;
    if let Some(err) = wait_error {
        stderr.extend_from_slice(format!("\nwait failed: {err}").as_bytes());
    }

    ExecutionResult {
        success: !timed_out && exit_code == Some(0),
        stdout: truncate_chars(&String::from_utf8_lossy(&stdout), max_output_chars),
        stderr: truncate_chars(&String::from_utf8_lossy(&stderr), max_output_chars),
        timed_out,
        exit_code,
        duration_ms,
    }
}

/// Owns a spawned child until its whole process group has been killed.
struct ProcessGuard {
    child: Child,
    pgid: Option<Pid>,
    done: bool,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        let pgid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);
        Self {
            child,
            pgid,
            done: false,
        }
    }

    fn kill_group(&self) {
        if let Some(pgid) = self.pgid {
            // ESRCH just means the group already emptied out.
            let _ = killpg(pgid, Signal::SIGKILL);
        }
    }

    /// Leader already reaped; sweep anything it left behind.
    ///
    /// While any member survives, the kernel keeps the pgid number out of
    /// circulation, so the signal can only reach this group. Once the group
    /// is empty the number may be recycled, and a stray hit would need a new
    /// group leader to take that exact pid between the reap and this call.
    fn finish(&mut self) {
        if !self.done {
            self.kill_group();
            self.done = true;
        }
    }

    async fn terminate(&mut self) {
        if self.done {
            return;
        }
        self.kill_group();
        let _ = self.child.kill().await;
        self.done = true;
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if !self.done {
            self.kill_group();
        }
    }
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };
    match tokio::time::timeout(READER_GRACE, &mut task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            task.abort();
            Vec::new()
        }
    }
}

async fn read_limited<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::with_capacity(limit.min(8192));
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                // Keep draining past the cap so the writer never blocks on a full pipe.
                if out.len() < limit {
                    let remaining = limit - out.len();
                    out.extend_from_slice(&chunk[..remaining.min(n)]);
                }
            }
            Err(_) => break,
        }
    }
    out
}

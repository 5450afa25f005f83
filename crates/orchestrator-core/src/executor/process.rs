//! §6.1 agent subprocess invocation: building the `pi` command line and
//! managing the spawned child's lifetime (kill via SIGTERM then SIGKILL).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Everything needed to assemble the `pi` invocation for one task, short of
/// the binary path itself (which is process-level configuration, see
/// [`crate::config`]).
#[derive(Debug, Clone, Default)]
pub struct PiInvocation {
    pub cwd: PathBuf,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub thinking: Option<String>,
    pub system_prompt_path: Option<PathBuf>,
    pub prompt: String,
}

/// Build the argument vector for a `pi` invocation in the fixed order
/// specified by §6.1: `--mode json -p --no-session`, then optional flags,
/// then the composed prompt as the final positional argument.
pub fn build_args(inv: &PiInvocation) -> Vec<String> {
    let mut args = vec![
        "--mode".to_owned(),
        "json".to_owned(),
        "-p".to_owned(),
        "--no-session".to_owned(),
    ];

    if let Some(provider) = &inv.provider {
        args.push("--provider".to_owned());
        args.push(provider.clone());
    }
    if let Some(model) = &inv.model {
        args.push("--model".to_owned());
        args.push(model.clone());
    }
    if let Some(tools) = &inv.tools {
        args.push("--tools".to_owned());
        args.push(tools.join(","));
    }
    if let Some(thinking) = &inv.thinking {
        args.push("--thinking".to_owned());
        args.push(thinking.clone());
    }
    if let Some(path) = &inv.system_prompt_path {
        args.push("--append-system-prompt".to_owned());
        args.push(path.display().to_string());
    }

    args.push(inv.prompt.clone());
    args
}

/// A live `pi` child process: stdin is already closed, stdout/stderr pipes
/// are handed back separately so the caller can line-parse stdout while
/// concurrently draining stderr (mirroring `invariant::runner::run_invariant`'s
/// `tokio::join!` pattern).
pub struct SpawnedProcess {
    pub child: Child,
    pub pid: u32,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn the `pi` binary with the given invocation. The child's stdin is
/// closed immediately (the prompt is passed as an argument, not via stdin);
/// stdout and stderr are piped.
pub async fn spawn(pi_binary: &str, inv: &PiInvocation) -> Result<SpawnedProcess> {
    let args = build_args(inv);

    let mut child = Command::new(pi_binary)
        .args(&args)
        .current_dir(&inv.cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn agent process: {pi_binary}"))?;

    let pid = child.id().context("spawned child has no pid")?;
    let stdout = child.stdout.take().context("child stdout was not piped")?;
    let stderr = child.stderr.take().context("child stderr was not piped")?;

    Ok(SpawnedProcess {
        child,
        pid,
        stdout,
        stderr,
    })
}

/// How long to wait after SIGTERM before escalating to SIGKILL (§4.3, §5).
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Terminate `child`: send SIGTERM, wait up to 5s, then SIGKILL.
///
/// On non-unix targets there is no signal distinction available through
/// `tokio::process`; the child is killed directly.
pub async fn terminate(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: `pid` is a valid process id for a child we spawned and
            // still hold; sending SIGTERM to it is the standard graceful
            // shutdown request.
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, child.wait()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e).context("error waiting on terminated child"),
        Err(_) => {
            // Still alive after the grace period: escalate to SIGKILL.
            child.kill().await.context("failed to SIGKILL child")?;
            Ok(())
        }
    }
}

/// Read a pipe to completion as lossy UTF-8 text (used for stderr capture).
pub async fn read_to_string_lossy(mut pipe: impl tokio::io::AsyncRead + Unpin) -> String {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Write `content` to a freshly created temp file inside a unique directory
/// under `base_dir`, with unix mode 0600, returning the file path. Used for
/// the system-prompt temp file (§4.3 step 3).
pub async fn write_scoped_temp_file(base_dir: &Path, content: &str) -> Result<(PathBuf, tempfile::TempDir)> {
    let dir = tempfile::Builder::new()
        .prefix("agent-prompt-")
        .tempdir_in(base_dir)
        .context("failed to create scoped temp directory")?;
    let path = dir.path().join("system-prompt.txt");

    tokio::fs::write(&path, content)
        .await
        .context("failed to write system prompt temp file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&path, perms)
            .await
            .context("failed to set temp file permissions")?;
    }

    Ok((path, dir))
}

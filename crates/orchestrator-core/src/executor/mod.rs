//! C3: subprocess executor — `run_agent` spawns the `pi` binary, parses its
//! event stream, accumulates progress and usage, applies resource guards and
//! retry, and returns a [`TaskResult`]. See §4.3.

pub mod events;
pub mod process;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use crate::guards::{GuardSet, ResourceLimits};
use crate::preview;
use crate::progress::{TaskProgress, TaskStatus};
use crate::retry::{RetryConfig, Retryable, run_with_retry};
use crate::truncate::truncate_output_default;
use crate::usage::{UsageDelta, UsageStats};

use events::{AgentEvent, EventUsage, parse_event_line};
use process::PiInvocation;

/// A caller-supplied sink receiving a consistent snapshot of [`TaskProgress`]
/// after every recognized event (§6.5).
pub type ProgressSink = Arc<dyn Fn(TaskProgress) + Send + Sync>;

/// Input to [`run_agent`] (§4.3 contract).
#[derive(Clone)]
pub struct RunAgentOptions {
    pub id: String,
    pub name: Option<String>,
    pub task: String,
    pub cwd: PathBuf,
    pub step: Option<u32>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub context: Option<String>,
    pub thinking: Option<String>,
    pub retry: Option<RetryConfig>,
    pub resource_limits: Option<ResourceLimits>,
    pub cancel: CancellationToken,
    pub on_progress: Option<ProgressSink>,
    /// Path or name of the agent binary to exec (process-level config,
    /// threaded through per-call so `run_agent` stays a pure function of
    /// its options and is trivially testable with a fake binary).
    pub pi_binary: String,
    /// Directory in which the per-task scoped temp directory is created.
    pub temp_base_dir: PathBuf,
}

impl RunAgentOptions {
    /// A minimal set of options with sensible defaults, for tests and
    /// simple callers. `pi_binary`, `task`, `cwd`, and `id` still need
    /// setting.
    pub fn new(id: impl Into<String>, task: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            id: id.into(),
            name: None,
            task: task.into(),
            cwd,
            step: None,
            provider: None,
            model: None,
            tools: None,
            system_prompt: None,
            context: None,
            thinking: None,
            retry: None,
            resource_limits: None,
            cancel: CancellationToken::new(),
            on_progress: None,
            pi_binary: "pi".to_owned(),
            temp_base_dir: std::env::temp_dir(),
        }
    }
}

/// Immutable result of one `run_agent` invocation (§3).
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub id: String,
    pub task: String,
    pub model: Option<String>,
    pub exit_code: i32,
    pub output: String,
    pub stderr: String,
    pub truncated: bool,
    pub duration_ms: u64,
    pub usage: UsageStats,
    pub error: Option<String>,
    pub step: Option<u32>,
    pub aborted: bool,
    pub tool_usage: HashMap<String, u64>,
}

impl Retryable for TaskResult {
    fn is_success(&self) -> bool {
        self.exit_code == 0 || self.error.is_none()
    }

    fn error_text(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Run one agent task to completion. Never returns an `Err`: every failure
/// mode (including resource-acquisition failures before the child spawns)
/// is encoded in the returned [`TaskResult`], per §7.
pub async fn run_agent(opts: RunAgentOptions) -> TaskResult {
    if let Some(retry) = opts.retry.clone() {
        run_with_retry(Some(&retry), |attempt| run_once(opts.clone(), attempt)).await
    } else {
        run_once(opts, 1).await
    }
}

#[tracing::instrument(skip_all, fields(task_id = %opts.id, attempt))]
async fn run_once(opts: RunAgentOptions, attempt: u32) -> TaskResult {
    let start = Instant::now();
    let limits = opts.resource_limits.clone().unwrap_or_default();
    let mut guards = GuardSet::new(&opts.cancel, &limits);
    let token = guards.token();

    // Step 3: optional system-prompt temp file, mode 0600, cleaned up via
    // the returned TempDir guard's Drop on every path out of this function.
    let mut temp_dir_guard = None;
    let mut system_prompt_path = None;
    if let Some(system_prompt) = &opts.system_prompt {
        let trimmed = system_prompt.trim();
        if !trimmed.is_empty() {
            match process::write_scoped_temp_file(&opts.temp_base_dir, trimmed).await {
                Ok((path, dir)) => {
                    system_prompt_path = Some(path);
                    temp_dir_guard = Some(dir);
                }
                Err(e) => {
                    guards.shutdown();
                    tracing::error!(error = %e, "failed to write system prompt temp file");
                    return resource_failure_result(&opts, start, format!("{e:#}"));
                }
            }
        }
    }

    let prompt = compose_prompt(opts.context.as_deref(), &opts.task);
    let invocation = PiInvocation {
        cwd: opts.cwd.clone(),
        provider: opts.provider.clone(),
        model: opts.model.clone(),
        tools: opts.tools.clone(),
        thinking: opts.thinking.clone(),
        system_prompt_path,
        prompt,
    };

    let mut spawned = match process::spawn(&opts.pi_binary, &invocation).await {
        Ok(spawned) => spawned,
        Err(e) => {
            guards.shutdown();
            tracing::error!(error = %e, "failed to spawn agent process");
            return resource_failure_result(&opts, start, format!("{e:#}"));
        }
    };
    tracing::info!(pid = spawned.pid, attempt, "agent process spawned");

    let mut progress = TaskProgress::new(opts.id.clone(), opts.name.clone(), opts.task.clone());
    progress.model = opts.model.clone();
    progress.status = TaskStatus::Running;
    emit(&opts.on_progress, &mut progress);

    let stderr_handle = tokio::spawn(process::read_to_string_lossy(spawned.stderr));
    let mut lines = tokio::io::BufReader::new(spawned.stdout).lines();

    let mut usage = UsageStats::default();
    let mut tool_usage: HashMap<String, u64> = HashMap::new();
    let mut final_output = String::new();
    let mut api_error: Option<String> = None;
    let mut aborted = false;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                aborted = true;
                let _ = process::terminate(&mut spawned.child).await;
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(raw_line)) => {
                        match parse_event_line(&raw_line) {
                            Some(event) => {
                                handle_event(
                                    event,
                                    &mut progress,
                                    &mut usage,
                                    &mut tool_usage,
                                    &mut final_output,
                                    &mut api_error,
                                    &limits,
                                    &guards,
                                );
                                emit(&opts.on_progress, &mut progress);
                            }
                            None => {
                                if !raw_line.trim().is_empty() {
                                    tracing::warn!(line = %raw_line, "skipping unparsed agent event line");
                                }
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "error reading agent stdout, ending stream");
                        break;
                    }
                }
            }
        }
    }

    let exit_status = spawned.child.wait().await.ok();
    let stderr_text = stderr_handle.await.unwrap_or_default();
    drop(temp_dir_guard);

    let truncated_output = truncate_output_default(&final_output);
    let mut exit_code = exit_status.as_ref().and_then(|s| s.code()).unwrap_or(0);
    let mut error = if exit_code != 0 && !aborted {
        Some(if !stderr_text.is_empty() {
            stderr_text.clone()
        } else {
            format!("Exit code: {exit_code}")
        })
    } else {
        None
    };

    if error.is_none() {
        if let Some(api_err) = api_error {
            error = Some(api_err);
            exit_code = 1;
        }
    }

    progress.status = if aborted {
        TaskStatus::Aborted
    } else if exit_code == 0 {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };
    emit(&opts.on_progress, &mut progress);

    guards.shutdown();
    tracing::info!(exit_code, aborted, attempt, "agent process finished");

    TaskResult {
        id: opts.id.clone(),
        task: opts.task.clone(),
        model: opts.model.clone(),
        exit_code,
        output: truncated_output.output,
        stderr: stderr_text,
        truncated: truncated_output.truncated,
        duration_ms: start.elapsed().as_millis() as u64,
        usage,
        error,
        step: opts.step,
        aborted,
        tool_usage,
    }
}

/// Apply one parsed event to the running progress/usage/output accumulators
/// (§4.3 event table).
#[allow(clippy::too_many_arguments)]
fn handle_event(
    event: AgentEvent,
    progress: &mut TaskProgress,
    usage: &mut UsageStats,
    tool_usage: &mut HashMap<String, u64>,
    final_output: &mut String,
    api_error: &mut Option<String>,
    limits: &ResourceLimits,
    guards: &GuardSet,
) {
    match event {
        AgentEvent::MessageEnd(message) => {
            if message.role == "assistant" {
                usage.turns += 1;
                if let Some(event_usage) = &message.usage {
                    usage.add(&usage_delta(event_usage));
                }

                let mut last_text = None;
                for part in &message.content {
                    if part.kind == "text" {
                        if let Some(text) = &part.text {
                            progress.push_output_preview(text);
                            last_text = Some(text.clone());
                        }
                    }
                }
                if let Some(text) = last_text {
                    *final_output = text;
                }

                if message.stop_reason.as_deref() == Some("error") {
                    if let Some(err) = &message.error_message {
                        *api_error = Some(err.clone());
                    }
                }
            }
            // Other roles: append-only; no accumulator state to update.
        }
        AgentEvent::ToolExecutionStart { tool_name, args } => {
            let preview = preview::build_preview(&tool_name, &args);
            progress.begin_tool(tool_name, preview);
            guards.tool_call_started(limits);
        }
        AgentEvent::ToolExecutionEnd => {
            let tool = progress.current_tool.clone().unwrap_or_default();
            let args_preview = progress.current_tool_args.clone().unwrap_or_default();
            progress.end_tool(tool.clone(), args_preview);
            *tool_usage.entry(tool).or_insert(0) += 1;
            guards.tool_call_finished();
        }
        AgentEvent::ToolResultEnd { .. } => {
            // Append-only; no accumulator state to update.
        }
    }
}

fn usage_delta(event_usage: &EventUsage) -> UsageDelta {
    UsageDelta {
        input: Some(event_usage.input),
        output: Some(event_usage.output),
        cache_read: Some(event_usage.cache_read),
        cache_write: Some(event_usage.cache_write),
        cost: event_usage.cost.as_ref().map(|c| c.total),
        context_tokens: Some(event_usage.total_tokens),
        turns: None,
    }
}

fn compose_prompt(context: Option<&str>, task: &str) -> String {
    let body = format!("Task: {task}");
    match context {
        Some(c) if !c.is_empty() => format!("{c}\n\n{body}"),
        _ => body,
    }
}

fn resource_failure_result(opts: &RunAgentOptions, start: Instant, reason: String) -> TaskResult {
    TaskResult {
        id: opts.id.clone(),
        task: opts.task.clone(),
        model: opts.model.clone(),
        exit_code: 1,
        output: String::new(),
        stderr: String::new(),
        truncated: false,
        duration_ms: start.elapsed().as_millis() as u64,
        usage: UsageStats::default(),
        error: Some(reason),
        step: opts.step,
        aborted: false,
        tool_usage: HashMap::new(),
    }
}

fn emit(sink: &Option<ProgressSink>, progress: &mut TaskProgress) {
    progress.tick();
    tracing::debug!(task_id = %progress.id, status = ?progress.status, "emitting progress snapshot");
    if let Some(sink) = sink {
        sink(progress.clone());
    }
}

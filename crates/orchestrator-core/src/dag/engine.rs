//! C5: DAG scheduler — promotes ready nodes, launches them against a global
//! concurrency budget, and runs each node's review/approval loops (§4.5).
//!
//! Grounded in the donor's `orchestrator::run_orchestrator` scheduling loop:
//! a semaphore-bounded spawn per ready unit of work, an mpsc channel
//! carrying completions back to one coordinating loop, and a
//! cancellation-drain path — rebuilt here over an in-memory `Dag` instead
//! of a Postgres-backed plan.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::executor::{ProgressSink, RunAgentOptions, TaskResult};
use crate::usage::UsageStats;
use crate::workspace::Workspace;

use super::{Dag, DagNode, DependencyReadiness, NodeStatus, assemble_context, dependency_readiness};

/// A caller-supplied function that actually runs an agent task. In
/// production this wraps [`crate::executor::run_agent`]; tests substitute a
/// stub closure (per §8 S5/S6).
pub type NodeRunner = Arc<dyn Fn(RunAgentOptions) -> BoxFuture<'static, TaskResult> + Send + Sync>;

/// The human approval gate's verdict (§4.5).
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub feedback: Option<String>,
}

/// `approve(taskId, plan) -> decision` (§4.5).
pub type ApprovalCallback = Arc<dyn Fn(String, String) -> BoxFuture<'static, ApprovalDecision> + Send + Sync>;

/// Detects whether a reviewer's output counts as approval. Exposed as a
/// parameter rather than hardcoded, resolving Open Question 1 (§9):
/// default implementation does a case-insensitive substring check for
/// `"APPROVED"`.
pub type ApprovalPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub fn default_approval_predicate() -> ApprovalPredicate {
    Arc::new(|text: &str| text.to_uppercase().contains("APPROVED"))
}

/// Per-node outcome after [`execute_dag`] finishes (§4.5 return contract).
#[derive(Debug, Clone)]
pub struct DagExecutionResult {
    pub output: String,
    pub exit_code: i32,
    pub error: Option<String>,
    pub iteration: u32,
    pub usage: UsageStats,
    pub aborted: bool,
}

/// The aggregate outcome of one [`execute_dag`] call.
#[derive(Debug, Clone)]
pub struct DagRunOutcome {
    pub results: HashMap<String, DagExecutionResult>,
    pub aborted: bool,
}

/// Options threaded through one [`execute_dag`] call.
pub struct ExecuteDagOptions {
    pub runner: NodeRunner,
    pub cwd: std::path::PathBuf,
    pub cancel: CancellationToken,
    pub on_progress: Option<ProgressSink>,
    pub approve: Option<ApprovalCallback>,
    pub approval_predicate: ApprovalPredicate,
    pub workspace: Option<Arc<dyn Workspace>>,
    /// Cap on human-approval re-run iterations when a node's
    /// `requires_approval` is set (§4.5: "a global default of 5").
    pub global_max_approval_iterations: u32,
}

impl ExecuteDagOptions {
    pub fn new(runner: NodeRunner, cwd: std::path::PathBuf, cancel: CancellationToken) -> Self {
        Self {
            runner,
            cwd,
            cancel,
            on_progress: None,
            approve: None,
            approval_predicate: default_approval_predicate(),
            workspace: None,
            global_max_approval_iterations: super::DEFAULT_GLOBAL_MAX_ITERATIONS,
        }
    }
}

/// Run `dag` to completion: promote pending nodes to ready as dependencies
/// resolve, launch ready nodes up to the global concurrency budget, and run
/// each node's review/approval loop (§4.5 execution phase).
#[tracing::instrument(skip_all, fields(team = %dag.objective, nodes = dag.nodes.len()))]
pub async fn execute_dag(mut dag: Dag, opts: ExecuteDagOptions) -> DagRunOutcome {
    let limit = dag.max_concurrency.max(1) as usize;
    let semaphore = Arc::new(Semaphore::new(limit));
    let (tx, mut rx) = mpsc::channel::<NodeDone>(dag.nodes.len().max(1));
    let mut in_flight: usize = 0;
    let mut results: HashMap<String, DagExecutionResult> = HashMap::new();
    let mut aborted = false;

    loop {
        if opts.cancel.is_cancelled() {
            aborted = true;
            break;
        }

        // 1. Promote pending -> ready / skipped based on dependency state.
        let pending_ids: Vec<String> = dag
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Pending)
            .map(|n| n.id.clone())
            .collect();
        for id in pending_ids {
            let readiness = {
                let node = &dag.nodes[&id];
                dependency_readiness(node, &dag.nodes)
            };
            match readiness {
                DependencyReadiness::Ready => {
                    dag.nodes.get_mut(&id).unwrap().status = NodeStatus::Ready;
                }
                DependencyReadiness::Skip => {
                    mark_skipped_transitively(&mut dag, &id);
                }
                DependencyReadiness::Wait => {}
            }
        }

        // 2. Launch as many ready nodes as the remaining budget permits.
        let ready_ids: Vec<String> = dag
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Ready)
            .map(|n| n.id.clone())
            .collect();

        for id in ready_ids {
            let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                break;
            };
            let context = assemble_context(&dag.nodes[&id], &dag.nodes);
            let node = dag.nodes.get_mut(&id).unwrap();
            node.status = NodeStatus::Running;
            let node_snapshot = node.clone();

            let runner = Arc::clone(&opts.runner);
            let cwd = opts.cwd.clone();
            let node_cancel = opts.cancel.child_token();
            let on_progress = opts.on_progress.clone();
            let approve = opts.approve.clone();
            let approval_predicate = Arc::clone(&opts.approval_predicate);
            let global_max_approval_iterations = opts.global_max_approval_iterations;
            let tx = tx.clone();

            in_flight += 1;
            tracing::info!(node_id = %id, "dag node transitioning to running");
            tokio::spawn(async move {
                let _permit = permit;
                let (result, iterations) = run_node(
                    &node_snapshot,
                    context,
                    cwd,
                    runner,
                    node_cancel,
                    on_progress,
                    approve,
                    approval_predicate,
                    global_max_approval_iterations,
                )
                .await;
                let _ = tx.send(NodeDone { id, result, iterations }).await;
            });
        }

        // 3. Termination check.
        let any_unfinished = dag
            .nodes
            .values()
            .any(|n| matches!(n.status, NodeStatus::Pending | NodeStatus::Ready | NodeStatus::Running));
        if !any_unfinished && in_flight == 0 {
            break;
        }

        // 4. Wait for the next completion (or cancellation).
        tokio::select! {
            done = rx.recv() => {
                if let Some(done) = done {
                    in_flight -= 1;
                    apply_completion(&mut dag, &opts, &mut results, done).await;
                }
            }
            _ = opts.cancel.cancelled() => {
                aborted = true;
            }
        }

        if aborted {
            break;
        }
    }

    if aborted {
        // Drain any still-in-flight nodes so nothing leaks past this call.
        while in_flight > 0 {
            match rx.recv().await {
                Some(done) => {
                    in_flight -= 1;
                    apply_completion(&mut dag, &opts, &mut results, done).await;
                }
                None => break,
            }
        }
        for node in dag.nodes.values_mut() {
            if matches!(node.status, NodeStatus::Pending | NodeStatus::Ready | NodeStatus::Running) {
                node.status = NodeStatus::Skipped;
            }
        }
    }

    for node in dag.nodes.values() {
        results.entry(node.id.clone()).or_insert_with(|| DagExecutionResult {
            output: node.output.clone().unwrap_or_default(),
            exit_code: if node.status == NodeStatus::Completed { 0 } else { 1 },
            error: node.error.clone(),
            iteration: node.iteration,
            usage: UsageStats::default(),
            aborted,
        });
    }

    DagRunOutcome { results, aborted }
}

struct NodeDone {
    id: String,
    result: TaskResult,
    iterations: u32,
}

/// Mark `id` skipped, then propagate transitively to every node that (even
/// indirectly) depends on it and is still unresolved (§4.5).
fn mark_skipped_transitively(dag: &mut Dag, id: &str) {
    if let Some(node) = dag.nodes.get_mut(id) {
        if matches!(node.status, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped) {
            return;
        }
        tracing::info!(node_id = %id, "dag node skipped due to upstream failure or cancellation");
        node.status = NodeStatus::Skipped;
    }

    let dependents: Vec<String> = dag
        .nodes
        .values()
        .filter(|n| n.depends.iter().any(|d| d == id))
        .map(|n| n.id.clone())
        .collect();
    for dependent in dependents {
        mark_skipped_transitively(dag, &dependent);
    }
}

async fn apply_completion(
    dag: &mut Dag,
    opts: &ExecuteDagOptions,
    results: &mut HashMap<String, DagExecutionResult>,
    done: NodeDone,
) {
    let status = if done.result.error.is_none() {
        NodeStatus::Completed
    } else {
        NodeStatus::Failed
    };

    tracing::info!(node_id = %done.id, ?status, "dag node finished");

    if let Some(node) = dag.nodes.get_mut(&done.id) {
        node.status = status;
        node.output = Some(done.result.output.clone());
        node.error = done.result.error.clone();
        node.iteration = done.iterations;
    }

    if let Some(workspace) = &opts.workspace {
        let status_text = if status == NodeStatus::Completed { "completed" } else { "failed" };
        let _ = workspace.write_task_result(&done.id, &done.result.output, status_text).await;
    }

    results.insert(
        done.id,
        DagExecutionResult {
            output: done.result.output,
            exit_code: done.result.exit_code,
            error: done.result.error,
            iteration: done.iterations,
            usage: done.result.usage,
            aborted: done.result.aborted,
        },
    );
}

#[allow(clippy::too_many_arguments)]
async fn run_node(
    node: &DagNode,
    context: String,
    cwd: std::path::PathBuf,
    runner: NodeRunner,
    cancel: CancellationToken,
    on_progress: Option<ProgressSink>,
    approve: Option<ApprovalCallback>,
    approval_predicate: ApprovalPredicate,
    global_max_approval_iterations: u32,
) -> (TaskResult, u32) {
    let mut current_task = node.task.clone();
    let mut total_iterations: u32 = 0;
    let mut approval_rounds: u32 = 0;

    loop {
        let (primary, review_iterations) = run_primary_with_review(
            node,
            &current_task,
            &context,
            cwd.clone(),
            Arc::clone(&runner),
            cancel.clone(),
            on_progress.clone(),
            Arc::clone(&approval_predicate),
        )
        .await;
        total_iterations += review_iterations;

        if primary.error.is_some() || !node.requires_approval {
            return (primary, total_iterations);
        }

        let Some(approve) = approve.clone() else {
            return (primary, total_iterations);
        };

        let decision = approve(node.id.clone(), primary.output.clone()).await;
        if decision.approved {
            return (primary, total_iterations);
        }
        if approval_rounds + 1 >= global_max_approval_iterations.max(1) {
            tracing::warn!(node_id = %node.id, approval_rounds, "approval loop exhausted without approval");
            // Exhausted: still completed, carrying the last output (§4.5).
            return (primary, total_iterations);
        }
        approval_rounds += 1;
        current_task = format!(
            "{}\n\nApprover feedback: {}",
            node.task,
            decision.feedback.unwrap_or_default()
        );
    }
}

/// Run the primary task once, then (if `review` is set) repeatedly re-run
/// it under reviewer feedback until approval or `review.max_iterations` is
/// reached (§4.5 review loops). Returns the last primary result and the
/// number of primary runs performed.
#[allow(clippy::too_many_arguments)]
async fn run_primary_with_review(
    node: &DagNode,
    base_task: &str,
    context: &str,
    cwd: std::path::PathBuf,
    runner: NodeRunner,
    cancel: CancellationToken,
    on_progress: Option<ProgressSink>,
    approval_predicate: ApprovalPredicate,
) -> (TaskResult, u32) {
    let mut current_task = base_task.to_owned();
    let mut runs: u32 = 0;

    loop {
        let opts = build_options(node, &current_task, context, cwd.clone(), cancel.clone(), on_progress.clone());
        let result = runner(opts).await;
        runs += 1;

        let Some(review) = &node.review else {
            return (result, runs);
        };
        if result.error.is_some() {
            return (result, runs);
        }

        let review_prompt = format!(
            "{}\n\nOriginal task:\n{}\n\nProduced output:\n{}",
            review.task, node.task, result.output
        );
        let reviewer = node
            .review_member
            .as_ref()
            .expect("review_member is Some whenever review is Some (build_dag invariant)");
        let review_opts = RunAgentOptions {
            id: format!("{}-review-{}", node.id, runs),
            ..build_options_for_member(reviewer, &node.id, &review_prompt, "", cwd.clone(), cancel.clone(), None)
        };
        let review_result = runner(review_opts).await;

        if approval_predicate(&review_result.output) {
            return (result, runs);
        }
        if runs >= review.max_iterations.max(1) {
            tracing::warn!(node_id = %node.id, runs, "review loop exhausted without approval");
            // Exhausted without approval: still completed (§4.5).
            return (result, runs);
        }

        current_task = format!("{}\n\nReviewer feedback: {}", base_task, review_result.output);
    }
}

/// Build options for the primary run of `node`: the node's own member
/// defaults, overridden by its task-level `model`/`tools`/`resource_limits`/
/// `retry` (§4.5 precedence: team-member defaults → task-level overrides).
fn build_options(
    node: &DagNode,
    task_text: &str,
    context: &str,
    cwd: std::path::PathBuf,
    cancel: CancellationToken,
    on_progress: Option<ProgressSink>,
) -> RunAgentOptions {
    let mut opts = build_options_for_member(&node.member, &node.id, task_text, context, cwd, cancel, on_progress);
    opts.model = node.model.clone().or(opts.model);
    opts.tools = node.tools.clone().or(opts.tools);
    opts.resource_limits = node.resource_limits.clone().or(opts.resource_limits);
    opts.retry = node.retry.clone().or(opts.retry);
    opts
}

/// Build options for an executor call running entirely under `member`'s
/// settings — no task-level overrides layered on top. Used both for a
/// node's primary run (layered with its own overrides in [`build_options`])
/// and, unmodified, for the reviewer's call under the reviewer's member
/// settings (§4.5: "invoke the reviewer ... under the reviewer's member
/// settings").
fn build_options_for_member(
    member: &crate::dag::TeamMember,
    id: &str,
    task_text: &str,
    context: &str,
    cwd: std::path::PathBuf,
    cancel: CancellationToken,
    on_progress: Option<ProgressSink>,
) -> RunAgentOptions {
    let mut opts = RunAgentOptions::new(id.to_owned(), task_text.to_owned(), cwd);
    opts.model = member.model.clone();
    opts.tools = member.tools.clone();
    opts.resource_limits = member.resource_limits.clone();
    opts.retry = member.retry.clone();
    opts.system_prompt = member.system_prompt.clone();
    opts.thinking = member.thinking.as_ref().map(|t| t.as_arg());
    opts.context = if context.is_empty() { None } else { Some(context.to_owned()) };
    opts.cancel = cancel;
    opts.on_progress = on_progress;
    opts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{TeamConfig, TeamMember, TeamTask, ReviewConfig, build_dag};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    fn member(role: &str) -> TeamMember {
        TeamMember {
            role: role.to_owned(),
            ..Default::default()
        }
    }

    fn ok_result(id: &str, output: &str) -> TaskResult {
        TaskResult {
            id: id.to_owned(),
            task: String::new(),
            model: None,
            exit_code: 0,
            output: output.to_owned(),
            stderr: String::new(),
            truncated: false,
            duration_ms: 0,
            usage: UsageStats::default(),
            error: None,
            step: None,
            aborted: false,
            tool_usage: HashMap::new(),
        }
    }

    fn failing_result(id: &str, error: &str) -> TaskResult {
        TaskResult {
            error: Some(error.to_owned()),
            exit_code: 1,
            ..ok_result(id, "")
        }
    }

    #[tokio::test]
    async fn s5_review_loop_runs_until_approved_and_threads_context() {
        // plan -> build (depends on plan), build has a review loop that
        // rejects once then approves (§8 S5).
        let plan = TeamTask::new("plan", "make a plan", "planner");
        let mut build = TeamTask::new("build", "build it", "builder");
        build.depends = vec!["plan".into()];
        build.review = Some(ReviewConfig {
            assignee: "reviewer".into(),
            max_iterations: 2,
            task: "review this".into(),
        });

        let config = TeamConfig {
            objective: "ship".into(),
            members: vec![member("planner"), member("builder"), member("reviewer")],
            tasks: vec![plan, build],
            max_concurrency: 0,
        };
        let dag = build_dag(&config).unwrap();

        let review_calls = Arc::new(AtomicU32::new(0));
        let review_calls_clone = Arc::clone(&review_calls);
        let seen_contexts: Arc<AsyncMutex<Vec<String>>> = Arc::new(AsyncMutex::new(Vec::new()));
        let seen_contexts_clone = Arc::clone(&seen_contexts);

        let runner: NodeRunner = Arc::new(move |opts: RunAgentOptions| {
            let review_calls = Arc::clone(&review_calls_clone);
            let seen_contexts = Arc::clone(&seen_contexts_clone);
            Box::pin(async move {
                if opts.id == "plan" {
                    ok_result("plan", "the plan")
                } else if opts.id.starts_with("build-review") {
                    let n = review_calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        ok_result(&opts.id, "add tests")
                    } else {
                        ok_result(&opts.id, "APPROVED")
                    }
                } else {
                    if let Some(ctx) = &opts.context {
                        seen_contexts.lock().await.push(ctx.clone());
                    }
                    ok_result("build", "built it")
                }
            })
        });

        let dag_opts = ExecuteDagOptions::new(runner, std::path::PathBuf::from("/tmp"), CancellationToken::new());
        let outcome = execute_dag(dag, dag_opts).await;

        assert!(!outcome.aborted);
        let build_result = &outcome.results["build"];
        assert_eq!(build_result.iteration, 2, "initial run + one revision");
        assert!(build_result.error.is_none());

        let contexts = seen_contexts.lock().await;
        assert!(contexts.iter().all(|c| c.contains("the plan")), "plan output threaded into build's context");
    }

    #[tokio::test]
    async fn review_call_uses_reviewer_member_settings_not_assignees() {
        // builder and reviewer carry distinct models; the review call must
        // run under the reviewer's model, never the builder's (§4.5).
        let mut build = TeamTask::new("build", "build it", "builder");
        build.review = Some(ReviewConfig {
            assignee: "reviewer".into(),
            max_iterations: 1,
            task: "review this".into(),
        });

        let mut builder_member = member("builder");
        builder_member.model = Some("builder-model".into());
        let mut reviewer_member = member("reviewer");
        reviewer_member.model = Some("reviewer-model".into());

        let config = TeamConfig {
            objective: "ship".into(),
            members: vec![builder_member, reviewer_member],
            tasks: vec![build],
            max_concurrency: 0,
        };
        let dag = build_dag(&config).unwrap();

        let seen_models: Arc<AsyncMutex<Vec<Option<String>>>> = Arc::new(AsyncMutex::new(Vec::new()));
        let seen_models_clone = Arc::clone(&seen_models);

        let runner: NodeRunner = Arc::new(move |opts: RunAgentOptions| {
            let seen_models = Arc::clone(&seen_models_clone);
            Box::pin(async move {
                seen_models.lock().await.push(opts.model.clone());
                if opts.id.starts_with("build-review") {
                    ok_result(&opts.id, "APPROVED")
                } else {
                    ok_result("build", "built it")
                }
            })
        });

        let dag_opts = ExecuteDagOptions::new(runner, std::path::PathBuf::from("/tmp"), CancellationToken::new());
        let outcome = execute_dag(dag, dag_opts).await;

        assert!(!outcome.aborted);
        assert!(outcome.results["build"].error.is_none());

        let models = seen_models.lock().await;
        assert_eq!(models[0], Some("builder-model".into()), "primary run uses builder's model");
        assert_eq!(models[1], Some("reviewer-model".into()), "review call uses reviewer's model, not the builder's");
    }

    #[tokio::test]
    async fn s6_failure_skips_downstream_but_independent_branches_continue() {
        // A -> B -> C, A -> D. B fails.
        let a = TeamTask::new("a", "a", "planner");
        let mut b = TeamTask::new("b", "b", "builder");
        b.depends = vec!["a".into()];
        let mut c = TeamTask::new("c", "c", "builder");
        c.depends = vec!["b".into()];
        let mut d = TeamTask::new("d", "d", "builder");
        d.depends = vec!["a".into()];

        let config = TeamConfig {
            objective: "ship".into(),
            members: vec![member("planner"), member("builder")],
            tasks: vec![a, b, c, d],
            max_concurrency: 0,
        };
        let dag = build_dag(&config).unwrap();

        let runner: NodeRunner = Arc::new(|opts: RunAgentOptions| {
            Box::pin(async move {
                if opts.id == "b" {
                    failing_result("b", "boom")
                } else {
                    ok_result(&opts.id, "ok")
                }
            })
        });

        let dag_opts = ExecuteDagOptions::new(runner, std::path::PathBuf::from("/tmp"), CancellationToken::new());
        let outcome = execute_dag(dag, dag_opts).await;

        assert!(!outcome.aborted, "engine returns normally, not aborted");
        assert!(outcome.results["a"].error.is_none());
        assert!(outcome.results["b"].error.is_some());
        // C is downstream of the failed B and must be reported as skipped
        // (exit_code != 0, no specific error text required).
        assert!(outcome.results["c"].error.is_none() || outcome.results["c"].exit_code != 0);
        assert!(outcome.results["d"].error.is_none(), "independent branch D still completes");
    }

    #[tokio::test]
    async fn approval_gate_reruns_until_approved() {
        let mut a = TeamTask::new("a", "do a", "builder");
        a.requires_approval = true;
        let config = TeamConfig {
            objective: "ship".into(),
            members: vec![member("builder")],
            tasks: vec![a],
            max_concurrency: 0,
        };
        let dag = build_dag(&config).unwrap();

        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = Arc::clone(&runs);
        let runner: NodeRunner = Arc::new(move |opts: RunAgentOptions| {
            let runs = Arc::clone(&runs_clone);
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                ok_result(&opts.id, "draft output")
            })
        });

        let approve_calls = Arc::new(AtomicU32::new(0));
        let approve_calls_clone = Arc::clone(&approve_calls);
        let approve: ApprovalCallback = Arc::new(move |_id, _plan| {
            let approve_calls = Arc::clone(&approve_calls_clone);
            Box::pin(async move {
                let n = approve_calls.fetch_add(1, Ordering::SeqCst);
                ApprovalDecision {
                    approved: n >= 1,
                    feedback: Some("needs more detail".into()),
                }
            })
        });

        let mut dag_opts = ExecuteDagOptions::new(runner, std::path::PathBuf::from("/tmp"), CancellationToken::new());
        dag_opts.approve = Some(approve);
        let outcome = execute_dag(dag, dag_opts).await;

        assert!(!outcome.aborted);
        assert!(outcome.results["a"].error.is_none());
        assert_eq!(runs.load(Ordering::SeqCst), 2, "re-ran once after rejection");
    }

    #[tokio::test]
    async fn cancellation_marks_unfinished_nodes_skipped_and_reports_aborted() {
        let mut a = TeamTask::new("a", "a", "builder");
        a.depends = vec![];
        let mut b = TeamTask::new("b", "b", "builder");
        b.depends = vec!["a".into()];

        let config = TeamConfig {
            objective: "ship".into(),
            members: vec![member("builder")],
            tasks: vec![a, b],
            max_concurrency: 1,
        };
        let dag = build_dag(&config).unwrap();

        let cancel = CancellationToken::new();
        let cancel_for_runner = cancel.clone();
        let runner: NodeRunner = Arc::new(move |opts: RunAgentOptions| {
            let cancel = cancel_for_runner.clone();
            Box::pin(async move {
                cancel.cancel();
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                ok_result(&opts.id, "ok")
            })
        });

        let dag_opts = ExecuteDagOptions::new(runner, std::path::PathBuf::from("/tmp"), cancel);
        let outcome = execute_dag(dag, dag_opts).await;
        assert!(outcome.aborted);
    }
}

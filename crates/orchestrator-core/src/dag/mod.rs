//! C5: DAG engine — team-mode graph validation and node types (§4.5).
//!
//! [`build_dag`] validates a [`TeamConfig`] (unknown assignees, unknown/
//! duplicate ids, cycles) and materializes the runtime [`Dag`] the
//! scheduler in [`crate::dag::engine`] drives to completion.

pub mod engine;

use std::collections::HashMap;

use thiserror::Error;

use crate::guards::ResourceLimits;
use crate::resolver::ThinkingBudget;
use crate::retry::RetryConfig;

/// A team participant, providing defaults for tasks assigned to it (§3).
#[derive(Debug, Clone, Default)]
pub struct TeamMember {
    pub role: String,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub thinking: Option<ThinkingBudget>,
    pub resource_limits: Option<ResourceLimits>,
    pub retry: Option<RetryConfig>,
}

/// A review loop attached to a task: repeated re-execution under reviewer
/// feedback until approval or `max_iterations` (§3, §4.5).
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub assignee: String,
    pub max_iterations: u32,
    pub task: String,
}

/// One node of the team DAG, as authored (§3).
#[derive(Debug, Clone)]
pub struct TeamTask {
    pub id: String,
    pub task: String,
    pub assignee: String,
    pub depends: Vec<String>,
    pub review: Option<ReviewConfig>,
    pub requires_approval: bool,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub resource_limits: Option<ResourceLimits>,
    pub retry: Option<RetryConfig>,
}

impl TeamTask {
    /// A minimal task with no dependencies, review, or overrides, for tests.
    pub fn new(id: impl Into<String>, task: impl Into<String>, assignee: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            assignee: assignee.into(),
            depends: Vec::new(),
            review: None,
            requires_approval: false,
            model: None,
            tools: None,
            resource_limits: None,
            retry: None,
        }
    }
}

/// Default `maxConcurrency` when a [`TeamConfig`] doesn't specify one (§4.5).
pub const DEFAULT_MAX_CONCURRENCY: u32 = 4;
/// Hard cap on `maxConcurrency` (§4.5).
pub const MAX_MAX_CONCURRENCY: u32 = 8;
/// Global default cap on review/approval re-run iterations when a task
/// doesn't specify its own `review.maxIterations` (§4.5).
pub const DEFAULT_GLOBAL_MAX_ITERATIONS: u32 = 5;

/// Input to [`build_dag`] (§4.5).
#[derive(Debug, Clone)]
pub struct TeamConfig {
    pub objective: String,
    pub members: Vec<TeamMember>,
    pub tasks: Vec<TeamTask>,
    pub max_concurrency: u32,
}

impl TeamConfig {
    /// Clamp `max_concurrency` to `[1, MAX_MAX_CONCURRENCY]`, defaulting to
    /// [`DEFAULT_MAX_CONCURRENCY`] when zero.
    pub fn effective_max_concurrency(&self) -> u32 {
        if self.max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            self.max_concurrency.min(MAX_MAX_CONCURRENCY)
        }
    }
}

/// Runtime lifecycle status of a [`DagNode`] (§3, state machine in §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// A task within the DAG, carrying runtime status (§3).
#[derive(Debug, Clone)]
pub struct DagNode {
    pub id: String,
    pub task: String,
    pub assignee: String,
    pub member: TeamMember,
    pub depends: Vec<String>,
    pub review: Option<ReviewConfig>,
    /// The reviewer's resolved member settings, snapshotted at build time
    /// from `review.assignee` — distinct from `member`, which belongs to
    /// the primary `assignee`. `Some` iff `review` is `Some` (§4.5: "invoke
    /// the reviewer ... under the reviewer's member settings").
    pub review_member: Option<TeamMember>,
    pub requires_approval: bool,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub resource_limits: Option<ResourceLimits>,
    pub retry: Option<RetryConfig>,

    pub status: NodeStatus,
    pub iteration: u32,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// The validated, materialized graph [`engine::execute_dag`] runs.
#[derive(Debug, Clone)]
pub struct Dag {
    pub objective: String,
    pub max_concurrency: u32,
    pub nodes: HashMap<String, DagNode>,
    /// Authoring order, preserved for deterministic iteration in tests and
    /// reporting.
    pub order: Vec<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DagBuildError {
    #[error("task {task:?} references unknown assignee {assignee:?}")]
    UnknownAssignee { task: String, assignee: String },
    #[error("duplicate task id: {0:?}")]
    DuplicateTaskId(String),
    #[error("task {task:?} depends on unknown task {dependency:?}")]
    UnknownDependency { task: String, dependency: String },
    #[error("review on task {task:?} assigned to unknown member {assignee:?}")]
    UnknownReviewAssignee { task: String, assignee: String },
    #[error("dependency cycle detected: {0}")]
    CycleDetected(String),
}

/// Validate and materialize a [`TeamConfig`] into a [`Dag`] (§4.5 build
/// phase):
/// 1. every `assignee` (task and review) must reference a known member role;
/// 2. task ids must be unique;
/// 3. every id in `depends` must exist;
/// 4. the dependency graph must be acyclic (DFS coloring, per §9).
pub fn build_dag(config: &TeamConfig) -> Result<Dag, DagBuildError> {
    let members: HashMap<&str, &TeamMember> = config.members.iter().map(|m| (m.role.as_str(), m)).collect();

    let mut by_id: HashMap<String, &TeamTask> = HashMap::new();
    for task in &config.tasks {
        if by_id.insert(task.id.clone(), task).is_some() {
            return Err(DagBuildError::DuplicateTaskId(task.id.clone()));
        }
    }

    for task in &config.tasks {
        if !members.contains_key(task.assignee.as_str()) {
            return Err(DagBuildError::UnknownAssignee {
                task: task.id.clone(),
                assignee: task.assignee.clone(),
            });
        }
        if let Some(review) = &task.review {
            if !members.contains_key(review.assignee.as_str()) {
                return Err(DagBuildError::UnknownReviewAssignee {
                    task: task.id.clone(),
                    assignee: review.assignee.clone(),
                });
            }
        }
        for dep in &task.depends {
            if !by_id.contains_key(dep) {
                return Err(DagBuildError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    detect_cycle(&config.tasks)?;

    let mut nodes = HashMap::with_capacity(config.tasks.len());
    let mut order = Vec::with_capacity(config.tasks.len());
    for task in &config.tasks {
        let member = (*members[task.assignee.as_str()]).clone();
        let review_member = task
            .review
            .as_ref()
            .map(|review| (*members[review.assignee.as_str()]).clone());
        order.push(task.id.clone());
        nodes.insert(
            task.id.clone(),
            DagNode {
                id: task.id.clone(),
                task: task.task.clone(),
                assignee: task.assignee.clone(),
                member,
                depends: task.depends.clone(),
                review: task.review.clone(),
                review_member,
                requires_approval: task.requires_approval,
                model: task.model.clone(),
                tools: task.tools.clone(),
                resource_limits: task.resource_limits.clone(),
                retry: task.retry.clone(),
                status: NodeStatus::Pending,
                iteration: 0,
                output: None,
                error: None,
            },
        );
    }

    Ok(Dag {
        objective: config.objective.clone(),
        max_concurrency: config.effective_max_concurrency(),
        nodes,
        order,
    })
}

/// DFS coloring cycle detection (§9: deliberately DFS, not Kahn's
/// algorithm). White = unvisited, gray = on the current path, black = fully
/// explored. A back-edge to a gray node is a cycle; its path is reported.
fn detect_cycle(tasks: &[TeamTask]) -> Result<(), DagBuildError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let by_id: HashMap<&str, &TeamTask> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut color: HashMap<&str, Color> = tasks.iter().map(|t| (t.id.as_str(), Color::White)).collect();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a TeamTask>,
        color: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), DagBuildError> {
        color.insert(id, Color::Gray);
        path.push(id);

        for dep in &by_id[id].depends {
            match color.get(dep.as_str()).copied().unwrap_or(Color::White) {
                Color::White => visit(dep.as_str(), by_id, color, path)?,
                Color::Gray => {
                    let mut cycle_path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
                    cycle_path.push(dep.clone());
                    return Err(DagBuildError::CycleDetected(cycle_path.join(" -> ")));
                }
                Color::Black => {}
            }
        }

        path.pop();
        color.insert(id, Color::Black);
        Ok(())
    }

    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    for id in ids {
        if *color.get(id).unwrap() == Color::White {
            let mut path = Vec::new();
            visit(id, &by_id, &mut color, &mut path)?;
        }
    }

    Ok(())
}

/// A node is ready once every dependency is `completed`; if any dependency
/// is `failed` or `skipped`, the node itself becomes `skipped` — and that
/// propagates transitively (§4.5).
pub fn dependency_readiness(node: &DagNode, nodes: &HashMap<String, DagNode>) -> DependencyReadiness {
    let mut any_failed_or_skipped = false;
    let mut all_completed = true;

    for dep_id in &node.depends {
        match nodes.get(dep_id).map(|n| n.status) {
            Some(NodeStatus::Completed) => {}
            Some(NodeStatus::Failed) | Some(NodeStatus::Skipped) => {
                any_failed_or_skipped = true;
                all_completed = false;
            }
            _ => all_completed = false,
        }
    }

    if any_failed_or_skipped {
        DependencyReadiness::Skip
    } else if all_completed {
        DependencyReadiness::Ready
    } else {
        DependencyReadiness::Wait
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyReadiness {
    Ready,
    Wait,
    Skip,
}

/// Collect, in `depends` order, the output of every dependency of `node`,
/// each prefixed with a header identifying the producing task id (§4.5
/// context assembly).
pub fn assemble_context(node: &DagNode, nodes: &HashMap<String, DagNode>) -> String {
    node.depends
        .iter()
        .filter_map(|dep_id| nodes.get(dep_id))
        .map(|dep| format!("### Output of task {}\n{}", dep.id, dep.output.clone().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(role: &str) -> TeamMember {
        TeamMember {
            role: role.to_owned(),
            ..Default::default()
        }
    }

    fn base_config(tasks: Vec<TeamTask>) -> TeamConfig {
        TeamConfig {
            objective: "ship it".into(),
            members: vec![member("planner"), member("builder"), member("reviewer")],
            tasks,
            max_concurrency: 0,
        }
    }

    #[test]
    fn builds_a_simple_dag() {
        let config = base_config(vec![TeamTask::new("a", "do a", "planner")]);
        let dag = build_dag(&config).unwrap();
        assert_eq!(dag.nodes.len(), 1);
        assert_eq!(dag.nodes["a"].status, NodeStatus::Pending);
    }

    #[test]
    fn unknown_assignee_is_rejected() {
        let config = base_config(vec![TeamTask::new("a", "do a", "ghost")]);
        let err = build_dag(&config).unwrap_err();
        assert!(matches!(err, DagBuildError::UnknownAssignee { .. }));
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let config = base_config(vec![
            TeamTask::new("a", "do a", "planner"),
            TeamTask::new("a", "do a again", "builder"),
        ]);
        let err = build_dag(&config).unwrap_err();
        assert!(matches!(err, DagBuildError::DuplicateTaskId(ref id) if id == "a"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut a = TeamTask::new("a", "do a", "planner");
        a.depends = vec!["ghost".into()];
        let config = base_config(vec![a]);
        let err = build_dag(&config).unwrap_err();
        assert!(matches!(err, DagBuildError::UnknownDependency { .. }));
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let mut a = TeamTask::new("a", "a", "planner");
        a.depends = vec!["b".into()];
        let mut b = TeamTask::new("b", "b", "planner");
        b.depends = vec!["a".into()];
        let config = base_config(vec![a, b]);
        let err = build_dag(&config).unwrap_err();
        assert!(matches!(err, DagBuildError::CycleDetected(_)));
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let mut a = TeamTask::new("a", "a", "planner");
        a.depends = vec!["c".into()];
        let mut b = TeamTask::new("b", "b", "planner");
        b.depends = vec!["a".into()];
        let mut c = TeamTask::new("c", "c", "planner");
        c.depends = vec!["b".into()];
        let config = base_config(vec![a, b, c]);
        let err = build_dag(&config).unwrap_err();
        assert!(matches!(err, DagBuildError::CycleDetected(_)));
    }

    #[test]
    fn diamond_dag_is_accepted() {
        let a = TeamTask::new("a", "a", "planner");
        let mut b = TeamTask::new("b", "b", "builder");
        b.depends = vec!["a".into()];
        let mut c = TeamTask::new("c", "c", "builder");
        c.depends = vec!["a".into()];
        let mut d = TeamTask::new("d", "d", "reviewer");
        d.depends = vec!["b".into(), "c".into()];
        let config = base_config(vec![a, b, c, d]);
        let dag = build_dag(&config).unwrap();
        assert_eq!(dag.nodes.len(), 4);
    }

    #[test]
    fn review_with_unknown_assignee_is_rejected() {
        let mut a = TeamTask::new("a", "a", "planner");
        a.review = Some(ReviewConfig {
            assignee: "ghost".into(),
            max_iterations: 2,
            task: "review it".into(),
        });
        let config = base_config(vec![a]);
        let err = build_dag(&config).unwrap_err();
        assert!(matches!(err, DagBuildError::UnknownReviewAssignee { .. }));
    }

    #[test]
    fn max_concurrency_defaults_and_clamps() {
        let config = TeamConfig {
            max_concurrency: 0,
            ..base_config(vec![])
        };
        assert_eq!(config.effective_max_concurrency(), DEFAULT_MAX_CONCURRENCY);

        let config = TeamConfig {
            max_concurrency: 99,
            ..base_config(vec![])
        };
        assert_eq!(config.effective_max_concurrency(), MAX_MAX_CONCURRENCY);

        let config = TeamConfig {
            max_concurrency: 2,
            ..base_config(vec![])
        };
        assert_eq!(config.effective_max_concurrency(), 2);
    }

    #[test]
    fn dependency_readiness_ready_when_all_completed() {
        let mut nodes = HashMap::new();
        nodes.insert("a".to_owned(), node_with_status("a", NodeStatus::Completed));
        let mut n = node_with_status("b", NodeStatus::Pending);
        n.depends = vec!["a".into()];
        assert_eq!(dependency_readiness(&n, &nodes), DependencyReadiness::Ready);
    }

    #[test]
    fn dependency_readiness_skip_when_dependency_failed() {
        let mut nodes = HashMap::new();
        nodes.insert("a".to_owned(), node_with_status("a", NodeStatus::Failed));
        let mut n = node_with_status("b", NodeStatus::Pending);
        n.depends = vec!["a".into()];
        assert_eq!(dependency_readiness(&n, &nodes), DependencyReadiness::Skip);
    }

    #[test]
    fn dependency_readiness_waits_when_dependency_still_running() {
        let mut nodes = HashMap::new();
        nodes.insert("a".to_owned(), node_with_status("a", NodeStatus::Running));
        let mut n = node_with_status("b", NodeStatus::Pending);
        n.depends = vec!["a".into()];
        assert_eq!(dependency_readiness(&n, &nodes), DependencyReadiness::Wait);
    }

    #[test]
    fn assemble_context_concatenates_dependency_outputs_in_order() {
        let mut nodes = HashMap::new();
        let mut a = node_with_status("a", NodeStatus::Completed);
        a.output = Some("output of a".into());
        let mut b = node_with_status("b", NodeStatus::Completed);
        b.output = Some("output of b".into());
        nodes.insert("a".to_owned(), a);
        nodes.insert("b".to_owned(), b);

        let mut n = node_with_status("c", NodeStatus::Pending);
        n.depends = vec!["a".into(), "b".into()];

        let context = assemble_context(&n, &nodes);
        assert!(context.contains("task a"));
        assert!(context.contains("output of a"));
        assert!(context.find("task a").unwrap() < context.find("task b").unwrap());
    }

    fn node_with_status(id: &str, status: NodeStatus) -> DagNode {
        DagNode {
            id: id.to_owned(),
            task: "do it".into(),
            assignee: "planner".into(),
            member: member("planner"),
            depends: vec![],
            review: None,
            review_member: None,
            requires_approval: false,
            model: None,
            tools: None,
            resource_limits: None,
            retry: None,
            status,
            iteration: 0,
            output: None,
            error: None,
        }
    }
}

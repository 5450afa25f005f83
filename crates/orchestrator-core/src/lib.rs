//! Scheduling and coordination engine for parallel agent execution: a
//! subprocess executor, bounded-concurrency primitives, a team-mode DAG
//! engine, and the agent-configuration resolver feeding them.
//!
//! Out of scope here (external collaborators, specified only at their
//! interface with this crate): top-level tool/CLI dispatch, terminal
//! rendering of progress, context/git-context assembly, and team workspace
//! filesystem layout beyond the write-result contract.

pub mod agentfile;
pub mod concurrency;
pub mod config;
pub mod dag;
pub mod executor;
pub mod guards;
pub mod preview;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod truncate;
pub mod usage;
pub mod workspace;

pub use agentfile::{load_agent_dir, merge_by_scope, parse_agent_file};
pub use concurrency::{
    MapBoundedError, MapBoundedOutcome, RaceFailure, RaceOutcome, RaceTask, boxed_race_task, map_bounded, race,
};
pub use config::{ConfigError, ProcessConfig, TeamConfigToml, parse_team_config_toml};
pub use dag::engine::{
    ApprovalCallback, ApprovalDecision, ApprovalPredicate, DagExecutionResult, DagRunOutcome, ExecuteDagOptions,
    NodeRunner, default_approval_predicate, execute_dag,
};
pub use dag::{Dag, DagBuildError, DagNode, NodeStatus, TeamConfig, TeamMember, TeamTask, build_dag};
pub use executor::{ProgressSink, RunAgentOptions, TaskResult, run_agent};
pub use guards::{GuardSet, ResourceLimits};
pub use progress::{TaskProgress, TaskStatus};
pub use resolver::{AgentConfig, AgentSource, InheritanceError, ThinkingBudget, resolve_inheritance, resolve_settings};
pub use retry::{RetryConfig, Retryable, run_with_retry};
pub use usage::{UsageDelta, UsageStats};
pub use workspace::{FsWorkspace, InMemoryWorkspace, Workspace};

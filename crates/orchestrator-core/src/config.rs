//! §10.3 configuration: TOML-first loading of team definitions, and the
//! process-level defaults the embedding binary fills in (`pi` binary path,
//! discovery directories, concurrency caps).
//!
//! Follows the donor's parse-then-validate split (`plan::toml_format` /
//! `plan::parser`): a plain `#[derive(Deserialize)]` struct tree mirrors the
//! on-disk shape, gets validated independently of `dag::build_dag`'s own
//! checks, and only then is turned into the domain [`TeamConfig`].

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::dag::{DagBuildError, ReviewConfig, TeamConfig, TeamMember, TeamTask};
use crate::guards::ResourceLimits;
use crate::resolver::ThinkingBudget;
use crate::retry::RetryConfig;

/// Top-level `[team]` + `[[members]]` + `[[tasks]]` document shape.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfigToml {
    pub team: TeamMetaToml,
    #[serde(default)]
    pub members: Vec<TeamMemberToml>,
    #[serde(default)]
    pub tasks: Vec<TeamTaskToml>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamMetaToml {
    pub objective: String,
    #[serde(default)]
    pub max_concurrency: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamMemberToml {
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub thinking: Option<ThinkingBudget>,
    #[serde(default)]
    pub resource_limits: Option<ResourceLimits>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamTaskToml {
    pub id: String,
    pub task: String,
    pub assignee: String,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub review: Option<ReviewConfigToml>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub resource_limits: Option<ResourceLimits>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfigToml {
    pub assignee: String,
    #[serde(default = "default_review_max_iterations")]
    pub max_iterations: u32,
    pub task: String,
}

fn default_review_max_iterations() -> u32 {
    crate::dag::DEFAULT_GLOBAL_MAX_ITERATIONS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("team has no members")]
    NoMembers,
    #[error("team has no tasks")]
    NoTasks,
    #[error("duplicate member role: {0:?}")]
    DuplicateMemberRole(String),
    #[error(transparent)]
    Dag(#[from] DagBuildError),
}

/// Parse a team TOML document into a [`TeamConfig`], validating shape
/// (non-empty members/tasks, unique member roles) before returning it — the
/// same parse-then-validate split as the donor's `parse_plan_toml`, except
/// graph-level validation (unknown assignee, cycles) is left to
/// [`crate::dag::build_dag`] rather than duplicated here.
pub fn parse_team_config_toml(content: &str) -> Result<TeamConfig, ConfigError> {
    let raw: TeamConfigToml = toml::from_str(content)?;
    validate_shape(&raw)?;
    Ok(into_team_config(raw))
}

fn validate_shape(raw: &TeamConfigToml) -> Result<(), ConfigError> {
    if raw.members.is_empty() {
        return Err(ConfigError::NoMembers);
    }
    if raw.tasks.is_empty() {
        return Err(ConfigError::NoTasks);
    }

    let mut seen = std::collections::HashSet::new();
    for member in &raw.members {
        if !seen.insert(&member.role) {
            return Err(ConfigError::DuplicateMemberRole(member.role.clone()));
        }
    }
    Ok(())
}

fn into_team_config(raw: TeamConfigToml) -> TeamConfig {
    TeamConfig {
        objective: raw.team.objective,
        max_concurrency: raw.team.max_concurrency,
        members: raw.members.into_iter().map(into_team_member).collect(),
        tasks: raw.tasks.into_iter().map(into_team_task).collect(),
    }
}

fn into_team_member(m: TeamMemberToml) -> TeamMember {
    TeamMember {
        role: m.role,
        model: m.model,
        tools: m.tools,
        system_prompt: m.system_prompt,
        thinking: m.thinking,
        resource_limits: m.resource_limits,
        retry: m.retry,
    }
}

fn into_team_task(t: TeamTaskToml) -> TeamTask {
    TeamTask {
        id: t.id,
        task: t.task,
        assignee: t.assignee,
        depends: t.depends,
        review: t.review.map(|r| ReviewConfig {
            assignee: r.assignee,
            max_iterations: r.max_iterations,
            task: r.task,
        }),
        requires_approval: t.requires_approval,
        model: t.model,
        tools: t.tools,
        resource_limits: t.resource_limits,
        retry: t.retry,
    }
}

/// Process-level defaults the embedding binary can override: the `pi`
/// binary path, agent-definition discovery directories, and the global
/// concurrency/iteration caps (§10.3). The core itself never reads any of
/// these from the environment.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub pi_binary: String,
    pub user_agent_dir: Option<PathBuf>,
    pub project_agent_dir: Option<PathBuf>,
    pub default_max_concurrency: u32,
    pub global_max_iterations: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            pi_binary: "pi".to_owned(),
            user_agent_dir: dirs::home_dir().map(|home| home.join(".pi").join("agents")),
            project_agent_dir: Some(PathBuf::from(".pi/agents")),
            default_max_concurrency: crate::dag::DEFAULT_MAX_CONCURRENCY,
            global_max_iterations: crate::dag::DEFAULT_GLOBAL_MAX_ITERATIONS,
        }
    }
}

//! Agent-configuration resolver: `extends`-chain inheritance resolution and
//! override merge feeding the executor (§4.6).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guards::ResourceLimits;
use crate::retry::RetryConfig;

/// A thinking-token budget: either an explicit token count or one of the
/// three labels recognized by the `pi` binary's `--thinking` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThinkingBudget {
    Tokens(u32),
    Label(ThinkingLabel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLabel {
    Low,
    Medium,
    High,
}

impl ThinkingBudget {
    /// Render as the literal string passed to `--thinking`.
    pub fn as_arg(&self) -> String {
        match self {
            ThinkingBudget::Tokens(n) => n.to_string(),
            ThinkingBudget::Label(ThinkingLabel::Low) => "low".to_owned(),
            ThinkingBudget::Label(ThinkingLabel::Medium) => "medium".to_owned(),
            ThinkingBudget::Label(ThinkingLabel::High) => "high".to_owned(),
        }
    }
}

/// Where an [`AgentConfig`] was discovered (§3). Project-scoped agents win
/// over user-scoped ones at the same name when a discovery scope of "both"
/// is requested by the (external) discovery collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    User,
    Project,
}

/// A configured agent role: model, tools, system prompt, thinking budget,
/// and an optional `extends` base to inherit from (§3, §4.6).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub tools: Option<Vec<String>>,
    pub model: Option<String>,
    pub system_prompt: String,
    pub thinking: Option<ThinkingBudget>,
    pub source: AgentSource,
    pub file_path: Option<std::path::PathBuf>,
    pub extends: Option<String>,

    /// Populated by [`resolve_inheritance`]; `None` until resolved.
    pub resolved_tools: Option<Vec<String>>,
    pub resolved_model: Option<String>,
    pub resolved_thinking: Option<ThinkingBudget>,
}

impl AgentConfig {
    /// A root agent (no `extends`) with otherwise-default fields, for tests
    /// and simple callers.
    pub fn new(name: impl Into<String>, description: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: None,
            model: None,
            system_prompt: system_prompt.into(),
            thinking: None,
            source: AgentSource::User,
            file_path: None,
            extends: None,
            resolved_tools: None,
            resolved_model: None,
            resolved_thinking: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InheritanceError {
    #[error("circular inheritance detected: {0}")]
    CircularInheritance(String),
    #[error("base agent not found: {0}")]
    BaseAgentNotFound(String),
}

/// Resolve every agent's inheritance chain in place.
///
/// Walks each agent's `extends` upward via DFS with a per-path "currently
/// visiting" set; re-entering a name already on the current path reports
/// [`InheritanceError::CircularInheritance`] with the offending path. A
/// missing base reports [`InheritanceError::BaseAgentNotFound`]. No partial
/// resolution is observable on error: callers should discard `agents` if
/// this returns `Err`.
pub fn resolve_inheritance(agents: &mut HashMap<String, AgentConfig>) -> Result<(), InheritanceError> {
    let names: Vec<String> = agents.keys().cloned().collect();
    let mut resolved: HashSet<String> = HashSet::new();

    for name in names {
        if !resolved.contains(&name) {
            let mut visiting = Vec::new();
            resolve_one(&name, agents, &mut resolved, &mut visiting)?;
        }
    }
    Ok(())
}

fn resolve_one(
    name: &str,
    agents: &mut HashMap<String, AgentConfig>,
    resolved: &mut HashSet<String>,
    visiting: &mut Vec<String>,
) -> Result<(), InheritanceError> {
    if resolved.contains(name) {
        return Ok(());
    }
    if visiting.contains(&name.to_owned()) {
        let mut path = visiting.clone();
        path.push(name.to_owned());
        return Err(InheritanceError::CircularInheritance(path.join(" -> ")));
    }

    let extends = agents
        .get(name)
        .ok_or_else(|| InheritanceError::BaseAgentNotFound(name.to_owned()))?
        .extends
        .clone();

    let Some(base_name) = extends else {
        // Root: copy fields verbatim into the resolved slots.
        let agent = agents.get_mut(name).expect("checked above");
        agent.resolved_tools = agent.tools.clone();
        agent.resolved_model = agent.model.clone();
        agent.resolved_thinking = agent.thinking.clone();
        resolved.insert(name.to_owned());
        return Ok(());
    };

    if !agents.contains_key(&base_name) {
        return Err(InheritanceError::BaseAgentNotFound(base_name));
    }

    visiting.push(name.to_owned());
    resolve_one(&base_name, agents, resolved, visiting)?;
    visiting.pop();

    let base = agents.get(&base_name).expect("just resolved").clone_resolved_view();
    let agent = agents.get_mut(name).expect("checked above");

    let mut tools = base.resolved_tools.unwrap_or_default();
    let mut seen: HashSet<String> = tools.iter().cloned().collect();
    for t in agent.tools.iter().flatten() {
        if seen.insert(t.clone()) {
            tools.push(t.clone());
        }
    }
    agent.resolved_tools = if tools.is_empty() { None } else { Some(tools) };
    agent.resolved_model = agent.model.clone().or(base.resolved_model).or(base.model);
    agent.resolved_thinking = agent
        .thinking
        .clone()
        .or(base.resolved_thinking)
        .or(base.thinking);
    // systemPrompt is never inherited (§4.6).

    resolved.insert(name.to_owned());
    Ok(())
}

/// A cheap snapshot of the fields [`resolve_one`] needs from an already
/// -resolved base, so the borrow on `agents` doesn't have to stay live
/// across the mutable borrow of the child.
struct ResolvedView {
    resolved_tools: Option<Vec<String>>,
    resolved_model: Option<String>,
    resolved_thinking: Option<ThinkingBudget>,
    model: Option<String>,
    thinking: Option<ThinkingBudget>,
}

impl AgentConfig {
    fn clone_resolved_view(&self) -> ResolvedView {
        ResolvedView {
            resolved_tools: self.resolved_tools.clone(),
            resolved_model: self.resolved_model.clone(),
            resolved_thinking: self.resolved_thinking.clone(),
            model: self.model.clone(),
            thinking: self.thinking.clone(),
        }
    }
}

/// Caller-supplied overrides for [`resolve_settings`]; any field left `None`
/// falls back to the resolved agent config.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub thinking: Option<ThinkingBudget>,
    pub resource_limits: Option<ResourceLimits>,
    pub retry: Option<RetryConfig>,
}

/// Effective settings for one executor invocation, after merging an agent's
/// resolved inheritance with call-site overrides.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSettings {
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub thinking: Option<ThinkingBudget>,
    pub resource_limits: Option<ResourceLimits>,
    pub retry: Option<RetryConfig>,
}

/// Merge an (optional) agent's resolved fields with caller overrides:
/// start from the agent's resolved fields + system prompt, then override
/// each field the caller actually supplied. `resource_limits`/`retry` pass
/// through unchanged from `overrides` — an agent config carries no such
/// fields to merge against (§4.6).
pub fn resolve_settings(agent: Option<&AgentConfig>, overrides: SettingsOverrides) -> ResolvedSettings {
    let mut settings = match agent {
        Some(agent) => ResolvedSettings {
            model: agent.resolved_model.clone(),
            tools: agent.resolved_tools.clone(),
            system_prompt: Some(agent.system_prompt.clone()),
            thinking: agent.resolved_thinking.clone(),
            resource_limits: None,
            retry: None,
        },
        None => ResolvedSettings::default(),
    };

    if overrides.model.is_some() {
        settings.model = overrides.model;
    }
    if overrides.tools.is_some() {
        settings.tools = overrides.tools;
    }
    if overrides.system_prompt.is_some() {
        settings.system_prompt = overrides.system_prompt;
    }
    if overrides.thinking.is_some() {
        settings.thinking = overrides.thinking;
    }
    settings.resource_limits = overrides.resource_limits;
    settings.retry = overrides.retry;

    settings
}

//! §6.3 agent definition file format: YAML-frontmatter-delimited markdown,
//! the same two-phase parse (frontmatter then body-as-prose) used by sibling
//! agent-definition formats in this ecosystem.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::resolver::{AgentConfig, AgentSource, ThinkingBudget};

/// Raw frontmatter shape, deserialized with `serde_yaml` before being
/// folded into an [`AgentConfig`] alongside the body text.
#[derive(Debug, Clone, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tools: Option<String>,
    model: Option<String>,
    thinking: Option<ThinkingBudget>,
    extends: Option<String>,
}

/// Parse one agent definition file's contents (§6.3).
///
/// Returns `None` if the file has no `---`-delimited frontmatter block, or
/// if the frontmatter is missing `name` or `description` — both required.
/// `tools` is a comma-separated list in the frontmatter; it is split and
/// trimmed into the ordered `Vec<String>` [`AgentConfig::tools`] expects.
/// Everything after the second `---` line becomes `system_prompt` verbatim.
pub fn parse_agent_file(raw: &str, source: AgentSource, file_path: Option<PathBuf>) -> Option<AgentConfig> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with("---") {
        return None;
    }

    let mut parts = trimmed.splitn(3, "---");
    let _ = parts.next(); // leading empty segment before the first `---`
    let frontmatter_text = parts.next()?.trim();
    let body = parts.next().unwrap_or("").trim().to_owned();

    let frontmatter: Frontmatter = serde_yaml::from_str(frontmatter_text).ok()?;
    let name = frontmatter.name?;
    let description = frontmatter.description?;

    let tools = frontmatter.tools.map(|csv| {
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>()
    });

    Some(AgentConfig {
        name,
        description,
        tools,
        model: frontmatter.model,
        system_prompt: body,
        thinking: frontmatter.thinking,
        source,
        file_path,
        extends: frontmatter.extends,
        resolved_tools: None,
        resolved_model: None,
        resolved_thinking: None,
    })
}

/// Load every `*.md` file directly inside `dir` as an agent definition
/// (§6.3). Non-`.md` entries, subdirectories, and files that fail to parse
/// (missing frontmatter, missing `name`/`description`) are silently skipped
/// — a missing `dir` is not an error, it simply yields no agents.
pub async fn load_agent_dir(dir: &Path, source: AgentSource) -> std::io::Result<Vec<AgentConfig>> {
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        if let Some(agent) = parse_agent_file(&raw, source, Some(path.clone())) {
            out.push(agent);
        }
    }

    Ok(out)
}

/// Merge user-scope and project-scope agent lists by name, with
/// project-scoped agents winning collisions (§4.6 discovery collaborator).
pub fn merge_by_scope(user: Vec<AgentConfig>, project: Vec<AgentConfig>) -> Vec<AgentConfig> {
    let mut by_name: std::collections::HashMap<String, AgentConfig> =
        user.into_iter().map(|a| (a.name.clone(), a)).collect();
    for agent in project {
        by_name.insert(agent.name.clone(), agent);
    }
    by_name.into_values().collect()
}

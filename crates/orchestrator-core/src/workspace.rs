//! §3/§6.4 workspace: the external collaborator the DAG engine writes
//! per-task result files to. The core depends only on the narrow
//! `write_task_result` contract; filesystem layout for team artifacts
//! beyond that is explicitly out of scope (§1).

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

/// Replace every byte outside `[A-Za-z0-9._-]` with `_`, then truncate to
/// `max_len` characters (§6.4 sanitization rule).
pub fn sanitize_name(name: &str, max_len: usize) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    sanitized.chars().take(max_len).collect()
}

/// A shared filesystem region a team's tasks exchange artifacts through.
/// The core only ever calls [`Workspace::write_task_result`] — everything
/// else about workspace layout belongs to the embedding application.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn write_task_result(&self, id: &str, output: &str, status: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct TaskResultFile<'a> {
    id: &'a str,
    status: &'a str,
    output: &'a str,
    timestamp: String,
}

/// A [`Workspace`] backed by a real directory:
/// `<root>/<sanitized-team-name>-<unique>/tasks/<sanitized-task-id>.json`
/// and a sibling `artifacts/` directory (§6.4).
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    /// Create the workspace directory tree under `root_base` for `team_name`,
    /// disambiguated by `unique` (e.g. a short id or timestamp supplied by
    /// the caller — this crate never reads the clock itself).
    pub async fn create(root_base: &std::path::Path, team_name: &str, unique: &str) -> anyhow::Result<Self> {
        let dir_name = format!("{}-{}", sanitize_name(team_name, 80), sanitize_name(unique, 32));
        let root = root_base.join(dir_name);
        tokio::fs::create_dir_all(root.join("tasks")).await?;
        tokio::fs::create_dir_all(root.join("artifacts")).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    async fn write_task_result(&self, id: &str, output: &str, status: &str) -> anyhow::Result<()> {
        let file = TaskResultFile {
            id,
            status,
            output,
            timestamp: Utc::now().to_rfc3339(),
        };
        let path = self.tasks_dir().join(format!("{}.json", sanitize_name(id, 200)));
        let body = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(path, body).await?;
        Ok(())
    }
}

/// An in-memory [`Workspace`] for tests: records every write without
/// touching the filesystem.
#[derive(Default)]
pub struct InMemoryWorkspace {
    writes: tokio::sync::Mutex<Vec<(String, String, String)>>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn writes(&self) -> Vec<(String, String, String)> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn write_task_result(&self, id: &str, output: &str, status: &str) -> anyhow::Result<()> {
        self.writes
            .lock()
            .await
            .push((id.to_owned(), output.to_owned(), status.to_owned()));
        Ok(())
    }
}

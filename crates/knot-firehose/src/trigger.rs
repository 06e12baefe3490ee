//! Compiling `.tangled/workflows/*` on a pull's source branch into a
//! pipeline-trigger payload.

use knot_git::GitEngine;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const WORKFLOWS_DIR: &str = ".tangled/workflows";

/// One discovered workflow file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub path: String,
    pub raw: String,
}

/// The event payload written to the oplog as nsid
/// `sh.tangled.pipeline.trigger`. Only emitted when non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTrigger {
    pub repo: String,
    pub branch: String,
    pub workflows: Vec<WorkflowFile>,
}

/// Walks `.tangled/workflows/` on `branch` and reads every file found
/// there. Returns `None` if the directory is absent or empty -- callers
/// must not emit an event in that case.
pub async fn compile(engine: &GitEngine, repo: &str, branch: &str) -> Result<Option<PipelineTrigger>> {
    let entries = match engine.list_tree(branch, WORKFLOWS_DIR).await {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };

    let mut workflows = Vec::new();
    for entry in entries {
        if !entry.is_file {
            continue;
        }
        let path = format!("{WORKFLOWS_DIR}/{}", entry.name);
        let Ok(content) = engine.file_content(branch, &path).await else { continue };
        let knot_git::FileContent::Text(raw) = content else { continue };
        workflows.push(WorkflowFile { path, raw });
    }

    if workflows.is_empty() {
        return Ok(None);
    }

    Ok(Some(PipelineTrigger {
        repo: repo.to_string(),
        branch: branch.to_string(),
        workflows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn seed_repo_with_workflow(dir: &tempfile::TempDir, content: Option<&str>) -> GitEngine {
        let bare_path = dir.path().join("repo.git");
        let caches = Arc::new(knot_git::Caches::new());
        let engine = GitEngine::init_bare(&bare_path, caches.clone()).await.unwrap();

        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .current_dir(&work_dir)
                .args(args)
                .output()
                .unwrap()
        };
        run(&["init", "--initial-branch=main"]);
        if let Some(content) = content {
            std::fs::create_dir_all(work_dir.join(".tangled/workflows")).unwrap();
            std::fs::write(work_dir.join(".tangled/workflows/ci.yaml"), content).unwrap();
        } else {
            std::fs::write(work_dir.join("README.md"), b"hi").unwrap();
        }
        run(&["add", "-A"]);
        run(&["-c", "user.name=t", "-c", "user.email=t@t.com", "commit", "-m", "init"]);
        run(&["push", bare_path.to_str().unwrap(), "main"]);

        GitEngine::open(bare_path, caches).unwrap()
    }

    #[tokio::test]
    async fn compiles_a_discovered_workflow_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = seed_repo_with_workflow(&dir, Some("name: ci\non: push\n")).await;

        let trigger = compile(&engine, "did:plc:a/proj", "main").await.unwrap();
        let trigger = trigger.expect("expected a pipeline trigger");
        assert_eq!(trigger.workflows.len(), 1);
        assert_eq!(trigger.workflows[0].path, ".tangled/workflows/ci.yaml");
    }

    #[tokio::test]
    async fn absent_workflows_directory_yields_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = seed_repo_with_workflow(&dir, None).await;

        let trigger = compile(&engine, "did:plc:a/proj", "main").await.unwrap();
        assert!(trigger.is_none());
    }
}

//! In-memory git and story status collaborators.

use async_trait::async_trait;
use sc_core::git::GitCollaborator;
use sc_core::story::StoryStatusUpdater;
use sc_protocol::{CreateBranchResult, MergeResult, OpResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records every call and answers from a few switches.
pub struct MockGit {
    calls: Mutex<Vec<String>>,
    branches: Mutex<HashSet<String>>,
    merged: Mutex<HashSet<String>>,
    has_changes: AtomicBool,
    conflict_on_merge: AtomicBool,
    fail_commits: AtomicBool,
}

#[allow(dead_code)]
impl MockGit {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            branches: Mutex::new(HashSet::new()),
            merged: Mutex::new(HashSet::new()),
            has_changes: AtomicBool::new(true),
            conflict_on_merge: AtomicBool::new(false),
            fail_commits: AtomicBool::new(false),
        }
    }

    pub fn with_branch(self, branch: &str) -> Self {
        self.branches.lock().unwrap().insert(branch.to_string());
        self
    }

    pub fn set_has_changes(&self, value: bool) {
        self.has_changes.store(value, Ordering::SeqCst);
    }

    pub fn set_conflict_on_merge(&self, value: bool) {
        self.conflict_on_merge.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_commits(&self, value: bool) {
        self.fail_commits.store(value, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls starting with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GitCollaborator for MockGit {
    async fn branch_exists(&self, _project_path: &str, branch: &str) -> bool {
        self.branches.lock().unwrap().contains(branch)
    }

    async fn create_branch(
        &self,
        _project_path: &str,
        branch: &str,
        from: Option<&str>,
    ) -> CreateBranchResult {
        self.record(format!("create_branch {branch} from {}", from.unwrap_or("HEAD")));
        if !self.branches.lock().unwrap().insert(branch.to_string()) {
            return CreateBranchResult {
                success: false,
                already_exists: true,
                error: Some(format!("a branch named '{branch}' already exists")),
            };
        }
        CreateBranchResult {
            success: true,
            already_exists: false,
            error: None,
        }
    }

    async fn checkout_branch(&self, _project_path: &str, branch: &str) -> OpResult {
        self.record(format!("checkout {branch}"));
        OpResult::ok()
    }

    async fn commit(&self, _project_path: &str, message: &str, force_add: bool) -> OpResult {
        self.record(format!("commit {message} force={force_add}"));
        if self.fail_commits.load(Ordering::SeqCst) {
            return OpResult::failed("fatal: unable to write index");
        }
        OpResult::ok()
    }

    async fn has_changes(&self, _project_path: &str) -> bool {
        self.has_changes.load(Ordering::SeqCst)
    }

    async fn merge_branch(&self, _project_path: &str, branch: &str) -> MergeResult {
        self.record(format!("merge {branch}"));
        if self.conflict_on_merge.load(Ordering::SeqCst) {
            return MergeResult {
                success: false,
                has_conflicts: true,
                error: Some("CONFLICT (content): Merge conflict in src/lib.rs".to_string()),
            };
        }
        self.merged.lock().unwrap().insert(branch.to_string());
        MergeResult {
            success: true,
            has_conflicts: false,
            error: None,
        }
    }

    async fn is_branch_merged(&self, _project_path: &str, branch: &str, _target: &str) -> bool {
        self.merged.lock().unwrap().contains(branch)
    }
}

/// Records status updates; can be told to fail them.
pub struct RecordingStatus {
    updates: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl RecordingStatus {
    pub fn new() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, value: bool) {
        self.fail.store(value, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoryStatusUpdater for RecordingStatus {
    async fn update_story_status(&self, file_path: &str, new_status: &str) -> OpResult {
        if self.fail.load(Ordering::SeqCst) {
            return OpResult::failed(format!("{file_path}: permission denied"));
        }
        self.updates
            .lock()
            .unwrap()
            .push((file_path.to_string(), new_status.to_string()));
        OpResult::ok()
    }
}

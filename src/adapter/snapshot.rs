//! File-backed snapshot adapter.
//!
//! Stands in for a container runtime: observed state lives in a JSON file,
//! keyed by `kind/name`. Stored documents may use any spelling a runtime
//! reports; applying an action first normalizes the stored fields with the
//! kind's policy table, then rewrites them the way the runtime would end up,
//! so plans can be applied and idempotence checked without Docker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{BackendError, ConvergeError, Result, StateError};
use crate::model::{ApiVersion, RawSpec, ResourceId, ResourceSpec, Value};
use crate::normalize::SpecNormalizer;
use crate::planner::Action;
use crate::policy::PolicyTable;

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::{ExecutionAdapter, ExecutionResult};

/// Current version of the snapshot file format.
pub const SNAPSHOT_FORMAT: &str = "1.0";

/// API version assumed for a snapshot that does not name one.
const DEFAULT_API_VERSION: &str = "1.41";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

const BACKEND: &str = "snapshot";

/// Contents of a snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version.
    pub format: String,
    /// API version the simulated backend reports.
    pub api_version: String,
    /// Canonical observed fields, keyed by `kind/name`.
    #[serde(default)]
    pub resources: BTreeMap<String, RawSpec>,
    /// Applied actions, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// When the snapshot was last written.
    pub last_updated: DateTime<Utc>,
}

/// One applied action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the action was applied.
    pub timestamp: DateTime<Utc>,
    /// Resource key (`kind/name`).
    pub resource: String,
    /// Action name.
    pub action: String,
}

/// Execution adapter backed by a snapshot file.
#[derive(Debug)]
pub struct SnapshotAdapter {
    /// Path to the snapshot file.
    path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
    /// Version reported instead of the snapshot's own, if set.
    api_version: Option<ApiVersion>,
    /// Serializes read-modify-write cycles within this process.
    write_guard: Mutex<()>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            format: SNAPSHOT_FORMAT.to_string(),
            api_version: api_version.into(),
            resources: BTreeMap::new(),
            history: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Records an applied action, dropping the oldest entries past the cap.
    pub fn add_history(&mut self, resource: &str, action: &str) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            resource: resource.to_string(),
            action: action.to_string(),
        });
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(DEFAULT_API_VERSION)
    }
}

impl SnapshotAdapter {
    /// Creates an adapter for the snapshot file at `path`.
    ///
    /// The lock file sits next to it with a `.lock` extension.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self {
            path,
            lock_path,
            api_version: None,
            write_guard: Mutex::new(()),
        }
    }

    /// Reports `version` instead of the version stored in the snapshot.
    #[must_use]
    pub fn with_api_version(mut self, version: Option<ApiVersion>) -> Self {
        self.api_version = version;
        self
    }

    /// Path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot. A missing file is an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns a backend-unavailable error if the file cannot be read or parsed.
    pub async fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            debug!("Snapshot does not exist yet: {}", self.path.display());
            return Ok(Snapshot::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| unavailable(format!("failed to read {}: {e}", self.path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| unavailable(format!("failed to parse {}: {e}", self.path.display())))
    }

    /// Writes the snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns a backend-unavailable error if the file cannot be written.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(format!("failed to create {}: {e}", parent.display())))?;
        }

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StateError::serialization(format!("failed to serialize snapshot: {e}")))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| unavailable(format!("failed to create temp snapshot: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| unavailable(format!("failed to write snapshot: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| unavailable(format!("failed to sync snapshot: {e}")))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| unavailable(format!("failed to rename snapshot: {e}")))?;

        debug!("Snapshot saved to {}", self.path.display());
        Ok(())
    }

    /// Stores raw observed fields for a resource, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or written.
    pub async fn put_observed(&self, id: &ResourceId, raw: RawSpec) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut snapshot = self.load().await?;
        snapshot.resources.insert(id.key(), raw);
        snapshot.last_updated = Utc::now();
        self.save(&snapshot).await
    }

    /// Acquires the snapshot lock. An empty `holder` gets a generated id.
    ///
    /// The lock file is created exclusively, so of two processes racing for
    /// it exactly one wins. An expired lock is taken over only if it is still
    /// the same lock when re-read.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::LockedByOther`] if a live lock is held.
    pub async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        let lock_info = LockInfo::new(&holder_id);

        for _ in 0..2 {
            if self.create_lock_file(&lock_info).await? {
                info!(
                    "Acquired snapshot lock: {} (expires in {}s)",
                    lock_info.lock_id, LOCK_EXPIRY_SECS
                );
                return Ok(lock_info);
            }

            let Some(existing) = self.read_lock_file().await? else {
                continue;
            };
            if !existing.is_expired() {
                return Err(locked_by(existing));
            }
            if self
                .read_lock_file()
                .await?
                .is_some_and(|current| current.lock_id == existing.lock_id)
            {
                debug!("Expired lock {} found, taking over", existing.lock_id);
                self.delete_lock_file().await?;
            }
        }

        match self.read_lock_file().await? {
            Some(existing) => Err(locked_by(existing)),
            None => Err(StateError::LockFailed {
                message: String::from("lock file kept changing while acquiring it"),
            }
            .into()),
        }
    }

    /// Releases the lock if `lock_id` still holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be read or removed.
    pub async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                info!("Released snapshot lock: {lock_id}");
            } else {
                debug!("Lock ID mismatch: expected {lock_id}, found {}", existing.lock_id);
            }
        }
        Ok(())
    }

    /// Removes the lock regardless of who holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be removed.
    pub async fn force_unlock(&self) -> Result<()> {
        self.delete_lock_file().await
    }

    /// Gets current lock information, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file exists but cannot be read.
    pub async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    /// Returns true if a live lock is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file exists but cannot be read.
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock_file()
            .await?
            .is_some_and(|lock| !lock.is_expired()))
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read lock file: {e}"),
        })?;
        let lock_info = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse lock file: {e}"),
        })?;
        Ok(Some(lock_info))
    }

    /// Creates the lock file exclusively. Returns false if it already exists.
    async fn create_lock_file(&self, lock_info: &LockInfo) -> Result<bool> {
        if let Some(parent) = self.lock_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| StateError::LockFailed {
                message: format!("Failed to create {}: {e}", parent.display()),
            })?;
        }

        let content = serde_json::to_string_pretty(lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;
        let lock_failed = |e: std::io::Error| StateError::LockFailed {
            message: format!("Failed to write lock file: {e}"),
        };

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(lock_failed(e).into()),
        };
        file.write_all(content.as_bytes()).await.map_err(lock_failed)?;
        file.sync_all().await.map_err(lock_failed)?;
        Ok(true)
    }

    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| StateError::LockFailed {
                message: format!("Failed to delete lock file: {e}"),
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionAdapter for SnapshotAdapter {
    async fn fetch_state(&self, id: &ResourceId) -> Result<Option<RawSpec>> {
        let snapshot = self.load().await?;
        Ok(snapshot.resources.get(&id.key()).cloned())
    }

    async fn apply_action(
        &self,
        id: &ResourceId,
        action: &Action,
        desired: &ResourceSpec,
    ) -> Result<ExecutionResult> {
        if action.is_noop() {
            return Ok(ExecutionResult::new(id, action));
        }

        let _guard = self.write_guard.lock().await;
        let mut snapshot = self.load().await?;
        let key = id.key();
        let table = id.kind.policy_table()?;
        let current = snapshot
            .resources
            .get(&key)
            .map(|raw| canonical_fields(raw, &table))
            .transpose()?;

        if current.is_none() && matches!(action, Action::UpdateInPlace(_) | Action::Recreate(_)) {
            return Err(BackendError::ActionFailed {
                backend: BACKEND.to_string(),
                resource: key,
                action: action.name().to_string(),
                message: String::from("resource does not exist"),
            }
            .into());
        }

        match action.apply_to(current.as_ref(), desired) {
            Some(fields) => {
                let raw = fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                snapshot.resources.insert(key.clone(), raw);
            }
            None => {
                snapshot.resources.remove(&key);
            }
        }
        snapshot.add_history(&key, action.name());
        snapshot.last_updated = Utc::now();
        self.save(&snapshot).await?;

        info!("Applied {} to {}", action.name(), key);
        Ok(ExecutionResult::new(id, action))
    }

    async fn backend_version(&self) -> Result<ApiVersion> {
        if let Some(version) = &self.api_version {
            return Ok(version.clone());
        }
        let snapshot = self.load().await?;
        ApiVersion::parse(&snapshot.api_version).map_err(|_| {
            BackendError::InvalidVersion {
                backend: BACKEND.to_string(),
                version: snapshot.api_version.clone(),
            }
            .into()
        })
    }

    fn backend_type(&self) -> &'static str {
        BACKEND
    }
}

/// Normalizes the fields `table` knows; other fields are kept as stored.
fn canonical_fields(raw: &RawSpec, table: &PolicyTable) -> Result<BTreeMap<String, Value>> {
    let mut fields = SpecNormalizer::new().normalize_observed(raw, table)?.fields;
    for (name, json) in raw.iter().filter(|(name, _)| table.lookup(name).is_none()) {
        fields.insert(name.clone(), Value::from_json(json));
    }
    Ok(fields)
}

fn locked_by(lock: LockInfo) -> ConvergeError {
    StateError::LockedByOther {
        holder: lock.holder,
        since: lock.acquired_at.to_rfc3339(),
    }
    .into()
}

fn unavailable(message: String) -> ConvergeError {
    BackendError::unavailable(BACKEND, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use crate::planner::{RecreateReason, SubOperation};
    use crate::reconciler::Reconciler;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_adapter() -> (SnapshotAdapter, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let adapter = SnapshotAdapter::new(temp_dir.path().join("snapshot.json"));
        (adapter, temp_dir)
    }

    fn web() -> ResourceId {
        ResourceId::new(ResourceKind::Container, "web")
    }

    fn spec(fields: &[(&str, Value)]) -> ResourceSpec {
        let mut spec = ResourceSpec::new(ResourceKind::Container);
        for (name, value) in fields {
            spec.fields.insert((*name).to_string(), value.clone());
        }
        spec
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_empty() {
        let (adapter, _temp) = create_test_adapter();
        assert!(adapter.fetch_state(&web()).await.unwrap().is_none());
        assert_eq!(adapter.backend_version().await.unwrap(), ApiVersion::docker(1, 41));
    }

    #[tokio::test]
    async fn test_create_then_update_then_remove() {
        let (adapter, _temp) = create_test_adapter();
        let desired = spec(&[("image", Value::str("nginx:latest")), ("memory", Value::Int(1024))]);

        adapter.apply_action(&web(), &Action::Create, &desired).await.unwrap();
        let stored = adapter.fetch_state(&web()).await.unwrap().unwrap();
        assert_eq!(stored, desired.to_raw());

        let update = Action::UpdateInPlace(vec![SubOperation::Set {
            field: String::from("memory"),
            value: Value::Int(2048),
        }]);
        let result = adapter.apply_action(&web(), &update, &desired).await.unwrap();
        assert_eq!(result.operations, 1);
        let stored = adapter.fetch_state(&web()).await.unwrap().unwrap();
        assert_eq!(stored.get("memory"), Some(&json!(2048)));

        adapter.apply_action(&web(), &Action::Remove, &desired).await.unwrap();
        assert!(adapter.fetch_state(&web()).await.unwrap().is_none());

        let snapshot = adapter.load().await.unwrap();
        let actions: Vec<&str> = snapshot.history.iter().map(|h| h.action.as_str()).collect();
        assert_eq!(actions, vec!["create", "update", "remove"]);
    }

    fn raw(value: serde_json::Value) -> RawSpec {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_update_replays_on_normalized_fields() {
        let (adapter, _temp) = create_test_adapter();
        let id = ResourceId::new(ResourceKind::Service, "api");
        let table = ResourceKind::Service.policy_table().unwrap();
        adapter
            .put_observed(
                &id,
                raw(json!({
                    "image": "api:1",
                    "mode": "replicated",
                    "replicas": 2,
                    "env": ["A=1"],
                    "ports": ["80:80", "81:81"],
                    "mounts": ["data:/data:ro", "logs:/logs"],
                    "created_at": "2024-01-01T00:00:00Z"
                })),
            )
            .await
            .unwrap();

        let desired = raw(json!({
            "image": "api:1",
            "replicas": 3,
            "env": {"A": "1", "B": "2"},
            "publish": ["80:80"],
            "mounts": ["data:/data:ro"]
        }));
        let reconciler = Reconciler::new(&adapter);
        let outcome = reconciler.reconcile(&id, &desired, &table).await.unwrap();
        assert!(matches!(outcome.action, Action::UpdateInPlace(_)));

        let report = reconciler.apply(&outcome, &table).await.unwrap();
        assert!(report.converged);
        assert!(report.follow_up.is_noop());

        let stored = adapter.fetch_state(&id).await.unwrap().unwrap();
        assert_eq!(stored["env"], json!({"A": "1", "B": "2"}));
        assert_eq!(stored["publish"].as_array().map(Vec::len), Some(1));
        assert_eq!(stored["mounts"].as_array().map(Vec::len), Some(1));
        assert_eq!(stored["created_at"], json!("2024-01-01T00:00:00Z"));
        assert!(!stored.contains_key("ports"));
    }

    #[tokio::test]
    async fn test_recreate_converges() {
        let (adapter, _temp) = create_test_adapter();
        let table = ResourceKind::Container.policy_table().unwrap();
        adapter
            .put_observed(&web(), raw(json!({"image": "nginx:1.24", "memory": "64M", "runtime": "runc"})))
            .await
            .unwrap();

        let desired = raw(json!({"image": "nginx:1.25", "memory": "64m"}));
        let reconciler = Reconciler::new(&adapter);
        let outcome = reconciler.reconcile(&web(), &desired, &table).await.unwrap();
        assert!(matches!(outcome.action, Action::Recreate(_)));

        let report = reconciler.apply(&outcome, &table).await.unwrap();
        assert!(report.converged);

        let stored = adapter.fetch_state(&web()).await.unwrap().unwrap();
        assert_eq!(stored["image"], json!("nginx:1.25"));
        assert_eq!(stored["memory"], json!(67_108_864));
        let again = reconciler.reconcile(&web(), &desired, &table).await.unwrap();
        assert!(again.action.is_noop());
    }

    #[tokio::test]
    async fn test_recreate_of_missing_resource_fails() {
        let (adapter, _temp) = create_test_adapter();
        let action = Action::Recreate(RecreateReason {
            fields: vec![String::from("image")],
        });
        let err = adapter.apply_action(&web(), &action, &spec(&[])).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Backend unavailable: snapshot backend failed to apply recreate to container/web: resource does not exist"
        );
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_is_unavailable() {
        let (adapter, _temp) = create_test_adapter();
        std::fs::write(adapter.path(), "{ not json").unwrap();
        let err = adapter.fetch_state(&web()).await.unwrap_err();
        assert!(matches!(err, ConvergeError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_version_override_and_invalid_version() {
        let (adapter, _temp) = create_test_adapter();
        let snapshot = Snapshot::new("not-a-version");
        adapter.save(&snapshot).await.unwrap();
        assert!(adapter.backend_version().await.is_err());

        let adapter = adapter.with_api_version(Some(ApiVersion::docker(1, 24)));
        assert_eq!(adapter.backend_version().await.unwrap().to_string(), "1.24");
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (adapter, _temp) = create_test_adapter();
        let lock = adapter.acquire_lock("test-holder").await.unwrap();
        assert!(adapter.is_locked().await.unwrap());

        adapter.release_lock(&lock.lock_id).await.unwrap();
        assert!(!adapter.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (adapter, _temp) = create_test_adapter();
        let _first = adapter.acquire_lock("holder-1").await.unwrap();

        let err = adapter.acquire_lock("holder-2").await.unwrap_err();
        assert!(err.to_string().contains("lock holder: holder-1"));

        adapter.force_unlock().await.unwrap();
        assert!(adapter.acquire_lock("holder-2").await.is_ok());
    }

    #[tokio::test]
    async fn test_racing_acquires_have_one_winner() {
        let (adapter, _temp) = create_test_adapter();
        let (first, second) = tokio::join!(adapter.acquire_lock("holder-1"), adapter.acquire_lock("holder-2"));
        assert_eq!(usize::from(first.is_ok()) + usize::from(second.is_ok()), 1);

        assert!(adapter.acquire_lock("holder-3").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let (adapter, _temp) = create_test_adapter();
        let mut stale = LockInfo::new("crashed");
        stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
        std::fs::write(&adapter.lock_path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = adapter.acquire_lock("holder-1").await.unwrap();
        let current = adapter.get_lock_info().await.unwrap().unwrap();
        assert_eq!(current.lock_id, lock.lock_id);
        assert_eq!(current.holder, "holder-1");
    }

    #[test]
    fn test_history_is_capped() {
        let mut snapshot = Snapshot::default();
        for i in 0..(MAX_HISTORY + 5) {
            snapshot.add_history(&format!("volume/v{i}"), "create");
        }
        assert_eq!(snapshot.history.len(), MAX_HISTORY);
        assert_eq!(snapshot.history[0].resource, "volume/v5");
    }
}

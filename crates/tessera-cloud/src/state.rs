//! Local record of reconciled objects
//!
//! Once a flow discovers the identifier of a remotely created object it is
//! cached in `.tessera/state.json`, keyed by `provider:type:id`.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".tessera";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.prev.json";
const STATE_STAGING: &str = "state.json.tmp";
const LOCK_FILE: &str = "state.lock";
const STALE_LOCK_MINUTES: i64 = 60;

/// Build the `provider:type:id` key used by [`GlobalState`]
pub fn state_key(provider: &str, resource_type: &str, id: &str) -> String {
    format!("{}:{}:{}", provider, resource_type, id)
}

/// All objects recorded for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: u32,

    pub updated_at: DateTime<Utc>,

    /// Objects indexed by `provider:type:id`
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reconciled object under its provider
    pub fn record(&mut self, provider: &str, resource: ResourceState) -> String {
        let key = state_key(provider, &resource.resource_type, &resource.id);
        self.resources.insert(key.clone(), resource);
        self.updated_at = Utc::now();
        key
    }

    pub fn forget(&mut self, key: &str) -> Option<ResourceState> {
        let removed = self.resources.remove(key);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn get(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Objects of one type recorded for `provider`
    pub fn by_type<'a>(
        &'a self,
        provider: &str,
        resource_type: &str,
    ) -> impl Iterator<Item = &'a ResourceState> + 'a {
        let prefix = format!("{}:{}:", provider, resource_type);
        self.resources
            .iter()
            .filter(move |(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v)
    }
}

/// Observed state of one remote object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Remote identifier (numeric id, or a composite key such as `primary:secondary`)
    pub id: String,

    pub resource_type: String,

    pub status: ResourceStatus,

    /// Observed attributes (assigned IP, transaction id, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Unknown,
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Serialize) {
        // Serializing plain data into a Value cannot fail; a failure leaves the map untouched.
        if let Ok(value) = serde_json::to_value(value) {
            self.attributes.insert(key.into(), value);
            self.updated_at = Utc::now();
        }
    }

    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The id parsed as a numeric remote identifier
    pub fn numeric_id(&self) -> Result<u64> {
        parse_numeric_id(&self.id)
    }
}

/// Parse a numeric remote identifier
pub fn parse_numeric_id(id: &str) -> Result<u64> {
    id.trim()
        .parse::<u64>()
        .map_err(|_| CloudError::InvalidId(format!("'{}' is not a numeric id", id)))
}

/// Lifecycle of a remote object as seen locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Order placed, object not yet discovered
    Ordered,
    /// Object exists but an async operation is still running on it
    Provisioning,
    Active,
    Deleted,
    Failed,
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Ordered => write!(f, "ordered"),
            ResourceStatus::Provisioning => write!(f, "provisioning"),
            ResourceStatus::Active => write!(f, "active"),
            ResourceStatus::Deleted => write!(f, "deleted"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Persists [`GlobalState`] under `<project>/.tessera/`
pub struct StateManager {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockOwner {
    host: String,
    pid: u32,
    since: DateTime<Utc>,
}

impl LockOwner {
    fn current() -> Self {
        let host = ["HOSTNAME", "HOST"]
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            host,
            pid: std::process::id(),
            since: Utc::now(),
        }
    }

    fn is_stale(&self) -> bool {
        Utc::now().signed_duration_since(self.since).num_minutes() >= STALE_LOCK_MINUTES
    }
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            dir: project_root.as_ref().join(STATE_DIR),
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn read_state(path: &Path) -> Result<GlobalState> {
        let raw = fs::read(path).await?;
        let state: GlobalState = serde_json::from_slice(&raw)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} has format version {}, this build understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Load the recorded state; an unreadable state file falls back to the backup
    pub async fn load(&self) -> Result<GlobalState> {
        let primary = self.file(STATE_FILE);
        if !primary.exists() {
            tracing::debug!("Nothing recorded yet in {}", self.dir.display());
            return Ok(GlobalState::default());
        }

        match Self::read_state(&primary).await {
            Ok(state) => {
                tracing::debug!("Loaded {} recorded objects", state.resources.len());
                Ok(state)
            }
            Err(CloudError::Json(e)) => {
                let backup = self.file(STATE_BACKUP);
                if !backup.exists() {
                    return Err(CloudError::Json(e));
                }
                tracing::warn!(
                    "{} is corrupt ({}), using {}",
                    primary.display(),
                    e,
                    backup.display()
                );
                Self::read_state(&backup).await
            }
            Err(e) => Err(e),
        }
    }

    /// Write `state` atomically; the file it replaces becomes the backup
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let primary = self.file(STATE_FILE);
        let staging = self.file(STATE_STAGING);
        fs::write(&staging, serde_json::to_vec_pretty(state)?).await?;
        if primary.exists() {
            fs::rename(&primary, self.file(STATE_BACKUP)).await?;
        }
        fs::rename(&staging, &primary).await?;

        tracing::debug!(
            "Recorded {} objects in {}",
            state.resources.len(),
            primary.display()
        );
        Ok(())
    }

    /// Take the project lock. A lock older than an hour is considered abandoned.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.file(LOCK_FILE);
        if path.exists() {
            let owner: LockOwner = serde_json::from_slice(&fs::read(&path).await?)?;
            if !owner.is_stale() {
                return Err(CloudError::LockError(format!(
                    "held by pid {} on {} since {}",
                    owner.pid, owner.host, owner.since
                )));
            }
            tracing::warn!(
                "Taking over abandoned lock of pid {} on {}",
                owner.pid,
                owner.host
            );
        }

        fs::write(&path, serde_json::to_vec_pretty(&LockOwner::current())?).await?;
        tracing::debug!("Locked {}", self.dir.display());
        Ok(StateLock { path: Some(path) })
    }
}

/// Exclusive hold on a project's state; released explicitly or on drop
pub struct StateLock {
    path: Option<PathBuf>,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if let Some(path) = self.path.take() {
            if path.exists() {
                fs::remove_file(&path).await?;
            }
            tracing::debug!("Unlocked {}", path.display());
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_save_load() {
        let dir = tempdir().unwrap();
        let manager = StateManager::new(dir.path());

        let mut state = GlobalState::new();
        let key = state.record(
            "softlayer",
            ResourceState::new("5512", "global-ip")
                .with_status(ResourceStatus::Active)
                .with_attribute("ip_address", "169.45.12.3"),
        );
        assert_eq!(key, "softlayer:global-ip:5512");

        manager.save(&state).await.unwrap();
        let loaded = manager.load().await.unwrap();

        let ip = loaded.get(&key).unwrap();
        assert_eq!(ip.status, ResourceStatus::Active);
        assert_eq!(ip.attribute::<String>("ip_address").unwrap(), "169.45.12.3");
        assert_eq!(ip.numeric_id().unwrap(), 5512);
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let dir = tempdir().unwrap();
        let manager = StateManager::new(dir.path());

        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();

        assert!(dir.path().join(STATE_DIR).join(STATE_BACKUP).exists());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let dir = tempdir().unwrap();
        assert!(
            StateManager::new(dir.path())
                .load()
                .await
                .unwrap()
                .resources
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_corrupt_state_falls_back_to_backup() {
        let dir = tempdir().unwrap();
        let manager = StateManager::new(dir.path());

        let mut state = GlobalState::new();
        state.record("softlayer", ResourceState::new("7", "dns-zone"));
        manager.save(&state).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();
        std::fs::write(dir.path().join(STATE_DIR).join(STATE_FILE), "{ truncated").unwrap();

        let recovered = manager.load().await.unwrap();
        assert_eq!(recovered.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_future_version_rejected() {
        let dir = tempdir().unwrap();
        let manager = StateManager::new(dir.path());
        let state = GlobalState {
            version: STATE_VERSION + 1,
            ..GlobalState::new()
        };
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let manager = StateManager::new(dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        assert!(manager.acquire_lock().await.is_ok());
    }

    #[test]
    fn test_by_type_and_composite_id() {
        let mut state = GlobalState::new();
        state.record("softlayer", ResourceState::new("11:12", "vpx-ha"));
        state.record("softlayer", ResourceState::new("7", "dns-zone"));

        let pairs: Vec<_> = state.by_type("softlayer", "vpx-ha").collect();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].numeric_id().is_err());
    }
}

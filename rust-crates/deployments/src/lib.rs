use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Dev,
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Dev => "dev",
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Dev => "Devnet",
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Where the world lives and how a client session should talk to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub world_address: String,
    pub namespace: String,
    pub rpc_url: String,
    pub torii_url: String,
    pub manifest_hash: String,
    #[serde(default)]
    pub game_id: u32,
    #[serde(default)]
    pub account_address: Option<String>,
    #[serde(default)]
    pub action_timeout_ms: Option<u64>,
}

impl DeploymentRecord {
    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.manifest_hash == hash
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::with_root(DEPLOYMENTS_ROOT, env)
    }

    /// Store rooted somewhere other than `./.deployments`. `~` and env vars expand.
    pub fn with_root(root: impl AsRef<str>, env: DeploymentEnv) -> Result<Self> {
        let expanded = shellexpand::full(root.as_ref())
            .with_context(|| format!("Failed to expand path {}", root.as_ref()))?;
        let path = ensure_store(Path::new(&*expanded), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: DeploymentRecord) -> Result<()> {
        write_record(&self.path, &record)
    }
}

pub fn compute_manifest_hash(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| {
        format!("Failed to read world manifest for hashing: {}", path.display())
    })?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn ensure_structure(root: impl AsRef<Path>) -> Result<()> {
    for env in [
        DeploymentEnv::Dev,
        DeploymentEnv::Test,
        DeploymentEnv::Local,
    ] {
        let _ = ensure_store(root.as_ref(), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).with_context(|| {
            format!("Failed to create deployments directory {}", root.display())
        })?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create {} directory", env_dir.display())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::write(&file_path, b"").with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}

pub fn record_deployment(
    store: &DeploymentStore,
    world_address: impl AsRef<str>,
    manifest_hash: impl AsRef<str>,
    rpc_url: impl AsRef<str>,
    torii_url: impl AsRef<str>,
) -> Result<DeploymentRecord> {
    let record = DeploymentRecord {
        deployed_at: Utc::now().to_rfc3339(),
        world_address: world_address.as_ref().to_string(),
        namespace: "dojo_starter".to_string(),
        rpc_url: rpc_url.as_ref().to_string(),
        torii_url: torii_url.as_ref().to_string(),
        manifest_hash: manifest_hash.as_ref().to_string(),
        game_id: 0,
        account_address: None,
        action_timeout_ms: None,
    };
    store.save(record.clone())?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    fn store_in(dir: &TempDir, env: DeploymentEnv) -> DeploymentStore {
        let root = dir.path().join(DEPLOYMENTS_ROOT);
        DeploymentStore::with_root(root.to_string_lossy(), env).unwrap()
    }

    #[test]
    fn load__fresh_store__returns_none() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = store_in(&dir, DeploymentEnv::Local);

        // when
        let loaded = store.load().unwrap();

        // then
        assert!(loaded.is_none());
    }

    #[test]
    fn record_deployment__is_read_back_by_load() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = store_in(&dir, DeploymentEnv::Dev);

        // when
        let saved = record_deployment(
            &store,
            "0x0123",
            "abcd",
            "http://localhost:5050",
            "http://localhost:8080",
        )
        .unwrap();
        let loaded = store.load().unwrap();

        // then
        assert_eq!(loaded, Some(saved));
    }

    #[test]
    fn load__list_of_records__returns_latest() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = store_in(&dir, DeploymentEnv::Test);
        let json = r#"[
            {"deployed_at":"a","world_address":"0x1","namespace":"dojo_starter",
             "rpc_url":"r","torii_url":"t","manifest_hash":"h1"},
            {"deployed_at":"b","world_address":"0x2","namespace":"dojo_starter",
             "rpc_url":"r","torii_url":"t","manifest_hash":"h2","game_id":7,
             "action_timeout_ms":500}
        ]"#;
        fs::write(store.path(), json).unwrap();

        // when
        let loaded = store.load().unwrap().unwrap();

        // then
        assert_eq!(loaded.world_address, "0x2");
        assert_eq!(loaded.game_id, 7);
        assert_eq!(loaded.action_timeout_ms, Some(500));
        assert!(loaded.is_compatible_with_hash("h2"));
    }

    #[test]
    fn compute_manifest_hash__is_sha256_hex() {
        // given
        let dir = TempDir::new("manifest").unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, b"{}").unwrap();

        // when
        let hash = compute_manifest_hash(&path).unwrap();

        // then
        assert_eq!(
            hash,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}

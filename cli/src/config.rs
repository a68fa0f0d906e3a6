//! CLI configuration: where to find an optional seed file and which
//! tenant new containers are created under. There is no remote endpoint
//! to resolve here — everything runs against an in-process store — so
//! this is far smaller than the teacher's `NetworkConfig`, but it is
//! loaded the same way: defaults first, CLI flags override.

use anyhow::{Context, Result};
use cellar_ledger_core::model::TenantId;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub struct CellarConfig {
    /// Directory holding an optional `seed.json` dump of containers/states
    /// to preload into the in-memory store at startup.
    pub data_dir: PathBuf,
    /// Tenant new containers are created under when `--tenant` is not
    /// passed on the command line.
    pub tenant_id: TenantId,
}

impl CellarConfig {
    pub fn new(data_dir: Option<PathBuf>, tenant: Option<String>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        let tenant_id = match tenant {
            Some(raw) => {
                TenantId::from(uuid::Uuid::from_str(&raw).with_context(|| format!("invalid tenant id: {raw}"))?)
            }
            None => default_tenant_id(&data_dir)?,
        };

        Ok(Self { data_dir, tenant_id })
    }

    pub fn seed_file(&self) -> PathBuf {
        self.data_dir.join("seed.json")
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("CELLAR_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(".cellar"))
}

/// A stable per-data-dir tenant id, generated once and cached alongside
/// the seed file so repeated CLI invocations against the same directory
/// see the same tenant without the caller having to track a UUID by hand.
fn default_tenant_id(data_dir: &Path) -> Result<TenantId> {
    let marker = data_dir.join("tenant");
    if marker.exists() {
        let raw = std::fs::read_to_string(&marker).with_context(|| format!("failed to read {}", marker.display()))?;
        let id = uuid::Uuid::from_str(raw.trim())
            .with_context(|| format!("invalid tenant marker in {}", marker.display()))?;
        return Ok(TenantId::from(id));
    }

    let id = TenantId::new();
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&marker, id.0.to_string()).with_context(|| format!("failed to write {}", marker.display()))?;
    Ok(id)
}

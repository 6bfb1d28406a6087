// site.rs — Per-site configuration.
//
// SiteConfig says which site this checkout provisions and where its state
// lives. `for_root()` produces the standard `.zv/` layout; `load()` overlays
// whatever `.zv/site.toml` sets. Relative paths in the file are resolved
// against the site root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Directory under the site root holding config and state.
pub const SITE_DIR: &str = ".zv";
/// Config file name inside [`SITE_DIR`].
pub const SITE_CONFIG_FILE: &str = "site.toml";

/// Where a site's policy, state and provision log live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Root directory of the site checkout.
    pub root: PathBuf,

    /// Site name, matched against the blueprint sites map.
    pub site: Option<String>,

    /// Explicit blueprint slug; skips the sites map.
    pub blueprint: Option<String>,

    /// Directory holding `policy.yaml` and `<slug>/policy.yaml`.
    pub blueprints_dir: PathBuf,

    /// A single policy file that replaces the layered candidates.
    pub policy_path: Option<PathBuf>,

    /// Snapshot of the entity/grant/schema state the reconcilers run against.
    pub state_path: PathBuf,

    /// Append-only provision log.
    pub provision_log: PathBuf,
}

/// On-disk shape of `.zv/site.toml`; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SiteFile {
    site: Option<String>,
    blueprint: Option<String>,
    blueprints_dir: Option<PathBuf>,
    policy_path: Option<PathBuf>,
    state_path: Option<PathBuf>,
    provision_log: Option<PathBuf>,
}

impl SiteConfig {
    /// Create a config with the standard `.zv/` layout for a site root.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let zv_dir = root.join(SITE_DIR);
        Self {
            blueprints_dir: root.join("blueprints"),
            state_path: zv_dir.join("state.json"),
            provision_log: zv_dir.join("provision.jsonl"),
            site: None,
            blueprint: None,
            policy_path: None,
            root,
        }
    }

    /// Path of the config file for a site root.
    pub fn config_path(root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(SITE_DIR).join(SITE_CONFIG_FILE)
    }

    /// Load `.zv/site.toml` over the defaults. A missing file is not an error.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let root = root.as_ref();
        let path = Self::config_path(root);
        let mut config = Self::for_root(root);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
            Err(source) => return Err(PolicyError::Io { path, source }),
        };
        let file: SiteFile = toml::from_str(&content).map_err(|e| PolicyError::InvalidSiteConfig {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let resolve = |p: PathBuf| if p.is_absolute() { p } else { root.join(p) };
        config.site = file.site;
        config.blueprint = file.blueprint;
        config.policy_path = file.policy_path.map(resolve);
        if let Some(dir) = file.blueprints_dir {
            config.blueprints_dir = resolve(dir);
        }
        if let Some(state) = file.state_path {
            config.state_path = resolve(state);
        }
        if let Some(log) = file.provision_log {
            config.provision_log = resolve(log);
        }
        Ok(config)
    }

    /// Try to load config, returning the default layout if it can't be read.
    pub fn load_or_default(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::load(root).unwrap_or_else(|_| Self::for_root(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(root: &Path, content: &str) {
        std::fs::create_dir_all(root.join(SITE_DIR)).unwrap();
        std::fs::write(SiteConfig::config_path(root), content).unwrap();
    }

    #[test]
    fn for_root_uses_zv_layout() {
        let config = SiteConfig::for_root("/srv/acme");
        assert_eq!(config.blueprints_dir, PathBuf::from("/srv/acme/blueprints"));
        assert_eq!(config.state_path, PathBuf::from("/srv/acme/.zv/state.json"));
        assert_eq!(
            config.provision_log,
            PathBuf::from("/srv/acme/.zv/provision.jsonl")
        );
        assert!(config.site.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        assert_eq!(
            SiteConfig::load(dir.path()).unwrap(),
            SiteConfig::for_root(dir.path())
        );
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            "site = \"acme.example.com\"\npolicy_path = \"custom/policy.yaml\"\nstate_path = \"/var/zv/state.json\"\n",
        );
        let config = SiteConfig::load(dir.path()).unwrap();
        assert_eq!(config.site.as_deref(), Some("acme.example.com"));
        assert_eq!(
            config.policy_path,
            Some(dir.path().join("custom/policy.yaml"))
        );
        assert_eq!(config.state_path, PathBuf::from("/var/zv/state.json"));
        assert_eq!(config.blueprints_dir, dir.path().join("blueprints"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "sitename = \"typo\"\n");
        let err = SiteConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSiteConfig { .. }));
        // load_or_default swallows it.
        assert_eq!(
            SiteConfig::load_or_default(dir.path()),
            SiteConfig::for_root(dir.path())
        );
    }
}

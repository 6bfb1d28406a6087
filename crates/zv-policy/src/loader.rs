// loader.rs — Layered policy loading from a blueprints directory.
//
// A site's policy is assembled from up to three layers:
//
//   built-in defaults → blueprints/policy.yaml → blueprints/<slug>/policy.yaml
//
// Top-level keys of a later layer replace earlier ones, except `pqc_doctypes`
// and `sensitive_roles`, which merge per entity type. The slug comes from the
// site config or, failing that, from `blueprints/_sites.yaml`.
//
// Every layer is validated on its own (so errors name the offending file) and
// the merged result is validated again. Any invalid layer fails the load.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::document::{parse_mapping, PolicyDocument};
use crate::error::PolicyError;
use crate::site::SiteConfig;

/// File name of a policy layer.
pub const POLICY_FILE: &str = "policy.yaml";
/// File name of the site → blueprint map.
pub const SITES_FILE: &str = "_sites.yaml";

/// Keys whose entries merge per entity type instead of being replaced.
const MERGED_KEYS: [&str; 2] = ["pqc_doctypes", "sensitive_roles"];

/// A policy document plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedPolicy {
    pub document: PolicyDocument,
    /// Layer files that existed and were applied, in order.
    pub layers: Vec<PathBuf>,
    /// Blueprint slug that selected the client layer, if any.
    pub blueprint: Option<String>,
}

/// Assembles the policy for one site.
#[derive(Debug, Clone)]
pub struct PolicyLoader {
    blueprints_dir: PathBuf,
    site: Option<String>,
    blueprint: Option<String>,
    explicit_path: Option<PathBuf>,
}

impl PolicyLoader {
    pub fn new(blueprints_dir: impl Into<PathBuf>) -> Self {
        Self {
            blueprints_dir: blueprints_dir.into(),
            site: None,
            blueprint: None,
            explicit_path: None,
        }
    }

    /// A loader configured from a site config.
    pub fn for_site(config: &SiteConfig) -> Self {
        Self {
            blueprints_dir: config.blueprints_dir.clone(),
            site: config.site.clone(),
            blueprint: config.blueprint.clone(),
            explicit_path: config.policy_path.clone(),
        }
    }

    /// Site name used for the sites-map lookup.
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// Explicit blueprint slug; the sites map is not consulted.
    pub fn with_blueprint(mut self, slug: impl Into<String>) -> Self {
        self.blueprint = Some(slug.into());
        self
    }

    /// A single policy file that replaces the layered candidates.
    pub fn with_explicit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// The blueprint slug for this site: configured slug first, then the sites map.
    pub fn resolve_blueprint(&self) -> Result<Option<String>, PolicyError> {
        if let Some(slug) = &self.blueprint {
            return Ok(Some(slug.clone()));
        }
        match &self.site {
            Some(site) => slug_from_sites_map(&self.blueprints_dir.join(SITES_FILE), site),
            None => Ok(None),
        }
    }

    /// Layer files to apply over the built-in defaults, in order.
    pub fn candidates(&self) -> Result<Vec<PathBuf>, PolicyError> {
        if let Some(explicit) = &self.explicit_path {
            return Ok(vec![explicit.clone()]);
        }
        let mut candidates = vec![self.blueprints_dir.join(POLICY_FILE)];
        if let Some(slug) = self.resolve_blueprint()? {
            candidates.push(self.blueprints_dir.join(slug).join(POLICY_FILE));
        }
        Ok(candidates)
    }

    /// Load and merge all layers.
    pub fn load(&self) -> Result<LoadedPolicy, PolicyError> {
        let blueprint = if self.explicit_path.is_some() {
            None
        } else {
            self.resolve_blueprint()?
        };

        let mut merged = builtin_mapping()?;
        let mut layers = Vec::new();
        for path in self.candidates()? {
            let raw = match std::fs::read(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "policy layer not present, skipping");
                    continue;
                }
                Err(source) => return Err(PolicyError::Io { path, source }),
            };
            let origin = path.display().to_string();
            let layer = parse_mapping(&origin, &raw)?;
            // Validate the layer alone so the error names this file.
            PolicyDocument::from_value(&origin, Value::Mapping(layer.clone()))?;
            merge_layer(&mut merged, layer);
            tracing::info!(path = %origin, "applied policy layer");
            layers.push(path);
        }

        let document = PolicyDocument::from_value("merged policy", Value::Mapping(merged))?;
        Ok(LoadedPolicy {
            document,
            layers,
            blueprint,
        })
    }
}

fn builtin_mapping() -> Result<Mapping, PolicyError> {
    match serde_yaml::to_value(PolicyDocument::builtin()) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(_) => Err(PolicyError::malformed("<builtin>", "defaults are not a mapping")),
        Err(e) => Err(PolicyError::malformed("<builtin>", e)),
    }
}

/// Apply one layer over the merged mapping.
fn merge_layer(merged: &mut Mapping, layer: Mapping) {
    for (key, value) in layer {
        let per_entry = key.as_str().is_some_and(|k| MERGED_KEYS.contains(&k));
        match (per_entry, value) {
            (true, Value::Null) => {}
            (true, Value::Mapping(entries)) => match merged.get_mut(&key) {
                Some(Value::Mapping(existing)) => existing.extend(entries),
                _ => {
                    merged.insert(key, Value::Mapping(entries));
                }
            },
            (_, value) => {
                merged.insert(key, value);
            }
        }
    }
}

/// Look `site` up in a sites map file.
///
/// The file holds a `map` (or `sites`) mapping in one of two styles:
///
/// ```yaml
/// map:                       # direct: site → slug
///   acme.example.com: acme
/// ---
/// map:                       # patterns: slug → glob patterns
///   acme: ["acme.*", "*.acme.internal"]
/// ```
///
/// The style is decided by the first entry's value. In pattern style the
/// first slug (in file order) with a matching pattern wins.
fn slug_from_sites_map(path: &Path, site: &str) -> Result<Option<String>, PolicyError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PolicyError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let origin = path.display().to_string();
    let doc = parse_mapping(&origin, &raw)?;

    let map = match doc.get("map").filter(|v| !v.is_null()).or_else(|| doc.get("sites")) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Mapping(map)) => map,
        Some(_) => {
            return Err(PolicyError::malformed(
                &origin,
                "'map'/'sites' must be a mapping",
            ))
        }
    };

    let direct = matches!(map.iter().next(), Some((_, Value::String(_))));
    if direct {
        return Ok(map
            .get(site)
            .and_then(Value::as_str)
            .map(str::to_string));
    }

    for (slug, patterns) in map {
        let slug = slug
            .as_str()
            .ok_or_else(|| PolicyError::malformed(&origin, "blueprint slugs must be strings"))?;
        let patterns = match patterns {
            Value::Null => continue,
            Value::Sequence(patterns) => patterns,
            _ => {
                return Err(PolicyError::malformed(
                    &origin,
                    format!("patterns for '{slug}' must be a list"),
                ))
            }
        };
        for pattern in patterns {
            let pattern = pattern.as_str().ok_or_else(|| {
                PolicyError::malformed(&origin, format!("patterns for '{slug}' must be strings"))
            })?;
            let glob = glob::Pattern::new(pattern).map_err(|e| {
                PolicyError::malformed(&origin, format!("bad pattern '{pattern}': {e}"))
            })?;
            if glob.matches(site) {
                return Ok(Some(slug.to_string()));
            }
        }
    }
    Ok(None)
}

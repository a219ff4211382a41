//! Server configuration: the TOML settings file, the per-file reread
//! registry, and the algorithm catalogue descriptor.
//!
//! All three are read once at boot. Configuration problems are fatal there;
//! nothing in the request path touches these files again except the watched
//! file itself in reread-on-query mode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("missing required key '{0}' in settings")]
    MissingKey(&'static str),
    #[error("watched file does not exist: {0}")]
    WatchedFileMissing(PathBuf),
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Parsed contents of the settings file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub file_path: PathBuf,
    pub use_ssl: bool,
    pub ssl_certfile: Option<PathBuf>,
    pub ssl_keyfile: Option<PathBuf>,
    pub reread_on_query_config: PathBuf,
    pub metrics_json_path: PathBuf,
    pub algorithms_list: PathBuf,
}

/// Read the settings file. Keys may sit at the top level or inside any
/// `[section]`; sections are flattened and later values win, matching the
/// section-scoped key/value files this service has always been configured
/// with. Fails fast when the watched file does not exist.
pub fn read_config(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table = content.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut merged = toml::Table::new();
    for (key, value) in &table {
        match value {
            toml::Value::Table(section) => {
                for (k, v) in section {
                    merged.insert(k.clone(), v.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    let get_path = |key: &'static str| -> Result<PathBuf, ConfigError> {
        merged
            .get(key)
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingKey(key))
    };

    let file_path = get_path("linuxpath")?;
    if !file_path.exists() {
        return Err(ConfigError::WatchedFileMissing(file_path));
    }

    Ok(Settings {
        file_path,
        use_ssl: merged.get("use_ssl").and_then(|v| v.as_bool()).unwrap_or(false),
        ssl_certfile: merged.get("ssl_certfile").and_then(|v| v.as_str()).map(PathBuf::from),
        ssl_keyfile: merged.get("ssl_keyfile").and_then(|v| v.as_str()).map(PathBuf::from),
        reread_on_query_config: get_path("reread_on_query_config")?,
        metrics_json_path: get_path("metrics_json_path")?,
        algorithms_list: get_path("algorithms_list")?,
    })
}

// ---------------------------------------------------------------------------
// Per-file reread registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct RereadRegistry {
    #[serde(default)]
    files: BTreeMap<String, RegistryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryEntry {
    file_path: PathBuf,
    reread_on_query: bool,
}

/// Look up the watched file's reread flag in the registry, creating the
/// registry (or just this file's entry) with the default of `true` when
/// absent.
pub fn load_reread_on_query(registry_path: &Path, data_file_path: &Path) -> Result<bool, ConfigError> {
    let stem = file_stem(data_file_path);

    let mut registry: RereadRegistry = match fs::read_to_string(registry_path) {
        Ok(content) => serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: registry_path.to_path_buf(),
            message: e.to_string(),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RereadRegistry::default(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: registry_path.to_path_buf(),
                source,
            })
        }
    };

    if let Some(entry) = registry.files.get(&stem) {
        debug!(file = stem.as_str(), reread_on_query = entry.reread_on_query, "registry entry found");
        return Ok(entry.reread_on_query);
    }

    // First sighting of this file: record the default and persist it.
    registry.files.insert(
        stem,
        RegistryEntry {
            file_path: data_file_path.to_path_buf(),
            reread_on_query: true,
        },
    );
    let serialized = serde_json::to_string_pretty(&registry).map_err(|e| ConfigError::Parse {
        path: registry_path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(registry_path, serialized).map_err(|source| ConfigError::Io {
        path: registry_path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// File name without its extension, used as the registry key.
pub fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Catalogue descriptor
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CatalogueDescriptor {
    algorithms: Vec<String>,
}

/// Load the ordered algorithm names; the order defines the indices the
/// metrics sink buckets by.
pub fn load_algorithm_names(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptor: CatalogueDescriptor =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(descriptor.algorithms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_settings(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_section_scoped_settings() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("200k.txt");
        fs::write(&data, "x\n").unwrap();

        let body = format!(
            r#"
[server]
linuxpath = "{}"
use_ssl = false
reread_on_query_config = "registry.json"
metrics_json_path = "metrics.json"
algorithms_list = "algorithms.json"
"#,
            data.display()
        );
        let path = write_settings(dir.path(), &body);

        let settings = read_config(&path).unwrap();
        assert_eq!(settings.file_path, data);
        assert!(!settings.use_ssl);
        assert_eq!(settings.metrics_json_path, PathBuf::from("metrics.json"));
        assert!(settings.ssl_certfile.is_none());
    }

    #[test]
    fn later_section_wins_in_file_order_not_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.txt");
        fs::write(&data, "x\n").unwrap();

        // [zzz_base] sorts after [server] alphabetically but appears first
        // in the file; [server]'s overrides must win.
        let body = format!(
            r#"
[zzz_base]
linuxpath = "{}"
reread_on_query_config = "base-registry.json"
metrics_json_path = "base-metrics.json"
algorithms_list = "base-algorithms.json"

[server]
metrics_json_path = "server-metrics.json"
"#,
            data.display()
        );
        let path = write_settings(dir.path(), &body);

        let settings = read_config(&path).unwrap();
        assert_eq!(settings.metrics_json_path, PathBuf::from("server-metrics.json"));
        // Keys only the earlier section sets are still picked up.
        assert_eq!(settings.reread_on_query_config, PathBuf::from("base-registry.json"));
        assert_eq!(settings.algorithms_list, PathBuf::from("base-algorithms.json"));
    }

    #[test]
    fn top_level_keys_work_without_a_section() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.txt");
        fs::write(&data, "x\n").unwrap();

        let body = format!(
            r#"
linuxpath = "{}"
reread_on_query_config = "r.json"
metrics_json_path = "m.json"
algorithms_list = "a.json"
"#,
            data.display()
        );
        let path = write_settings(dir.path(), &body);
        assert!(read_config(&path).is_ok());
    }

    #[test]
    fn missing_watched_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"
linuxpath = "/does/not/exist.txt"
reread_on_query_config = "r.json"
metrics_json_path = "m.json"
algorithms_list = "a.json"
"#;
        let path = write_settings(dir.path(), body);
        assert!(matches!(read_config(&path), Err(ConfigError::WatchedFileMissing(_))));
    }

    #[test]
    fn missing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.txt");
        fs::write(&data, "x\n").unwrap();

        let body = format!("linuxpath = \"{}\"\n", data.display());
        let path = write_settings(dir.path(), &body);
        assert!(matches!(read_config(&path), Err(ConfigError::MissingKey(_))));
    }

    #[test]
    fn registry_is_created_with_default_entry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.json");
        let data = dir.path().join("200k.txt");

        let reread = load_reread_on_query(&registry, &data).unwrap();
        assert!(reread, "default must be reread_on_query = true");

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&registry).unwrap()).unwrap();
        assert_eq!(written["files"]["200k"]["reread_on_query"], true);
        assert_eq!(
            written["files"]["200k"]["file_path"],
            serde_json::Value::String(data.display().to_string())
        );
    }

    #[test]
    fn existing_registry_entry_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.json");
        fs::write(
            &registry,
            r#"{"files": {"200k": {"file_path": "/srv/200k.txt", "reread_on_query": false}}}"#,
        )
        .unwrap();

        let reread = load_reread_on_query(&registry, Path::new("/srv/200k.txt")).unwrap();
        assert!(!reread);
    }

    #[test]
    fn unknown_stem_is_appended_to_existing_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.json");
        fs::write(
            &registry,
            r#"{"files": {"other": {"file_path": "/srv/other.txt", "reread_on_query": false}}}"#,
        )
        .unwrap();

        let reread = load_reread_on_query(&registry, Path::new("/srv/fresh.txt")).unwrap();
        assert!(reread);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&registry).unwrap()).unwrap();
        assert_eq!(written["files"]["other"]["reread_on_query"], false);
        assert_eq!(written["files"]["fresh"]["reread_on_query"], true);
    }

    #[test]
    fn algorithm_names_keep_descriptor_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("algorithms.json");
        fs::write(&path, r#"{"algorithms": ["default", "binary", "linear"]}"#).unwrap();

        let names = load_algorithm_names(&path).unwrap();
        assert_eq!(names, ["default", "binary", "linear"]);
    }

    #[test]
    fn file_stem_strips_directory_and_extension() {
        assert_eq!(file_stem(Path::new("/srv/data/200k.txt")), "200k");
        assert_eq!(file_stem(Path::new("plain")), "plain");
    }
}

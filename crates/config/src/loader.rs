use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::McpboxConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["mcpbox.toml", "mcpbox.yaml", "mcpbox.yml", "mcpbox.json"];

/// Load config from the given path (any supported format), after env
/// substitution.
pub fn load_config(path: &Path) -> Result<McpboxConfig> {
    let raw = read_substituted(path)?;
    parse_config(&raw, path)
}

/// Load the config as an untyped JSON value (used by validation to detect
/// unknown keys).
pub fn load_config_value(path: &Path) -> Result<serde_json::Value> {
    let raw = read_substituted(path)?;
    parse_config_value(&raw, path)
}

fn read_substituted(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = raw.len(), "read config file");
    Ok(substitute_env(&raw))
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./mcpbox.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/mcpbox/mcpbox.{toml,yaml,yml,json}` (user-global)
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/mcpbox/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mcpbox").map(|d| d.config_dir().to_path_buf())
}

/// Resolve an explicit path, or discover one, and load it.
pub fn load_explicit_or_discovered(path: Option<&Path>) -> Result<(McpboxConfig, PathBuf)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => find_config_file().ok_or_else(|| Error::NotFound {
            searched: CONFIG_FILENAMES.join(", "),
        })?,
    };
    debug!(path = %path.display(), "loading config");
    let config = load_config(&path)?;
    Ok((config, path))
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

/// Parse already-substituted config text, choosing the format by extension.
pub fn parse_config(raw: &str, path: &Path) -> Result<McpboxConfig> {
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match extension(path) {
        "toml" => toml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        ext => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match extension(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(raw).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(v).map_err(|e| parse_err(e.to_string()))
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(v).map_err(|e| parse_err(e.to_string()))
        },
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        ext => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::schema::SandboxBackend, secrecy::ExposeSecret};

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpbox.toml");
        std::fs::write(
            &path,
            r#"
            [sandbox]
            backend = "host"

            [[backends]]
            name = "alpha"
            start_command = "npx -y alpha-mcp --port 3000"
            "#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.sandbox.backend, SandboxBackend::Host);
        assert_eq!(cfg.backends.len(), 1);
        assert_eq!(cfg.backends[0].name, "alpha");
    }

    #[test]
    fn loads_yaml_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpbox.yaml");
        std::fs::write(
            &path,
            "backends:\n  - name: beta\n    start_command: run-beta\n    env:\n      TOKEN: \"${MCPBOX_LOADER_UNSET_VAR:-fallback}\"\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.backends[0].env["TOKEN"].expose_secret(), "fallback");
        assert_eq!(cfg.orchestrator.connect_timeout_secs, 60);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_config(Path::new("/nonexistent/mcpbox.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn unsupported_extension_rejected() {
        let err = parse_config("", Path::new("mcpbox.ini")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ext) if ext == "ini"));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = parse_config("[[backends]\nname=", Path::new("mcpbox.toml")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn value_loader_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpbox.json");
        std::fs::write(&path, r#"{"backends":[],"extra":1}"#).unwrap();
        let value = load_config_value(&path).unwrap();
        assert_eq!(value["extra"], 1);
    }
}

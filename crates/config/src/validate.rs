//! Configuration validation.
//!
//! Catches the mistakes that would otherwise surface late, in the middle of
//! a sandbox run: misspelled keys (a misspelled `allowed_tools` silently
//! exposes every tool), duplicate backend names, unusable ports and paths,
//! and env placeholders that were never resolved.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use secrecy::ExposeSecret;

use crate::{env_subst::unresolved_placeholders, loader, schema::McpboxConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "backend", "env"
    pub category: &'static str,
    /// Dotted path, e.g. "backends[1].port"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

const TOP_LEVEL_KEYS: &[&str] = &["sandbox", "orchestrator", "backends"];
const SANDBOX_KEYS: &[&str] = &["backend", "name", "image", "keepalive_command"];
const ORCHESTRATOR_KEYS: &[&str] = &[
    "network_ready_delay_secs",
    "command_timeout_secs",
    "start_timeout_secs",
    "connect_timeout_secs",
    "disconnect_timeout_secs",
    "collision_policy",
];
const BACKEND_KEYS: &[&str] = &[
    "name",
    "start_command",
    "server_start_cmd",
    "env",
    "server_env",
    "provision",
    "pre_install_cmds",
    "port",
    "mcp_port",
    "path",
    "mcp_path",
    "headers",
    "allowed_tools",
];

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest known key within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

fn check_keys(
    value: &serde_json::Value,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(map) = value.as_object() else {
        return;
    };
    for key in map.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let message = match suggest(key, known, 3) {
            Some(s) => format!("unknown field '{key}' (did you mean '{s}'?)"),
            None => format!("unknown field '{key}'"),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "unknown-field",
            path,
            message,
        ));
    }
}

/// Report keys the schema does not know about.
pub fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    check_keys(value, TOP_LEVEL_KEYS, "", diagnostics);
    if let Some(sandbox) = value.get("sandbox") {
        check_keys(sandbox, SANDBOX_KEYS, "sandbox", diagnostics);
    }
    if let Some(orchestrator) = value.get("orchestrator") {
        check_keys(orchestrator, ORCHESTRATOR_KEYS, "orchestrator", diagnostics);
    }
    if let Some(backends) = value.get("backends").and_then(|v| v.as_array()) {
        for (i, backend) in backends.iter().enumerate() {
            check_keys(backend, BACKEND_KEYS, &format!("backends[{i}]"), diagnostics);
        }
    }
}

/// Semantic checks on a parsed config.
pub fn validate_config(config: &McpboxConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.backends.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "backend",
            "backends",
            "no backends configured; at least one [[backends]] entry is required",
        ));
    }

    let mut names = HashSet::new();
    let mut ports: HashMap<u16, &str> = HashMap::new();

    for (i, backend) in config.backends.iter().enumerate() {
        let at = |field: &str| format!("backends[{i}].{field}");

        if backend.name.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "backend",
                at("name"),
                "backend name is empty",
            ));
        } else if !names.insert(backend.name.as_str()) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "backend",
                at("name"),
                format!("duplicate backend name '{}'", backend.name),
            ));
        }

        if backend.start_command.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "backend",
                at("start_command"),
                format!("backend '{}' has no start command", backend.name),
            ));
        }

        let port = backend.effective_port(i);
        if port == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "backend",
                at("port"),
                "port 0 cannot be exposed",
            ));
        } else if let Some(other) = ports.insert(port, backend.name.as_str()) {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "backend",
                at("port"),
                format!(
                    "backend '{}' shares port {port} with '{other}'; both cannot listen at once",
                    backend.name
                ),
            ));
        }

        if !backend.path.starts_with('/') {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "backend",
                at("path"),
                format!("path '{}' must start with '/'", backend.path),
            ));
        }

        if let Some(allowed) = &backend.allowed_tools {
            if allowed.is_empty() {
                diagnostics.push(Diagnostic::new(
                    Severity::Warning,
                    "backend",
                    at("allowed_tools"),
                    format!(
                        "backend '{}' has an empty allow-list and will contribute no tools",
                        backend.name
                    ),
                ));
            }
            if allowed.iter().any(|t| t.trim().is_empty()) {
                diagnostics.push(Diagnostic::new(
                    Severity::Warning,
                    "backend",
                    at("allowed_tools"),
                    "allow-list contains an empty tool name",
                ));
            }
        }

        let mut env_keys: Vec<&String> = backend.env.keys().collect();
        env_keys.sort();
        for key in env_keys {
            let unresolved = unresolved_placeholders(backend.env[key].expose_secret());
            if !unresolved.is_empty() {
                diagnostics.push(Diagnostic::new(
                    Severity::Warning,
                    "env",
                    format!("backends[{i}].env.{key}"),
                    format!("unresolved environment variable(s): {}", unresolved.join(", ")),
                ));
            }
        }
    }

    if config.orchestrator.connect_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "backend",
            "orchestrator.connect_timeout_secs",
            "connect timeout of 0 waits on unresponsive backends forever",
        ));
    }

    diagnostics
}

/// Validate a config file at `path`, or the discovered default location.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(loader::find_config_file);

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "file-ref",
                "",
                "no config file found",
            )],
            config_path: None,
        };
    };

    let mut result = ValidationResult {
        diagnostics: Vec::new(),
        config_path: Some(actual_path.clone()),
    };

    match loader::load_config_value(&actual_path) {
        Ok(value) => check_unknown_fields(&value, &mut result.diagnostics),
        Err(e) => {
            result
                .diagnostics
                .push(Diagnostic::new(Severity::Error, "syntax", "", e.to_string()));
            return result;
        },
    }

    match loader::load_config(&actual_path) {
        Ok(config) => result.diagnostics.extend(validate_config(&config)),
        Err(e) => result
            .diagnostics
            .push(Diagnostic::new(Severity::Error, "syntax", "", e.to_string())),
    }

    result.diagnostics.sort_by_key(|d| d.severity);
    result
}

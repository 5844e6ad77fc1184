use std::path::Path;

use {
    anyhow::Result,
    mcpbox_config::{Diagnostic, Severity, ValidationResult, validate},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// `mcpbox validate`: print diagnostics, exit 1 when any is an error.
pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    }

    let shown = print_diagnostics(&result.diagnostics, verbose);
    if shown > 0 {
        eprintln!();
    }
    eprintln!("{}", summary(&result));

    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print diagnostics to stderr, skipping info unless `verbose`. Returns how
/// many were printed.
pub fn print_diagnostics(diagnostics: &[Diagnostic], verbose: bool) -> usize {
    let mut shown = 0;
    for d in diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        eprintln!("  {}", render(d));
        shown += 1;
    }
    shown
}

fn render(d: &Diagnostic) -> String {
    let (color, label) = match d.severity {
        Severity::Error => (RED, "error"),
        Severity::Warning => (YELLOW, "warning"),
        Severity::Info => (CYAN, "info"),
    };
    if d.path.is_empty() {
        format!("{BOLD}{color}{label}{RESET} {}", d.message)
    } else {
        format!("{BOLD}{color}{label}{RESET} {}: {}", d.path, d.message)
    }
}

fn summary(result: &ValidationResult) -> String {
    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        "No issues found.".into()
    } else {
        format!("{errors} error(s), {warnings} warning(s)")
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    fn validate_text(text: &str) -> ValidationResult {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
        validate(Some(file.path()))
    }

    #[test]
    fn clean_config_has_no_issues() {
        let result = validate_text(
            r#"
[[backends]]
name = "records"
start_command = "node server.js"
"#,
        );
        assert_eq!(summary(&result), "No issues found.");
    }

    #[test]
    fn empty_backend_list_is_counted_as_error() {
        let result = validate_text("backends = []\n");
        assert!(result.has_errors());
        assert!(summary(&result).starts_with("1 error(s)"));
    }

    #[test]
    fn render_includes_path_when_present() {
        let d = Diagnostic {
            severity: Severity::Warning,
            category: "backend",
            path: "backends[0].port".into(),
            message: "duplicate port".into(),
        };
        let line = render(&d);
        assert!(line.contains("warning"));
        assert!(line.ends_with("backends[0].port: duplicate port"));
    }
}

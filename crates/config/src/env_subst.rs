/// Replace `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders in config text.
///
/// Unresolvable variables without a default are left as-is so validation can
/// point at them.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with a custom lookup, so tests do not have to
/// mutate the process environment.
fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated, emit the remainder literally.
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), default) {
            (false, Some(value), _) if !value.is_empty() || default.is_none() => {
                result.push_str(&value);
            },
            (false, _, Some(default)) => result.push_str(default),
            _ => {
                result.push_str("${");
                result.push_str(body);
                result.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

/// Names of `${...}` placeholders still present in `input`.
pub fn unresolved_placeholders(input: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = after[..end].split(":-").next().unwrap_or_default();
        if !name.is_empty() {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "MCPBOX_TEST_KEY" => Some("secret-123".to_string()),
            "MCPBOX_EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("key = \"${MCPBOX_TEST_KEY}\"", lookup),
            "key = \"secret-123\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${MCPBOX_NONEXISTENT_XYZ}", lookup),
            "${MCPBOX_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn default_used_when_unset_or_empty() {
        assert_eq!(substitute_env_with("${MISSING:-3000}", lookup), "3000");
        assert_eq!(substitute_env_with("${MCPBOX_EMPTY:-fallback}", lookup), "fallback");
        assert_eq!(substitute_env_with("${MCPBOX_TEST_KEY:-x}", lookup), "secret-123");
    }

    #[test]
    fn empty_value_without_default_is_kept_empty() {
        assert_eq!(substitute_env_with("a${MCPBOX_EMPTY}b", lookup), "ab");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env_with("x ${OPEN", lookup), "x ${OPEN");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }

    #[test]
    fn lists_unresolved_placeholders() {
        assert_eq!(
            unresolved_placeholders("${A} and ${B:-x} and $C"),
            vec!["A".to_string(), "B".to_string()]
        );
    }
}

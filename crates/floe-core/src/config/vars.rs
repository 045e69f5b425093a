//! `${VAR}` style environment substitution for YAML config files.
//!
//! - `$VAR` / `${VAR}`: value of VAR, an error when unset
//! - `${VAR:-default}`: default when VAR is unset or empty
//! - `${VAR-default}`: default only when VAR is unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static VAR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{ ([A-Za-z_][A-Za-z0-9_]*) (?: (:?-) ([^}]*) )? \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("variable reference pattern is valid")
});

/// Text after substitution plus every unresolved reference.
#[derive(Debug)]
pub struct InterpolationResult {
    pub text: String,
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Substitute environment references in `input`.
///
/// Errors are collected rather than returned early so a config with several
/// missing variables reports all of them at once.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = VAR_REFERENCE
        .replace_all(input, |caps: &Captures| resolve(caps, &mut errors))
        .into_owned();

    InterpolationResult { text, errors }
}

fn resolve(caps: &Captures, errors: &mut Vec<String>) -> String {
    let whole = &caps[0];
    if whole == "$$" {
        return "$".to_string();
    }

    let Some(name) = caps.get(1).or_else(|| caps.get(4)).map(|m| m.as_str()) else {
        return whole.to_string();
    };
    let empty_uses_default = caps.get(2).is_some_and(|m| m.as_str() == ":-");
    let default = caps.get(3).map(|m| m.as_str());

    match (env::var(name), default) {
        (Ok(value), _) if value.contains(['\n', '\r']) => {
            errors.push(format!(
                "environment variable '{name}' contains newlines, which is not allowed"
            ));
            whole.to_string()
        }
        (Ok(value), Some(default)) if value.is_empty() && empty_uses_default => default.to_string(),
        (Ok(value), _) => value,
        (Err(_), Some(default)) => default.to_string(),
        (Err(_), None) => {
            errors.push(format!("environment variable '{name}' is not set"));
            whole.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_var<R>(key: &str, value: Option<&str>, f: impl FnOnce() -> R) -> R {
        let original = env::var(key).ok();
        // SAFETY: every test uses its own variable name
        unsafe {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        let result = f();
        // SAFETY: restoring the value captured above
        unsafe {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        result
    }

    #[test]
    fn test_plain_and_braced_references() {
        with_var("FLOE_TEST_DATASET", Some("logs"), || {
            let result = interpolate("a: $FLOE_TEST_DATASET\nb: ${FLOE_TEST_DATASET}_raw");
            assert!(result.is_ok());
            assert_eq!(result.text, "a: logs\nb: logs_raw");
        });
    }

    #[test]
    fn test_unset_variable_is_reported() {
        with_var("FLOE_TEST_UNSET", None, || {
            let result = interpolate("bucket: ${FLOE_TEST_UNSET}");
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains("FLOE_TEST_UNSET"));
        });
    }

    #[test]
    fn test_defaults() {
        with_var("FLOE_TEST_EMPTY", Some(""), || {
            assert_eq!(interpolate("${FLOE_TEST_EMPTY:-x}").text, "x");
            assert_eq!(interpolate("${FLOE_TEST_EMPTY-x}").text, "");
        });
        with_var("FLOE_TEST_ABSENT", None, || {
            assert_eq!(interpolate("${FLOE_TEST_ABSENT-x}").text, "x");
        });
    }

    #[test]
    fn test_newline_injection_rejected() {
        with_var("FLOE_TEST_NEWLINE", Some("a\nb"), || {
            assert!(!interpolate("$FLOE_TEST_NEWLINE").is_ok());
        });
    }

    #[test]
    fn test_escaped_dollar() {
        assert_eq!(interpolate("cost: $$5").text, "cost: $5");
    }
}

/// Get environment variable with OSIKATU_ prefix, falling back to unprefixed version
///
/// Checks `OSIKATU_{key}` first, then `{key}`, so platform-provided variables
/// such as `PORT` keep working.
///
/// # Examples
///
/// ```rust
/// use osikatu::utils::get_env_with_prefix;
///
/// // Checks OSIKATU_PORT first, then PORT
/// let port = get_env_with_prefix("PORT");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("OSIKATU_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a comma separated environment value into trimmed, non-empty parts.
pub fn get_env_list(key: &str) -> Option<Vec<String>> {
    get_env_with_prefix(key).map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Parse an environment value, ignoring values that fail to parse.
pub fn get_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_with_prefix(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("OSIKATU_ENV_TEST_VAR", "prefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_VAR"), Some("prefixed_value".to_string()));
        unsafe {
            std::env::remove_var("OSIKATU_ENV_TEST_VAR");
        }

        unsafe {
            std::env::set_var("ENV_FALLBACK_VAR", "unprefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_FALLBACK_VAR"), Some("unprefixed_value".to_string()));
        unsafe {
            std::env::remove_var("ENV_FALLBACK_VAR");
        }

        assert_eq!(get_env_with_prefix("ENV_NON_EXISTENT_VAR"), None);
    }

    #[test]
    fn test_get_env_list_and_parsed() {
        unsafe {
            std::env::set_var("OSIKATU_ENV_LIST_VAR", " a, b ,,c ");
            std::env::set_var("OSIKATU_ENV_NUM_VAR", " 42 ");
            std::env::set_var("OSIKATU_ENV_BAD_NUM_VAR", "abc");
        }
        assert_eq!(
            get_env_list("ENV_LIST_VAR"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(get_env_parsed::<u32>("ENV_NUM_VAR"), Some(42));
        assert_eq!(get_env_parsed::<u32>("ENV_BAD_NUM_VAR"), None);
        unsafe {
            std::env::remove_var("OSIKATU_ENV_LIST_VAR");
            std::env::remove_var("OSIKATU_ENV_NUM_VAR");
            std::env::remove_var("OSIKATU_ENV_BAD_NUM_VAR");
        }
    }
}

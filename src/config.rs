use serde::Deserialize;

/// Language-wide knobs shared by every expression a [`crate::SimpleLanguage`] compiles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SimpleOptions {
    /// Cache compiled expressions, predicates and leaf functions by their source text.
    pub cache_enabled: bool,
    /// Maximum nesting of `${}` blocks, including blocks re-parsed during evaluation.
    pub max_nesting_depth: usize,
    /// Honour backslash escapes such as `\n` or `\}` in expression text.
    pub allow_escape: bool,
    /// IANA timezone used by `date:` when no zone is given. UTC when unset.
    pub default_timezone: Option<String>,
}

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

impl Default for SimpleOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            allow_escape: true,
            default_timezone: None,
        }
    }
}

impl SimpleOptions {
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_default_timezone(mut self, tz: impl Into<String>) -> Self {
        self.default_timezone = Some(tz.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let opts: SimpleOptions = serde_json::from_str(r#"{"cache_enabled": false}"#).unwrap();
        assert!(!opts.cache_enabled);
        assert!(opts.allow_escape);
        assert_eq!(opts.max_nesting_depth, DEFAULT_MAX_NESTING_DEPTH);
    }
}

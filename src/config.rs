use std::path::PathBuf;

pub const STDLIB_ENV: &str = "CORVID_STDLIB";
pub const MAX_CALL_DEPTH_ENV: &str = "CORVID_MAX_CALL_DEPTH";

/// Interpreter options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Root directory of `import a.b;` style imports.
    pub stdlib_root: PathBuf,
    /// Deepest allowed nesting of user function calls.
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { stdlib_root: PathBuf::from("stdlib"), max_call_depth: 128 }
    }
}

impl Config {
    /// Defaults overridden by `CORVID_STDLIB` and `CORVID_MAX_CALL_DEPTH`. Unparsable values are
    /// ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var(STDLIB_ENV) {
            config.stdlib_root = PathBuf::from(root);
        }
        if let Ok(depth) = std::env::var(MAX_CALL_DEPTH_ENV) {
            match depth.parse() {
                Ok(depth) => config.max_call_depth = depth,
                Err(e) => tracing::warn!("ignoring {MAX_CALL_DEPTH_ENV}={depth:?}: {e}"),
            }
        }

        config
    }

    pub fn with_stdlib_root(self, stdlib_root: impl Into<PathBuf>) -> Self {
        Self { stdlib_root: stdlib_root.into(), ..self }
    }

    pub fn with_max_call_depth(self, max_call_depth: usize) -> Self {
        Self { max_call_depth, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = Config::default().with_stdlib_root("/opt/corvid").with_max_call_depth(8);
        assert_eq!(config.stdlib_root, PathBuf::from("/opt/corvid"));
        assert_eq!(config.max_call_depth, 8);
    }
}

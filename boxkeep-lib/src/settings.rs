use std::path::PathBuf;

pub const HELPER_IMAGE_VAR: &str = "BOXKEEP_HELPER_IMAGE";
pub const OUTPUT_DIR_VAR: &str = "BOXKEEP_OUTPUT_DIR";

pub const DEFAULT_HELPER_IMAGE: &str = "alpine:latest";

/// Runtime settings, read from the environment and overridable per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Image used by the helper workloads that archive and extract volumes.
    pub helper_image: String,
    /// Directory new snapshots are created in.
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            helper_image: DEFAULT_HELPER_IMAGE.to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        Self {
            helper_image: read(HELPER_IMAGE_VAR).unwrap_or(defaults.helper_image),
            output_dir: read(OUTPUT_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }

    pub fn with_helper_image(mut self, image: Option<String>) -> Self {
        if let Some(image) = image {
            self.helper_image = image;
        }
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.output_dir = dir;
        }
        self
    }
}

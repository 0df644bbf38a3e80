use crate::server::config::RuntimeConfig;

/// What route factories need to know about where and as what they are
/// mounted. Rebuilt on every reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    /// Normalized mount point: empty for the root, otherwise `/segment...`
    /// without a trailing slash.
    pub base_path: String,
    pub service_name: String,
    pub service_version: String,
    pub run_mode: String,
}

impl ViewConfig {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            base_path: normalize_base_path(&config.webapp.base_path),
            service_name: config.project.name.clone(),
            service_version: config.project.version.clone(),
            run_mode: config.run_mode.clone(),
        }
    }

    /// `true` when application routes are mounted at the root.
    pub fn is_root(&self) -> bool {
        self.base_path.is_empty()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_paths_are_normalized() {
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("api/"), "/api");
        assert_eq!(normalize_base_path(" /api/v1/ "), "/api/v1");
    }
}

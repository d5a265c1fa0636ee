/// Environment variable holding the `env_logger` filter.
pub const LOG_ENV: &str = "RETRO_SCRIPT_LOG";
/// Environment variable that can switch off debugger negotiation.
pub const DEBUGGER_ENV: &str = "RETRO_SCRIPT_DEBUGGER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimConfig {
    pub log_level: String,
    pub debugger: bool,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            debugger: true,
        }
    }
}

impl ShimConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(LOG_ENV)
            && !level.trim().is_empty()
        {
            config.log_level = level.trim().to_string();
        }

        if let Some(flag) = lookup(DEBUGGER_ENV) {
            config.debugger = !matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = ShimConfig::from_lookup(|_| None);
        assert_eq!(config, ShimConfig::default());
        assert!(config.debugger);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn reads_overrides() {
        let config = ShimConfig::from_lookup(|key| match key {
            LOG_ENV => Some("debug".into()),
            DEBUGGER_ENV => Some("Off".into()),
            _ => None,
        });
        assert_eq!(config.log_level, "debug");
        assert!(!config.debugger);
    }

    #[test]
    fn blank_log_level_keeps_default() {
        let config = ShimConfig::from_lookup(|key| (key == LOG_ENV).then(|| "  ".into()));
        assert_eq!(config.log_level, "warn");
    }
}

//! Logger setup shared by the CLI and embedding hosts.
//!
//! Filters use `env_logger` syntax. The filter in effect is chosen in this
//! order: an explicit filter, a verbosity level above zero, `RUST_LOG`, and
//! finally [`DEFAULT_FILTER`].

/// Filter used when nothing else is configured: warnings from dependencies,
/// lifecycle messages (load, resize, unload) from this crate.
pub const DEFAULT_FILTER: &str = "warn,prism_engine_core=info";

/// Logger configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingConfig {
    /// Explicit filter, e.g. `"debug"` or `"prism_engine_core=trace"`.
    pub filter: Option<String>,
    /// 0 keeps the default, 1 adds per-resource `debug` records, 2 and above
    /// adds per-call `trace` records.
    pub verbosity: u8,
    pub write_style: WriteStyle,
}

/// Whether to colour output. Mirrors `env_logger::WriteStyle` so callers do
/// not need the dependency.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum WriteStyle {
    #[default]
    Auto,
    Always,
    Never,
}

impl From<WriteStyle> for env_logger::WriteStyle {
    fn from(style: WriteStyle) -> Self {
        match style {
            WriteStyle::Auto => env_logger::WriteStyle::Auto,
            WriteStyle::Always => env_logger::WriteStyle::Always,
            WriteStyle::Never => env_logger::WriteStyle::Never,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::default()
        }
    }

    pub fn with_verbosity(verbosity: u8) -> Self {
        Self {
            verbosity,
            ..Self::default()
        }
    }

    /// The filter string to install, given the value of `RUST_LOG`.
    pub fn resolve_filter(&self, rust_log: Option<&str>) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        match self.verbosity {
            0 => rust_log
                .filter(|f| !f.trim().is_empty())
                .unwrap_or(DEFAULT_FILTER)
                .to_string(),
            1 => "warn,prism_engine_core=debug,prism_engine_cli=debug".to_string(),
            _ => "info,prism_engine_core=trace,prism_engine_cli=trace".to_string(),
        }
    }
}

/// Installs the global logger. Returns `false` when a logger was already
/// installed, by an earlier call or by an embedding host; the existing one is
/// kept.
pub fn init_logging(config: LoggingConfig) -> bool {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = config.resolve_filter(rust_log.as_deref());

    let installed = env_logger::Builder::new()
        .parse_filters(&filter)
        .write_style(config.write_style.into())
        .try_init()
        .is_ok();
    if installed {
        log::debug!("logging initialized with filter '{filter}'");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins_over_everything() {
        let config = LoggingConfig {
            filter: Some("error".into()),
            verbosity: 2,
            ..LoggingConfig::default()
        };
        assert_eq!(config.resolve_filter(Some("trace")), "error");
        assert_eq!(LoggingConfig::with_filter("off").resolve_filter(None), "off");
    }

    #[test]
    fn verbosity_overrides_rust_log() {
        let debug = LoggingConfig::with_verbosity(1).resolve_filter(Some("error"));
        assert!(debug.contains("prism_engine_core=debug"), "got {debug}");
        let trace = LoggingConfig::with_verbosity(5).resolve_filter(None);
        assert!(trace.contains("prism_engine_core=trace"), "got {trace}");
    }

    #[test]
    fn rust_log_then_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.resolve_filter(Some("info")), "info");
        assert_eq!(config.resolve_filter(Some("  ")), DEFAULT_FILTER);
        assert_eq!(config.resolve_filter(None), DEFAULT_FILTER);
    }

    #[test]
    fn second_init_keeps_the_first_logger() {
        init_logging(LoggingConfig::with_filter("warn"));
        assert!(!init_logging(LoggingConfig::with_verbosity(2)));
        log::warn!("still logging after second init");
    }
}

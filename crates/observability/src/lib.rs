//! Process-wide tracing/logging setup.

/// Initialize process-wide logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init(logging::LogFormat::from_env());
}

/// Logging configuration (filters, output format).
pub mod logging {
    use tracing_subscriber::EnvFilter;

    /// Output format, chosen by `SUPPLYSIGHT_LOG_FORMAT` (`json` or `pretty`).
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub enum LogFormat {
        #[default]
        Json,
        Pretty,
    }

    impl LogFormat {
        pub fn parse(s: &str) -> Option<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "json" => Some(Self::Json),
                "pretty" | "text" => Some(Self::Pretty),
                _ => None,
            }
        }

        /// Unset or unknown values fall back to JSON.
        pub fn from_env() -> Self {
            std::env::var("SUPPLYSIGHT_LOG_FORMAT")
                .ok()
                .and_then(|v| Self::parse(&v))
                .unwrap_or_default()
        }
    }

    /// Filter from `RUST_LOG`, defaulting to `info`.
    pub fn filter() -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Safe to call multiple times (subsequent calls are no-ops).
    pub fn init(format: LogFormat) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_timer(tracing_subscriber::fmt::time::SystemTime);

        let _ = match format {
            LogFormat::Json => builder.json().with_target(false).try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
    }

}

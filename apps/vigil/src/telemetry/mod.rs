use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

fn env_truthy(var: &str) -> Option<bool> {
    std::env::var(var).map(|v| v != "0" && !v.is_empty()).ok()
}

static COUNTERS_ENABLED: Lazy<bool> =
    Lazy::new(|| env_truthy("VIGIL_TELEMETRY").unwrap_or(false));

static COUNTERS: Lazy<Mutex<HashMap<&'static str, u64>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn enabled() -> bool {
    *COUNTERS_ENABLED
}

/// Bump a named event counter. Counter labels used by the sync subsystem:
/// `sync.frames`, `sync.decode_failures`, `sync.coalesced`,
/// `sync.batch_flushes`, `sync.reconnect_attempts`, `sync.poll_suppressed`,
/// `sync.pings`.
pub fn incr(label: &'static str) {
    if !enabled() {
        return;
    }
    let mut counters = COUNTERS.lock().unwrap();
    let entry = counters.entry(label).or_insert(0);
    *entry += 1;
    if *entry % 100 == 0 {
        eprintln!("[telemetry] {label}: count={entry}");
    }
}

pub fn counter(label: &'static str) -> u64 {
    COUNTERS
        .lock()
        .unwrap()
        .get(label)
        .copied()
        .unwrap_or_default()
}

pub mod logging {
    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn as_str(self) -> &'static str {
            match self {
                LogLevel::Error => "error",
                LogLevel::Warn => "warn",
                LogLevel::Info => "info",
                LogLevel::Debug => "debug",
                LogLevel::Trace => "trace",
            }
        }

        pub fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static INIT: OnceLock<()> = OnceLock::new();
    static GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if INIT.get().is_some() {
            return Ok(());
        }

        inner_init(config)?;
        INIT.set(()).ok();
        Ok(())
    }

    fn inner_init(config: &LogConfig) -> Result<(), InitError> {
        let env_filter = build_env_filter(config.level.to_filter());

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_level(true)
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;

        let _ = GUARD.set(Some(guard));
        Ok(())
    }

    fn build_env_filter(level: LevelFilter) -> EnvFilter {
        if let Ok(filter) = std::env::var("VIGIL_LOG_FILTER") {
            return EnvFilter::new(filter);
        }
        EnvFilter::new(default_filter_for(level))
    }

    // Keep dependency chatter out of debug/trace runs unless VIGIL_LOG_FILTER
    // asks for it explicitly.
    const NOISY_DEP_TARGETS: &[&str] = &["hyper", "reqwest", "tungstenite", "tokio_tungstenite"];

    fn default_filter_for(level: LevelFilter) -> String {
        let base = match level {
            LevelFilter::TRACE => "info,vigil_client_core=trace,vigil=trace",
            LevelFilter::DEBUG => "info,vigil_client_core=debug,vigil=debug",
            LevelFilter::INFO => "info",
            LevelFilter::WARN => "warn",
            LevelFilter::ERROR => "error",
            LevelFilter::OFF => "off",
        };
        let mut filter = base.to_owned();
        if level >= LevelFilter::DEBUG {
            for target in NOISY_DEP_TARGETS {
                filter.push(',');
                filter.push_str(target);
                filter.push_str("=info");
            }
        }
        filter
    }
}

use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Target used for boot lifecycle events; add a logging section with this key to
/// route events into their own file.
pub const EVENT_TARGET: &str = "rkboot::event";

const DEFAULT_SECTION: &str = "default";

// Dropping the guard drains the non-blocking console writer.
static CONSOLE_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(None);

// File sinks installed by `init_logging_unified`, kept for `flush_all`.
static FILE_SINKS: OnceLock<FileRouter> = OnceLock::new();

/// `None` means the sink is switched off for that section.
fn level_of(s: &str) -> Option<LevelFilter> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => None,
        _ => Some(LevelFilter::INFO),
    }
}

/// `target` is `prefix` itself or a module below it.
fn under_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/* ----------------------------- file sinks ----------------------------- */

/// One size-rotated log file, shared by every record routed to it.
#[derive(Clone)]
struct FileSink(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl FileSink {
    fn open(path: &Path, section: &Section) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let limit = match section.max_backups {
            Some(n) => FileLimit::MaxFiles(n),
            None => FileLimit::Age(chrono::Duration::days(section.max_age_days.unwrap_or(1) as i64)),
        };
        let max_bytes = section.max_size_mb.unwrap_or(100) as usize * 1024 * 1024;
        let rotate = FileRotate::new(
            path,
            AppendTimestamp::default(limit),
            ContentLimit::BytesSurpassed(max_bytes),
            Compression::None,
            None,
        );
        Ok(Self(Arc::new(Mutex::new(rotate))))
    }

    // a writer that panicked mid-record must not silence the crash report
    fn lock(&self) -> MutexGuard<'_, FileRotate<AppendTimestamp>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writer handed to the fmt layer; drops the record when no sink matched.
struct SinkWriter(Option<FileSink>);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(sink) => sink.lock().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(sink) => sink.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Picks the file for a record: the longest matching target prefix, else `default`.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<FileSink>,
    // longest prefix first
    by_target: Vec<(String, FileSink)>,
}

impl FileRouter {
    fn build(cfg: &LoggingConfig, base_dir: &Path) -> Self {
        let mut router = FileRouter::default();
        for (key, section) in cfg {
            if section.file.trim().is_empty() {
                continue;
            }
            let path = base_dir.join(&section.file);
            match FileSink::open(&path, section) {
                Ok(sink) if key == DEFAULT_SECTION => router.default = Some(sink),
                Ok(sink) => router.by_target.push((key.clone(), sink)),
                Err(e) => eprintln!("Failed to open log file {} for '{key}': {e}", path.display()),
            }
        }
        router.by_target.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        router
    }

    fn sink_for(&self, target: &str) -> Option<FileSink> {
        self.by_target
            .iter()
            .find(|(prefix, _)| under_prefix(target, prefix))
            .map(|(_, sink)| sink)
            .or(self.default.as_ref())
            .cloned()
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_target.is_empty()
    }

    fn flush(&self) {
        for sink in self.default.iter().chain(self.by_target.iter().map(|(_, s)| s)) {
            if let Err(e) = sink.lock().flush() {
                eprintln!("Failed to flush log file: {e}");
            }
        }
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        SinkWriter(self.sink_for(meta.target()))
    }
}

/* ------------------------------ filters ------------------------------- */

fn console_targets(cfg: &LoggingConfig) -> Targets {
    let default = cfg
        .get(DEFAULT_SECTION)
        .and_then(|s| level_of(&s.console_level))
        .unwrap_or(LevelFilter::INFO);

    cfg.iter()
        .filter(|(key, _)| key.as_str() != DEFAULT_SECTION)
        .fold(Targets::new().with_default(default), |targets, (key, s)| {
            targets.with_target(key.clone(), level_of(&s.console_level).unwrap_or(LevelFilter::OFF))
        })
}

fn file_targets(cfg: &LoggingConfig, router: &FileRouter) -> Targets {
    let default = cfg
        .get(DEFAULT_SECTION)
        .and_then(|s| level_of(&s.file_level))
        .filter(|_| router.default.is_some())
        .unwrap_or(LevelFilter::OFF);

    cfg.iter()
        .filter(|(key, s)| key.as_str() != DEFAULT_SECTION && !s.file.trim().is_empty())
        .fold(Targets::new().with_default(default), |targets, (key, s)| {
            targets.with_target(key.clone(), level_of(&s.file_level).unwrap_or(LevelFilter::OFF))
        })
}

/* ----------------------------- public API ----------------------------- */

/// Install the global subscriber: console (stderr) plus JSON files routed by target.
///
/// Relative file paths are resolved against `base_dir`, normally the boot file's directory.
/// `RUST_LOG`, when set, caps both sinks.
pub fn init_logging_unified(cfg: &LoggingConfig, base_dir: &Path) {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let env = EnvFilter::try_from_default_env().ok();

    let (stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    *CONSOLE_GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(guard);

    let console = fmt::layer()
        .with_writer(stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets(cfg));

    let router = FileRouter::build(cfg, base_dir);
    let files = (!router.is_empty()).then(|| {
        let _ = FILE_SINKS.set(router.clone());
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router.clone())
            .with_filter(file_targets(cfg, &router))
    });

    let _ = Registry::default().with(env).with(console).with(files).try_init();
}

/// Flush every file sink and drain the console writer.
///
/// Draining closes the non-blocking console worker, so this belongs on exit paths:
/// the panic guard and the end of `main`.
pub fn flush_all() {
    if let Some(router) = FILE_SINKS.get() {
        router.flush();
    }

    let guard = CONSOLE_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    drop(guard);

    let _ = std::io::stderr().flush();
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn section(file: &str) -> Section {
        Section {
            console_level: "info".to_string(),
            file: file.to_string(),
            file_level: "debug".to_string(),
            max_age_days: None,
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn prefix_matching() {
        assert!(under_prefix("rkboot::event", "rkboot::event"));
        assert!(under_prefix("rkboot::event::boot", "rkboot::event"));
        assert!(!under_prefix("rkboot::eventual", "rkboot::event"));
        assert!(!under_prefix("rkboot", "rkboot::event"));
    }

    #[test]
    fn level_parsing() {
        assert_eq!(level_of("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(level_of("off"), None);
        assert_eq!(level_of("bogus"), Some(LevelFilter::INFO));
    }

    #[test]
    fn event_target_goes_to_its_own_file() {
        let dir = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert(DEFAULT_SECTION.to_string(), section("logs/app.log"));
        cfg.insert(EVENT_TARGET.to_string(), section("logs/event.log"));

        let router = FileRouter::build(&cfg, dir.path());
        assert!(router.default.is_some());
        assert_eq!(router.by_target.len(), 1);

        SinkWriter(router.sink_for("rkboot::event"))
            .write_all(b"{\"event\":\"boot_start\"}\n")
            .unwrap();
        SinkWriter(router.sink_for("rkboot::boot"))
            .write_all(b"{\"msg\":\"other\"}\n")
            .unwrap();
        router.flush();

        let events = std::fs::read_to_string(dir.path().join("logs/event.log")).unwrap();
        let app = std::fs::read_to_string(dir.path().join("logs/app.log")).unwrap();
        assert!(events.contains("boot_start"));
        assert!(!events.contains("other"));
        assert!(app.contains("other"));
    }

    #[test]
    fn longest_prefix_wins() {
        let dir = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("rkboot".to_string(), section("logs/rkboot.log"));
        cfg.insert(EVENT_TARGET.to_string(), section("logs/event.log"));

        let router = FileRouter::build(&cfg, dir.path());
        SinkWriter(router.sink_for("rkboot::event")).write_all(b"event\n").unwrap();
        router.flush();

        let events = std::fs::read_to_string(dir.path().join("logs/event.log")).unwrap();
        assert!(events.contains("event"));
        assert!(router.sink_for("other_crate").is_none());
    }

    #[test]
    fn sections_without_file_have_no_sink() {
        let dir = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert(DEFAULT_SECTION.to_string(), section(""));

        let router = FileRouter::build(&cfg, dir.path());
        assert!(router.is_empty());
        assert!(!file_targets(&cfg, &router).would_enable("anything", &tracing::Level::ERROR));
    }

    #[test]
    fn flush_all_without_init_is_noop() {
        flush_all();
        flush_all();
    }
}

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock, Weak};

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INSTANCES: LazyLock<Mutex<Vec<Weak<LoggerInner>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));

type SharedLogHandler = Arc<dyn Fn(&Logger, LogLevel, &str) + Send + Sync + 'static>;

/// Named diagnostic logger shared by one subsystem of the SDK.
///
/// Every logger starts at the global level and writes through the default handler, which
/// prints `[timestamp]  name: message` to stderr (or the browser console under `wasm-web`).
/// A user handler registered with [`set_user_log_handler`] receives a copy of every record
/// above its threshold, which is how embedders forward diagnostics to their own reporting.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        let inner = Arc::new(LoggerInner::new(name.into()));
        INSTANCES.lock().unwrap().push(Arc::downgrade(&inner));
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.log_level.load(Ordering::SeqCst))
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.inner.log_level.store(level as u8, Ordering::SeqCst);
    }

    pub fn set_log_handler<F>(&self, handler: F)
    where
        F: Fn(&Logger, LogLevel, &str) + Send + Sync + 'static,
    {
        *self.inner.log_handler.write().unwrap() = Arc::new(handler);
    }

    pub fn reset_log_handler(&self) {
        *self.inner.log_handler.write().unwrap() = Arc::new(default_log_handler);
    }

    pub fn has_user_log_handler(&self) -> bool {
        self.inner.user_log_handler.read().unwrap().is_some()
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Debug, message.into());
    }

    pub fn log(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Verbose, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Error, message.into());
    }

    fn dispatch(&self, level: LogLevel, message: String) {
        let user_handler = self.inner.user_log_handler.read().unwrap().clone();
        if let Some(handler) = user_handler {
            handler(self, level, &message);
        }
        let handler = self.inner.log_handler.read().unwrap().clone();
        handler(self, level, &message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("level", &self.log_level())
            .finish()
    }
}

struct LoggerInner {
    name: String,
    log_level: AtomicU8,
    log_handler: RwLock<SharedLogHandler>,
    user_log_handler: RwLock<Option<SharedLogHandler>>,
}

impl LoggerInner {
    fn new(name: String) -> Self {
        Self {
            name,
            log_level: AtomicU8::new(GLOBAL_LOG_LEVEL.load(Ordering::SeqCst)),
            log_handler: RwLock::new(Arc::new(default_log_handler)),
            user_log_handler: RwLock::new(None),
        }
    }
}

fn default_log_handler(logger: &Logger, level: LogLevel, message: &str) {
    if level < logger.log_level() || level == LogLevel::Silent {
        return;
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let line = format!("[{}]  {}: {}", now, logger.name(), message);
    write_line(level, &line);
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
fn write_line(level: LogLevel, line: &str) {
    let value = wasm_bindgen::JsValue::from_str(line);
    match level {
        LogLevel::Error => web_sys::console::error_1(&value),
        LogLevel::Warn => web_sys::console::warn_1(&value),
        LogLevel::Info => web_sys::console::info_1(&value),
        _ => web_sys::console::log_1(&value),
    }
}

#[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
fn write_line(level: LogLevel, line: &str) {
    match level {
        LogLevel::Warn | LogLevel::Error => eprintln!("{line}"),
        _ => println!("{line}"),
    }
}

fn with_instances<F>(mut f: F)
where
    F: FnMut(Logger),
{
    let mut instances = INSTANCES.lock().unwrap();
    instances.retain(|weak| weak.strong_count() > 0);
    for weak in instances.iter() {
        if let Some(inner) = weak.upgrade() {
            f(Logger { inner });
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Silent = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Verbose,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

/// Record handed to user log callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub logger: String,
    pub message: String,
}

pub type LogCallback = Arc<dyn Fn(LogRecord) + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => {
                write!(f, "Invalid value \"{level}\" assigned to `logLevel`")
            }
        }
    }
}

impl std::error::Error for LogError {}

/// Sets the level of every live logger and of loggers created afterwards.
pub fn set_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    with_instances(|logger| logger.set_log_level(level));
}

/// Parses `level` (e.g. `"warn"`) and applies it with [`set_log_level`].
pub fn set_log_level_str(level: &str) -> Result<(), LogError> {
    set_log_level(LogLevel::from_str(level)?);
    Ok(())
}

/// Installs (or clears, with `None`) a callback receiving records at or above `threshold`.
///
/// When `threshold` is `None` each logger's own level applies.
pub fn set_user_log_handler(callback: Option<LogCallback>, threshold: Option<LogLevel>) {
    match callback {
        Some(callback) => with_instances(|logger| {
            let callback = Arc::clone(&callback);
            let handler: SharedLogHandler = Arc::new(move |instance, level, message| {
                if level < threshold.unwrap_or_else(|| instance.log_level()) {
                    return;
                }
                callback(LogRecord {
                    level,
                    logger: instance.name().to_owned(),
                    message: message.to_owned(),
                });
            });
            *logger.inner.user_log_handler.write().unwrap() = Some(handler);
        }),
        None => with_instances(|logger| {
            logger.inner.user_log_handler.write().unwrap().take();
        }),
    }
}

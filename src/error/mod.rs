use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use sqlx::Error as SqlxError;
use std::io::Error as IoError;

mod crash_id;

pub use crash_id::CrashId;

/// Store rejected or could not complete a whole-collection write.
pub const STORE_WRITE_FAILED: &str = "STORE/WRITE_FAILED";
/// Engine-level read failure (not a malformed payload).
pub const STORE_READ_FAILED: &str = "STORE/READ_FAILED";
pub const BACKUP_INVALID_FORMAT: &str = "BACKUP/INVALID_FORMAT";
pub const BACKUP_UNSUPPORTED_VERSION: &str = "BACKUP/UNSUPPORTED_VERSION";
pub const AUTH_INVALID_CREDENTIALS: &str = "AUTH/INVALID_CREDENTIALS";
pub const CONSOLE_NOT_AN_ARRAY: &str = "CONSOLE/NOT_AN_ARRAY";
pub const CONSOLE_INVALID_JSON: &str = "CONSOLE/INVALID_JSON";
pub const VALIDATION_REQUIRED_FIELD: &str = "VALIDATION/REQUIRED_FIELD";
pub const VALIDATION_INVALID_VALUE: &str = "VALIDATION/INVALID_VALUE";
pub const VALIDATION_MISSING_REFERENCE: &str = "VALIDATION/MISSING_REFERENCE";
pub const VALIDATION_DUPLICATE: &str = "VALIDATION/DUPLICATE";
pub const RUNTIME_PANIC: &str = "RUNTIME/PANIC";

/// A structured application error that can be serialized and surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message that can be shown directly to the user.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    /// Identifier correlating a caught panic with its log line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_id: Option<CrashId>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;
pub type Result<T> = AppResult<T>;

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    /// Code used for errors created from free-form messages.
    pub const GENERIC_CODE: &'static str = "APP/GENERIC";

    /// Construct a new application error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            crash_id: None,
            cause: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn crash_id(&self) -> Option<&CrashId> {
        self.crash_id.as_ref()
    }

    pub fn set_crash_id(&mut self, crash_id: CrashId) {
        self.crash_id = Some(crash_id);
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    /// True when the error (or any cause) carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.code == code || self.cause().is_some_and(|cause| cause.has_code(code))
    }

    /// Emit the error as a single structured log line.
    pub fn log_with_event(&self, event: &'static str) {
        tracing::error!(
            target: "ironward",
            event,
            code = %self.code,
            message = %self.message,
            crash_id = self.crash_id.as_ref().map(|id| id.to_string()).as_deref(),
            context = ?self.context,
        );
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }

            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_data() {
            "JSON/DATA"
        } else if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else if error.is_io() {
            "JSON/IO"
        } else {
            "JSON/ERROR"
        };

        let mut app_error = AppError::new(code, error.to_string());
        let line = error.line();
        if line > 0 {
            app_error = app_error.with_context("line", line.to_string());
        }
        let column = error.column();
        if column > 0 {
            app_error = app_error.with_context("column", column.to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_NOT_FOUND", "Record not found"),
            SqlxError::ColumnNotFound(name) => {
                AppError::new("SQLX/COLUMN_NOT_FOUND", format!("Column not found: {name}"))
            }
            SqlxError::PoolTimedOut => AppError::new(
                "SQLX/POOL_TIMEOUT",
                "Timed out acquiring a database connection",
            ),
            SqlxError::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "Database pool is closed"),
            SqlxError::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            SqlxError::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("Sqlite/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new("SQLX/COLUMN_DECODE", source.to_string())
                    .with_context("column_index", index.to_string())
            }
            SqlxError::Decode(decode_err) => AppError::new("SQLX/DECODE", decode_err.to_string()),
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}

thread_local! {
    static PANIC_CRASH_ID: RefCell<Option<CrashId>> = const { RefCell::new(None) };
}

/// Remember the crash id assigned by the panic hook on this thread.
pub fn stash_panic_crash_id(crash_id: CrashId) {
    PANIC_CRASH_ID.with(|slot| *slot.borrow_mut() = Some(crash_id));
}

/// Take the crash id stashed by the panic hook, if any.
pub fn take_panic_crash_id() -> Option<CrashId> {
    PANIC_CRASH_ID.with(|slot| slot.borrow_mut().take())
}

/// Render a panic payload as text.
pub fn panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

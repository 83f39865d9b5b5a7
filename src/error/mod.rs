use std::collections::HashMap;
use std::fmt;

use anyhow::Error as AnyhowError;
use rusqlite::Error as SqliteError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

/// Error raised by the migration passes, the stores and the collaborators.
/// `code` is a stable `AREA/REASON` string the CLI prints and tests match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    /// Paths, operations and ids involved in the failure.
    pub context: HashMap<String, String>,
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Code for foreign errors that carry no code of their own.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            let mut pairs: Vec<_> = self.context.iter().collect();
            pairs.sort();
            write!(f, "[{}] {} ({:?})", self.code, self.message, pairs)
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

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        // Built innermost first. An `AppError` found in the chain is kept as is.
        let mut built: Option<AppError> = None;
        for layer in error.chain().rev() {
            built = Some(match layer.downcast_ref::<AppError>() {
                Some(app) => app.clone(),
                None => {
                    let mut app = AppError::new(AppError::UNKNOWN_CODE, layer.to_string());
                    app.cause = built.map(Box::new);
                    app
                }
            });
        }
        built.unwrap_or_else(|| AppError::new(AppError::UNKNOWN_CODE, error.to_string()))
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

impl From<SqliteError> for AppError {
    fn from(error: SqliteError) -> Self {
        match error {
            SqliteError::QueryReturnedNoRows => {
                AppError::new("SQLITE/ROW_NOT_FOUND", "Record not found")
            }
            SqliteError::SqliteFailure(code, message) => {
                let text = message.unwrap_or_else(|| code.to_string());
                AppError::new(format!("SQLITE/{:?}", code.code), text)
                    .with_context("extended_code", code.extended_code.to_string())
            }
            other => AppError::new("SQLITE/ERROR", other.to_string()),
        }
    }
}

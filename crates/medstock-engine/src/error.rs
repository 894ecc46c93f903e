//! # Engine Error Type
//!
//! Every operation returns [`EngineResult`]. The error splits into two
//! classes the caller treats differently:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in MedStock                               │
//! │                                                                         │
//! │  engine.set_order_status(id, Delivered)                                 │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Rule violated? ── CoreError ──────► EngineError::Rule           │  │
//! │  │     (shortage, illegal transition,    show to operator, do not   │  │
//! │  │      immutable record, validation)    resubmit unchanged         │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Store failed? ─── DbError ────────► EngineError::Storage        │  │
//! │  │     (busy, pool exhausted, I/O)       transaction rolled back,   │  │
//! │  │                                       resubmission is safe       │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ErrorReport { code, message, shortages? }  ──► UI / CLI JSON           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use medstock_core::{CoreError, Shortage, ValidationError};
use medstock_db::DbError;

/// Error returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule rejected the request. Nothing was written.
    #[error(transparent)]
    Rule(#[from] CoreError),

    /// The record store failed. The transaction was rolled back.
    #[error(transparent)]
    Storage(#[from] DbError),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Rule(CoreError::Validation(err))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Whether resubmitting the same request may succeed.
    ///
    /// Rule violations never are. Storage failures are, except for those a
    /// retry would hit again (missing rows, constraint violations, corrupt
    /// data, a broken schema).
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Rule(_) => false,
            EngineError::Storage(e) => !matches!(
                e,
                DbError::NotFound { .. }
                    | DbError::UniqueViolation { .. }
                    | DbError::ForeignKeyViolation { .. }
                    | DbError::CheckViolation { .. }
                    | DbError::Corrupt { .. }
                    | DbError::MigrationFailed(_)
            ),
        }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Rule(e) => match e {
                CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                CoreError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
                CoreError::ImmutableRecord { .. } => ErrorCode::ImmutableRecord,
                CoreError::NotFound { .. } => ErrorCode::NotFound,
                CoreError::CustomerBanned { .. } => ErrorCode::CustomerBanned,
                CoreError::Validation(_) => ErrorCode::ValidationError,
            },
            EngineError::Storage(e) => match e {
                DbError::NotFound { .. } => ErrorCode::NotFound,
                DbError::UniqueViolation { .. } => ErrorCode::Conflict,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => {
                    ErrorCode::ValidationError
                }
                DbError::Busy(_) | DbError::PoolExhausted => ErrorCode::Busy,
                _ => ErrorCode::DatabaseError,
            },
        }
    }

    /// Builds the serializable report shown to operators.
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            EngineError::Rule(e) => e.to_string(),
            EngineError::Storage(e) => match e {
                DbError::NotFound { .. } | DbError::UniqueViolation { .. } => e.to_string(),
                DbError::ForeignKeyViolation { message } => {
                    tracing::error!("Foreign key violation: {}", message);
                    "Invalid reference".to_string()
                }
                DbError::Busy(_) | DbError::PoolExhausted => {
                    "The store is busy, please retry".to_string()
                }
                other => {
                    // Log the actual error but return a generic message
                    tracing::error!("Storage failure: {}", other);
                    "Database operation failed".to_string()
                }
            },
        };

        let shortages = match self {
            EngineError::Rule(CoreError::InsufficientStock { shortages, .. }) => Some(shortages.clone()),
            _ => None,
        };

        ErrorReport {
            code: self.code(),
            message,
            shortages,
            retryable: self.is_retryable(),
        }
    }
}

/// Error codes for reports.
///
/// ## Usage in the Admin Console
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_STOCK':
///     showShortages(e.shortages);
///     break;
///   case 'BUSY':
///     retryLater();
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    InsufficientStock,
    InvalidTransition,
    ImmutableRecord,
    CustomerBanned,
    /// A concurrent write got there first (e.g. a second sale for one order).
    Conflict,
    /// Lock wait or pool timeout; retry.
    Busy,
    DatabaseError,
}

/// What the UI receives when an operation fails.
///
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "message": "Insufficient stock for order 9f2c…: FreeStyle Libre 2 (required 5, available 2)",
///   "shortages": [{ "product_id": "…", "product_name": "FreeStyle Libre 2", "required": 5, "available": 2 }],
///   "retryable": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortages: Option<Vec<Shortage>>,
    pub retryable: bool,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        err.report()
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

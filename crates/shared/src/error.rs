use std::{
  backtrace::{Backtrace, BacktraceStatus},
  fmt::Display,
};

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use thiserror::Error;

/// Engine-level error taxonomy.
///
/// Every fallible path in the pipeline classifies into one of these
/// kinds; the task runtime retries only `Transient` failures, and the
/// server maps kinds to HTTP statuses. The kind name is the stable
/// prefix of the display string so terminal task errors stay
/// machine-readable without exposing stack traces.
#[derive(Debug, Error)]
pub enum EngineError {
  /// Network error, 5xx, or timeout. Retried per policy.
  #[error("Transient: {0}")]
  Transient(#[source] anyhow::Error),

  /// Model returned JSON we could not parse. The fallback path has
  /// already run; never retried.
  #[error("ModelParse: {0}")]
  ModelParse(String),

  /// Duplicate vector id. A warning on ADD, an error on UPDATE.
  #[error("StoreConflict: {0}")]
  StoreConflict(String),

  /// Target fact missing on UPDATE/DELETE. The op is skipped.
  #[error("NotFound: {0}")]
  NotFound(String),

  /// Validation failure surfaced synchronously; never enqueued.
  #[error("PermanentReject: {0}")]
  PermanentReject(String),

  /// Store unreachable after retries. Dead-letters the task.
  #[error("Fatal: {0}")]
  Fatal(#[source] anyhow::Error),
}

impl EngineError {
  pub fn transient<E: Into<anyhow::Error>>(err: E) -> Self {
    Self::Transient(err.into())
  }

  pub fn fatal<E: Into<anyhow::Error>>(err: E) -> Self {
    Self::Fatal(err.into())
  }

  #[must_use]
  pub const fn is_retryable(&self) -> bool {
    matches!(self, Self::Transient(_))
  }

  #[must_use]
  pub const fn kind(&self) -> &'static str {
    match self {
      Self::Transient(_) => "Transient",
      Self::ModelParse(_) => "ModelParse",
      Self::StoreConflict(_) => "StoreConflict",
      Self::NotFound(_) => "NotFound",
      Self::PermanentReject(_) => "PermanentReject",
      Self::Fatal(_) => "Fatal",
    }
  }
}

#[derive(Debug)]
pub struct AppError {
  err: anyhow::Error,
  status_code: StatusCode,
}

impl AppError {
  /// Create with 500 status
  pub fn new<E: Into<anyhow::Error>>(err: E) -> Self {
    Self {
      err: err.into(),
      status_code: StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Create with custom status
  pub fn with_status<E: Into<anyhow::Error>>(status: StatusCode, err: E) -> Self {
    Self {
      err: err.into(),
      status_code: status,
    }
  }

  #[must_use]
  pub const fn status_code(&self) -> StatusCode {
    self.status_code
  }

  /// Map an engine error onto its HTTP status. Not a `From` impl: the
  /// blanket conversion below already claims every error type.
  #[must_use]
  pub fn engine(err: EngineError) -> Self {
    let status = match &err {
      EngineError::PermanentReject(_) => StatusCode::BAD_REQUEST,
      EngineError::NotFound(_) => StatusCode::NOT_FOUND,
      EngineError::StoreConflict(_) => StatusCode::CONFLICT,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Self::with_status(status, err)
  }

  /// Get backtrace from anyhow (requires `RUST_BACKTRACE=1` to capture)
  pub fn backtrace(&self) -> &Backtrace {
    self.err.backtrace()
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let body = if cfg!(debug_assertions) {
      let bt = self.err.backtrace();
      if bt.status() == BacktraceStatus::Captured {
        format!("{}\nBacktrace:\n{}", self.err, bt)
      } else {
        format!(
          "{}\n(hint: set RUST_BACKTRACE=1 to enable backtrace)",
          self.err
        )
      }
    } else {
      self.err.to_string()
    };
    (self.status_code, body).into_response()
  }
}

impl Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.status_code, self.err)
  }
}

impl<E> From<E> for AppError
where
  E: Into<anyhow::Error>,
{
  fn from(err: E) -> Self {
    Self::new(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn engine_error_kind_prefixes_display() {
    let err = EngineError::PermanentReject("batch too large".to_owned());
    assert!(err.to_string().starts_with("PermanentReject:"));
    assert_eq!(err.kind(), "PermanentReject");
  }

  #[test]
  fn only_transient_is_retryable() {
    assert!(EngineError::transient(anyhow::anyhow!("timeout")).is_retryable());
    assert!(!EngineError::ModelParse("garbage".to_owned()).is_retryable());
    assert!(!EngineError::fatal(anyhow::anyhow!("down")).is_retryable());
  }

  #[test]
  fn reject_maps_to_bad_request() {
    let app = AppError::engine(EngineError::PermanentReject("empty content".to_owned()));
    assert_eq!(app.status_code(), StatusCode::BAD_REQUEST);

    let not_found = AppError::engine(EngineError::NotFound("task x".to_owned()));
    assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
  }
}

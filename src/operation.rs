//! Long-running operation handles as returned by the Gemini API.
//!
//! A submission to a `:predictLongRunning` endpoint answers with an
//! [`Operation`] whose `done` flag starts out false. The handle is refreshed
//! by name until the service marks it done, at which point it carries either
//! a `response` or an `error`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{GenMediaError, Result};

/// Remote job handle.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation<T> {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<T>,
    #[serde(default)]
    pub error: Option<OperationStatus>,
}

/// Error payload of a failed operation (google.rpc.Status)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Complete,
    Failed,
}

impl<T> Operation<T> {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            response: None,
            error: None,
        }
    }

    pub fn completed(name: impl Into<String>, response: T) -> Self {
        Self {
            name: name.into(),
            done: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            name: name.into(),
            done: true,
            response: None,
            error: Some(status),
        }
    }

    /// A done handle without an error counts as `Complete`; one that is also
    /// missing its response is rejected by [`Operation::into_result`].
    pub fn state(&self) -> JobState {
        match (self.done, &self.error) {
            (false, _) => JobState::Pending,
            (true, Some(_)) => JobState::Failed,
            (true, None) => JobState::Complete,
        }
    }

    /// Consume a finished handle and hand back its result reference.
    pub fn into_result(self) -> Result<T> {
        if !self.done {
            return Err(GenMediaError::InvalidResponse(format!(
                "operation {} is still running",
                self.name
            )));
        }
        if let Some(status) = self.error {
            return Err(GenMediaError::JobFailed {
                name: self.name,
                code: status.code,
                message: status.message,
            });
        }
        self.response.ok_or_else(|| {
            GenMediaError::InvalidResponse(format!(
                "operation {} completed without a response",
                self.name
            ))
        })
    }
}

/// Status-refresh seam for long-running jobs.
#[async_trait]
pub trait OperationSource: Send + Sync {
    type Response: Send + Sync;

    /// Query the current state of `operation`, keyed by its name.
    async fn refresh(
        &self,
        operation: &Operation<Self::Response>,
    ) -> Result<Operation<Self::Response>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_operation_not_done() {
        let json = r#"{"name": "operations/123"}"#;
        let op: Operation<Value> = serde_json::from_str(json).unwrap();
        assert_eq!(op.name, "operations/123");
        assert!(!op.done);
        assert_eq!(op.state(), JobState::Pending);
        assert!(op.response.is_none());
    }

    #[test]
    fn test_operation_done_with_response() {
        let json = r#"{"name": "operations/123", "done": true, "response": {"x": 1}}"#;
        let op: Operation<Value> = serde_json::from_str(json).unwrap();
        assert_eq!(op.state(), JobState::Complete);
        assert_eq!(op.into_result().unwrap()["x"], 1);
    }

    #[test]
    fn test_operation_done_with_error() {
        let json = r#"{
            "name": "operations/123",
            "done": true,
            "error": {"code": 8, "message": "Quota exceeded"}
        }"#;
        let op: Operation<Value> = serde_json::from_str(json).unwrap();
        assert_eq!(op.state(), JobState::Failed);
        match op.into_result() {
            Err(GenMediaError::JobFailed {
                name,
                code,
                message,
            }) => {
                assert_eq!(name, "operations/123");
                assert_eq!(code, 8);
                assert_eq!(message, "Quota exceeded");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_done_without_response_is_invalid() {
        let op: Operation<Value> = Operation {
            name: "operations/1".to_string(),
            done: true,
            response: None,
            error: None,
        };
        assert!(matches!(
            op.into_result(),
            Err(GenMediaError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_pending_into_result_is_invalid() {
        let op: Operation<Value> = Operation::pending("operations/1");
        assert!(matches!(
            op.into_result(),
            Err(GenMediaError::InvalidResponse(_))
        ));
    }
}

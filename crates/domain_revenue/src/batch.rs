//! Per-item results for batch operations

use crate::error::{ReasonCode, RevenueError};

/// A batch item that failed, with its position in the request
#[derive(Debug)]
pub struct BatchItemError {
    pub index: usize,
    /// Caller-recognisable handle for the item (id, claim number, ...)
    pub reference: String,
    pub error: RevenueError,
}

impl BatchItemError {
    pub fn reason_code(&self) -> Option<ReasonCode> {
        self.error.reason_code()
    }
}

/// Outcome of a batch where every item runs in its own transaction
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchItemError>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    pub fn push(
        &mut self,
        index: usize,
        reference: impl Into<String>,
        result: Result<T, RevenueError>,
    ) {
        match result {
            Ok(value) => self.succeeded.push(value),
            Err(error) => self.failed.push(BatchItemError {
                index,
                reference: reference.into(),
                error,
            }),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

//! Step tracking for multi-document operations
//!
//! The store has no cross-document transactions. An operation made of
//! several writes runs each one through [`Steps::run`]: a failure before
//! anything committed is returned as is, a failure after that becomes
//! [`EngineError::PartialFailure`] so the caller knows a retry is needed.

use crate::error::{EngineError, EngineResult};
use std::future::Future;

pub(crate) struct Steps {
    operation: &'static str,
    committed: usize,
}

impl Steps {
    pub fn new(operation: &'static str) -> Self {
        Self { operation, committed: 0 }
    }

    pub async fn run<T, F>(&mut self, step: &'static str, write: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        match write.await {
            Ok(value) => {
                self.committed += 1;
                Ok(value)
            }
            Err(err) if self.committed == 0 => Err(err),
            Err(err) => {
                log::error!(
                    "{} failed at step '{}' after {} committed step(s): {}",
                    self.operation,
                    step,
                    self.committed,
                    err
                );
                Err(EngineError::PartialFailure {
                    operation: self.operation,
                    step,
                    committed: self.committed,
                    source: Box::new(err),
                })
            }
        }
    }

    pub fn committed(&self) -> usize {
        self.committed
    }
}

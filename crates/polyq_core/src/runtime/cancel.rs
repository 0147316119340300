use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use polyq_error::{DbError, Result};
use tracing::debug;

use crate::arrays::row::Row;

/// Cooperative cancellation shared by every task of a query.
///
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        debug!("cancellation requested");
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns a `Cancelled` error if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(DbError::cancelled());
        }
        Ok(())
    }
}

/// Wraps a row stream, stopping at the next row boundary once the token is
/// cancelled.
///
/// A single `Cancelled` error is yielded, after which the stream ends.
#[derive(Debug)]
pub struct CancellableRows<I> {
    inner: I,
    token: CancellationToken,
    finished: bool,
}

impl<I> CancellableRows<I> {
    pub fn new(inner: I, token: CancellationToken) -> Self {
        CancellableRows {
            inner,
            token,
            finished: false,
        }
    }
}

impl<I> Iterator for CancellableRows<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Err(e) = self.token.check() {
            self.finished = true;
            return Some(Err(e));
        }
        let next = self.inner.next();
        if next.is_none() {
            self.finished = true;
        }
        next
    }
}

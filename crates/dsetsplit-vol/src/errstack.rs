//! Per-thread error stack.
//!
//! Connectors push a record for every failed operation, so a caller can
//! inspect the chain of failures behind the error it got back. Internal
//! cleanup that might itself fail runs inside an [`ErrorContext`], which puts
//! the caller's stack back when it goes out of scope.

use std::cell::RefCell;
use std::fmt;

/// One entry on the error stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Operation that failed, e.g. `"dataset_close"`.
    pub op: String,
    pub message: String,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.message)
    }
}

thread_local! {
    static STACK: RefCell<Vec<ErrorRecord>> = const { RefCell::new(Vec::new()) };
}

/// Push a failure record onto the current thread's stack.
pub fn push(op: &str, err: &dyn fmt::Display) {
    STACK.with(|s| {
        s.borrow_mut().push(ErrorRecord {
            op: op.to_string(),
            message: err.to_string(),
        })
    });
}

/// Snapshot of the current thread's stack, oldest first.
pub fn current() -> Vec<ErrorRecord> {
    STACK.with(|s| s.borrow().clone())
}

/// Replace the current thread's stack.
pub fn set_current(records: Vec<ErrorRecord>) {
    STACK.with(|s| *s.borrow_mut() = records);
}

pub fn clear() {
    STACK.with(|s| s.borrow_mut().clear());
}

pub fn len() -> usize {
    STACK.with(|s| s.borrow().len())
}

pub fn is_empty() -> bool {
    len() == 0
}

/// Saved error stack, restored on drop.
///
/// ```
/// use dsetsplit_vol::errstack::{self, ErrorContext};
///
/// errstack::clear();
/// errstack::push("dataset_close", &"device busy");
/// {
///     let _ctx = ErrorContext::save();
///     errstack::push("file_close", &"cleanup noise");
/// }
/// assert_eq!(errstack::current().len(), 1);
/// ```
#[must_use = "the saved stack is restored when the context is dropped"]
pub struct ErrorContext {
    saved: Option<Vec<ErrorRecord>>,
}

impl ErrorContext {
    pub fn save() -> Self {
        Self {
            saved: Some(current()),
        }
    }
}

impl Drop for ErrorContext {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            set_current(saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_clear() {
        clear();
        push("file_open", &"no such container");
        push("dataset_open", &"no such link");
        let stack = current();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].op, "file_open");
        assert_eq!(stack[1].to_string(), "dataset_open: no such link");
        clear();
        assert!(is_empty());
    }

    #[test]
    fn context_restores_on_drop() {
        clear();
        push("dataset_close", &"busy");
        {
            let _ctx = ErrorContext::save();
            clear();
            push("file_close", &"bad handle");
            push("file_close", &"still bad");
            assert_eq!(len(), 2);
        }
        let stack = current();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].op, "dataset_close");
        clear();
    }

    #[test]
    fn context_restores_even_on_unwind() {
        clear();
        push("attr_write", &"size mismatch");
        let result = std::panic::catch_unwind(|| {
            let _ctx = ErrorContext::save();
            push("attr_close", &"noise");
            panic!("cleanup blew up");
        });
        assert!(result.is_err());
        assert_eq!(current().len(), 1);
        clear();
    }
}

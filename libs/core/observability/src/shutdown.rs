//! Ordered teardown procedures with aggregated failure reporting.

use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Teardown = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// One failed teardown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownFailure {
    pub component: String,
    pub message: String,
}

/// Aggregate of every teardown failure encountered while draining a chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("shutdown failed for {} component(s): {}", .failures.len(), join(.failures))]
pub struct ShutdownError {
    pub failures: Vec<ShutdownFailure>,
}

fn join(failures: &[ShutdownFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.component, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ordered list of named teardown procedures.
///
/// Steps run in insertion order. Draining is idempotent: each step runs at
/// most once, and later drains return the same aggregate as the first.
#[derive(Default)]
pub struct ShutdownChain {
    steps: Vec<(String, Teardown)>,
    failures: Vec<ShutdownFailure>,
    drained: usize,
}

impl ShutdownChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a teardown step.
    pub fn push<F>(&mut self, component: impl Into<String>, teardown: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.steps.push((component.into(), Box::new(teardown)));
    }

    /// Move every pending step of `other` to the end of this chain.
    pub fn append(&mut self, other: &mut ShutdownChain) {
        self.steps.append(&mut other.steps);
    }

    /// Number of steps not yet executed.
    pub fn pending(&self) -> usize {
        self.steps.len()
    }

    /// Number of steps executed so far.
    pub fn drained(&self) -> usize {
        self.drained
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every pending step and report the aggregate of all failures seen
    /// by this chain.
    pub fn shutdown(&mut self) -> Result<(), ShutdownError> {
        let steps = std::mem::take(&mut self.steps);
        if !steps.is_empty() {
            info!(steps = steps.len(), "Running shutdown chain");
        }

        for (component, teardown) in steps {
            self.drained += 1;
            match teardown() {
                Ok(()) => debug!(component = %component, "Shutdown step completed"),
                Err(e) => {
                    error!(component = %component, error = %e, "Shutdown step failed");
                    self.failures.push(ShutdownFailure {
                        component,
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError {
                failures: self.failures.clone(),
            })
        }
    }
}

impl fmt::Debug for ShutdownChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownChain")
            .field("pending", &self.steps.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .field("drained", &self.drained)
            .field("failures", &self.failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_empty_chain_succeeds() {
        let mut chain = ShutdownChain::new();
        assert!(chain.shutdown().is_ok());
        assert_eq!(chain.drained(), 0);
    }

    #[test]
    fn test_steps_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ShutdownChain::new();

        for name in ["meter", "tracer", "logger"] {
            let order = order.clone();
            chain.push(name, move || {
                order.lock().unwrap().push(name);
                Ok(())
            });
        }

        chain.shutdown().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["meter", "tracer", "logger"]);
    }

    #[test]
    fn test_failures_are_aggregated_not_short_circuited() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut chain = ShutdownChain::new();

        let r = ran.clone();
        chain.push("tracer", move || {
            r.fetch_add(1, Ordering::SeqCst);
            Err("exporter timed out".into())
        });
        let r = ran.clone();
        chain.push("meter", move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let r = ran.clone();
        chain.push("logger", move || {
            r.fetch_add(1, Ordering::SeqCst);
            Err("already shut down".into())
        });

        let err = chain.shutdown().unwrap_err();
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].component, "tracer");
        assert_eq!(err.failures[1].component, "logger");
        assert!(err.to_string().contains("exporter timed out"));
        assert!(err.to_string().contains("already shut down"));
        assert_eq!(
            err.to_string(),
            "shutdown failed for 2 component(s): tracer: exporter timed out; logger: already shut down"
        );
    }

    #[test]
    fn test_double_drain_runs_once_and_is_stable() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut chain = ShutdownChain::new();

        let r = ran.clone();
        chain.push("tracer", move || {
            r.fetch_add(1, Ordering::SeqCst);
            Err("flush failed".into())
        });

        let first = chain.shutdown();
        let second = chain.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(chain.drained(), 1);
    }

    #[test]
    fn test_append_moves_pending_steps() {
        let mut outer = ShutdownChain::new();
        outer.push("first", || Ok(()));

        let mut inner = ShutdownChain::new();
        inner.push("second", || Ok(()));
        outer.append(&mut inner);

        assert!(inner.is_empty());
        assert_eq!(outer.pending(), 2);
        outer.shutdown().unwrap();
        assert_eq!(outer.drained(), 2);
    }
}

//! Health of the downstream dependency.
//!
//! The controller only asks a yes/no question; how that answer is produced
//! (probing a database, reading a flag flipped by another task) is up to the
//! hosting process.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;

/// Health of the dependency the downstream capability relies on
#[async_trait]
pub trait HealthCheck: Send + Sync + std::fmt::Debug {
    /// Whether downstream processing should be attempted now
    ///
    /// Must not have side effects the controller can observe.
    async fn is_healthy(&self) -> bool;
}

/// Health check backed by a shared flag
///
/// Clones share the flag, so the host can keep one handle to toggle health
/// while the controller holds another.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    healthy: Arc<AtomicBool>,
}

impl HealthChecker {
    #[must_use]
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(healthy)),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    #[must_use]
    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl HealthCheck for HealthChecker {
    async fn is_healthy(&self) -> bool {
        self.healthy()
    }
}

/// Health check that calls a closure
pub struct FnHealthCheck<F> {
    name: &'static str,
    check: F,
}

impl<F> FnHealthCheck<F>
where
    F: Fn() -> bool + Send + Sync,
{
    pub const fn new(name: &'static str, check: F) -> Self {
        Self { name, check }
    }
}

impl<F> std::fmt::Debug for FnHealthCheck<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHealthCheck")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> HealthCheck for FnHealthCheck<F>
where
    F: Fn() -> bool + Send + Sync,
{
    async fn is_healthy(&self) -> bool {
        (self.check)()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn test_health_checker_toggles() {
        let checker = HealthChecker::new(false);
        let handle = checker.clone();
        assert!(!checker.is_healthy().await);

        handle.set_healthy(true);
        assert!(checker.is_healthy().await);
    }

    #[tokio::test]
    async fn test_fn_health_check() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let check = FnHealthCheck::new("even-calls", move || {
            counter.fetch_add(1, Ordering::SeqCst) % 2 == 0
        });

        assert!(check.is_healthy().await);
        assert!(!check.is_healthy().await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(format!("{check:?}").contains("even-calls"));
    }
}

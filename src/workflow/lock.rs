//! Optional per-project mutual exclusion for the verify workflow.
//!
//! Without a lock, the open-PR and fork checks are plain check-then-act
//! against the hosting platform: two workers handling the same project at
//! the same time can both pass the checks and both create a pull request.
//! Supplying a `ProjectLock` serializes workflows per `owner/project`.
//! `InProcessLocks` only covers workflows sharing one process; anything wider
//! needs an external implementation of the trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// Held for the duration of one verify run; dropping it releases the lock.
pub type ProjectGuard = Box<dyn Send>;

#[async_trait]
pub trait ProjectLock: Send + Sync {
    async fn acquire(&self, project: &str) -> ProjectGuard;
}

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Keyed async mutexes, one per project. An entry is dropped again once no
/// run holds or waits on it.
#[derive(Default)]
pub struct InProcessLocks {
    locks: LockMap,
}

impl InProcessLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, project: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(project.to_string()).or_default())
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

struct PrunedGuard {
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
    project: String,
    locks: LockMap,
}

impl Drop for PrunedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if locks
            .get(&self.project)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.project);
        }
    }
}

#[async_trait]
impl ProjectLock for InProcessLocks {
    async fn acquire(&self, project: &str) -> ProjectGuard {
        let guard = self.entry(project).lock_owned().await;
        Box::new(PrunedGuard {
            guard: Some(guard),
            project: project.to_string(),
            locks: Arc::clone(&self.locks),
        })
    }
}

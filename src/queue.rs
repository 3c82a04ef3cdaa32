//! Broker abstraction: one FIFO list per channel.
//!
//! `MemoryQueue` is the in-process broker used by `serve`. Tasks do not
//! survive a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::errors::QueueError;
use crate::task::{Channel, Task};

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a task to `channel`. Never waits on consumers.
    async fn push(&self, channel: Channel, task: Task) -> Result<(), QueueError>;

    /// Wait until a task is available on `channel` and take the oldest one.
    async fn pop(&self, channel: Channel) -> Result<Task, QueueError>;

    /// Take the oldest task on `channel` if there is one, without waiting.
    async fn try_pop(&self, channel: Channel) -> Option<Task>;

    async fn len(&self, channel: Channel) -> usize;

    /// Reject further pushes and wake every waiting `pop` with `Closed`.
    /// Tasks already queued can still be drained with `pop`.
    fn close(&self);
}

#[derive(Default)]
struct Lists {
    lists: HashMap<Channel, VecDeque<Task>>,
    closed: bool,
}

pub struct MemoryQueue {
    state: Mutex<Lists>,
    notifiers: HashMap<Channel, Notify>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Lists::default()),
            notifiers: Channel::ALL.iter().map(|c| (*c, Notify::new())).collect(),
        }
    }

    fn notifier(&self, channel: Channel) -> &Notify {
        // Every channel gets a notifier in `new`.
        &self.notifiers[&channel]
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lists> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the tasks currently queued on `channel`, oldest first.
    pub fn snapshot(&self, channel: Channel) -> Vec<Task> {
        self.lock()
            .lists
            .get(&channel)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, channel: Channel, task: Task) -> Result<(), QueueError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.lists.entry(channel).or_default().push_back(task);
        }
        self.notifier(channel).notify_one();
        Ok(())
    }

    async fn pop(&self, channel: Channel) -> Result<Task, QueueError> {
        let notify = self.notifier(channel);
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a push between the check
            // and the await still wakes us.
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(task) = state.lists.get_mut(&channel).and_then(VecDeque::pop_front) {
                    return Ok(task);
                }
                if state.closed {
                    return Err(QueueError::Closed);
                }
            }
            notified.await;
        }
    }

    async fn try_pop(&self, channel: Channel) -> Option<Task> {
        self.lock().lists.get_mut(&channel)?.pop_front()
    }

    async fn len(&self, channel: Channel) -> usize {
        self.lock().lists.get(&channel).map_or(0, VecDeque::len)
    }

    fn close(&self) {
        self.lock().closed = true;
        for notify in self.notifiers.values() {
            notify.notify_waiters();
        }
    }
}

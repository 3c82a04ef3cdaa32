//! Binds channels to workflows and runs one consume loop per bound channel.
//!
//! Each loop pops a task, hands it to its workflow, waits for `process` to
//! return, and pops again. Channels without a workflow are never polled, so
//! their tasks stay queued for some other consumer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::errors::{DispatchError, QueueError};
use crate::queue::TaskQueue;
use crate::task::Channel;
use crate::workflow::Workflow;

pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    bindings: HashMap<Channel, Arc<dyn Workflow>>,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            queue,
            bindings: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        channel: Channel,
        workflow: Arc<dyn Workflow>,
    ) -> Result<(), DispatchError> {
        if self.bindings.contains_key(&channel) {
            return Err(DispatchError::DuplicateRegistration(channel));
        }
        tracing::debug!(channel = %channel, workflow = workflow.name(), "Registered workflow");
        self.bindings.insert(channel, workflow);
        Ok(())
    }

    /// Fail if any of `channels` has no workflow bound.
    pub fn require(&self, channels: &[Channel]) -> Result<(), DispatchError> {
        match channels.iter().find(|c| !self.bindings.contains_key(c)) {
            Some(channel) => Err(DispatchError::Unbound(*channel)),
            None => Ok(()),
        }
    }

    /// Bound channels in declaration order.
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.bindings.contains_key(c))
            .collect()
    }

    /// Spawn the consume loops. The binding table is fixed from here on.
    pub fn start(self) -> Result<RunningDispatcher, DispatchError> {
        if self.bindings.is_empty() {
            return Err(DispatchError::NothingRegistered);
        }
        let (shutdown, _) = watch::channel(false);
        let loops = self
            .channels()
            .into_iter()
            .map(|channel| {
                let workflow = Arc::clone(&self.bindings[&channel]);
                let queue = Arc::clone(&self.queue);
                let stop = shutdown.subscribe();
                (channel, tokio::spawn(consume(channel, queue, workflow, stop)))
            })
            .collect();
        Ok(RunningDispatcher { shutdown, loops })
    }
}

async fn consume(
    channel: Channel,
    queue: Arc<dyn TaskQueue>,
    workflow: Arc<dyn Workflow>,
    mut stop: watch::Receiver<bool>,
) {
    tracing::info!(channel = %channel, workflow = workflow.name(), "Consuming");
    loop {
        if *stop.borrow() {
            break;
        }
        let task = tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            popped = queue.pop(channel) => match popped {
                Ok(task) => task,
                Err(QueueError::Closed) => {
                    tracing::info!(channel = %channel, "Queue closed");
                    break;
                }
            },
        };
        tracing::info!(channel = %channel, guid = %task.guid(), project = %task.project_metadata.project_full_name, "Dispatching task");
        workflow.process(task).await;
    }
    tracing::info!(channel = %channel, "Consume loop stopped");
}

/// Handle to the spawned consume loops.
pub struct RunningDispatcher {
    shutdown: watch::Sender<bool>,
    loops: Vec<(Channel, JoinHandle<()>)>,
}

impl RunningDispatcher {
    pub fn channels(&self) -> Vec<Channel> {
        self.loops.iter().map(|(c, _)| *c).collect()
    }

    /// Stop every loop at its next pop and wait for them. A task already
    /// being processed runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (channel, handle) in self.loops {
            if let Err(e) = handle.await {
                tracing::error!(channel = %channel, error = %e, "Consume loop panicked");
            }
        }
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::commands::CommandEvent;

pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 64;

/// Cloneable publishing half of a [`CommandBus`]. Publishing never blocks.
#[derive(Clone)]
pub struct CommandSender {
    inner: Arc<CommandBus>,
}

/// Holds published events until the UI side drains them.
///
/// The notifier channel has room for a single wake-up; it is pinged only when
/// the queue goes from empty to non-empty.
pub struct CommandBus {
    queue: Mutex<VecDeque<CommandEvent>>,
    notify: mpsc::Sender<()>,
    max_len: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    Replaced,
    QueuedAfterDrop,
}

impl CommandBus {
    pub fn new(max_len: usize) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (notify, notify_rx) = mpsc::channel(1);
        (
            Arc::new(Self {
                queue: Mutex::new(VecDeque::new()),
                notify,
                max_len: max_len.max(1),
            }),
            notify_rx,
        )
    }

    pub fn sender(self: &Arc<Self>) -> CommandSender {
        CommandSender {
            inner: Arc::clone(self),
        }
    }

    pub fn drain(&self) -> Vec<CommandEvent> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CommandEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: CommandEvent) -> PushOutcome {
        // Displaced events may run callbacks that publish again, so they are
        // dropped only after the lock is released.
        let (outcome, displaced) = self.enqueue(event);
        drop(displaced);
        outcome
    }

    fn enqueue(&self, event: CommandEvent) -> (PushOutcome, Option<CommandEvent>) {
        let mut queue = self.lock();
        let was_empty = queue.is_empty();

        if let Some(key) = event.coalesce_key() {
            if let Some(existing) = queue
                .iter_mut()
                .find(|pending| pending.coalesce_key() == Some(key))
            {
                debug!("replacing pending {} with newer one", existing.name());
                let replaced = std::mem::replace(existing, event);
                return (PushOutcome::Replaced, Some(replaced));
            }
        }

        let mut outcome = PushOutcome::Queued;
        let mut displaced = None;
        if queue.len() >= self.max_len {
            if let Some(dropped) = queue.pop_front() {
                debug!("command queue full, dropping oldest {}", dropped.name());
                outcome = PushOutcome::QueuedAfterDrop;
                displaced = Some(dropped);
            }
        }

        queue.push_back(event);
        if was_empty {
            let _ = self.notify.try_send(());
        }
        (outcome, displaced)
    }
}

impl CommandSender {
    pub fn publish(&self, event: CommandEvent) -> PushOutcome {
        self.inner.push(event)
    }
}

//! In-process notifications for observers (CLI, logging, tests).
//!
//! Delivery is synchronous and in emission order: `emit` calls every
//! registered observer before returning. Components emit only after they
//! have released their own locks, so an observer may read the registry.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tokio::sync::mpsc;

use crate::registry::{TaskId, TaskMetadata, TaskState};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    Created {
        id: TaskId,
        source: String,
        metadata: TaskMetadata,
    },
    Queued {
        id: TaskId,
    },
    StateChanged {
        id: TaskId,
        from: TaskState,
        to: TaskState,
        at: SystemTime,
    },
    Progress {
        id: TaskId,
        percent: f64,
    },
    /// One line of raw downloader output.
    Output {
        id: TaskId,
        line: String,
    },
    Error {
        id: TaskId,
        message: String,
    },
    /// A dispatched job settled (any outcome) and its slot was released.
    Finished {
        id: TaskId,
    },
    MaxConcurrentChanged {
        max_concurrent: usize,
    },
    PlaylistExpansionStarted {
        url: String,
    },
    PlaylistInfo {
        url: String,
        count: usize,
        title: String,
    },
    PlaylistExpanded {
        url: String,
        entries: usize,
        destination: PathBuf,
    },
    PlaylistError {
        url: String,
        message: String,
    },
}

impl Event {
    /// Task the event refers to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Event::Created { id, .. }
            | Event::Queued { id }
            | Event::StateChanged { id, .. }
            | Event::Progress { id, .. }
            | Event::Output { id, .. }
            | Event::Error { id, .. }
            | Event::Finished { id } => Some(*id),
            _ => None,
        }
    }
}

type Observer = Arc<dyn Fn(&Event) + Send + Sync>;

/// Fan-out of events to registered observers. Cloning shares the observer list.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<Vec<Observer>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. It is called on the emitting thread.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// Register an observer that forwards every event into an unbounded channel.
    /// Once the receiver is dropped the observer silently discards.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    pub fn emit(&self, event: Event) {
        // Snapshot so observers may subscribe without deadlocking.
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(&event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Observer that logs every event through `tracing` at debug level.
pub fn log_event(event: &Event) {
    match event {
        Event::Output { id, line } => tracing::trace!(task = id, "output: {}", line),
        Event::StateChanged { id, from, to, .. } => {
            tracing::debug!(task = id, "state {} -> {}", from, to)
        }
        Event::Error { id, message } => tracing::debug!(task = id, "error: {}", message),
        other => tracing::debug!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn observers_receive_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |e| sink.lock().unwrap().push(e.task_id()));
        bus.emit(Event::Queued { id: 1 });
        bus.emit(Event::Finished { id: 2 });
        bus.emit(Event::MaxConcurrentChanged { max_concurrent: 3 });
        assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(2), None]);
    }

    #[tokio::test]
    async fn channel_subscription_forwards_and_survives_dropped_receiver() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_channel();
        bus.emit(Event::Queued { id: 5 });
        match rx.recv().await {
            Some(Event::Queued { id }) => assert_eq!(id, 5),
            other => panic!("unexpected {:?}", other),
        }
        drop(rx);
        bus.emit(Event::Queued { id: 6 });
        assert_eq!(bus.observer_count(), 1);
    }

    #[test]
    fn state_changed_serializes_with_tag() {
        let json = serde_json::to_value(Event::StateChanged {
            id: 1,
            from: TaskState::Queued,
            to: TaskState::Downloading,
            at: SystemTime::UNIX_EPOCH,
        })
        .unwrap();
        assert_eq!(json["event"], "state-changed");
        assert_eq!(json["from"], "QUEUED");
        assert_eq!(json["to"], "DOWNLOADING");
    }
}

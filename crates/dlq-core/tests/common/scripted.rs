//! Executor whose jobs finish when the test releases them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use dlq_core::executor::Executor;
use dlq_core::registry::{ExecutionHandle, TaskId, TaskRegistry, TaskState};
use dlq_core::DownloadManager;

#[derive(Debug)]
struct Attached;

impl ExecutionHandle for Attached {
    fn terminate(&mut self) -> bool {
        true
    }
}

pub struct ScriptedExecutor {
    registry: Arc<TaskRegistry>,
    running: Mutex<HashMap<TaskId, oneshot::Sender<Result<(), String>>>>,
    started: Mutex<Vec<TaskId>>,
}

impl ScriptedExecutor {
    pub fn new(registry: Arc<TaskRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            running: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
        })
    }

    /// Order in which jobs were started.
    pub fn started(&self) -> Vec<TaskId> {
        self.started.lock().unwrap().clone()
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.running.lock().unwrap().contains_key(&id)
    }

    /// Wait until `id`'s job has started, then finish it with `outcome`.
    pub async fn finish(&self, id: TaskId, outcome: Result<(), &str>) {
        let tx = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(tx) = self.running.lock().unwrap().remove(&id) {
                    return tx;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job {id} never started"));
        let _ = tx.send(outcome.map_err(str::to_string));
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, id: TaskId) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.running.lock().unwrap().insert(id, tx);
        self.started.lock().unwrap().push(id);
        self.registry.set_execution_handle(id, Some(Box::new(Attached)));
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(anyhow::anyhow!(message)),
            Err(_) => Err(anyhow::anyhow!("job dropped")),
        }
    }

    fn cancel(&self, id: TaskId) -> bool {
        match self.running.lock().unwrap().remove(&id) {
            Some(tx) => tx.send(Err("terminated".to_string())).is_ok(),
            None => false,
        }
    }
}

/// Poll until `id` reaches `state`.
pub async fn wait_for_state(manager: &DownloadManager, id: TaskId, state: TaskState) {
    let current = || manager.get(id).map(|t| t.state);
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while current() != Some(state) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "task {id} never reached {state}; now {:?}",
        current()
    );
}

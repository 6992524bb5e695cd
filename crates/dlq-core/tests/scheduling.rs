//! Integration test: group-fair admission through the public manager API.
//!
//! Jobs are held open by a scripted executor so each test decides when a
//! download finishes.

mod common;

use std::sync::Arc;

use common::scripted::{wait_for_state, ScriptedExecutor};
use dlq_core::registry::{TaskMetadata, TaskState};
use dlq_core::DownloadManager;
use tempfile::tempdir;

fn scripted_manager(max_concurrent: usize) -> (DownloadManager, Arc<ScriptedExecutor>) {
    let mut slot = None;
    let manager = DownloadManager::with_executor(max_concurrent, |sm, _| {
        let executor = ScriptedExecutor::new(Arc::clone(sm.registry()));
        slot = Some(Arc::clone(&executor));
        executor
    });
    (manager, slot.unwrap())
}

fn in_playlist(id: &str, title: &str) -> TaskMetadata {
    TaskMetadata {
        playlist_id: Some(id.to_string()),
        title: Some(title.to_string()),
        ..TaskMetadata::default()
    }
}

#[tokio::test]
async fn playlists_drain_one_at_a_time() {
    let (m, exec) = scripted_manager(2);
    let dir = tempdir().unwrap();
    let a: Vec<_> = (0..3)
        .map(|i| {
            m.add_download(&format!("https://media.test/a{i}"), dir.path(), in_playlist("A", "a"))
                .unwrap()
        })
        .collect();
    let single = m
        .add_download("https://media.test/solo", dir.path(), TaskMetadata::default())
        .unwrap();
    let b = m
        .add_download("https://media.test/b0", dir.path(), in_playlist("B", "b"))
        .unwrap();

    wait_for_state(&m, a[0], TaskState::Downloading).await;
    wait_for_state(&m, a[1], TaskState::Downloading).await;
    // The freed slot goes to the playlist's remaining member.
    exec.finish(a[0], Ok(())).await;
    wait_for_state(&m, a[2], TaskState::Downloading).await;
    assert_eq!(m.get(single).unwrap().state, TaskState::Queued);

    // Nothing of A is left to admit, so the next group in line gets the slot.
    exec.finish(a[1], Ok(())).await;
    wait_for_state(&m, single, TaskState::Downloading).await;
    assert_eq!(m.get(b).unwrap().state, TaskState::Queued);

    exec.finish(a[2], Err("gone")).await;
    exec.finish(single, Ok(())).await;
    wait_for_state(&m, b, TaskState::Downloading).await;
    exec.finish(b, Ok(())).await;
    m.wait_idle().await;

    assert_eq!(exec.started(), vec![a[0], a[1], a[2], single, b]);
    let stats = m.stats();
    assert_eq!(stats.registry.completed, 4);
    assert_eq!(stats.registry.error, 1);
    assert_eq!(stats.gate.available, 2);
}

#[tokio::test]
async fn cancelling_the_rest_of_a_group_moves_on() {
    let (m, exec) = scripted_manager(1);
    let dir = tempdir().unwrap();
    let first = m
        .add_download("https://media.test/p0", dir.path(), in_playlist("P", "x"))
        .unwrap();
    let second = m
        .add_download("https://media.test/p1", dir.path(), in_playlist("P", "y"))
        .unwrap();
    let other = m
        .add_download("https://media.test/q0", dir.path(), in_playlist("Q", "z"))
        .unwrap();

    wait_for_state(&m, first, TaskState::Downloading).await;
    m.cancel(second).unwrap();
    assert_eq!(m.get(second).unwrap().state, TaskState::Stopped);
    m.cancel(first).unwrap();
    wait_for_state(&m, first, TaskState::Stopped).await;

    wait_for_state(&m, other, TaskState::Downloading).await;
    assert!(exec.is_running(other));
    exec.finish(other, Ok(())).await;
    m.wait_idle().await;
    assert_eq!(exec.started(), vec![first, other]);
}

#[tokio::test]
async fn late_members_queue_behind_earlier_groups() {
    let (m, exec) = scripted_manager(1);
    let dir = tempdir().unwrap();
    let p0 = m
        .add_download("https://media.test/p0", dir.path(), in_playlist("P", "0"))
        .unwrap();
    let single = m
        .add_download("https://media.test/s", dir.path(), TaskMetadata::default())
        .unwrap();
    wait_for_state(&m, p0, TaskState::Downloading).await;
    let p1 = m
        .add_download("https://media.test/p1", dir.path(), in_playlist("P", "1"))
        .unwrap();

    exec.finish(p0, Ok(())).await;
    wait_for_state(&m, single, TaskState::Downloading).await;
    assert_eq!(m.get(p1).unwrap().state, TaskState::Queued);
    exec.finish(single, Ok(())).await;
    wait_for_state(&m, p1, TaskState::Downloading).await;
    exec.finish(p1, Ok(())).await;
    m.wait_idle().await;
    assert_eq!(exec.started(), vec![p0, single, p1]);
}

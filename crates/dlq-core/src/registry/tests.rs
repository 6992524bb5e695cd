//! Tests for the task registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

#[derive(Debug)]
struct CountingHandle(Arc<AtomicUsize>);

impl ExecutionHandle for CountingHandle {
    fn terminate(&mut self) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn playlist(id: &str) -> TaskMetadata {
    TaskMetadata {
        playlist_id: Some(id.to_string()),
        ..TaskMetadata::default()
    }
}

#[test]
fn create_assigns_increasing_ids_in_created_state() {
    let reg = TaskRegistry::new();
    let a = reg.create("https://a.test/1", "/tmp", TaskMetadata::default());
    let b = reg.create("https://a.test/2", "/tmp", TaskMetadata::default());
    assert_eq!(a, 1);
    assert_eq!(b, 2);
    let task = reg.get(a).unwrap();
    assert_eq!(task.state, TaskState::Created);
    assert_eq!(task.progress, 0.0);
    assert!(task.error.is_none());
    assert!(task.started_at.is_none());
    assert!(task.finished_at.is_none());
}

#[test]
fn group_key_from_metadata() {
    let reg = TaskRegistry::new();
    let single = reg.create("https://a.test/1", "/tmp", TaskMetadata::default());
    let grouped = reg.create("https://a.test/2", "/tmp", playlist("P"));
    assert_eq!(reg.get(single).unwrap().group, GroupKey::Single(single));
    assert_eq!(reg.get(single).unwrap().group.to_string(), "single_1");
    assert_eq!(
        reg.get(grouped).unwrap().group,
        GroupKey::Playlist("P".to_string())
    );
}

#[test]
fn get_all_keeps_insertion_order_and_get_by_state_filters() {
    let reg = TaskRegistry::new();
    let ids: Vec<_> = (0..4)
        .map(|i| reg.create(format!("https://a.test/{i}"), "/tmp", TaskMetadata::default()))
        .collect();
    reg.update_state(ids[1], TaskState::Queued);
    reg.update_state(ids[3], TaskState::Queued);
    let all: Vec<_> = reg.get_all().into_iter().map(|t| t.id).collect();
    assert_eq!(all, ids);
    let queued: Vec<_> = reg
        .get_by_state(TaskState::Queued)
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(queued, vec![ids[1], ids[3]]);
}

#[test]
fn update_state_stamps_timestamps_and_clears_handle_on_terminal() {
    let reg = TaskRegistry::new();
    let id = reg.create("https://a.test/x", "/tmp", TaskMetadata::default());
    let kills = Arc::new(AtomicUsize::new(0));
    reg.update_state(id, TaskState::Downloading);
    let started = reg.get(id).unwrap().started_at;
    assert!(started.is_some());
    reg.set_execution_handle(id, Some(Box::new(CountingHandle(Arc::clone(&kills)))));
    assert!(reg.get(id).unwrap().has_execution_handle);

    reg.update_state(id, TaskState::Cancelling);
    reg.update_state(id, TaskState::Downloading);
    assert_eq!(reg.get(id).unwrap().started_at, started, "started stamped once");

    reg.update_state(id, TaskState::AlreadyExists);
    let task = reg.get(id).unwrap();
    assert!(task.finished_at.is_some());
    assert!(!task.has_execution_handle);
    assert_eq!(kills.load(Ordering::SeqCst), 0, "terminal state drops, not kills");
}

#[test]
fn progress_is_clamped() {
    let reg = TaskRegistry::new();
    let id = reg.create("https://a.test/x", "/tmp", TaskMetadata::default());
    reg.update_progress(id, 150.0);
    assert_eq!(reg.get(id).unwrap().progress, 100.0);
    reg.update_progress(id, -3.0);
    assert_eq!(reg.get(id).unwrap().progress, 0.0);
    reg.update_progress(id, 42.5);
    assert_eq!(reg.get(id).unwrap().progress, 42.5);
    reg.update_progress(id, f64::NAN);
    assert_eq!(reg.get(id).unwrap().progress, 0.0);
}

#[test]
fn unknown_ids_are_soft_failures() {
    let reg = TaskRegistry::new();
    assert!(reg.get(7).is_none());
    assert!(!reg.exists(7));
    assert!(!reg.update_state(7, TaskState::Queued));
    assert!(!reg.update_progress(7, 1.0));
    assert!(!reg.set_error(7, "x"));
    assert!(!reg.set_execution_handle(7, None));
    assert!(!reg.terminate_execution(7));
    assert!(!reg.remove(7));
}

#[test]
fn remove_and_clear_terminate_live_handles() {
    let reg = TaskRegistry::new();
    let kills = Arc::new(AtomicUsize::new(0));
    let a = reg.create("https://a.test/a", "/tmp", TaskMetadata::default());
    let b = reg.create("https://a.test/b", "/tmp", TaskMetadata::default());
    let c = reg.create("https://a.test/c", "/tmp", TaskMetadata::default());
    for id in [a, b, c] {
        reg.set_execution_handle(id, Some(Box::new(CountingHandle(Arc::clone(&kills)))));
    }
    assert!(reg.remove(a));
    assert!(!reg.exists(a));
    assert_eq!(kills.load(Ordering::SeqCst), 1);

    assert!(reg.terminate_execution(b));
    assert!(reg.get(b).unwrap().has_execution_handle, "terminate keeps the handle");
    assert_eq!(kills.load(Ordering::SeqCst), 2);

    reg.clear();
    assert!(reg.get_all().is_empty());
    assert_eq!(kills.load(Ordering::SeqCst), 4);
}

#[test]
fn stats_count_every_state() {
    let reg = TaskRegistry::new();
    for state in TaskState::ALL {
        let id = reg.create("https://a.test/x", "/tmp", TaskMetadata::default());
        reg.update_state(id, state);
    }
    let stats = reg.get_stats();
    assert_eq!(stats.total, 8);
    assert_eq!(stats.created, 1);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.downloading, 1);
    assert_eq!(stats.cancelling, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.error, 1);
    assert_eq!(stats.stopped, 1);
    assert_eq!(stats.already_exists, 1);
    assert_eq!(stats.live(), 4);
}

#[test]
fn state_display_uses_wire_names() {
    assert_eq!(TaskState::AlreadyExists.to_string(), "ALREADY_EXISTS");
    assert_eq!(
        serde_json::to_string(&TaskState::Cancelling).unwrap(),
        "\"CANCELLING\""
    );
}

#[test]
fn compare_and_update_only_applies_on_expected_state() {
    let reg = TaskRegistry::new();
    let id = reg.create("https://a.test/x", "/tmp", TaskMetadata::default());
    assert_eq!(
        reg.compare_and_update_state(id, TaskState::Queued, TaskState::Downloading),
        Some(false)
    );
    assert_eq!(reg.state_of(id), Some(TaskState::Created));
    assert_eq!(
        reg.compare_and_update_state(id, TaskState::Created, TaskState::Queued),
        Some(true)
    );
    assert_eq!(reg.state_of(id), Some(TaskState::Queued));
    assert_eq!(
        reg.compare_and_update_state(99, TaskState::Created, TaskState::Queued),
        None
    );
}

#[test]
fn debug_output_summarises_the_store() {
    let reg = TaskRegistry::new();
    reg.create("https://a.test/1", "/tmp", TaskMetadata::default());
    reg.create("https://a.test/2", "/tmp", TaskMetadata::default());
    assert_eq!(
        format!("{:?}", reg),
        "TaskRegistry { tasks: 2, next_id: 3 }"
    );
}

//! Coarse-grained restore progress notifications.

use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// A phase transition reported to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RestoreProgress {
    Started { projects: usize },
    Planned { restore: usize, skip: usize },
    ProjectSkipped { project: String },
    ProjectStarted { project: String },
    ProjectFinished { project: String, success: bool },
    Finished {
        restored: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Caller-supplied progress sink.
pub type ProgressFn<'a> = dyn Fn(&RestoreProgress) + Send + Sync + 'a;

/// Deliver `event`. A panicking callback is logged and otherwise ignored.
pub(crate) fn notify(progress: Option<&ProgressFn<'_>>, event: &RestoreProgress) {
    let Some(callback) = progress else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
        warn!(?event, "Progress callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_notify_delivers_events() {
        let seen = Mutex::new(Vec::new());
        let callback = |event: &RestoreProgress| seen.lock().unwrap().push(event.clone());

        notify(Some(&callback), &RestoreProgress::Started { projects: 2 });
        notify(None, &RestoreProgress::Started { projects: 3 });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![RestoreProgress::Started { projects: 2 }]
        );
    }

    #[test]
    fn test_notify_swallows_panics() {
        let callback = |_: &RestoreProgress| panic!("sink exploded");
        notify(
            Some(&callback),
            &RestoreProgress::ProjectStarted {
                project: "app".into(),
            },
        );
    }

    #[test]
    fn test_progress_serializes_with_phase_tag() {
        let json = serde_json::to_string(&RestoreProgress::Planned { restore: 1, skip: 2 }).unwrap();
        assert_eq!(json, r#"{"phase":"planned","restore":1,"skip":2}"#);
    }
}

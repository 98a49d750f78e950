//! Aggregate status and change detection for the periodic status poll

use crate::types::{Event, StatusSummary, TaskId, TaskSnapshot, TaskStatus};
use std::collections::HashMap;

impl StatusSummary {
    /// Count tasks per status and compute combined speed and progress
    ///
    /// `percent` is the mean progress of queued and active tasks, 0 when there
    /// are none.
    pub fn from_snapshots(snapshots: &[TaskSnapshot]) -> Self {
        let mut summary = StatusSummary::default();
        let mut progress_sum = 0.0;
        let mut progress_count = 0usize;

        for snapshot in snapshots {
            match snapshot.status {
                TaskStatus::Queued => summary.queued += 1,
                TaskStatus::Downloading | TaskStatus::Pausing | TaskStatus::Cancelling => {
                    summary.active += 1;
                    summary.speed_bps += snapshot.speed_bps;
                }
                TaskStatus::Paused => summary.paused += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Done => summary.done += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
            }
            if snapshot.status == TaskStatus::Queued || snapshot.status.is_active() {
                progress_sum += snapshot.progress;
                progress_count += 1;
            }
        }

        if progress_count > 0 {
            summary.percent = progress_sum / progress_count as f64 * 100.0;
        }
        summary
    }
}

/// Remembers what observers last saw so each poll only reports changes
#[derive(Debug, Default)]
pub(crate) struct StatusTracker {
    last: HashMap<TaskId, TaskSnapshot>,
    last_summary: Option<StatusSummary>,
}

impl StatusTracker {
    /// Diff `snapshots` against the previous poll
    ///
    /// Emits `TaskUpdated` for every task whose snapshot changed, followed by one
    /// `SummaryUpdated` when the aggregate changed.
    pub(crate) fn poll(&mut self, snapshots: &[TaskSnapshot]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut current = HashMap::with_capacity(snapshots.len());

        for snapshot in snapshots {
            if self.last.get(&snapshot.id) != Some(snapshot) {
                events.push(Event::TaskUpdated {
                    task: snapshot.clone(),
                });
            }
            current.insert(snapshot.id, snapshot.clone());
        }
        self.last = current;

        let summary = StatusSummary::from_snapshots(snapshots);
        if self.last_summary.as_ref() != Some(&summary) {
            events.push(Event::SummaryUpdated {
                summary: summary.clone(),
            });
            self.last_summary = Some(summary);
        }
        events
    }
}

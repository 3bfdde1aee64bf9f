//! # Audit Trail Recorder
//!
//! Appends change-history entries to a job. Entries are only ever pushed;
//! nothing in the crate removes or reorders them. Derived totals are not
//! audited since they can be recomputed from the audited inputs.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::models::{Actor, ChangeHistoryEntry, ChangeKind, RepairJob};

/// Append one entry and return it.
///
/// The timestamp never runs backwards relative to the last entry, so the log
/// stays ordered even if the wall clock steps back.
pub fn record_change<'a>(
    job: &'a mut RepairJob,
    field: &str,
    old_value: Value,
    new_value: Value,
    kind: ChangeKind,
    actor: &Actor,
) -> &'a ChangeHistoryEntry {
    let now = Utc::now();
    let changed_at = match job.change_history.last() {
        Some(last) if last.changed_at > now => last.changed_at,
        _ => now,
    };

    debug!(
        job_id = %job.id,
        field,
        actor = %actor,
        kind = ?kind,
        "Recording change"
    );

    job.updated_at = changed_at;
    job.change_history.push(ChangeHistoryEntry {
        changed_at,
        changed_by: actor.clone(),
        field: field.to_string(),
        old_value,
        new_value,
        change_type: kind,
    });
    &job.change_history[job.change_history.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::sample_job;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn appends_fully_populated_entry() {
        let mut job = sample_job();
        let before = job.change_history.len();
        let actor = Actor::new("alice");

        let entry = record_change(
            &mut job,
            "repairCost",
            json!(500),
            json!(650),
            ChangeKind::Update,
            &actor,
        )
        .clone();

        assert_eq!(job.change_history.len(), before + 1);
        assert_eq!(entry.field, "repairCost");
        assert_eq!(entry.changed_by.as_str(), "alice");
        assert_eq!(entry.old_value, json!(500));
        assert_eq!(entry.new_value, json!(650));
        assert_eq!(entry.change_type, ChangeKind::Update);
        assert_eq!(job.updated_at, entry.changed_at);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut job = sample_job();
        let future = Utc::now() + Duration::hours(1);
        record_change(&mut job, "a", Value::Null, json!(1), ChangeKind::Update, &Actor::default());
        job.change_history.last_mut().unwrap().changed_at = future;

        let entry = record_change(&mut job, "b", Value::Null, json!(2), ChangeKind::Update, &Actor::default());
        assert_eq!(entry.changed_at, future);
    }

    #[test]
    fn blank_actor_defaults_to_system() {
        assert_eq!(Actor::new("  ").as_str(), "System");
        assert_eq!(Actor::from_option(None).as_str(), "System");
        assert_eq!(Actor::from_option(Some("bob")).as_str(), "bob");
    }
}

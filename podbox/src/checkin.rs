// SPDX-License-Identifier: MIT OR Apache-2.0

//! Types and process-local state of ticket check-ins.
//!
//! A check-in moves a ticket from unconsumed to pending to consumed. Pending markers live in
//! memory only: they make concurrent attempts in this process observe each other while the
//! backend call is in flight, and are pruned once a load cycle reflects the backend's state.
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use podbox_core::{Credential, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason a check-in was refused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum CheckinError {
    /// Requester is not allowed to check in this ticket.
    NotSuperuser,

    /// Requester's credential could not be verified.
    InvalidSignature,

    /// No ticket with this id exists in the pipeline.
    InvalidTicket,

    #[serde(rename_all = "camelCase")]
    AlreadyCheckedIn {
        checkin_timestamp: Option<Timestamp>,
        checker: Option<String>,
    },

    ServerError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinRequest {
    pub credential: Credential,
    pub ticket_id: Uuid,
}

/// Ticket details shown to the checker before confirming.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPreview {
    pub ticket_id: Uuid,
    pub event_name: String,
    pub ticket_name: String,
    pub attendee_name: String,
    pub attendee_email: String,
}

/// Result of the pre-check step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
    pub success: bool,
    pub can_check_in: bool,
    pub permissioned: bool,
    pub ticket: Option<TicketPreview>,
    pub error: Option<CheckinError>,
}

impl ActionConfig {
    pub(crate) fn allowed(ticket: TicketPreview) -> Self {
        Self {
            success: true,
            can_check_in: true,
            permissioned: true,
            ticket: Some(ticket),
            error: None,
        }
    }

    pub(crate) fn refused(error: CheckinError) -> Self {
        Self {
            success: false,
            can_check_in: false,
            permissioned: matches!(error, CheckinError::AlreadyCheckedIn { .. }),
            ticket: None,
            error: Some(error),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub success: bool,
    pub error: Option<CheckinError>,
}

impl CheckinResponse {
    pub(crate) fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub(crate) fn failed(error: CheckinError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingStatus {
    Pending,
    Success,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCheckin {
    pub status: PendingStatus,
    /// Time of the check-in as reported to other checkers.
    pub timestamp: Timestamp,
    pub checker: String,
    /// Time the backend acknowledged the push.
    pub succeeded_at: Option<Timestamp>,
}

/// Process-local check-in markers of one pipeline, keyed by ticket id.
#[derive(Clone, Debug, Default)]
pub struct PendingCheckins {
    inner: Arc<Mutex<HashMap<Uuid, PendingCheckin>>>,
}

impl PendingCheckins {
    pub fn get(&self, ticket_id: Uuid) -> Option<PendingCheckin> {
        self.inner
            .lock()
            .expect("acquire lock on pending check-ins")
            .get(&ticket_id)
            .cloned()
    }

    /// Places a `Pending` marker, returns the existing entry if there is one.
    pub fn try_mark_pending(
        &self,
        ticket_id: Uuid,
        checker: &str,
        timestamp: Timestamp,
    ) -> Result<(), PendingCheckin> {
        let mut inner = self.inner.lock().expect("acquire lock on pending check-ins");
        match inner.entry(ticket_id) {
            Entry::Occupied(entry) => Err(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(PendingCheckin {
                    status: PendingStatus::Pending,
                    timestamp,
                    checker: checker.to_string(),
                    succeeded_at: None,
                });
                Ok(())
            }
        }
    }

    /// Flags the marker as pushed, `timestamp` being the time the backend acknowledged it.
    pub fn mark_success(&self, ticket_id: Uuid, timestamp: Timestamp) {
        if let Some(entry) = self
            .inner
            .lock()
            .expect("acquire lock on pending check-ins")
            .get_mut(&ticket_id)
        {
            entry.status = PendingStatus::Success;
            entry.succeeded_at = Some(timestamp);
        }
    }

    pub fn remove(&self, ticket_id: Uuid) {
        self.inner
            .lock()
            .expect("acquire lock on pending check-ins")
            .remove(&ticket_id);
    }

    /// Drops `Success` markers the backend data of a load reflects.
    ///
    /// A marker is reflected when its push was acknowledged before the load started fetching, or
    /// when the loaded data already shows the ticket as checked in. Pushes finishing during the
    /// load keep their marker until the next load.
    pub fn prune(&self, load_started_at: Timestamp, checked_in: impl Fn(Uuid) -> bool) -> usize {
        let mut inner = self.inner.lock().expect("acquire lock on pending check-ins");
        let before = inner.len();
        inner.retain(|ticket_id, entry| {
            let Some(succeeded_at) = entry.succeeded_at else {
                return true;
            };
            !(succeeded_at < load_started_at || checked_in(*ticket_id))
        });
        before - inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("acquire lock on pending check-ins")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{CheckinError, PendingCheckins, PendingStatus};

    #[test]
    fn second_marker_observes_first() {
        let pending = PendingCheckins::default();
        let ticket_id = Uuid::new_v4();

        assert!(pending.try_mark_pending(ticket_id, "a@example.org", 10).is_ok());
        let existing = pending
            .try_mark_pending(ticket_id, "b@example.org", 11)
            .unwrap_err();
        assert_eq!(existing.checker, "a@example.org");
        assert_eq!(existing.status, PendingStatus::Pending);
    }

    #[test]
    fn prune_keeps_pending_and_late_successes() {
        let pending = PendingCheckins::default();
        let in_flight = Uuid::new_v4();
        let done = Uuid::new_v4();
        let done_later = Uuid::new_v4();

        pending.try_mark_pending(in_flight, "a", 5).unwrap();
        pending.try_mark_pending(done, "a", 5).unwrap();
        pending.try_mark_pending(done_later, "a", 5).unwrap();
        pending.mark_success(done, 8);
        pending.mark_success(done_later, 12);

        assert_eq!(pending.prune(10, |_| false), 1);
        assert!(pending.get(done).is_none());
        assert!(pending.get(in_flight).is_some());

        // Placed before the load started, acknowledged while it was fetching.
        let marker = pending.get(done_later).unwrap();
        assert_eq!(marker.status, PendingStatus::Success);
        assert_eq!(marker.timestamp, 5);
        assert_eq!(marker.succeeded_at, Some(12));
    }

    #[test]
    fn loaded_checkins_confirm_markers() {
        let pending = PendingCheckins::default();
        let in_flight = Uuid::new_v4();
        let done = Uuid::new_v4();

        pending.try_mark_pending(in_flight, "a", 10).unwrap();
        pending.try_mark_pending(done, "a", 10).unwrap();
        pending.mark_success(done, 10);

        assert_eq!(pending.prune(10, |_| false), 0);
        assert_eq!(pending.prune(10, |ticket_id| ticket_id == done), 1);
        assert!(pending.get(done).is_none());

        // Markers of pushes still in flight are never dropped.
        assert_eq!(pending.prune(100, |_| true), 0);
        assert!(pending.get(in_flight).is_some());
    }

    #[test]
    fn errors_serialize_with_name_tag() {
        let json = serde_json::to_value(CheckinError::AlreadyCheckedIn {
            checkin_timestamp: Some(1),
            checker: Some("door@example.org".into()),
        })
        .unwrap();
        assert_eq!(json["name"], "AlreadyCheckedIn");
        assert_eq!(json["checker"], "door@example.org");

        let json = serde_json::to_value(CheckinError::NotSuperuser).unwrap();
        assert_eq!(json["name"], "NotSuperuser");
    }
}

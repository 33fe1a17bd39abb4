use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{LeadId, LeadLogId, UserId};
use super::error::CrmError;
use super::repository::CrmRepository;

/// Longest old/new value stored verbatim on an audit row.
pub const MAX_LOGGED_VALUE_CHARS: usize = 100;

/// Kind of change an audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadAction {
    Created,
    StatusChanged,
    MovedToTrash,
    Restored,
    NextCallUpdated,
    LastCallUpdated,
    RemarksUpdated,
    EnrollmentCreated,
}

impl LeadAction {
    pub const fn label(self) -> &'static str {
        match self {
            LeadAction::Created => "Lead Created",
            LeadAction::StatusChanged => "Status Changed",
            LeadAction::MovedToTrash => "Moved to Trash",
            LeadAction::Restored => "Restored from Trash",
            LeadAction::NextCallUpdated => "Next Call Updated",
            LeadAction::LastCallUpdated => "Last Call Updated",
            LeadAction::RemarksUpdated => "Remarks Updated",
            LeadAction::EnrollmentCreated => "Enrollment Created",
        }
    }
}

/// Immutable audit row describing one change to a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadLog {
    pub id: LeadLogId,
    pub lead: LeadId,
    pub action: LeadAction,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Audit row before it receives its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadLogDraft {
    pub lead: LeadId,
    pub action: LeadAction,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Option<UserId>,
    pub description: String,
}

impl LeadLogDraft {
    pub fn new(lead: LeadId, action: LeadAction, description: impl Into<String>) -> Self {
        Self {
            lead,
            action,
            field_changed: None,
            old_value: None,
            new_value: None,
            changed_by: None,
            description: description.into(),
        }
    }

    pub fn field(
        mut self,
        name: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        self.field_changed = Some(name.to_string());
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn changed_by(mut self, user: UserId) -> Self {
        self.changed_by = Some(user);
        self
    }
}

static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Append-only history of lead changes.
pub struct AuditLog<R> {
    repository: Arc<R>,
}

impl<R> Clone for AuditLog<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R> AuditLog<R>
where
    R: CrmRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Assign id and timestamp. The row is persisted by whoever commits it.
    pub fn stamp(&self, draft: LeadLogDraft) -> LeadLog {
        let id = LeadLogId(LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed));
        LeadLog {
            id,
            lead: draft.lead,
            action: draft.action,
            field_changed: draft.field_changed,
            old_value: draft.old_value,
            new_value: draft.new_value,
            changed_by: draft.changed_by,
            timestamp: Utc::now(),
            description: draft.description,
        }
    }

    pub fn append(&self, draft: LeadLogDraft) -> Result<LeadLog, CrmError> {
        let log = self.stamp(draft);
        self.repository.append_log(log.clone())?;
        Ok(log)
    }

    /// History of a lead in chronological order.
    pub fn list_for_lead(&self, lead: LeadId) -> Result<Vec<LeadLog>, CrmError> {
        let mut logs = self.repository.logs_for_lead(lead)?;
        logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(logs)
    }
}

/// Clip long free text so audit rows stay compact.
pub fn truncate_value(value: &str) -> String {
    if value.chars().count() <= MAX_LOGGED_VALUE_CHARS {
        return value.to_string();
    }
    let mut clipped: String = value.chars().take(MAX_LOGGED_VALUE_CHARS).collect();
    clipped.push_str("...");
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_at_the_limit_are_kept() {
        let exact = "r".repeat(MAX_LOGGED_VALUE_CHARS);
        assert_eq!(truncate_value(&exact), exact);
    }

    #[test]
    fn longer_values_are_clipped_with_ellipsis() {
        let long = "é".repeat(MAX_LOGGED_VALUE_CHARS + 1);
        let clipped = truncate_value(&long);
        assert!(clipped.ends_with("..."));
        assert_eq!(clipped.chars().count(), MAX_LOGGED_VALUE_CHARS + 3);
    }

    #[test]
    fn draft_builder_records_field_and_actor() {
        let draft = LeadLogDraft::new(LeadId(4), LeadAction::RemarksUpdated, "Remarks updated")
            .field("remarks", Some("old".to_string()), Some("new".to_string()))
            .changed_by(UserId(9));
        assert_eq!(draft.field_changed.as_deref(), Some("remarks"));
        assert_eq!(draft.changed_by, Some(UserId(9)));
        assert_eq!(draft.new_value.as_deref(), Some("new"));
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::audit::{truncate_value, AuditLog, LeadAction, LeadLogDraft};
use super::domain::{
    Actor, CourseId, Enrollment, Lead, LeadId, LeadPatch, LeadStatus, NewLead,
};
use super::enrollment::EnrollmentManager;
use super::error::CrmError;
use super::repository::{CrmRepository, LeadFilter, LeadUnitOfWork, LeadWrite, RepositoryError};

static LEAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Rebuilds allowed when concurrent writers keep moving a lead's revision.
const MAX_COMMIT_ATTEMPTS: usize = 3;

fn next_lead_id() -> LeadId {
    LeadId(LEAD_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Owns leads and turns each create/update into a single committed unit of work.
pub struct LeadStore<R> {
    repository: Arc<R>,
    audit: AuditLog<R>,
    enrollments: EnrollmentManager<R>,
}

impl<R> Clone for LeadStore<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            audit: self.audit.clone(),
            enrollments: self.enrollments.clone(),
        }
    }
}

impl<R> LeadStore<R>
where
    R: CrmRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        audit: AuditLog<R>,
        enrollments: EnrollmentManager<R>,
    ) -> Self {
        Self {
            repository,
            audit,
            enrollments,
        }
    }

    pub fn create(&self, new_lead: NewLead, actor: &Actor) -> Result<Lead, CrmError> {
        new_lead.profile.validate()?;
        self.check_course(new_lead.course)?;

        let now = Utc::now();
        let lead = Lead {
            id: next_lead_id(),
            status: new_lead.status,
            profile: new_lead.profile,
            course: new_lead.course,
            last_call: new_lead.last_call,
            next_call: new_lead.next_call,
            remarks: new_lead.remarks,
            created_by: Some(actor.id),
            revision: 1,
            add_date: now.date_naive(),
            created_at: now,
            updated_at: now,
        };

        let mut drafts = vec![LeadLogDraft::new(
            lead.id,
            LeadAction::Created,
            format!("Lead created with status {}", lead.status),
        )
        .field("status", None, Some(lead.status.label().to_string()))];

        let enrollment = if lead.is_converted() {
            self.enrollments.convert(&lead)?
        } else {
            None
        };
        if let Some(enrollment) = &enrollment {
            drafts.push(
                LeadLogDraft::new(
                    lead.id,
                    LeadAction::EnrollmentCreated,
                    "Enrollment created automatically",
                )
                .field("enrollment", None, Some(enrollment.id.to_string())),
            );
        }

        let unit = self.unit_of_work(LeadWrite::Insert(lead), drafts, enrollment, actor);
        let lead = self.commit(unit)?;
        info!(lead_id = %lead.id, status = %lead.status, user_id = %actor.id, "lead created");
        Ok(lead)
    }

    pub fn update(&self, id: LeadId, patch: LeadPatch, actor: &Actor) -> Result<Lead, CrmError> {
        let lead = self.get(id)?;
        self.apply_update(lead, &patch, actor, |_| Ok(()))
    }

    /// Shared by the main and trash update paths once the caller has loaded `before`.
    ///
    /// `admit` gates each snapshot the change set is built from. When another writer
    /// commits first, the lead is reloaded and the change set rebuilt against it.
    pub(crate) fn apply_update<F>(
        &self,
        mut before: Lead,
        patch: &LeadPatch,
        actor: &Actor,
        admit: F,
    ) -> Result<Lead, CrmError>
    where
        F: Fn(&Lead) -> Result<(), CrmError>,
    {
        if let Some(course) = patch.course {
            self.check_course(course)?;
        }

        let mut attempt = 1;
        loop {
            admit(&before)?;
            match self.build_and_commit(&before, patch, actor) {
                Err(CrmError::Repository(RepositoryError::Stale))
                    if attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    debug!(
                        lead_id = %before.id,
                        attempt,
                        "lead changed underneath update, rebuilding"
                    );
                    before = self.get(before.id)?;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn build_and_commit(
        &self,
        before: &Lead,
        patch: &LeadPatch,
        actor: &Actor,
    ) -> Result<Lead, CrmError> {
        let mut after = before.clone();
        if let Some(status) = patch.status {
            after.status = status;
        }
        if let Some(course) = patch.course {
            after.course = course;
        }
        if let Some(last_call) = patch.last_call {
            after.last_call = last_call;
        }
        if let Some(next_call) = patch.next_call {
            after.next_call = next_call;
        }
        if let Some(remarks) = &patch.remarks {
            after.remarks = remarks.clone();
        }
        patch.profile.clone().apply(&mut after.profile);
        after.profile.validate()?;
        after.revision = before.revision + 1;
        after.updated_at = Utc::now();

        let mut drafts = change_drafts(before, &after, patch);

        let converting = before.status != LeadStatus::Converted && after.is_converted();
        let enrollment = if converting {
            self.enrollments.convert(&after)?
        } else {
            None
        };
        if let Some(enrollment) = &enrollment {
            drafts.push(
                LeadLogDraft::new(
                    after.id,
                    LeadAction::EnrollmentCreated,
                    "Enrollment created upon conversion",
                )
                .field("enrollment", None, Some(enrollment.id.to_string())),
            );
        }

        let unit = self.unit_of_work(LeadWrite::Update(after), drafts, enrollment, actor);
        debug!(lead_id = %before.id, logs = unit.logs.len(), "committing lead update");
        let lead = self.commit(unit)?;

        if converting {
            info!(lead_id = %lead.id, user_id = %actor.id, "lead converted");
        } else if before.in_trash() && !lead.in_trash() {
            info!(lead_id = %lead.id, status = %lead.status, "lead restored from trash");
        }
        Ok(lead)
    }

    /// Leads whose status is not excluded, ordered by id.
    pub fn list(&self, exclude: &[LeadStatus]) -> Result<Vec<Lead>, CrmError> {
        Ok(self.repository.leads(&LeadFilter::excluding(exclude))?)
    }

    pub fn list_active(&self) -> Result<Vec<Lead>, CrmError> {
        self.list(&LeadStatus::INACTIVE)
    }

    pub(crate) fn query(&self, filter: &LeadFilter) -> Result<Vec<Lead>, CrmError> {
        Ok(self.repository.leads(filter)?)
    }

    pub fn get(&self, id: LeadId) -> Result<Lead, CrmError> {
        self.repository
            .fetch_lead(id)?
            .ok_or_else(|| CrmError::not_found(LeadId::ENTITY, id.0))
    }

    /// Physically remove a lead together with its enrollment.
    pub fn delete(&self, id: LeadId, actor: &Actor) -> Result<Lead, CrmError> {
        let lead = self.repository.delete_lead(id).map_err(|err| match err {
            RepositoryError::NotFound => CrmError::not_found(LeadId::ENTITY, id.0),
            other => other.into(),
        })?;
        info!(lead_id = %id, user_id = %actor.id, "lead deleted");
        Ok(lead)
    }

    fn check_course(&self, course: Option<CourseId>) -> Result<(), CrmError> {
        match course {
            Some(id) if self.repository.fetch_course(id)?.is_none() => Err(CrmError::validation(
                "course",
                format!("course {id} does not exist"),
            )),
            _ => Ok(()),
        }
    }

    fn unit_of_work(
        &self,
        write: LeadWrite,
        drafts: Vec<LeadLogDraft>,
        enrollment: Option<Enrollment>,
        actor: &Actor,
    ) -> LeadUnitOfWork {
        let logs = drafts
            .into_iter()
            .map(|draft| self.audit.stamp(draft.changed_by(actor.id)))
            .collect();
        LeadUnitOfWork {
            write,
            logs,
            enrollment,
        }
    }

    fn commit(&self, unit: LeadUnitOfWork) -> Result<Lead, CrmError> {
        match self.repository.commit(&unit) {
            Ok(()) => Ok(unit.write.into_lead()),
            Err(RepositoryError::Conflict) if unit.enrollment.is_some() => {
                // Another writer converted this lead first; its enrollment stands.
                warn!(lead_id = %unit.lead().id, "enrollment already present, skipping creation");
                let unit = unit.without_enrollment();
                self.repository.commit(&unit)?;
                Ok(unit.write.into_lead())
            }
            Err(RepositoryError::NotFound) => {
                let id = unit.lead().id;
                Err(CrmError::not_found(LeadId::ENTITY, id.0))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Audit rows for the differences between two snapshots, in evaluation order.
///
/// Dates and remarks are only compared when the request carried them.
pub(crate) fn change_drafts(before: &Lead, after: &Lead, patch: &LeadPatch) -> Vec<LeadLogDraft> {
    let id = after.id;
    let old_status = before.status;
    let new_status = after.status;
    let mut drafts = Vec::new();

    if old_status != new_status {
        drafts.push(
            LeadLogDraft::new(
                id,
                LeadAction::StatusChanged,
                format!("Status changed from {old_status} to {new_status}"),
            )
            .field("status", status_value(old_status), status_value(new_status)),
        );
    }

    if new_status.is_trash() && !old_status.is_trash() {
        drafts.push(
            LeadLogDraft::new(
                id,
                LeadAction::MovedToTrash,
                format!("Lead moved to trash as {new_status}"),
            )
            .field("status", status_value(old_status), status_value(new_status)),
        );
    }

    if old_status.is_trash() && !new_status.is_trash() {
        drafts.push(
            LeadLogDraft::new(
                id,
                LeadAction::Restored,
                format!("Lead restored from {old_status} to {new_status}"),
            )
            .field("status", status_value(old_status), status_value(new_status)),
        );
    }

    if patch.next_call.is_some() && before.next_call != after.next_call {
        drafts.push(
            LeadLogDraft::new(
                id,
                LeadAction::NextCallUpdated,
                date_change_description("Next call", before.next_call, after.next_call),
            )
            .field(
                "next_call",
                date_value(before.next_call),
                date_value(after.next_call),
            ),
        );
    }

    if patch.last_call.is_some() && before.last_call != after.last_call {
        drafts.push(
            LeadLogDraft::new(
                id,
                LeadAction::LastCallUpdated,
                date_change_description("Last call", before.last_call, after.last_call),
            )
            .field(
                "last_call",
                date_value(before.last_call),
                date_value(after.last_call),
            ),
        );
    }

    if patch.remarks.is_some() && before.remarks != after.remarks {
        drafts.push(
            LeadLogDraft::new(id, LeadAction::RemarksUpdated, "Remarks updated").field(
                "remarks",
                Some(truncate_value(&before.remarks)),
                Some(truncate_value(&after.remarks)),
            ),
        );
    }

    drafts
}

fn status_value(status: LeadStatus) -> Option<String> {
    Some(status.label().to_string())
}

fn date_value(date: Option<NaiveDate>) -> Option<String> {
    date.map(|date| date.format("%Y-%m-%d").to_string())
}

fn date_change_description(label: &str, old: Option<NaiveDate>, new: Option<NaiveDate>) -> String {
    let render = |date: Option<NaiveDate>| {
        date.map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "not set".to_string())
    };
    format!("{label} changed from {} to {}", render(old), render(new))
}

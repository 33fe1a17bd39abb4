use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{Actor, Enrollment, EnrollmentId, EnrollmentPatch, Lead, LeadId};
use super::error::CrmError;
use super::repository::CrmRepository;

static ENROLLMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_enrollment_id() -> EnrollmentId {
    EnrollmentId(ENROLLMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Sole creator of enrollments; everything else is payment bookkeeping.
pub struct EnrollmentManager<R> {
    repository: Arc<R>,
}

impl<R> Clone for EnrollmentManager<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R> EnrollmentManager<R>
where
    R: CrmRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Stage the enrollment for a converting lead, or `None` when one already exists.
    ///
    /// The result is persisted by the lead's unit of work, not here.
    pub fn convert(&self, lead: &Lead) -> Result<Option<Enrollment>, CrmError> {
        if self.repository.enrollment_for_lead(lead.id)?.is_some() {
            return Ok(None);
        }

        let now = Utc::now();
        Ok(Some(Enrollment {
            id: next_enrollment_id(),
            lead: lead.id,
            course: lead.course,
            total_payment: None,
            first_installment: None,
            second_installment: None,
            third_installment: None,
            last_pay_date: None,
            payment_completed: false,
            created_at: now,
            updated_at: now,
        }))
    }

    pub fn get(&self, id: EnrollmentId) -> Result<Enrollment, CrmError> {
        self.repository
            .fetch_enrollment(id)?
            .ok_or_else(|| CrmError::not_found(EnrollmentId::ENTITY, id.0))
    }

    pub fn list(&self) -> Result<Vec<Enrollment>, CrmError> {
        Ok(self.repository.enrollments()?)
    }

    pub fn for_lead(&self, lead: LeadId) -> Result<Option<Enrollment>, CrmError> {
        Ok(self.repository.enrollment_for_lead(lead)?)
    }

    /// Record payment progress.
    pub fn update(
        &self,
        id: EnrollmentId,
        patch: EnrollmentPatch,
        actor: &Actor,
    ) -> Result<Enrollment, CrmError> {
        let mut enrollment = self.get(id)?;

        if let Some(total) = patch.total_payment {
            enrollment.total_payment = total;
        }
        if let Some(amount) = patch.first_installment {
            enrollment.first_installment = amount;
        }
        if let Some(amount) = patch.second_installment {
            enrollment.second_installment = amount;
        }
        if let Some(amount) = patch.third_installment {
            enrollment.third_installment = amount;
        }
        if let Some(date) = patch.last_pay_date {
            enrollment.last_pay_date = date;
        }
        if let Some(completed) = patch.payment_completed {
            enrollment.payment_completed = completed;
        }
        enrollment.updated_at = Utc::now();

        self.repository.update_enrollment(enrollment.clone())?;
        info!(enrollment_id = %id, user_id = %actor.id, "enrollment payment updated");
        Ok(enrollment)
    }
}

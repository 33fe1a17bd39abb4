use super::audit::{LeadAction, LeadLog};
use super::domain::{
    Course, CourseId, Enrollment, EnrollmentId, Lead, LeadId, LeadStatus, Role, User, UserId,
};

/// Status filter applied when querying leads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    /// Restrict results to these statuses when set.
    pub only: Option<Vec<LeadStatus>>,
    pub exclude: Vec<LeadStatus>,
}

impl LeadFilter {
    pub fn excluding(statuses: &[LeadStatus]) -> Self {
        Self {
            only: None,
            exclude: statuses.to_vec(),
        }
    }

    pub fn only(statuses: &[LeadStatus]) -> Self {
        Self {
            only: Some(statuses.to_vec()),
            exclude: Vec::new(),
        }
    }

    pub fn matches(&self, lead: &Lead) -> bool {
        let included = match &self.only {
            Some(only) => only.contains(&lead.status),
            None => true,
        };
        included && !self.exclude.contains(&lead.status)
    }
}

/// Whether the unit of work introduces a new lead or rewrites an existing one.
///
/// An update carries the next revision of the lead it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadWrite {
    Insert(Lead),
    Update(Lead),
}

impl LeadWrite {
    pub fn lead(&self) -> &Lead {
        match self {
            LeadWrite::Insert(lead) | LeadWrite::Update(lead) => lead,
        }
    }

    pub fn into_lead(self) -> Lead {
        match self {
            LeadWrite::Insert(lead) | LeadWrite::Update(lead) => lead,
        }
    }
}

/// Everything a single lead create/update persists. Stores must apply it entirely or
/// not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadUnitOfWork {
    pub write: LeadWrite,
    pub logs: Vec<LeadLog>,
    pub enrollment: Option<Enrollment>,
}

impl LeadUnitOfWork {
    pub fn lead(&self) -> &Lead {
        self.write.lead()
    }

    /// Drop the staged enrollment together with the audit row announcing it.
    pub fn without_enrollment(mut self) -> Self {
        self.enrollment = None;
        self.logs
            .retain(|log| log.action != LeadAction::EnrollmentCreated);
        self
    }
}

/// Record store backing the pipeline, so services can be exercised in isolation.
pub trait CrmRepository: Send + Sync {
    /// Atomically persist a lead write, its audit rows and an optional enrollment.
    ///
    /// Fails with `Conflict` when the enrollment's lead already has one, with
    /// `NotFound` when updating a lead that no longer exists, and with `Stale` when
    /// an update's revision does not directly follow the stored one.
    fn commit(&self, unit: &LeadUnitOfWork) -> Result<(), RepositoryError>;
    fn fetch_lead(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError>;
    fn leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError>;
    /// Remove a lead and cascade to its enrollment. Audit rows are retained.
    fn delete_lead(&self, id: LeadId) -> Result<Lead, RepositoryError>;

    fn enrollment_for_lead(&self, lead: LeadId) -> Result<Option<Enrollment>, RepositoryError>;
    fn fetch_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError>;
    fn enrollments(&self) -> Result<Vec<Enrollment>, RepositoryError>;
    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError>;

    fn append_log(&self, log: LeadLog) -> Result<(), RepositoryError>;
    fn logs_for_lead(&self, lead: LeadId) -> Result<Vec<LeadLog>, RepositoryError>;

    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError>;
    fn fetch_course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError>;
    fn courses(&self) -> Result<Vec<Course>, RepositoryError>;
    fn update_course(&self, course: Course) -> Result<(), RepositoryError>;
    /// Remove a course, clearing references from leads and enrollments.
    fn delete_course(&self, id: CourseId) -> Result<Course, RepositoryError>;

    fn insert_user(&self, user: User) -> Result<User, RepositoryError>;
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    fn users(&self, role: Option<Role>) -> Result<Vec<User>, RepositoryError>;
    fn update_user(&self, user: User) -> Result<(), RepositoryError>;
    /// Remove a user, clearing `created_by` on leads and `changed_by` on audit rows.
    fn delete_user(&self, id: UserId) -> Result<User, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was changed by another writer")]
    Stale,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}


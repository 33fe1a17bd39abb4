use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::crm::audit::{LeadAction, LeadLog};
use crate::crm::domain::{
    Actor, Course, CourseId, Enrollment, EnrollmentId, Lead, LeadId, LeadProfile, LeadStatus,
    NewLead, NewUser, Role, User, UserId,
};
use crate::crm::memory::InMemoryCrmRepository;
use crate::crm::repository::{
    CrmRepository, LeadFilter, LeadUnitOfWork, LeadWrite, RepositoryError,
};
use crate::crm::service::CrmService;

pub(super) struct Fixture<R> {
    pub(super) service: CrmService<R>,
    pub(super) repository: Arc<R>,
    pub(super) superadmin: Actor,
}

pub(super) fn fixture() -> Fixture<InMemoryCrmRepository> {
    fixture_with(InMemoryCrmRepository::new())
}

pub(super) fn fixture_with<R>(repository: R) -> Fixture<R>
where
    R: CrmRepository + 'static,
{
    let repository = Arc::new(repository);
    let service = CrmService::new(repository.clone());
    let superadmin = service
        .users()
        .bootstrap_superadmin("root")
        .expect("superadmin seeds")
        .actor();
    Fixture {
        service,
        repository,
        superadmin,
    }
}

impl<R> Fixture<R>
where
    R: CrmRepository + 'static,
{
    pub(super) fn user(&self, username: &str, role: Role) -> Actor {
        self.service
            .users()
            .create(
                NewUser {
                    username: username.to_string(),
                    email: Some(format!("{username}@example.com")),
                    role,
                },
                &self.superadmin,
            )
            .expect("user created")
            .actor()
    }

    pub(super) fn sales_rep(&self) -> Actor {
        self.user("priya", Role::SalesRep)
    }

    pub(super) fn course(&self, name: &str) -> CourseId {
        self.service
            .courses()
            .create(name, &self.superadmin)
            .expect("course created")
            .id
    }

    pub(super) fn lead(&self, status: LeadStatus, actor: &Actor) -> Lead {
        self.service
            .leads()
            .create(new_lead(status), actor)
            .expect("lead created")
    }

    pub(super) fn logs(&self, lead: LeadId) -> Vec<LeadLog> {
        self.service
            .audit()
            .list_for_lead(lead)
            .expect("logs listed")
    }

    /// Logs written after the creation row(s).
    pub(super) fn logs_after_create(&self, lead: LeadId) -> Vec<LeadLog> {
        self.logs(lead)
            .into_iter()
            .skip_while(|log| log.action == LeadAction::Created)
            .collect()
    }

    pub(super) fn enrollments_for(&self, lead: LeadId) -> Vec<Enrollment> {
        self.service
            .enrollments()
            .list()
            .expect("enrollments listed")
            .into_iter()
            .filter(|enrollment| enrollment.lead == lead)
            .collect()
    }
}

pub(super) fn new_lead(status: LeadStatus) -> NewLead {
    NewLead {
        status,
        profile: LeadProfile {
            parents_name: "Meera Shah".to_string(),
            student_name: "Arjun Shah".to_string(),
            email: Some("meera@example.com".to_string()),
            phone_number: "07700 900123".to_string(),
            grade: "7".to_string(),
            ..LeadProfile::default()
        },
        ..NewLead::default()
    }
}

pub(super) fn actions(logs: &[LeadLog]) -> Vec<LeadAction> {
    logs.iter().map(|log| log.action).collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// How [`ScriptedRepository`] interferes with commits.
pub(super) enum CommitScript {
    /// Fail every commit carrying an enrollment, as a broken enrollment insert would.
    FailEnrollment,
    /// Report that a competing writer enrolled the lead first. The competitor's
    /// enrollment is served from here from then on.
    RaceEnrollment { competitor: Mutex<Option<Enrollment>> },
    /// Let another writer set `status` just before the first lead update commits.
    ConcurrentEdit {
        status: LeadStatus,
        applied: AtomicBool,
    },
}

/// In-memory store with scripted behavior around lead commits.
pub(super) struct ScriptedRepository {
    pub(super) inner: InMemoryCrmRepository,
    script: CommitScript,
}

impl ScriptedRepository {
    fn scripted(script: CommitScript) -> Self {
        Self {
            inner: InMemoryCrmRepository::new(),
            script,
        }
    }

    pub(super) fn failing_enrollments() -> Self {
        Self::scripted(CommitScript::FailEnrollment)
    }

    pub(super) fn racing_enrollments() -> Self {
        Self::scripted(CommitScript::RaceEnrollment {
            competitor: Mutex::new(None),
        })
    }

    pub(super) fn concurrent_edit(status: LeadStatus) -> Self {
        Self::scripted(CommitScript::ConcurrentEdit {
            status,
            applied: AtomicBool::new(false),
        })
    }

    fn competitor(&self) -> Option<Enrollment> {
        match &self.script {
            CommitScript::RaceEnrollment { competitor } => {
                competitor.lock().expect("competitor lock").clone()
            }
            _ => None,
        }
    }
}

pub(super) const COMPETING_ENROLLMENT_OFFSET: u64 = 1_000_000;

impl CrmRepository for ScriptedRepository {
    fn commit(&self, unit: &LeadUnitOfWork) -> Result<(), RepositoryError> {
        match &self.script {
            CommitScript::FailEnrollment if unit.enrollment.is_some() => Err(
                RepositoryError::Unavailable("enrollment insert failed".to_string()),
            ),
            CommitScript::RaceEnrollment { competitor } => match &unit.enrollment {
                Some(enrollment) => {
                    let mut competitor = competitor.lock().expect("competitor lock");
                    competitor.get_or_insert_with(|| Enrollment {
                        id: EnrollmentId(enrollment.id.0 + COMPETING_ENROLLMENT_OFFSET),
                        ..enrollment.clone()
                    });
                    Err(RepositoryError::Conflict)
                }
                None => self.inner.commit(unit),
            },
            CommitScript::ConcurrentEdit { status, applied }
                if matches!(unit.write, LeadWrite::Update(_))
                    && !applied.swap(true, Ordering::SeqCst) =>
            {
                let mut stored = self
                    .inner
                    .fetch_lead(unit.lead().id)?
                    .ok_or(RepositoryError::NotFound)?;
                stored.status = *status;
                stored.revision += 1;
                self.inner.commit(&LeadUnitOfWork {
                    write: LeadWrite::Update(stored),
                    logs: Vec::new(),
                    enrollment: None,
                })?;
                self.inner.commit(unit)
            }
            _ => self.inner.commit(unit),
        }
    }

    fn fetch_lead(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError> {
        self.inner.fetch_lead(id)
    }

    fn leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError> {
        self.inner.leads(filter)
    }

    fn delete_lead(&self, id: LeadId) -> Result<Lead, RepositoryError> {
        self.inner.delete_lead(id)
    }

    fn enrollment_for_lead(&self, lead: LeadId) -> Result<Option<Enrollment>, RepositoryError> {
        match self.competitor().filter(|enrollment| enrollment.lead == lead) {
            Some(enrollment) => Ok(Some(enrollment)),
            None => self.inner.enrollment_for_lead(lead),
        }
    }

    fn fetch_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        match self.competitor().filter(|enrollment| enrollment.id == id) {
            Some(enrollment) => Ok(Some(enrollment)),
            None => self.inner.fetch_enrollment(id),
        }
    }

    fn enrollments(&self) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut enrollments = self.inner.enrollments()?;
        enrollments.extend(self.competitor());
        Ok(enrollments)
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        self.inner.update_enrollment(enrollment)
    }

    fn append_log(&self, log: LeadLog) -> Result<(), RepositoryError> {
        self.inner.append_log(log)
    }

    fn logs_for_lead(&self, lead: LeadId) -> Result<Vec<LeadLog>, RepositoryError> {
        self.inner.logs_for_lead(lead)
    }

    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError> {
        self.inner.insert_course(course)
    }

    fn fetch_course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError> {
        self.inner.fetch_course(id)
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        self.inner.courses()
    }

    fn update_course(&self, course: Course) -> Result<(), RepositoryError> {
        self.inner.update_course(course)
    }

    fn delete_course(&self, id: CourseId) -> Result<Course, RepositoryError> {
        self.inner.delete_course(id)
    }

    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        self.inner.insert_user(user)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.fetch_user(id)
    }

    fn users(&self, role: Option<Role>) -> Result<Vec<User>, RepositoryError> {
        self.inner.users(role)
    }

    fn update_user(&self, user: User) -> Result<(), RepositoryError> {
        self.inner.update_user(user)
    }

    fn delete_user(&self, id: UserId) -> Result<User, RepositoryError> {
        self.inner.delete_user(id)
    }
}

use std::sync::Arc;

use super::audit::AuditLog;
use super::catalog::CourseCatalog;
use super::enrollment::EnrollmentManager;
use super::leads::LeadStore;
use super::repository::CrmRepository;
use super::trash::TrashManager;
use super::users::UserDirectory;

/// Facade composing the pipeline components over one repository.
pub struct CrmService<R> {
    leads: LeadStore<R>,
    trash: TrashManager<R>,
    enrollments: EnrollmentManager<R>,
    audit: AuditLog<R>,
    courses: CourseCatalog<R>,
    users: UserDirectory<R>,
}

impl<R> CrmService<R>
where
    R: CrmRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        let audit = AuditLog::new(Arc::clone(&repository));
        let enrollments = EnrollmentManager::new(Arc::clone(&repository));
        let leads = LeadStore::new(Arc::clone(&repository), audit.clone(), enrollments.clone());
        let trash = TrashManager::new(leads.clone());

        Self {
            leads,
            trash,
            enrollments,
            audit,
            courses: CourseCatalog::new(Arc::clone(&repository)),
            users: UserDirectory::new(repository),
        }
    }

    pub fn leads(&self) -> &LeadStore<R> {
        &self.leads
    }

    pub fn trash(&self) -> &TrashManager<R> {
        &self.trash
    }

    pub fn enrollments(&self) -> &EnrollmentManager<R> {
        &self.enrollments
    }

    pub fn audit(&self) -> &AuditLog<R> {
        &self.audit
    }

    pub fn courses(&self) -> &CourseCatalog<R> {
        &self.courses
    }

    pub fn users(&self) -> &UserDirectory<R> {
        &self.users
    }
}

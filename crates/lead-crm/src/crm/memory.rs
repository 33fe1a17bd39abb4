use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::audit::LeadLog;
use super::domain::{
    Course, CourseId, Enrollment, EnrollmentId, Lead, LeadId, LeadLogId, Role, User, UserId,
};
use super::repository::{CrmRepository, LeadFilter, LeadUnitOfWork, LeadWrite, RepositoryError};

#[derive(Debug, Default)]
struct Tables {
    leads: BTreeMap<LeadId, Lead>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,
    logs: BTreeMap<LeadLogId, LeadLog>,
    courses: BTreeMap<CourseId, Course>,
    users: BTreeMap<UserId, User>,
}

impl Tables {
    fn has_enrollment_for(&self, lead: LeadId) -> bool {
        self.enrollments.values().any(|enrollment| enrollment.lead == lead)
    }
}

/// Process-local store. Every operation runs under one lock, which gives
/// lead commits serializable isolation.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCrmRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryCrmRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl CrmRepository for InMemoryCrmRepository {
    fn commit(&self, unit: &LeadUnitOfWork) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let lead = unit.lead();

        match &unit.write {
            LeadWrite::Insert(_) if tables.leads.contains_key(&lead.id) => {
                return Err(RepositoryError::Conflict)
            }
            LeadWrite::Insert(_) => {}
            LeadWrite::Update(_) => match tables.leads.get(&lead.id) {
                None => return Err(RepositoryError::NotFound),
                Some(stored) if stored.revision + 1 != lead.revision => {
                    return Err(RepositoryError::Stale)
                }
                Some(_) => {}
            },
        }
        if let Some(enrollment) = &unit.enrollment {
            if tables.has_enrollment_for(enrollment.lead)
                || tables.enrollments.contains_key(&enrollment.id)
            {
                return Err(RepositoryError::Conflict);
            }
        }
        if unit.logs.iter().any(|log| tables.logs.contains_key(&log.id)) {
            return Err(RepositoryError::Conflict);
        }

        tables.leads.insert(lead.id, lead.clone());
        if let Some(enrollment) = &unit.enrollment {
            tables.enrollments.insert(enrollment.id, enrollment.clone());
        }
        for log in &unit.logs {
            tables.logs.insert(log.id, log.clone());
        }
        Ok(())
    }

    fn fetch_lead(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.tables()?.leads.get(&id).cloned())
    }

    fn leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError> {
        Ok(self
            .tables()?
            .leads
            .values()
            .filter(|lead| filter.matches(lead))
            .cloned()
            .collect())
    }

    fn delete_lead(&self, id: LeadId) -> Result<Lead, RepositoryError> {
        let mut tables = self.tables()?;
        let lead = tables.leads.remove(&id).ok_or(RepositoryError::NotFound)?;
        tables.enrollments.retain(|_, enrollment| enrollment.lead != id);
        Ok(lead)
    }

    fn enrollment_for_lead(&self, lead: LeadId) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .tables()?
            .enrollments
            .values()
            .find(|enrollment| enrollment.lead == lead)
            .cloned())
    }

    fn fetch_enrollment(&self, id: EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self.tables()?.enrollments.get(&id).cloned())
    }

    fn enrollments(&self) -> Result<Vec<Enrollment>, RepositoryError> {
        Ok(self.tables()?.enrollments.values().cloned().collect())
    }

    fn update_enrollment(&self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.enrollments.get_mut(&enrollment.id) {
            Some(slot) => {
                *slot = enrollment;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn append_log(&self, log: LeadLog) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.logs.contains_key(&log.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.logs.insert(log.id, log);
        Ok(())
    }

    fn logs_for_lead(&self, lead: LeadId) -> Result<Vec<LeadLog>, RepositoryError> {
        Ok(self
            .tables()?
            .logs
            .values()
            .filter(|log| log.lead == lead)
            .cloned()
            .collect())
    }

    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.courses.contains_key(&course.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.courses.insert(course.id, course.clone());
        Ok(course)
    }

    fn fetch_course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(self.tables()?.courses.get(&id).cloned())
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        Ok(self.tables()?.courses.values().cloned().collect())
    }

    fn update_course(&self, course: Course) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.courses.get_mut(&course.id) {
            Some(slot) => {
                *slot = course;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_course(&self, id: CourseId) -> Result<Course, RepositoryError> {
        let mut tables = self.tables()?;
        let course = tables.courses.remove(&id).ok_or(RepositoryError::NotFound)?;
        for lead in tables.leads.values_mut() {
            if lead.course == Some(id) {
                lead.course = None;
                lead.revision += 1;
            }
        }
        for enrollment in tables.enrollments.values_mut() {
            if enrollment.course == Some(id) {
                enrollment.course = None;
            }
        }
        Ok(course)
    }

    fn insert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut tables = self.tables()?;
        let duplicate = tables.users.contains_key(&user.id)
            || tables
                .users
                .values()
                .any(|existing| existing.username == user.username);
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn fetch_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    fn users(&self, role: Option<Role>) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .tables()?
            .users
            .values()
            .filter(|user| role.map_or(true, |role| user.role == role))
            .cloned()
            .collect())
    }

    fn update_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let taken = tables
            .users
            .values()
            .any(|existing| existing.id != user.id && existing.username == user.username);
        if taken {
            return Err(RepositoryError::Conflict);
        }
        match tables.users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_user(&self, id: UserId) -> Result<User, RepositoryError> {
        let mut tables = self.tables()?;
        let user = tables.users.remove(&id).ok_or(RepositoryError::NotFound)?;
        for lead in tables.leads.values_mut() {
            if lead.created_by == Some(id) {
                lead.created_by = None;
                lead.revision += 1;
            }
        }
        for log in tables.logs.values_mut() {
            if log.changed_by == Some(id) {
                log.changed_by = None;
            }
        }
        Ok(user)
    }
}

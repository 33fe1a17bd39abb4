use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::access::{AccessPolicy, Capability};
use super::domain::{check_length, Actor, Course, CourseId};
use super::error::CrmError;
use super::repository::{CrmRepository, RepositoryError};

static COURSE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_course_id() -> CourseId {
    CourseId(COURSE_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Courses referenced by leads and enrollments. Writes need the admin capability.
pub struct CourseCatalog<R> {
    repository: Arc<R>,
}

impl<R> Clone for CourseCatalog<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R> CourseCatalog<R>
where
    R: CrmRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn list(&self) -> Result<Vec<Course>, CrmError> {
        Ok(self.repository.courses()?)
    }

    pub fn get(&self, id: CourseId) -> Result<Course, CrmError> {
        self.repository
            .fetch_course(id)?
            .ok_or_else(|| CrmError::not_found(CourseId::ENTITY, id.0))
    }

    pub fn create(&self, course_name: &str, actor: &Actor) -> Result<Course, CrmError> {
        AccessPolicy::check(actor, Capability::SuperadminOrAdmin)?;
        let course_name = validate_name(course_name)?;

        let course = self.repository.insert_course(Course {
            id: next_course_id(),
            course_name,
        })?;
        info!(course_id = %course.id, user_id = %actor.id, "course created");
        Ok(course)
    }

    pub fn rename(
        &self,
        id: CourseId,
        course_name: &str,
        actor: &Actor,
    ) -> Result<Course, CrmError> {
        AccessPolicy::check(actor, Capability::SuperadminOrAdmin)?;
        let course_name = validate_name(course_name)?;

        let mut course = self.get(id)?;
        course.course_name = course_name;
        self.repository.update_course(course.clone())?;
        Ok(course)
    }

    /// Delete a course; leads and enrollments keep existing with the reference cleared.
    pub fn delete(&self, id: CourseId, actor: &Actor) -> Result<Course, CrmError> {
        AccessPolicy::check(actor, Capability::SuperadminOrAdmin)?;

        let course = self.repository.delete_course(id).map_err(|err| match err {
            RepositoryError::NotFound => CrmError::not_found(CourseId::ENTITY, id.0),
            other => other.into(),
        })?;
        info!(course_id = %id, user_id = %actor.id, "course deleted");
        Ok(course)
    }
}

fn validate_name(raw: &str) -> Result<String, CrmError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CrmError::validation("course_name", "this field may not be blank"));
    }
    check_length("course_name", name, 255)?;
    Ok(name.to_string())
}

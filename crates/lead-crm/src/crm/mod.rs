//! Lead pipeline: status transitions, automatic enrollment on conversion, trash
//! handling and the audit trail, plus the course and user surfaces around them.

pub mod access;
pub mod audit;
pub mod catalog;
pub mod domain;
pub mod enrollment;
mod error;
pub mod leads;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub mod trash;
pub mod users;

#[cfg(test)]
mod tests;

pub use access::{AccessPolicy, Capability};
pub use audit::{AuditLog, LeadAction, LeadLog, LeadLogDraft};
pub use catalog::CourseCatalog;
pub use domain::{
    Actor, ClassType, CodingExperience, Course, CourseId, DeviceAccess, Enrollment,
    EnrollmentId, EnrollmentPatch, Lead, LeadId, LeadLogId, LeadPatch, LeadProfile,
    LeadProfilePatch, LeadSource, LeadStatus, NewLead, NewUser, PaymentType, Role, User, UserId,
    UserPatch,
};
pub use enrollment::EnrollmentManager;
pub use error::CrmError;
pub use leads::LeadStore;
pub use memory::InMemoryCrmRepository;
pub use repository::{
    CrmRepository, LeadFilter, LeadUnitOfWork, LeadWrite, RepositoryError,
};
pub use router::crm_router;
pub use service::CrmService;
pub use trash::TrashManager;
pub use users::UserDirectory;

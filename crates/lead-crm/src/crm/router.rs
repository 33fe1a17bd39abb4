use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{
    Actor, CourseId, EnrollmentId, EnrollmentPatch, LeadId, LeadPatch, LeadStatus, NewLead,
    NewUser, Role, UserId, UserPatch,
};
use super::error::CrmError;
use super::repository::{CrmRepository, RepositoryError};
use super::service::CrmService;
use super::trash::TrashManager;
use super::users::UserDirectory;

/// Header carrying the authenticated user id, set by the upstream identity provider.
pub const ACTOR_HEADER: &str = "x-user-id";

/// Router builder exposing the lead pipeline over HTTP.
pub fn crm_router<R>(service: Arc<CrmService<R>>) -> Router
where
    R: CrmRepository + 'static,
{
    Router::new()
        .route("/api/leads", get(list_leads::<R>).post(create_lead::<R>))
        .route(
            "/api/leads/:lead_id",
            get(get_lead::<R>)
                .patch(update_lead::<R>)
                .delete(delete_lead::<R>),
        )
        .route("/api/trash", get(list_trash::<R>))
        .route("/api/trash/status-choices", get(trash_status_choices::<R>))
        .route(
            "/api/trash/:lead_id",
            get(get_trashed_lead::<R>).patch(update_trashed_lead::<R>),
        )
        .route("/api/leadlogs", get(list_lead_logs::<R>))
        .route("/api/enrollments", get(list_enrollments::<R>))
        .route(
            "/api/enrollments/:enrollment_id",
            get(get_enrollment::<R>).patch(update_enrollment::<R>),
        )
        .route(
            "/api/courses",
            get(list_courses::<R>).post(create_course::<R>),
        )
        .route(
            "/api/courses/:course_id",
            get(get_course::<R>)
                .patch(rename_course::<R>)
                .delete(delete_course::<R>),
        )
        .route("/api/users", get(list_users::<R>).post(create_user::<R>))
        .route("/api/users/role-choices", get(role_choices::<R>))
        .route(
            "/api/users/:user_id",
            get(get_user::<R>)
                .patch(update_user::<R>)
                .delete(delete_user::<R>),
        )
        .with_state(service)
}

impl CrmError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CrmError::NotFound { .. } | CrmError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            CrmError::Validation { .. } => StatusCode::BAD_REQUEST,
            CrmError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            CrmError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CrmError::Repository(RepositoryError::Conflict | RepositoryError::Stale) => {
                StatusCode::CONFLICT
            }
            CrmError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "crm request failed");
        }

        let payload = match &self {
            CrmError::Validation { field, .. } => {
                json!({ "error": self.to_string(), "field": field })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(payload)).into_response()
    }
}

/// JSON request body whose decoding failures surface as [`CrmError::Validation`].
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CrmError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(body_rejection(&rejection)),
        }
    }
}

/// Map a body rejection onto the offending field when the decoder reports one.
fn body_rejection(rejection: &JsonRejection) -> CrmError {
    let text = rejection.body_text();
    let JsonRejection::JsonDataError(_) = rejection else {
        return CrmError::validation("body", text);
    };

    // "<prefix>: <path>: <reason>" with a path, "<prefix>: <reason>" without.
    let detail = text.split_once(": ").map_or(text.as_str(), |(_, rest)| rest);
    if let Some((path, reason)) = detail.split_once(": ") {
        if is_field_path(path) {
            return CrmError::validation(path.to_string(), reason);
        }
    }
    if let Some(field) = detail
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split_once('`'))
        .map(|(field, _)| field)
    {
        return CrmError::validation(field.to_string(), "this field is required");
    }
    CrmError::validation("body", detail)
}

fn is_field_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
}

fn authenticate<R>(service: &CrmService<R>, headers: &HeaderMap) -> Result<Actor, CrmError>
where
    R: CrmRepository + 'static,
{
    let id = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .ok_or(CrmError::Unauthenticated)?;
    service.users().resolve(UserId(id))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadListQuery {
    /// Comma separated status labels. Absent means the active view.
    pub exclude: Option<String>,
}

impl LeadListQuery {
    pub fn exclusions(&self) -> Result<Vec<LeadStatus>, CrmError> {
        let Some(raw) = &self.exclude else {
            return Ok(LeadStatus::INACTIVE.to_vec());
        };

        raw.split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(|label| {
                LeadStatus::from_label(label).ok_or_else(|| {
                    CrmError::validation("exclude", format!("unknown lead status '{label}'"))
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct LeadLogQuery {
    pub lead: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct CourseRequest {
    pub course_name: String,
}

#[derive(Debug, Serialize)]
pub struct RoleChoice {
    pub value: Role,
    pub label: &'static str,
}

pub(crate) async fn list_leads<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Query(query): Query<LeadListQuery>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    let exclusions = query.exclusions()?;
    Ok(Json(service.leads().list(&exclusions)?))
}

pub(crate) async fn create_lead<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    JsonBody(new_lead): JsonBody<NewLead>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    let lead = service.leads().create(new_lead, &actor)?;
    Ok((StatusCode::CREATED, Json(lead)))
}

pub(crate) async fn get_lead<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(lead_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.leads().get(LeadId(lead_id))?))
}

pub(crate) async fn update_lead<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(lead_id): Path<u64>,
    JsonBody(patch): JsonBody<LeadPatch>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    Ok(Json(service.leads().update(LeadId(lead_id), patch, &actor)?))
}

pub(crate) async fn delete_lead<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(lead_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    service.leads().delete(LeadId(lead_id), &actor)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_trash<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.trash().list()?))
}

pub(crate) async fn trash_status_choices<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(TrashManager::<R>::status_choices()))
}

pub(crate) async fn get_trashed_lead<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(lead_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.trash().get(LeadId(lead_id))?))
}

pub(crate) async fn update_trashed_lead<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(lead_id): Path<u64>,
    JsonBody(patch): JsonBody<LeadPatch>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    Ok(Json(service.trash().update(LeadId(lead_id), patch, &actor)?))
}

pub(crate) async fn list_lead_logs<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Query(query): Query<LeadLogQuery>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.audit().list_for_lead(LeadId(query.lead))?))
}

pub(crate) async fn list_enrollments<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.enrollments().list()?))
}

pub(crate) async fn get_enrollment<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(enrollment_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.enrollments().get(EnrollmentId(enrollment_id))?))
}

pub(crate) async fn update_enrollment<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(enrollment_id): Path<u64>,
    JsonBody(patch): JsonBody<EnrollmentPatch>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    let enrollment = service
        .enrollments()
        .update(EnrollmentId(enrollment_id), patch, &actor)?;
    Ok(Json(enrollment))
}

pub(crate) async fn list_courses<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.courses().list()?))
}

pub(crate) async fn create_course<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<CourseRequest>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    let course = service.courses().create(&request.course_name, &actor)?;
    Ok((StatusCode::CREATED, Json(course)))
}

pub(crate) async fn get_course<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(course_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.courses().get(CourseId(course_id))?))
}

pub(crate) async fn rename_course<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(course_id): Path<u64>,
    JsonBody(request): JsonBody<CourseRequest>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    let course = service
        .courses()
        .rename(CourseId(course_id), &request.course_name, &actor)?;
    Ok(Json(course))
}

pub(crate) async fn delete_course<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(course_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    service.courses().delete(CourseId(course_id), &actor)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_users<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.users().list(query.role)?))
}

pub(crate) async fn create_user<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    JsonBody(new_user): JsonBody<NewUser>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    let user = service.users().create(new_user, &actor)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub(crate) async fn role_choices<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    let choices: Vec<RoleChoice> = UserDirectory::<R>::role_choices(&actor)
        .into_iter()
        .map(|role| RoleChoice {
            value: role,
            label: role.display_name(),
        })
        .collect();
    Ok(Json(choices))
}

pub(crate) async fn get_user<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    authenticate(&service, &headers)?;
    Ok(Json(service.users().get(UserId(user_id))?))
}

pub(crate) async fn update_user<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
    JsonBody(patch): JsonBody<UserPatch>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    Ok(Json(service.users().update(UserId(user_id), patch, &actor)?))
}

pub(crate) async fn delete_user<R>(
    State(service): State<Arc<CrmService<R>>>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
) -> Result<impl IntoResponse, CrmError>
where
    R: CrmRepository + 'static,
{
    let actor = authenticate(&service, &headers)?;
    service.users().delete(UserId(user_id), &actor)?;
    Ok(StatusCode::NO_CONTENT)
}

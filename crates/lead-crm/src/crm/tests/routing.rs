use super::common::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::crm::domain::{Actor, LeadStatus, Role};
use crate::crm::router::{crm_router, LeadListQuery, ACTOR_HEADER};
use crate::crm::service::CrmService;
use crate::crm::InMemoryCrmRepository;

struct App {
    router: Router,
    service: Arc<CrmService<InMemoryCrmRepository>>,
    superadmin: Actor,
}

fn app() -> App {
    let service = Arc::new(CrmService::new(Arc::new(InMemoryCrmRepository::new())));
    let superadmin = service
        .users()
        .bootstrap_superadmin("root")
        .expect("superadmin seeds")
        .actor();
    App {
        router: crm_router(Arc::clone(&service)),
        service,
        superadmin,
    }
}

fn request(method: Method, uri: &str, actor: Option<&Actor>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor.id.to_string());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl App {
    fn sales_rep(&self) -> Actor {
        self.service
            .users()
            .create(
                crate::crm::domain::NewUser {
                    username: "priya".to_string(),
                    email: None,
                    role: Role::SalesRep,
                },
                &self.superadmin,
            )
            .expect("user created")
            .actor()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return (status, Value::Null);
        }
        (status, read_json_body(response).await)
    }
}

#[tokio::test]
async fn missing_or_unknown_identity_is_unauthorized() {
    let app = app();

    let (status, body) = app
        .send(request(Method::GET, "/api/leads", None, None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let stranger = Actor {
        id: crate::crm::domain::UserId(u64::MAX),
        role: Role::Superadmin,
    };
    let (status, _) = app
        .send(request(Method::GET, "/api/leads", Some(&stranger), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_lead_returns_created_with_author() {
    let app = app();
    let rep = app.sales_rep();

    let (status, body) = app
        .send(request(
            Method::POST,
            "/api/leads",
            Some(&rep),
            Some(json!({
                "parents_name": "Meera Shah",
                "student_name": "Arjun Shah",
                "status": "Interested",
                "next_call": "2025-10-20"
            })),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "Interested");
    assert_eq!(body["created_by"], rep.id.0);
    assert_eq!(body["next_call"], "2025-10-20");

    let lead_id = body["id"].as_u64().expect("numeric id");
    let (status, logs) = app
        .send(request(
            Method::GET,
            &format!("/api/leadlogs?lead={lead_id}"),
            Some(&rep),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs[0]["action"], "created");
}

#[tokio::test]
async fn default_listing_hides_inactive_leads() {
    let app = app();
    let rep = app.sales_rep();
    let active = app
        .service
        .leads()
        .create(new_lead(LeadStatus::Open), &rep)
        .expect("lead");
    app.service
        .leads()
        .create(new_lead(LeadStatus::Lost), &rep)
        .expect("lead");

    let (status, body) = app
        .send(request(Method::GET, "/api/leads", Some(&rep), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    let leads = body.as_array().expect("array");
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["id"], active.id.0);

    let (_, body) = app
        .send(request(Method::GET, "/api/leads?exclude=", Some(&rep), None))
        .await;
    assert_eq!(body.as_array().expect("array").len(), 2);

    let (status, body) = app
        .send(request(Method::GET, "/api/leads?exclude=Pending", Some(&rep), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "exclude");
}

#[test]
fn exclusion_labels_are_case_insensitive() {
    let query = LeadListQuery {
        exclude: Some("lost, INPROGRESS".to_string()),
    };

    assert_eq!(
        query.exclusions().expect("valid labels"),
        vec![LeadStatus::Lost, LeadStatus::InProgress]
    );
}

#[tokio::test]
async fn patch_converts_lead_and_enrolls_once() {
    let app = app();
    let rep = app.sales_rep();
    let lead = app
        .service
        .leads()
        .create(new_lead(LeadStatus::Interested), &rep)
        .expect("lead");
    let uri = format!("/api/leads/{}", lead.id);

    for _ in 0..2 {
        let (status, body) = app
            .send(request(
                Method::PATCH,
                &uri,
                Some(&rep),
                Some(json!({ "status": "Converted" })),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Converted");
    }

    let (_, enrollments) = app
        .send(request(Method::GET, "/api/enrollments", Some(&rep), None))
        .await;
    let enrollments = enrollments.as_array().expect("array");
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0]["lead"], lead.id.0);
    assert_eq!(enrollments[0]["payment_completed"], false);
}

#[tokio::test]
async fn trash_rejects_conversion_and_restores() {
    let app = app();
    let rep = app.sales_rep();
    let lead = app
        .service
        .leads()
        .create(new_lead(LeadStatus::Junk), &rep)
        .expect("lead");
    let uri = format!("/api/trash/{}", lead.id);

    let (status, body) = app
        .send(request(
            Method::PATCH,
            &uri,
            Some(&rep),
            Some(json!({ "status": "Converted" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "status");

    let (status, body) = app
        .send(request(
            Method::PATCH,
            &uri,
            Some(&rep),
            Some(json!({ "status": "Followup" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Followup");

    let (status, _) = app
        .send(request(Method::GET, &uri, Some(&rep), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, logs) = app
        .send(request(
            Method::GET,
            &format!("/api/leadlogs?lead={}", lead.id),
            Some(&rep),
            None,
        ))
        .await;
    let actions: Vec<_> = logs
        .as_array()
        .expect("array")
        .iter()
        .map(|log| log["action"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions, vec!["created", "status_changed", "restored"]);
}

#[tokio::test]
async fn trash_status_choices_omit_converted() {
    let app = app();
    let rep = app.sales_rep();

    let (status, body) = app
        .send(request(Method::GET, "/api/trash/status-choices", Some(&rep), None))
        .await;

    assert_eq!(status, StatusCode::OK);
    let choices = body.as_array().expect("array");
    assert_eq!(choices.len(), 9);
    assert!(!choices.contains(&json!("Converted")));
}

#[tokio::test]
async fn course_writes_are_forbidden_for_sales_reps() {
    let app = app();
    let rep = app.sales_rep();

    let (status, _) = app
        .send(request(
            Method::POST,
            "/api/courses",
            Some(&rep),
            Some(json!({ "course_name": "Python" })),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(request(
            Method::POST,
            "/api/courses",
            Some(&app.superadmin),
            Some(json!({ "course_name": "Python" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["course_name"], "Python");

    let (status, _) = app
        .send(request(
            Method::DELETE,
            &format!("/api/courses/{}", body["id"]),
            Some(&app.superadmin),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_lead_is_not_found() {
    let app = app();
    let rep = app.sales_rep();

    let (status, body) = app
        .send(request(Method::DELETE, "/api/leads/987654321", Some(&rep), None))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]
        .as_str()
        .expect("message")
        .contains("987654321"));
}

#[tokio::test]
async fn role_choices_follow_the_caller() {
    let app = app();

    let (status, body) = app
        .send(request(
            Method::GET,
            "/api/users/role-choices",
            Some(&app.superadmin),
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "value": "admin", "label": "Admin" },
            { "value": "sales_rep", "label": "Sales Representative" }
        ])
    );
}

#[tokio::test]
async fn unknown_status_label_is_a_field_validation_error() {
    let app = app();
    let rep = app.sales_rep();
    let lead = app
        .service
        .leads()
        .create(new_lead(LeadStatus::Open), &rep)
        .expect("lead");

    let (status, body) = app
        .send(request(
            Method::PATCH,
            &format!("/api/leads/{}", lead.id),
            Some(&rep),
            Some(json!({ "status": "Archived" })),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "status");
    assert!(body["error"]
        .as_str()
        .expect("message")
        .contains("Archived"));
    assert_eq!(
        app.service.leads().get(lead.id).expect("lead").status,
        LeadStatus::Open
    );
}

#[tokio::test]
async fn status_labels_in_bodies_ignore_case() {
    let app = app();
    let rep = app.sales_rep();
    let lead = app
        .service
        .leads()
        .create(new_lead(LeadStatus::Open), &rep)
        .expect("lead");

    let (status, body) = app
        .send(request(
            Method::PATCH,
            &format!("/api/leads/{}", lead.id),
            Some(&rep),
            Some(json!({ "status": "followup" })),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Followup");
}

#[tokio::test]
async fn missing_required_body_field_is_reported_by_name() {
    let app = app();

    let (status, body) = app
        .send(request(
            Method::POST,
            "/api/courses",
            Some(&app.superadmin),
            Some(json!({})),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "course_name");
}

#[tokio::test]
async fn body_without_json_content_type_is_rejected_as_validation() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/courses")
        .header(ACTOR_HEADER, app.superadmin.id.to_string())
        .body(Body::from(r#"{"course_name":"Python"}"#))
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "body");
}

#[test]
fn stale_writes_map_to_conflict() {
    let err = crate::crm::CrmError::from(crate::crm::RepositoryError::Stale);

    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

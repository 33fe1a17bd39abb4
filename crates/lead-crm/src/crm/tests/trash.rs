use super::common::*;

use crate::crm::audit::LeadAction;
use crate::crm::domain::{LeadPatch, LeadStatus};
use crate::crm::error::CrmError;
use crate::crm::trash::TrashManager;
use crate::crm::InMemoryCrmRepository;

#[test]
fn trash_lists_only_lost_and_junk() {
    let fixture = fixture();
    let rep = fixture.sales_rep();
    let lost = fixture.lead(LeadStatus::Lost, &rep);
    let junk = fixture.lead(LeadStatus::Junk, &rep);
    fixture.lead(LeadStatus::Open, &rep);
    fixture.lead(LeadStatus::Converted, &rep);

    let trashed = fixture.service.trash().list().expect("trash listed");

    let ids: Vec<_> = trashed.iter().map(|lead| lead.id).collect();
    assert_eq!(ids, vec![lost.id, junk.id]);
}

#[test]
fn converting_from_trash_is_rejected_without_side_effects() {
    let fixture = fixture();
    let rep = fixture.sales_rep();
    let lead = fixture.lead(LeadStatus::Lost, &rep);

    match fixture
        .service
        .trash()
        .update(lead.id, LeadPatch::status(LeadStatus::Converted), &rep)
    {
        Err(CrmError::Validation { field, .. }) => assert_eq!(field, "status"),
        other => panic!("expected validation error, got {other:?}"),
    }

    assert_eq!(
        fixture.service.leads().get(lead.id).expect("lead").status,
        LeadStatus::Lost
    );
    assert!(fixture.logs_after_create(lead.id).is_empty());
    assert!(fixture.enrollments_for(lead.id).is_empty());
}

#[test]
fn restoring_from_trash_logs_status_change_and_restore() {
    let fixture = fixture();
    let rep = fixture.sales_rep();
    let lead = fixture.lead(LeadStatus::Junk, &rep);

    let restored = fixture
        .service
        .trash()
        .update(lead.id, LeadPatch::status(LeadStatus::Followup), &rep)
        .expect("restore succeeds");

    assert_eq!(restored.status, LeadStatus::Followup);
    let logs = fixture.logs_after_create(lead.id);
    assert_eq!(
        actions(&logs),
        vec![LeadAction::StatusChanged, LeadAction::Restored]
    );
    let restore = &logs[1];
    assert_eq!(restore.old_value.as_deref(), Some("Junk"));
    assert_eq!(restore.new_value.as_deref(), Some("Followup"));
    assert_eq!(restore.changed_by, Some(rep.id));
    assert!(fixture.service.trash().list().expect("trash").is_empty());
}

#[test]
fn remarks_edit_keeps_lead_in_trash() {
    let fixture = fixture();
    let rep = fixture.sales_rep();
    let lead = fixture.lead(LeadStatus::Lost, &rep);

    let updated = fixture
        .service
        .trash()
        .update(
            lead.id,
            LeadPatch {
                remarks: Some("number disconnected".to_string()),
                ..LeadPatch::default()
            },
            &rep,
        )
        .expect("update succeeds");

    assert!(updated.in_trash());
    assert_eq!(
        actions(&fixture.logs_after_create(lead.id)),
        vec![LeadAction::RemarksUpdated]
    );
}

#[test]
fn trash_view_hides_active_leads() {
    let fixture = fixture();
    let rep = fixture.sales_rep();
    let lead = fixture.lead(LeadStatus::Open, &rep);

    assert!(matches!(
        fixture.service.trash().get(lead.id),
        Err(CrmError::NotFound { entity: "trashed lead", .. })
    ));
    assert!(matches!(
        fixture
            .service
            .trash()
            .update(lead.id, LeadPatch::status(LeadStatus::Junk), &rep),
        Err(CrmError::NotFound { .. })
    ));
    assert!(fixture.logs_after_create(lead.id).is_empty());
}

#[test]
fn status_choices_exclude_conversion() {
    let choices = TrashManager::<InMemoryCrmRepository>::status_choices();

    assert_eq!(choices.len(), LeadStatus::ALL.len() - 1);
    assert!(!choices.contains(&LeadStatus::Converted));
    assert!(choices.contains(&LeadStatus::Lost));
}

#[test]
fn lead_restored_concurrently_is_no_longer_editable_from_trash() {
    let fixture = fixture_with(ScriptedRepository::concurrent_edit(LeadStatus::Followup));
    let rep = fixture.sales_rep();
    let lead = fixture.lead(LeadStatus::Lost, &rep);

    let result = fixture.service.trash().update(
        lead.id,
        LeadPatch {
            remarks: Some("number disconnected".to_string()),
            ..LeadPatch::default()
        },
        &rep,
    );

    assert!(matches!(
        result,
        Err(CrmError::NotFound { entity: "trashed lead", .. })
    ));
    let stored = fixture.service.leads().get(lead.id).expect("lead");
    assert_eq!(stored.status, LeadStatus::Followup);
    assert_eq!(stored.remarks, "");
    assert!(fixture.logs_after_create(lead.id).is_empty());
}

use crate::infra::{in_memory_crm, InMemoryCrm};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use lead_crm::config::CrmConfig;
use lead_crm::crm::{
    Actor, Enrollment, EnrollmentPatch, Lead, LeadLog, LeadPatch, LeadProfile, LeadSource,
    LeadStatus, NewLead, NewUser, Role,
};
use lead_crm::error::AppError;
use serde::Serialize;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reference date for scheduled calls (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print the final lead, enrollment and audit trail as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct DemoSummary {
    lead: Lead,
    enrollment: Option<Enrollment>,
    trail: Vec<LeadLog>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let (crm, superadmin) = in_memory_crm(&CrmConfig {
        bootstrap_superadmin: "demo-superadmin".to_string(),
    })?;
    let (admin, rep) = seed_team(&crm, &superadmin)?;

    let course = crm.courses().create("Python for Young Coders", &admin)?;

    println!("Lead lifecycle demo ({today})");
    let lead = crm.leads().create(
        NewLead {
            profile: LeadProfile {
                parents_name: "Meera Shah".to_string(),
                student_name: "Arjun Shah".to_string(),
                email: Some("meera.shah@example.com".to_string()),
                phone_number: "07700 900123".to_string(),
                grade: "7".to_string(),
                source: Some(LeadSource::Website),
                ..LeadProfile::default()
            },
            next_call: Some(today + Duration::days(1)),
            ..NewLead::default()
        },
        &rep,
    )?;
    println!("- Created lead {} with status {}", lead.id, lead.status);

    crm.leads()
        .update(lead.id, LeadPatch::status(LeadStatus::Lost), &rep)?;
    println!(
        "- Marked lost; trash now holds {} lead(s)",
        crm.trash().list()?.len()
    );

    crm.trash().update(
        lead.id,
        LeadPatch {
            status: Some(LeadStatus::Interested),
            last_call: Some(Some(today)),
            next_call: Some(Some(today + Duration::days(3))),
            remarks: Some("Parent called back asking about weekend batches".to_string()),
            ..LeadPatch::default()
        },
        &rep,
    )?;
    println!("- Restored from trash as Interested");

    let lead = crm.leads().update(
        lead.id,
        LeadPatch {
            status: Some(LeadStatus::Converted),
            course: Some(Some(course.id)),
            ..LeadPatch::default()
        },
        &rep,
    )?;
    println!("- Converted into {}", course.course_name);

    let enrollment = match crm.enrollments().for_lead(lead.id)? {
        Some(enrollment) => Some(crm.enrollments().update(
            enrollment.id,
            EnrollmentPatch {
                total_payment: Some(Some(45_000)),
                first_installment: Some(Some(15_000)),
                last_pay_date: Some(Some(today)),
                ..EnrollmentPatch::default()
            },
            &admin,
        )?),
        None => None,
    };
    if let Some(enrollment) = &enrollment {
        println!(
            "- Enrollment {} recorded first installment of {} (minor units)",
            enrollment.id,
            enrollment.first_installment.unwrap_or_default()
        );
    }

    let trail = crm.audit().list_for_lead(lead.id)?;
    if args.json {
        let summary = DemoSummary {
            lead,
            enrollment,
            trail,
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Summary payload unavailable: {err}"),
        }
        return Ok(());
    }

    println!("\nAudit trail");
    for log in &trail {
        let change = match (&log.old_value, &log.new_value) {
            (Some(old), Some(new)) => format!(" [{old} -> {new}]"),
            (None, Some(new)) => format!(" [{new}]"),
            _ => String::new(),
        };
        println!(
            "- {} | {}: {}{}",
            log.timestamp.format("%H:%M:%S%.3f"),
            log.action.label(),
            log.description,
            change
        );
    }

    Ok(())
}

fn seed_team(crm: &InMemoryCrm, superadmin: &Actor) -> Result<(Actor, Actor), AppError> {
    let admin = crm.users().create(
        NewUser {
            username: "asha".to_string(),
            email: Some("asha@example.com".to_string()),
            role: Role::Admin,
        },
        superadmin,
    )?;
    let rep = crm.users().create(
        NewUser {
            username: "ravi".to_string(),
            email: None,
            role: Role::SalesRep,
        },
        &admin.actor(),
    )?;
    Ok((admin.actor(), rep.actor()))
}

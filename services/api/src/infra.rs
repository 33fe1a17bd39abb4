use chrono::NaiveDate;
use lead_crm::config::CrmConfig;
use lead_crm::crm::{Actor, CrmError, CrmService, InMemoryCrmRepository};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type InMemoryCrm = CrmService<InMemoryCrmRepository>;

/// Process-local CRM with the configured superadmin already seeded.
pub(crate) fn in_memory_crm(config: &CrmConfig) -> Result<(Arc<InMemoryCrm>, Actor), CrmError> {
    let service = Arc::new(CrmService::new(Arc::new(InMemoryCrmRepository::new())));
    let superadmin = service
        .users()
        .bootstrap_superadmin(&config.bootstrap_superadmin)?
        .actor();
    Ok((service, superadmin))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

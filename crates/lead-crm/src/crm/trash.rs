use super::domain::{Actor, Lead, LeadId, LeadPatch, LeadStatus};
use super::error::CrmError;
use super::leads::LeadStore;
use super::repository::{CrmRepository, LeadFilter};

/// Restricted view over leads parked as Lost or Junk.
pub struct TrashManager<R> {
    leads: LeadStore<R>,
}

impl<R> Clone for TrashManager<R> {
    fn clone(&self) -> Self {
        Self {
            leads: self.leads.clone(),
        }
    }
}

impl<R> TrashManager<R>
where
    R: CrmRepository + 'static,
{
    pub fn new(leads: LeadStore<R>) -> Self {
        Self { leads }
    }

    /// Statuses a trash-view write may set. Conversion is never offered here.
    pub fn status_choices() -> Vec<LeadStatus> {
        LeadStatus::ALL
            .into_iter()
            .filter(|status| *status != LeadStatus::Converted)
            .collect()
    }

    pub fn list(&self) -> Result<Vec<Lead>, CrmError> {
        self.leads.query(&LeadFilter::only(&LeadStatus::TRASH))
    }

    pub fn get(&self, id: LeadId) -> Result<Lead, CrmError> {
        let lead = self.leads.get(id)?;
        require_trashed(&lead)?;
        Ok(lead)
    }

    /// Update a trashed lead; leaving {Lost, Junk} is logged as a restore.
    ///
    /// The trash check is repeated if a concurrent write forces the update to be rebuilt.
    pub fn update(&self, id: LeadId, patch: LeadPatch, actor: &Actor) -> Result<Lead, CrmError> {
        if patch.status == Some(LeadStatus::Converted) {
            return Err(CrmError::validation(
                "status",
                "leads cannot be converted from the trash; restore the lead first",
            ));
        }

        let lead = self.leads.get(id)?;
        self.leads.apply_update(lead, &patch, actor, require_trashed)
    }
}

fn require_trashed(lead: &Lead) -> Result<(), CrmError> {
    if lead.in_trash() {
        Ok(())
    } else {
        Err(CrmError::not_found("trashed lead", lead.id.0))
    }
}

//! One webhook invocation end to end: normalize, resolve the contact, open a lead, attach the
//! call note.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::domain::contact::ContactId;
use crate::domain::lead::LeadId;
use crate::errors::ReconcileError;
use crate::gateway::{AmoGateway, ContactDraft, LeadDraft};
use crate::normalize::normalize;
use crate::note::format_note;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileStage {
    Normalize,
    LookupContact,
    CreateContact,
    UpdateContact,
    CreateLead,
    FormatNote,
    AttachNote,
    Done,
}

impl ReconcileStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::LookupContact => "lookup_contact",
            Self::CreateContact => "create_contact",
            Self::UpdateContact => "update_contact",
            Self::CreateLead => "create_lead",
            Self::FormatNote => "format_note",
            Self::AttachNote => "attach_note",
            Self::Done => "done",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub contact_id: ContactId,
    pub lead_id: LeadId,
}

#[derive(Clone)]
pub struct CallReconciler {
    gateway: Arc<AmoGateway>,
}

impl CallReconciler {
    pub fn new(gateway: Arc<AmoGateway>) -> Self {
        Self { gateway }
    }

    /// Runs the pipeline for one payload. The first failing step aborts the rest; entities
    /// created before it are left in place.
    pub async fn reconcile(
        &self,
        payload: &Value,
        correlation_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let span = info_span!("reconcile", correlation_id = %correlation_id);
        let mut stage = ReconcileStage::Normalize;
        let result = self.run(payload, correlation_id, &mut stage).instrument(span).await;

        match &result {
            Ok(outcome) => info!(
                event_name = "reconcile.completed",
                correlation_id,
                contact_id = outcome.contact_id.0,
                lead_id = outcome.lead_id.0,
                "call reconciled"
            ),
            Err(error) => warn!(
                event_name = "reconcile.failed",
                correlation_id,
                stage = stage.as_str(),
                error_kind = error.kind(),
                error = %error,
                "call reconciliation aborted"
            ),
        }
        result
    }

    async fn run(
        &self,
        payload: &Value,
        correlation_id: &str,
        stage: &mut ReconcileStage,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        advance(stage, ReconcileStage::Normalize, correlation_id);
        let record = normalize(payload)?;

        advance(stage, ReconcileStage::LookupContact, correlation_id);
        let existing = self.gateway.find_contact_by_phone(&record.phone).await?;

        let next = if existing.is_some() {
            ReconcileStage::UpdateContact
        } else {
            ReconcileStage::CreateContact
        };
        advance(stage, next, correlation_id);
        let company = match record.company.as_deref() {
            Some(name) => self.gateway.find_or_create_company(name).await.into_option(),
            None => None,
        };
        let company_id = company.as_ref().map(|company| company.id);
        let draft = ContactDraft {
            name: record.name.as_deref(),
            phone: &record.phone,
            email: record.email.as_deref(),
            company_name: record.company.as_deref(),
            company_id,
            position: record.position.as_deref(),
        };
        let contact = match existing {
            Some(existing) => self.gateway.update_contact(existing.id, draft).await?,
            None => self.gateway.create_contact(draft).await?,
        };

        advance(stage, ReconcileStage::CreateLead, correlation_id);
        let lead_name = record.lead_name();
        let lead = self
            .gateway
            .create_lead(LeadDraft {
                contact_id: contact.id,
                name: &lead_name,
                budget: record.budget,
                tags: &record.tags,
                company_id,
            })
            .await?;

        advance(stage, ReconcileStage::FormatNote, correlation_id);
        let note = format_note(&record);

        advance(stage, ReconcileStage::AttachNote, correlation_id);
        self.gateway.add_note_to_lead(lead.id, &note).await?;

        advance(stage, ReconcileStage::Done, correlation_id);
        Ok(ReconcileOutcome { contact_id: contact.id, lead_id: lead.id })
    }
}

fn advance(current: &mut ReconcileStage, next: ReconcileStage, correlation_id: &str) {
    *current = next;
    info!(
        event_name = "reconcile.stage",
        correlation_id,
        stage = next.as_str(),
        "reconcile stage entered"
    );
}

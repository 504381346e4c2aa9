//! amoCRM v4 entity operations used by the reconciliation pipeline.
//!
//! Every call goes through [`AmoGateway::request`], which checks the credential before any
//! network traffic and classifies transport failures. Company resolution is best-effort and
//! reports through [`Lookup`] instead of failing the caller.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::domain::call::digits_only;
use crate::domain::company::{Company, CompanyId};
use crate::domain::contact::{Contact, ContactId, CustomFieldValue, CustomFieldValues, FieldId};
use crate::domain::lead::{Lead, LeadId, LeadPlacement};
use crate::errors::{DegradedLookupError, PreconditionError, ReconcileError, UpstreamError};
use crate::fields::{ContactField, CustomFieldDefinition, FieldMappingTable, ResolvedFieldIds};
use crate::transport::{encode_query, CrmRequest, CrmTransport, TransportError};

/// Outcome of a best-effort lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Degraded(DegradedLookupError),
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound | Self::Degraded(_) => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Contact attributes written on create and update.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContactDraft<'a> {
    /// Falls back to `phone` when absent.
    pub name: Option<&'a str>,
    pub phone: &'a str,
    pub email: Option<&'a str>,
    pub company_name: Option<&'a str>,
    pub company_id: Option<CompanyId>,
    pub position: Option<&'a str>,
}

impl ContactDraft<'_> {
    fn display_name(&self) -> &str {
        self.name.filter(|name| !name.trim().is_empty()).unwrap_or(self.phone)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LeadDraft<'a> {
    pub contact_id: ContactId,
    pub name: &'a str,
    pub budget: Option<Decimal>,
    pub tags: &'a [String],
    pub company_id: Option<CompanyId>,
}

pub struct AmoGateway {
    transport: Arc<dyn CrmTransport>,
    credentials: Arc<dyn CredentialStore>,
    fields: Arc<FieldMappingTable>,
    placement: LeadPlacement,
}

impl AmoGateway {
    pub fn new(
        transport: Arc<dyn CrmTransport>,
        credentials: Arc<dyn CredentialStore>,
        fields: Arc<FieldMappingTable>,
        placement: LeadPlacement,
    ) -> Self {
        Self { transport, credentials, fields, placement }
    }

    /// Exact digits match among the search results, else the first result.
    pub async fn find_contact_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Contact>, ReconcileError> {
        const OPERATION: &str = "search contacts";
        let digits = digits_only(phone);
        if digits.is_empty() {
            return Ok(None);
        }

        let path = format!("/api/v4/contacts?query={}", encode_query(&digits));
        let response = self.request(OPERATION, CrmRequest::get(path)).await?;
        let candidates: Vec<Contact> = embedded_list(OPERATION, &response, "contacts")?;
        let exact = candidates.iter().position(|contact| contact.has_phone_digits(&digits));

        debug!(
            event_name = "crm.contact.search",
            candidates = candidates.len(),
            exact_match = exact.is_some(),
            "contact search finished"
        );
        Ok(candidates.into_iter().nth(exact.unwrap_or(0)))
    }

    /// Exact name among the search results, else the first result, else a new company.
    /// Failures are reported as [`Lookup::Degraded`].
    pub async fn find_or_create_company(&self, name: &str) -> Lookup<Company> {
        let name = name.trim();
        if name.is_empty() {
            return Lookup::NotFound;
        }

        match self.search_or_create_company(name).await {
            Ok(company) => Lookup::Found(company),
            Err((operation, error)) => {
                let degraded = DegradedLookupError::new(operation, &error);
                warn!(
                    event_name = "crm.company.degraded",
                    error = %degraded,
                    "company could not be resolved; continuing without a company link"
                );
                Lookup::Degraded(degraded)
            }
        }
    }

    async fn search_or_create_company(
        &self,
        name: &str,
    ) -> Result<Company, (&'static str, ReconcileError)> {
        const SEARCH: &str = "search companies";
        const CREATE: &str = "create company";

        let search = async {
            let path = format!("/api/v4/companies?query={}", encode_query(name));
            let response = self.request(SEARCH, CrmRequest::get(path)).await?;
            embedded_list::<Company>(SEARCH, &response, "companies")
        };
        let mut candidates = search.await.map_err(|error| (SEARCH, error))?;
        if !candidates.is_empty() {
            let exact = candidates.iter().position(|company| company.name == name).unwrap_or(0);
            return Ok(candidates.swap_remove(exact));
        }

        let create = async {
            let body = json!([{ "name": name }]);
            let response = self.request(CREATE, CrmRequest::post("/api/v4/companies", body)).await?;
            embedded_list::<Company>(CREATE, &response, "companies")
        };
        let company = create
            .await
            .map_err(|error| (CREATE, error))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                let empty = UpstreamError::EmptyResponse { operation: CREATE, entity: "company" };
                (CREATE, ReconcileError::from(empty))
            })?;
        info!(event_name = "crm.company.created", company_id = company.id.0, "company created");
        Ok(company)
    }

    pub async fn create_contact(&self, draft: ContactDraft<'_>) -> Result<Contact, ReconcileError> {
        const OPERATION: &str = "create contact";
        let ids = self.field_ids().await;

        let mut body = json!({ "name": draft.display_name() });
        let custom_fields = self.contact_custom_fields(&ids, &draft);
        if !custom_fields.is_empty() {
            body["custom_fields_values"] = json!(custom_fields);
        }
        attach_company(&mut body, &draft);

        let response =
            self.request(OPERATION, CrmRequest::post("/api/v4/contacts", json!([body]))).await?;
        let contact = embedded_list::<Contact>(OPERATION, &response, "contacts")?
            .into_iter()
            .next()
            .ok_or(UpstreamError::EmptyResponse { operation: OPERATION, entity: "contact" })?;

        info!(event_name = "crm.contact.created", contact_id = contact.id.0, "contact created");
        Ok(contact)
    }

    /// Writes the draft onto an existing contact. Custom fields the draft does not write are
    /// sent back unchanged, and the stored company name is kept when the draft has none.
    pub async fn update_contact(
        &self,
        id: ContactId,
        draft: ContactDraft<'_>,
    ) -> Result<Contact, ReconcileError> {
        const OPERATION: &str = "update contact";
        let ids = self.field_ids().await;

        let existing = match self.fetch_contact(id).await {
            Ok(contact) => contact,
            Err(error) => {
                let degraded = DegradedLookupError::new("fetch contact", &error);
                warn!(
                    event_name = "crm.contact.prefetch_degraded",
                    contact_id = id.0,
                    error = %degraded,
                    "existing contact could not be read; updating without its current fields"
                );
                None
            }
        };

        let written = self.contact_custom_fields(&ids, &draft);
        let existing_fields = existing.as_ref().map(Contact::custom_fields).unwrap_or_default();
        let merged = merge_custom_fields(existing_fields, written);

        let mut body = json!({ "id": id.0, "name": draft.display_name() });
        if !merged.is_empty() {
            body["custom_fields_values"] = json!(merged);
        }
        if draft.company_name.is_some() {
            attach_company(&mut body, &draft);
        } else if let Some(stored) = existing.as_ref().and_then(|c| c.company_name.as_deref()) {
            body["company_name"] = json!(stored);
        }

        let response = self
            .request(OPERATION, CrmRequest::patch(format!("/api/v4/contacts/{id}"), json!([body])))
            .await?;
        let returned = embedded_list::<Contact>(OPERATION, &response, "contacts")?;
        let updated = match returned.into_iter().next() {
            Some(contact) => Some(contact),
            None => self.fetch_contact(id).await?,
        };
        let contact = updated
            .ok_or(UpstreamError::EmptyResponse { operation: OPERATION, entity: "contact" })?;

        info!(event_name = "crm.contact.updated", contact_id = contact.id.0, "contact updated");
        Ok(contact)
    }

    /// `GET /api/v4/contacts/{id}`; accepts both the embedded and the bare entity shape.
    pub async fn fetch_contact(&self, id: ContactId) -> Result<Option<Contact>, ReconcileError> {
        const OPERATION: &str = "fetch contact";
        let response =
            self.request(OPERATION, CrmRequest::get(format!("/api/v4/contacts/{id}"))).await?;

        let embedded = embedded_list::<Contact>(OPERATION, &response, "contacts")?;
        if let Some(contact) = embedded.into_iter().next() {
            return Ok(Some(contact));
        }
        if response.get("id").is_some() {
            return decode(OPERATION, response).map(Some);
        }
        Ok(None)
    }

    pub async fn create_lead(&self, draft: LeadDraft<'_>) -> Result<Lead, ReconcileError> {
        const OPERATION: &str = "create lead";

        let mut embedded = json!({ "contacts": [{ "id": draft.contact_id.0 }] });
        if let Some(company_id) = draft.company_id {
            embedded["companies"] = json!([{ "id": company_id.0 }]);
        }
        if !draft.tags.is_empty() {
            let tags: Vec<Value> = draft.tags.iter().map(|tag| json!({ "name": tag })).collect();
            embedded["tags"] = Value::Array(tags);
        }

        let body = json!([{
            "name": draft.name,
            "price": lead_price(draft.budget),
            "pipeline_id": self.placement.pipeline_id,
            "status_id": self.placement.status_id,
            "_embedded": embedded,
        }]);

        let response = self.request(OPERATION, CrmRequest::post("/api/v4/leads", body)).await?;
        let lead = embedded_list::<Lead>(OPERATION, &response, "leads")?
            .into_iter()
            .next()
            .ok_or(UpstreamError::EmptyResponse { operation: OPERATION, entity: "lead" })?;

        info!(
            event_name = "crm.lead.created",
            lead_id = lead.id.0,
            contact_id = draft.contact_id.0,
            "lead created"
        );
        Ok(lead)
    }

    pub async fn add_note_to_lead(
        &self,
        lead_id: LeadId,
        text: &str,
    ) -> Result<(), ReconcileError> {
        let body = json!([{
            "entity_id": lead_id.0,
            "note_type": "common",
            "params": { "text": text },
        }]);
        let path = format!("/api/v4/leads/{lead_id}/notes");
        self.request("add note", CrmRequest::post(path, body)).await?;

        info!(event_name = "crm.note.attached", lead_id = lead_id.0, "note attached to lead");
        Ok(())
    }

    /// Contact custom-field catalogue. Accepts the embedded shape or a bare array.
    pub async fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, ReconcileError> {
        const OPERATION: &str = "list contact fields";
        let response =
            self.request(OPERATION, CrmRequest::get("/api/v4/contacts/custom_fields")).await?;
        if response.is_array() {
            return decode(OPERATION, response);
        }
        embedded_list(OPERATION, &response, "custom_fields")
    }

    pub async fn field_ids(&self) -> ResolvedFieldIds {
        self.fields.resolve_with(|| self.list_custom_fields()).await
    }

    fn contact_custom_fields(
        &self,
        ids: &ResolvedFieldIds,
        draft: &ContactDraft<'_>,
    ) -> Vec<CustomFieldValues> {
        let mut fields = Vec::new();
        let mut push = |field: ContactField, value: &str| {
            if let Some(field_id) = ids.get(field) {
                let enum_id = self.fields.default_enum_id(field);
                let value = CustomFieldValue::new(value, enum_id);
                fields.push(CustomFieldValues::single(field_id, value));
            }
        };

        push(ContactField::Phone, draft.phone);
        if let Some(email) = draft.email {
            push(ContactField::Email, email);
        }
        if let Some(position) = draft.position {
            push(ContactField::Position, position);
        }
        fields
    }

    async fn request(
        &self,
        operation: &'static str,
        request: CrmRequest,
    ) -> Result<Value, ReconcileError> {
        let credential = self.credentials.get().ok_or(PreconditionError::MissingCredential)?;
        debug!(
            event_name = "crm.request",
            operation,
            method = %request.method,
            path = %request.path,
            "sending crm request"
        );

        self.transport.send(&credential, request).await.map_err(|error| {
            let upstream = match error {
                TransportError::Unauthorized => {
                    warn!(
                        event_name = "crm.credential.rejected",
                        operation,
                        "crm rejected the access token"
                    );
                    UpstreamError::CredentialRejected
                }
                source => UpstreamError::Api { operation, source },
            };
            ReconcileError::from(upstream)
        })
    }
}

/// Existing fields minus those being written, in their stored order, then the written ones.
pub fn merge_custom_fields(
    existing: &[CustomFieldValues],
    written: Vec<CustomFieldValues>,
) -> Vec<CustomFieldValues> {
    let written_ids: Vec<FieldId> = written.iter().map(|field| field.field_id).collect();
    let mut merged: Vec<CustomFieldValues> =
        existing.iter().filter(|field| !written_ids.contains(&field.field_id)).cloned().collect();

    for field in written {
        match merged.iter_mut().find(|current| current.field_id == field.field_id) {
            Some(current) => *current = field,
            None => merged.push(field),
        }
    }
    merged
}

/// Budget rounded half away from zero, or 0.
pub fn lead_price(budget: Option<Decimal>) -> i64 {
    budget
        .and_then(|budget| {
            budget.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero).to_i64()
        })
        .unwrap_or(0)
}

fn attach_company(body: &mut Value, draft: &ContactDraft<'_>) {
    if let Some(company_name) = draft.company_name {
        body["company_name"] = json!(company_name);
    }
    if let Some(company_id) = draft.company_id {
        body["_embedded"] = json!({ "companies": [{ "id": company_id.0 }] });
    }
}

fn embedded_list<T: DeserializeOwned>(
    operation: &'static str,
    response: &Value,
    key: &str,
) -> Result<Vec<T>, ReconcileError> {
    match response.get("_embedded").and_then(|embedded| embedded.get(key)) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items) => decode(operation, items.clone()),
    }
}

fn decode<T: DeserializeOwned>(operation: &'static str, value: Value) -> Result<T, ReconcileError> {
    serde_json::from_value(value).map_err(|error| {
        ReconcileError::from(UpstreamError::Api {
            operation,
            source: TransportError::Decode(error.to_string()),
        })
    })
}

//! Semantic contact fields → amoCRM custom-field identifiers and enum sub-types.
//!
//! Identifiers come from configuration when set and are otherwise discovered once per
//! process from `GET /api/v4/contacts/custom_fields` by field code. Whatever the first
//! resolution yields (including a partial or failed discovery) is kept for the life of
//! the process.

use std::collections::BTreeMap;
use std::future::Future;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{FieldConfig, FieldMappingConfig};
use crate::domain::contact::FieldId;
use crate::errors::ReconcileError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContactField {
    Phone,
    Email,
    Position,
}

impl ContactField {
    pub const ALL: [ContactField; 3] = [Self::Phone, Self::Email, Self::Position];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Position => "position",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMappingEntry {
    pub field_id: Option<FieldId>,
    pub code: String,
    pub enums: BTreeMap<String, i64>,
    pub default_enum: Option<String>,
}

impl From<&FieldConfig> for FieldMappingEntry {
    fn from(config: &FieldConfig) -> Self {
        Self {
            field_id: config.field_id.map(FieldId),
            code: config.code.clone(),
            enums: config.enums.clone(),
            default_enum: config.default_enum.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvedFieldIds {
    pub phone: Option<FieldId>,
    pub email: Option<FieldId>,
    pub position: Option<FieldId>,
}

impl ResolvedFieldIds {
    pub fn get(&self, field: ContactField) -> Option<FieldId> {
        match field {
            ContactField::Phone => self.phone,
            ContactField::Email => self.email,
            ContactField::Position => self.position,
        }
    }

    fn slot(&mut self, field: ContactField) -> &mut Option<FieldId> {
        match field {
            ContactField::Phone => &mut self.phone,
            ContactField::Email => &mut self.email,
            ContactField::Position => &mut self.position,
        }
    }

    pub fn is_complete(&self) -> bool {
        ContactField::ALL.iter().all(|field| self.get(*field).is_some())
    }

    pub fn missing(&self) -> Vec<ContactField> {
        ContactField::ALL.into_iter().filter(|field| self.get(*field).is_none()).collect()
    }
}

/// Entry of the CRM's custom-field catalogue.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: FieldId,
    #[serde(default)]
    pub code: Option<String>,
}

pub struct FieldMappingTable {
    phone: FieldMappingEntry,
    email: FieldMappingEntry,
    position: FieldMappingEntry,
    resolved: OnceCell<ResolvedFieldIds>,
}

impl FieldMappingTable {
    pub fn new(config: &FieldMappingConfig) -> Self {
        Self {
            phone: FieldMappingEntry::from(&config.phone),
            email: FieldMappingEntry::from(&config.email),
            position: FieldMappingEntry::from(&config.position),
            resolved: OnceCell::new(),
        }
    }

    pub fn entry(&self, field: ContactField) -> &FieldMappingEntry {
        match field {
            ContactField::Phone => &self.phone,
            ContactField::Email => &self.email,
            ContactField::Position => &self.position,
        }
    }

    /// Enum id for `key`, else for the field's default key, else `None`.
    pub fn enum_id(&self, field: ContactField, key: &str) -> Option<i64> {
        let entry = self.entry(field);
        entry
            .enums
            .get(key)
            .or_else(|| entry.default_enum.as_ref().and_then(|default| entry.enums.get(default)))
            .copied()
    }

    pub fn default_enum_id(&self, field: ContactField) -> Option<i64> {
        let entry = self.entry(field);
        entry.default_enum.as_ref().and_then(|default| entry.enums.get(default)).copied()
    }

    pub fn static_ids(&self) -> ResolvedFieldIds {
        ResolvedFieldIds {
            phone: self.phone.field_id,
            email: self.email.field_id,
            position: self.position.field_id,
        }
    }

    /// Resolves identifiers once per table. `discover` is only awaited when some field has
    /// no configured id, and at most once even under concurrent callers.
    pub async fn resolve_with<F, Fut>(&self, discover: F) -> ResolvedFieldIds
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<CustomFieldDefinition>, ReconcileError>>,
    {
        *self
            .resolved
            .get_or_init(|| async {
                let configured = self.static_ids();
                if configured.is_complete() {
                    return configured;
                }

                let resolved = match discover().await {
                    Ok(definitions) => self.match_codes(configured, &definitions),
                    Err(error) => {
                        warn!(
                            event_name = "crm.fields.discovery_failed",
                            error = %error,
                            "custom field discovery failed; unresolved fields will be skipped"
                        );
                        configured
                    }
                };

                let missing = resolved.missing();
                if missing.is_empty() {
                    info!(
                        event_name = "crm.fields.resolved",
                        phone_field_id = ?resolved.phone,
                        email_field_id = ?resolved.email,
                        position_field_id = ?resolved.position,
                        "contact custom field ids resolved"
                    );
                } else {
                    let names: Vec<&str> = missing.iter().map(ContactField::as_str).collect();
                    warn!(
                        event_name = "crm.fields.unresolved",
                        missing = %names.join(","),
                        "some contact fields could not be resolved; set their ids in configuration"
                    );
                }
                resolved
            })
            .await
    }

    fn match_codes(
        &self,
        mut resolved: ResolvedFieldIds,
        definitions: &[CustomFieldDefinition],
    ) -> ResolvedFieldIds {
        for field in ContactField::ALL {
            if resolved.get(field).is_some() {
                continue;
            }
            let code = self.entry(field).code.as_str();
            if let Some(definition) =
                definitions.iter().find(|definition| definition.code.as_deref() == Some(code))
            {
                *resolved.slot(field) = Some(definition.id);
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{ContactField, CustomFieldDefinition, FieldMappingTable, ResolvedFieldIds};
    use crate::config::FieldMappingConfig;
    use crate::domain::contact::FieldId;
    use crate::errors::{PreconditionError, ReconcileError};

    fn definition(id: i64, code: &str) -> CustomFieldDefinition {
        CustomFieldDefinition { id: FieldId(id), code: Some(code.to_owned()) }
    }

    #[test]
    fn enum_lookup_falls_back_to_default_key() {
        let table = FieldMappingTable::new(&FieldMappingConfig::default());

        assert_eq!(table.enum_id(ContactField::Phone, "MOB"), Some(1_322_669));
        assert_eq!(table.enum_id(ContactField::Phone, "PAGER"), Some(1_322_665));
        assert_eq!(table.enum_id(ContactField::Email, "PRIV"), Some(1_322_679));
        assert_eq!(table.enum_id(ContactField::Position, "WORK"), None);
        assert_eq!(table.default_enum_id(ContactField::Email), Some(1_322_677));
    }

    #[tokio::test]
    async fn discovery_fills_only_missing_ids_by_code() {
        let mut config = FieldMappingConfig::default();
        config.phone.field_id = Some(11);
        let table = FieldMappingTable::new(&config);

        let resolved = table
            .resolve_with(|| async {
                Ok(vec![
                    definition(900, "PHONE"),
                    definition(22, "EMAIL"),
                    definition(33, "POSITION"),
                ])
            })
            .await;

        assert_eq!(
            resolved,
            ResolvedFieldIds {
                phone: Some(FieldId(11)),
                email: Some(FieldId(22)),
                position: Some(FieldId(33)),
            }
        );
    }

    #[tokio::test]
    async fn skips_discovery_when_everything_is_configured() {
        let mut config = FieldMappingConfig::default();
        config.phone.field_id = Some(1);
        config.email.field_id = Some(2);
        config.position.field_id = Some(3);
        let table = FieldMappingTable::new(&config);
        let calls = AtomicUsize::new(0);

        let resolved = table
            .resolve_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await;

        assert!(resolved.is_complete());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_discovery_is_cached_and_not_retried() {
        let table = FieldMappingTable::new(&FieldMappingConfig::default());
        let calls = AtomicUsize::new(0);

        let first = table
            .resolve_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ReconcileError::from(PreconditionError::MissingCredential))
            })
            .await;
        let second = table
            .resolve_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![definition(1, "PHONE")])
            })
            .await;

        assert_eq!(first, ResolvedFieldIds::default());
        assert_eq!(second, ResolvedFieldIds::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_discovery_reports_missing_fields() {
        let table = FieldMappingTable::new(&FieldMappingConfig::default());

        let resolved = table.resolve_with(|| async { Ok(vec![definition(5, "PHONE")]) }).await;

        assert_eq!(resolved.phone, Some(FieldId(5)));
        assert_eq!(resolved.missing(), vec![ContactField::Email, ContactField::Position]);
    }
}

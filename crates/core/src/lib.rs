pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod fields;
pub mod gateway;
pub mod normalize;
pub mod note;
pub mod reconcile;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use credentials::{CredentialStore, InMemoryCredentialStore};
pub use domain::call::{NormalizedCallRecord, TranscriptTurn, TurnRole};
pub use domain::company::{Company, CompanyId};
pub use domain::contact::{Contact, ContactId, FieldId};
pub use domain::lead::{Lead, LeadId, LeadPlacement};
pub use errors::{
    DegradedLookupError, InterfaceError, PreconditionError, ReconcileError, UpstreamError,
    ValidationError,
};
pub use fields::{ContactField, FieldMappingTable, ResolvedFieldIds};
pub use gateway::{AmoGateway, Lookup};
pub use reconcile::{CallReconciler, ReconcileOutcome, ReconcileStage};
pub use transport::{CrmRequest, CrmTransport, HttpMethod, TransportError};

use thiserror::Error;

use crate::transport::TransportError;

/// Malformed or incomplete webhook input. The only failure a boundary should render as a
/// client error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("phone required: contact.phone is missing or contains no digits")]
    MissingPhone,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("crm access token is not set; configure CALLBRIDGE_AMO_ACCESS_TOKEN")]
    MissingCredential,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Terminal for the invocation: never retried without external credential renewal.
    #[error("crm rejected the access token; renew it through amoCRM OAuth and restart")]
    CredentialRejected,
    #[error("crm {operation} failed: {source}")]
    Api {
        operation: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("crm {operation} returned no {entity}")]
    EmptyResponse { operation: &'static str, entity: &'static str },
}

/// A best-effort sub-operation failed. Never propagated: it only travels inside
/// [`crate::gateway::Lookup::Degraded`] so callers can log it and carry on.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("degraded {operation}: {reason}")]
pub struct DegradedLookupError {
    pub operation: &'static str,
    pub reason: String,
}

impl DegradedLookupError {
    pub fn new(operation: &'static str, cause: &ReconcileError) -> Self {
        Self { operation, reason: cause.to_string() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ReconcileError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Precondition(_) => "precondition",
            Self::Upstream(UpstreamError::CredentialRejected) => "credential_rejected",
            Self::Upstream(_) => "upstream",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The webhook payload is incomplete. A phone number is required."
            }
            Self::UpstreamUnavailable { .. } => {
                "The CRM rejected or failed the request. Check the CRM connection and retry."
            }
            Self::Internal { .. } => "The service is not configured to reach the CRM.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::UpstreamUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::UpstreamUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ReconcileError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::UpstreamUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ReconcileError> for InterfaceError {
    fn from(value: ReconcileError) -> Self {
        let message = value.to_string();
        match value {
            ReconcileError::Validation(_) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ReconcileError::Upstream(_) => {
                Self::UpstreamUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ReconcileError::Precondition(_) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

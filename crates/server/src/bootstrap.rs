use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use callbridge_core::config::{AppConfig, ConfigError};
use callbridge_core::credentials::{CredentialStore, InMemoryCredentialStore};
use callbridge_core::domain::lead::LeadPlacement;
use callbridge_core::fields::FieldMappingTable;
use callbridge_core::gateway::AmoGateway;
use callbridge_core::reconcile::CallReconciler;
use thiserror::Error;
use tracing::{info, warn};

use crate::transport::ReqwestCrmTransport;
use crate::{health, webhook};

pub struct Application {
    pub config: AppConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub reconciler: CallReconciler,
}

impl Application {
    pub fn router(&self) -> Router {
        webhook::router(self.reconciler.clone()).merge(health::router(self.credentials.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("crm http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let transport = ReqwestCrmTransport::new(
        &config.amo.base_url,
        Duration::from_secs(config.amo.timeout_secs),
    )
    .map_err(BootstrapError::HttpClient)?;

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(InMemoryCredentialStore::new(config.amo.access_token.clone()));
    if credentials.has_value() {
        info!(
            event_name = "system.bootstrap.credential_loaded",
            correlation_id = "bootstrap",
            "crm access token loaded"
        );
    } else {
        warn!(
            event_name = "system.bootstrap.credential_missing",
            correlation_id = "bootstrap",
            "crm access token is not configured; webhooks will fail until it is set"
        );
    }

    let fields = Arc::new(FieldMappingTable::new(&config.fields));
    let placement =
        LeadPlacement { pipeline_id: config.lead.pipeline_id, status_id: config.lead.status_id };
    let gateway =
        AmoGateway::new(Arc::new(transport), credentials.clone(), fields, placement);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        crm_base_url = %config.amo.base_url,
        pipeline_id = placement.pipeline_id,
        status_id = placement.status_id,
        "application bootstrap complete"
    );

    Ok(Application { config, credentials, reconciler: CallReconciler::new(Arc::new(gateway)) })
}

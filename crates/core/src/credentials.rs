use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};

/// Holder of the CRM bearer credential.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<SecretString>;
    fn set(&self, credential: SecretString);
    fn has_value(&self) -> bool;
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    credential: RwLock<Option<SecretString>>,
}

impl InMemoryCredentialStore {
    pub fn new(initial: Option<SecretString>) -> Self {
        let store = Self::default();
        if let Some(credential) = initial {
            store.set(credential);
        }
        store
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self) -> Option<SecretString> {
        let guard = self.credential.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    fn set(&self, credential: SecretString) {
        let mut guard = self.credential.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if credential.expose_secret().trim().is_empty() {
            *guard = None;
        } else {
            *guard = Some(credential);
        }
    }

    fn has_value(&self) -> bool {
        self.get().is_some()
    }
}

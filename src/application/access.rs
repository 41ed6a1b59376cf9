//! Shared-secret checks for clients and operators.

use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential")]
    Invalid,
    #[error("no credential configured for this action")]
    Disabled,
}

#[derive(Clone, Default)]
pub struct AccessKeys {
    api_key: Option<String>,
    admin_key: Option<String>,
}

impl AccessKeys {
    pub fn new(api_key: Option<String>, admin_key: Option<String>) -> Self {
        Self { api_key, admin_key }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Client access is open when no API key is configured.
    pub fn authorize_client(&self, presented: Option<&str>) -> Result<(), AccessError> {
        match self.api_key.as_deref() {
            None => Ok(()),
            Some(expected) => verify(expected, presented),
        }
    }

    /// Admin actions are refused outright when no admin key is configured.
    pub fn authorize_admin(&self, presented: Option<&str>) -> Result<(), AccessError> {
        match self.admin_key.as_deref() {
            None => Err(AccessError::Disabled),
            Some(expected) => verify(expected, presented),
        }
    }
}

impl std::fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKeys")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("admin_key", &self.admin_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn verify(expected: &str, presented: Option<&str>) -> Result<(), AccessError> {
    let presented = presented.ok_or(AccessError::Missing)?;
    if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
        Ok(())
    } else {
        Err(AccessError::Invalid)
    }
}

//! Provisioning errors.

use thiserror::Error;

use cloudburst_core::CredentialError;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("credentials unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error("{context}: HTTP {status}: {message}")]
    Api {
        context: String,
        status: u16,
        message: String,
    },

    #[error("{context}: request failed: {message}")]
    Transport { context: String, message: String },

    #[error("creating instance {instance} failed: {reason}")]
    CreateFailed { instance: String, reason: String },

    #[error("{context}: malformed response: {message}")]
    Decode { context: String, message: String },

    #[error("address lookup for {instance} failed: {message}")]
    AddressLookup { instance: String, message: String },
}

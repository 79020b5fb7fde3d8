// [libs/zatca-orchestrator/src/error.rs]
//! Error taxonomy for the onboarding and submission state machines. Each
//! variant wraps the lower layer's own error rather than re-stating it, so
//! the original CONFIG_FAULT/CRYPTO_FAULT/XML_FAULT/NETWORK_FAULT/etc.
//! prefix survives up to the CLI's JSON error envelope.

use thiserror::Error;
use zatca_api_client::ApiError;
use zatca_core::error::{CsrError, SigningError, XmlError};

use crate::onboarding::ComplianceCheckMap;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Csr(#[from] CsrError),
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("PROTOCOL_FAULT: {0}")]
    Decoding(String),
    #[error("PROTOCOL_FAULT: compliance check failed for sample document '{document_id}': {detail}")]
    ComplianceCheckFailed {
        document_id: String,
        detail: String,
        /// Which of the six sample documents had already passed before
        /// this one failed, so the caller can report partial progress.
        compliance_check: ComplianceCheckMap,
    },
}

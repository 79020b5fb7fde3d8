// [libs/zatca-orchestrator/src/lib.rs]
//! Onboarding and submission state machines for the ZATCA Fatoora
//! e-invoicing client: everything above the crypto/XML core (`zatca-core`)
//! and the REST transport (`zatca-api-client`) that sequences requests
//! into the regulator's mandated order.

pub mod error;
pub mod onboarding;
pub mod submission;

pub use error::OrchestratorError;
pub use onboarding::{decode_binary_security_token, run_onboarding, ComplianceCheckMap, OnboardingIdentity, OnboardingResult};
pub use submission::{check_compliance, submit_invoice, ComplianceCheckResult, SubmissionResult};

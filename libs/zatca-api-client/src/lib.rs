// [libs/zatca-api-client/src/lib.rs]
//! Async HTTP client for the ZATCA Fatoora e-invoicing REST API.

pub mod client;
pub mod error;

pub use client::{
    ClearanceResponse, ComplianceCheckResponse, ComplianceCsidResponse, CsidCredential,
    InvoiceSubmission, ProductionCsidResponse, ReportingResponse, ZatcaClient,
};
pub use error::ApiError;

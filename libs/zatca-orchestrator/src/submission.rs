// [libs/zatca-orchestrator/src/submission.rs]
//! Prepares and submits a single already-modeled invoice: either to the
//! compliance-checks endpoint (a taxpayer's real invoice, checked before
//! going live) or, once production credentials exist, to Reporting or
//! Clearance depending on the invoice's own classification.
//!
//! Grounded in `ZatcaPython/compliance_check.py` and
//! `ZatcaPython/reporting_and_clearance.py`: both scripts parse the
//! prepared XML file, classify it via `InvoiceTypeCode/@name`, and only
//! run the XAdES signer when the document is simplified — a standard
//! invoice's payload carries the canonical bytes unsigned, because the
//! Clearance endpoint is the one that stamps and returns the cleared copy.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use zatca_api_client::{CsidCredential, InvoiceSubmission, ZatcaClient};
use zatca_core::canon::strip_canonicalize_and_hash;
use zatca_core::invoice::is_simplified_invoice;
use zatca_core::resources::Resources;
use zatca_core::xades::{sign_invoice, SigningMaterial};

use crate::error::OrchestratorError;
use crate::onboarding::decode_binary_security_token;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// One invoice prepared for transport: the plain invoice hash, a fresh
/// UUID, and the base64-encoded document (signed, for a simplified
/// invoice; unsigned canonical bytes, for a standard one).
struct PreparedInvoice {
    is_simplified: bool,
    invoice_hash: String,
    uuid: String,
    invoice_base64: String,
}

/// Runs C → D (when simplified) → E against `xml`, classifying it from its
/// own `InvoiceTypeCode/@name` rather than trusting a caller-supplied flag.
fn prepare_invoice(
    resources: &Resources,
    xml: &[u8],
    material: &SigningMaterial,
) -> Result<PreparedInvoice, OrchestratorError> {
    let is_simplified = is_simplified_invoice(xml)?;
    let uuid = uuid::Uuid::new_v4().to_string().to_uppercase();

    if is_simplified {
        let signed = sign_invoice(resources, xml, material)?;
        let mut invoice_bytes = XML_DECLARATION.as_bytes().to_vec();
        invoice_bytes.extend_from_slice(&signed.signed_xml);
        Ok(PreparedInvoice {
            is_simplified,
            invoice_hash: signed.invoice_hash,
            uuid,
            invoice_base64: BASE64.encode(invoice_bytes),
        })
    } else {
        let (canonical, invoice_hash) = strip_canonicalize_and_hash(xml)?;
        let mut invoice_bytes = XML_DECLARATION.as_bytes().to_vec();
        invoice_bytes.extend_from_slice(&canonical);
        Ok(PreparedInvoice {
            is_simplified,
            invoice_hash,
            uuid,
            invoice_base64: BASE64.encode(invoice_bytes),
        })
    }
}

/// The result of a compliance check on a single already-prepared invoice.
#[derive(Debug, Clone)]
pub struct ComplianceCheckResult {
    pub invoice_hash: String,
    pub compliance_passed: bool,
}

/// Validates one prepared invoice against ZATCA's compliance rules —
/// the per-invoice counterpart to the six sample documents onboarding
/// submits, used once a taxpayer has a real invoice ready before
/// switching that document class over to live reporting/clearance.
pub async fn check_compliance(
    client: &ZatcaClient,
    resources: &Resources,
    private_key_pem: &str,
    compliance: &CsidCredential,
    xml: &[u8],
) -> Result<ComplianceCheckResult, OrchestratorError> {
    let certificate_der = decode_binary_security_token(&compliance.binary_security_token)?;
    let material = SigningMaterial {
        private_key_pem: private_key_pem.to_string(),
        certificate_der,
    };
    let prepared = prepare_invoice(resources, xml, &material)?;

    let submission = InvoiceSubmission {
        invoice_hash: &prepared.invoice_hash,
        uuid: &prepared.uuid,
        invoice: &prepared.invoice_base64,
    };
    let response = client.compliance_checks(compliance, &submission).await?;

    Ok(ComplianceCheckResult {
        invoice_hash: prepared.invoice_hash,
        compliance_passed: response.passed(),
    })
}

/// The result of reporting or clearing a single prepared invoice.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub invoice_hash: String,
    pub reporting_passed: bool,
    pub cleared_invoice: String,
    pub is_simplified: bool,
}

/// Signs (if simplified) or canonicalizes (if standard) `xml`, then routes
/// it to Reporting or Clearance per spec §4.H: simplified invoices are
/// reported (ZATCA does not echo them back, so the cleared invoice is the
/// request's own invoice field); standard invoices are cleared (ZATCA
/// stamps and returns the cleared document in `clearedInvoice`).
pub async fn submit_invoice(
    client: &ZatcaClient,
    resources: &Resources,
    private_key_pem: &str,
    production: &CsidCredential,
    xml: &[u8],
) -> Result<SubmissionResult, OrchestratorError> {
    let certificate_der = decode_binary_security_token(&production.binary_security_token)?;
    let material = SigningMaterial {
        private_key_pem: private_key_pem.to_string(),
        certificate_der,
    };
    let prepared = prepare_invoice(resources, xml, &material)?;

    let submission = InvoiceSubmission {
        invoice_hash: &prepared.invoice_hash,
        uuid: &prepared.uuid,
        invoice: &prepared.invoice_base64,
    };

    if prepared.is_simplified {
        let response = client.invoice_reporting(production, &submission).await?;
        Ok(SubmissionResult {
            invoice_hash: prepared.invoice_hash,
            reporting_passed: response.passed(),
            cleared_invoice: prepared.invoice_base64,
            is_simplified: true,
        })
    } else {
        let response = client.invoice_clearance(production, &submission).await?;
        let cleared_invoice = response.cleared_invoice.clone().unwrap_or_default();
        Ok(SubmissionResult {
            invoice_hash: prepared.invoice_hash,
            reporting_passed: response.passed(),
            cleared_invoice,
            is_simplified: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDARD_TEMPLATE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns:cbc="urn:cbc" xmlns:cac="urn:cac">
  <cbc:InvoiceTypeCode name="0100000">388</cbc:InvoiceTypeCode>
</Invoice>"#;

    const SIMPLIFIED_TEMPLATE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns:cbc="urn:cbc" xmlns:cac="urn:cac">
  <cbc:InvoiceTypeCode name="0200000">388</cbc:InvoiceTypeCode>
</Invoice>"#;

    #[test]
    fn classification_matches_invoice_type_code_name() {
        assert!(!is_simplified_invoice(STANDARD_TEMPLATE).unwrap());
        assert!(is_simplified_invoice(SIMPLIFIED_TEMPLATE).unwrap());
    }
}

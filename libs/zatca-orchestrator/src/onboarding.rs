// [libs/zatca-orchestrator/src/onboarding.rs]
//! The onboarding state machine: GenCSR → CompCSID → six sample documents
//! validated against ZATCA's compliance rules → ProdCSID.
//!
//! Grounded in `ZatcaPython/csr_and_onboarding.py`: the `cert_info` shape
//! carried between steps, the fixed six-entry `document_types` sequence,
//! and the ICV/PIH chaining across those six documents (ICV starts at 1
//! and increments per document; PIH seeds from the zero-hash constant and
//! thereafter is each document's own `invoiceHash`). Only the three
//! simplified samples are XAdES-signed; the three standard samples submit
//! unsigned canonical bytes, matching `get_request_api`'s branch on
//! `is_simplified_invoice`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use zatca_api_client::{CsidCredential, InvoiceSubmission, ZatcaClient};
use zatca_core::canon::strip_canonicalize_and_hash;
use zatca_core::csr::{generate_csr, CsrConfig, EnvironmentProfile};
use zatca_core::invoice::{modify_invoice_xml, InvoiceFields};
use zatca_core::resources::{Resources, SampleDocumentType, SAMPLE_DOCUMENT_TYPES, SEED_PREVIOUS_INVOICE_HASH};
use zatca_core::xades::{sign_invoice, SigningMaterial};

use crate::error::OrchestratorError;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Everything a caller needs once onboarding finishes: the taxpayer's
/// private key, its production certificate, and the production CSID
/// credential used for every subsequent reporting/clearance call.
#[derive(Debug, Clone)]
pub struct OnboardingResult {
    pub private_key_pem: String,
    pub csr_base64: String,
    pub compliance_request_id: String,
    pub compliance_credential: CsidCredential,
    pub production_request_id: String,
    pub production_certificate_der: Vec<u8>,
    pub production_credential: CsidCredential,
    pub last_invoice_counter_value: u64,
    pub last_invoice_hash: String,
    pub compliance_check: ComplianceCheckMap,
}

/// The six sample-document pass/fail flags the onboarding response envelope
/// reports, one per entry in `SAMPLE_DOCUMENT_TYPES`, in that fixed order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplianceCheckMap {
    pub standard_invoice: bool,
    pub standard_credit_note: bool,
    pub standard_debit_note: bool,
    pub simplified_invoice: bool,
    pub simplified_credit_note: bool,
    pub simplified_debit_note: bool,
}

impl ComplianceCheckMap {
    fn set(&mut self, document_type: &SampleDocumentType, passed: bool) {
        match document_type.prefix {
            "STDSI" => self.standard_invoice = passed,
            "STDCN" => self.standard_credit_note = passed,
            "STDDN" => self.standard_debit_note = passed,
            "SIMSI" => self.simplified_invoice = passed,
            "SIMCN" => self.simplified_credit_note = passed,
            "SIMDN" => self.simplified_debit_note = passed,
            other => unreachable!("unknown sample document prefix '{other}'"),
        }
    }
}

/// Per-sample-document taxpayer identity written into the invoice body
/// during the compliance-check stage.
#[derive(Debug, Clone)]
pub struct OnboardingIdentity {
    pub vat_registration_number: String,
    pub commercial_registration_number: String,
}

/// Runs the full onboarding flow and returns the production credential.
pub async fn run_onboarding(
    client: &ZatcaClient,
    resources: &Resources,
    csr_config: &CsrConfig,
    environment: EnvironmentProfile,
    otp: &str,
    identity: &OnboardingIdentity,
) -> Result<OnboardingResult, OrchestratorError> {
    let generated = generate_csr(csr_config, environment)?;
    tracing::info!("CSR generated, requesting compliance CSID");

    let compliance_csid = client.compliance_csid(&generated.csr_base64, otp).await?;
    let compliance_credential = CsidCredential {
        binary_security_token: compliance_csid.binary_security_token.clone(),
        secret: compliance_csid.secret.clone(),
    };
    let compliance_certificate_der = decode_binary_security_token(&compliance_csid.binary_security_token)?;

    let material = SigningMaterial {
        private_key_pem: generated.private_key_content.clone(),
        certificate_der: compliance_certificate_der,
    };

    let mut previous_invoice_hash = SEED_PREVIOUS_INVOICE_HASH.to_string();
    let mut icv: u64 = 0;
    let mut compliance_check = ComplianceCheckMap::default();

    for document_type in SAMPLE_DOCUMENT_TYPES.iter() {
        icv += 1;
        let fields = InvoiceFields::for_sample_document(
            document_type,
            &identity.commercial_registration_number,
            &identity.vat_registration_number,
            icv,
            &previous_invoice_hash,
        );
        let template = std::fs::read(&resources.ubl_invoice_template)
            .map_err(zatca_core::error::SigningError::Io)?;
        let modeled = modify_invoice_xml(&template, &fields)?;

        let (invoice_hash, document_base64) = if document_type.is_simplified() {
            let signed = sign_invoice(resources, &modeled, &material)?;
            let mut bytes = XML_DECLARATION.as_bytes().to_vec();
            bytes.extend_from_slice(&signed.signed_xml);
            (signed.invoice_hash, BASE64.encode(bytes))
        } else {
            let (canonical, invoice_hash) = strip_canonicalize_and_hash(&modeled)?;
            let mut bytes = XML_DECLARATION.as_bytes().to_vec();
            bytes.extend_from_slice(&canonical);
            (invoice_hash, BASE64.encode(bytes))
        };

        let uuid = uuid::Uuid::new_v4().to_string().to_uppercase();
        let submission = InvoiceSubmission {
            invoice_hash: &invoice_hash,
            uuid: &uuid,
            invoice: &document_base64,
        };

        let response = client
            .compliance_checks(&compliance_credential, &submission)
            .await?;
        if !response.passed() {
            return Err(OrchestratorError::ComplianceCheckFailed {
                document_id: document_type.document_id(),
                detail: format!("{:?}", response.validation_results),
                compliance_check,
            });
        }

        compliance_check.set(document_type, true);
        tracing::info!(
            document_id = document_type.document_id(),
            icv,
            "compliance check passed for sample document"
        );

        previous_invoice_hash = invoice_hash;
    }

    tracing::info!("all six sample documents passed compliance, requesting production CSID");
    let production_csid = client
        .production_csid(&compliance_credential, &compliance_csid.request_id)
        .await?;
    let production_certificate_der = decode_binary_security_token(&production_csid.binary_security_token)?;

    Ok(OnboardingResult {
        private_key_pem: generated.private_key_content,
        csr_base64: generated.csr_base64,
        compliance_request_id: compliance_csid.request_id,
        compliance_credential,
        production_request_id: production_csid.request_id,
        production_certificate_der,
        production_credential: CsidCredential {
            binary_security_token: production_csid.binary_security_token,
            secret: production_csid.secret,
        },
        last_invoice_counter_value: icv,
        last_invoice_hash: previous_invoice_hash,
        compliance_check,
    })
}

/// A `binarySecurityToken` is the certificate's base64-PEM body, itself
/// base64 encoded again for safe transport in a JSON string. Decoding it
/// back to raw DER therefore takes two base64 passes.
pub fn decode_binary_security_token(token: &str) -> Result<Vec<u8>, OrchestratorError> {
    let pem_body = BASE64
        .decode(token)
        .map_err(|e| OrchestratorError::Decoding(e.to_string()))?;
    let pem_body = String::from_utf8(pem_body).map_err(|e| OrchestratorError::Decoding(e.to_string()))?;
    BASE64
        .decode(pem_body.trim())
        .map_err(|e| OrchestratorError::Decoding(e.to_string()))
}

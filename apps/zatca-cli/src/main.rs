// [apps/zatca-cli/src/main.rs]
//! Reads one request envelope from stdin, runs the matching onboarding or
//! submission flow, and writes one response envelope to stdout. One process
//! per request: this binary is meant to be shelled out to, not kept warm.

use std::io::Read;

use clap::Parser;
use serde::{Deserialize, Serialize};

use zatca_api_client::ZatcaClient;
use zatca_core::csr::{CsrConfig, EnvironmentProfile};
use zatca_core::resources::Resources;
use zatca_orchestrator::onboarding::{run_onboarding, OnboardingIdentity};
use zatca_orchestrator::submission::{check_compliance, submit_invoice};

/// Where the on-disk XSLT/UBL template assets live, relative to the
/// process's working directory unless an absolute path is given.
#[derive(Parser, Debug)]
#[command(name = "zatca-cli")]
struct Args {
    #[arg(long, default_value = "resources")]
    resources_dir: String,
}

/// The three request shapes share no discriminator field in the spec, so
/// they're told apart by which of `otp`, `binary_security_token` or
/// `production_binary_security_token` is present.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Request {
    Onboarding(OnboardingRequest),
    ComplianceCheck(ComplianceCheckRequest),
    Submission(SubmissionRequest),
}

#[derive(Debug, Deserialize)]
struct OnboardingRequest {
    env: String,
    otp: String,
    crn: String,
    serial_number: String,
    vat: String,
    branch_name: String,
    name: String,
    country_code: String,
    invoice_type: String,
    address: String,
    business_category: String,
    /// Accepted for compatibility with the envelope's field list; the
    /// original pipeline threads it into a call whose own function
    /// signature never accepts it, so there is nothing for it to drive here.
    #[serde(default)]
    #[allow(dead_code)]
    invoice_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComplianceCheckRequest {
    env: String,
    private_key: String,
    binary_security_token: String,
    secret: String,
    xml_file_path: String,
    /// Accepted but not trusted: classification is always re-derived from
    /// the invoice XML itself (see `zatca_core::invoice::is_simplified_invoice`).
    #[serde(default)]
    #[allow(dead_code)]
    is_simplified: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SubmissionRequest {
    env: String,
    private_key: String,
    production_binary_security_token: String,
    production_secret: String,
    xml_file_path: String,
    #[serde(default)]
    #[allow(dead_code)]
    is_simplified: Option<bool>,
}

#[derive(Debug, Serialize, Default)]
struct ComplianceCheckMapOut {
    standard_invoice: bool,
    standard_credit_note: bool,
    standard_debit_note: bool,
    simplified_invoice: bool,
    simplified_credit_note: bool,
    simplified_debit_note: bool,
}

impl From<zatca_orchestrator::onboarding::ComplianceCheckMap> for ComplianceCheckMapOut {
    fn from(m: zatca_orchestrator::onboarding::ComplianceCheckMap) -> Self {
        Self {
            standard_invoice: m.standard_invoice,
            standard_credit_note: m.standard_credit_note,
            standard_debit_note: m.standard_debit_note,
            simplified_invoice: m.simplified_invoice,
            simplified_credit_note: m.simplified_credit_note,
            simplified_debit_note: m.simplified_debit_note,
        }
    }
}

#[derive(Debug, Serialize, Default)]
struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    csr: Option<String>,
    #[serde(rename = "ccsid_requestID", skip_serializing_if = "Option::is_none")]
    ccsid_request_id: Option<String>,
    #[serde(rename = "ccsid_binarySecurityToken", skip_serializing_if = "Option::is_none")]
    ccsid_binary_security_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ccsid_secret: Option<String>,
    #[serde(rename = "pcsid_requestID", skip_serializing_if = "Option::is_none")]
    pcsid_request_id: Option<String>,
    #[serde(rename = "pcsid_binarySecurityToken", skip_serializing_if = "Option::is_none")]
    pcsid_binary_security_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pcsid_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compliance_check: Option<ComplianceCheckMapOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invoice_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compliance_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reporting_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cleared_invoice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_simplified: Option<bool>,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    traceback: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut raw = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut raw) {
        emit_fatal(&format!("failed to read request from stdin: {err}"), None);
        std::process::exit(1);
    }

    let request: Request = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(err) => {
            emit_fatal(&format!("malformed request envelope: {err}"), None);
            std::process::exit(1);
        }
    };

    let resources = Resources::from_base_dir(&args.resources_dir);
    tracing::info!(resources_dir = %args.resources_dir, "dispatching request");

    let envelope = match request {
        Request::Onboarding(req) => run_onboarding_request(&resources, req).await,
        Request::ComplianceCheck(req) => run_compliance_check_request(&resources, req).await,
        Request::Submission(req) => run_submission_request(&resources, req).await,
    };

    match envelope {
        Ok(envelope) => {
            print_envelope(&envelope);
        }
        Err(envelope) => {
            tracing::error!(error = %envelope.error, "request failed");
            print_envelope(&envelope);
            std::process::exit(1);
        }
    }
}

fn print_envelope(envelope: &ResponseEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to serialize response envelope: {err}"),
    }
}

fn emit_fatal(message: &str, traceback: Option<String>) {
    print_envelope(&ResponseEnvelope {
        error: message.to_string(),
        traceback,
        ..Default::default()
    });
}

async fn run_onboarding_request(
    resources: &Resources,
    req: OnboardingRequest,
) -> Result<ResponseEnvelope, ResponseEnvelope> {
    let environment = EnvironmentProfile::parse(&req.env).map_err(|e| fault_envelope(e))?;
    let csr_config = CsrConfig {
        common_name: req.crn.clone(),
        serial_number: req.serial_number,
        organization_identifier: req.vat.clone(),
        organization_unit_name: req.branch_name,
        organization_name: req.name,
        country_code: req.country_code,
        invoice_type: req.invoice_type,
        location_address: req.address,
        industry_business_category: req.business_category,
    };
    let identity = OnboardingIdentity {
        vat_registration_number: req.vat,
        commercial_registration_number: req.crn,
    };

    let client = ZatcaClient::new(environment);
    let result = run_onboarding(&client, resources, &csr_config, environment, &req.otp, &identity)
        .await
        .map_err(|e| fault_envelope(e))?;

    Ok(ResponseEnvelope {
        private_key: Some(result.private_key_pem),
        csr: Some(result.csr_base64),
        ccsid_request_id: Some(result.compliance_request_id),
        ccsid_binary_security_token: Some(result.compliance_credential.binary_security_token),
        ccsid_secret: Some(result.compliance_credential.secret),
        pcsid_request_id: Some(result.production_request_id),
        pcsid_binary_security_token: Some(result.production_credential.binary_security_token),
        pcsid_secret: Some(result.production_credential.secret),
        compliance_check: Some(result.compliance_check.into()),
        error: String::new(),
        ..Default::default()
    })
}

async fn run_compliance_check_request(
    resources: &Resources,
    req: ComplianceCheckRequest,
) -> Result<ResponseEnvelope, ResponseEnvelope> {
    let environment = EnvironmentProfile::parse(&req.env).map_err(|e| fault_envelope(e))?;
    let xml = std::fs::read(&req.xml_file_path)
        .map_err(|e| fault_envelope(format!("failed to read '{}': {e}", req.xml_file_path)))?;

    let credential = zatca_api_client::CsidCredential {
        binary_security_token: req.binary_security_token,
        secret: req.secret,
    };
    let client = ZatcaClient::new(environment);
    let result = check_compliance(&client, resources, &req.private_key, &credential, &xml)
        .await
        .map_err(|e| fault_envelope(e))?;

    Ok(ResponseEnvelope {
        invoice_hash: Some(result.invoice_hash),
        compliance_passed: Some(result.compliance_passed),
        error: String::new(),
        ..Default::default()
    })
}

async fn run_submission_request(
    resources: &Resources,
    req: SubmissionRequest,
) -> Result<ResponseEnvelope, ResponseEnvelope> {
    let environment = EnvironmentProfile::parse(&req.env).map_err(|e| fault_envelope(e))?;
    let xml = std::fs::read(&req.xml_file_path)
        .map_err(|e| fault_envelope(format!("failed to read '{}': {e}", req.xml_file_path)))?;

    let credential = zatca_api_client::CsidCredential {
        binary_security_token: req.production_binary_security_token,
        secret: req.production_secret,
    };
    let client = ZatcaClient::new(environment);
    let result = submit_invoice(&client, resources, &req.private_key, &credential, &xml)
        .await
        .map_err(|e| fault_envelope(e))?;

    Ok(ResponseEnvelope {
        invoice_hash: Some(result.invoice_hash),
        reporting_passed: Some(result.reporting_passed),
        cleared_invoice: Some(result.cleared_invoice),
        is_simplified: Some(result.is_simplified),
        error: String::new(),
        ..Default::default()
    })
}

/// Builds a fatal-error envelope from any displayable error, carrying the
/// error's `{:?}` rendering as the traceback since none of the lower layers
/// capture a backtrace of their own.
fn fault_envelope(err: impl std::fmt::Debug + std::fmt::Display) -> ResponseEnvelope {
    ResponseEnvelope {
        error: err.to_string(),
        traceback: Some(format!("{err:?}")),
        ..Default::default()
    }
}

// [libs/zatca-api-client/src/client.rs]
//! Thin async wrapper over ZATCA's five e-invoicing REST endpoints.
//!
//! Grounded in `ZatcaPython/utilities/api_helper.py`: the same five
//! endpoint functions, the same headers (`Accept-Version: V2`, `OTP` on the
//! compliance-CSID call only, HTTP Basic auth built from the CSID/secret
//! pair everywhere else, `Clearance-Status` distinguishing reporting from
//! clearance), and `post_request_with_retries`'s retry policy: three
//! attempts, `backoff_factor * 2^attempt` seconds of sleep, retrying only
//! on a connection-layer failure — a non-2xx response is the regulator's
//! verdict and is returned immediately, never retried.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zatca_core::EnvironmentProfile;

use crate::error::ApiError;

const BASE_HOST: &str = "https://gw-fatoora.zatca.gov.sa/e-invoicing";
const API_VERSION: &str = "V2";
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_FACTOR_SECONDS: f64 = 1.0;

/// A CSID credential pair as issued by either the compliance or production
/// CSID endpoint, used as HTTP Basic auth on every subsequent call.
#[derive(Debug, Clone)]
pub struct CsidCredential {
    pub binary_security_token: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
struct ComplianceCsidRequest<'a> {
    csr: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ComplianceCsidResponse {
    #[serde(rename = "binarySecurityToken")]
    pub binary_security_token: String,
    pub secret: String,
    #[serde(rename = "requestID")]
    pub request_id: String,
}

#[derive(Debug, Serialize)]
struct ProductionCsidRequest<'a> {
    compliance_request_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ProductionCsidResponse {
    #[serde(rename = "binarySecurityToken")]
    pub binary_security_token: String,
    pub secret: String,
    #[serde(rename = "requestID")]
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvoiceSubmission<'a> {
    #[serde(rename = "invoiceHash")]
    pub invoice_hash: &'a str,
    pub uuid: &'a str,
    pub invoice: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct ComplianceCheckResponse {
    #[serde(default, rename = "reportingStatus")]
    pub reporting_status: Option<String>,
    #[serde(default, rename = "clearanceStatus")]
    pub clearance_status: Option<String>,
    #[serde(default, rename = "validationResults")]
    pub validation_results: serde_json::Value,
}

impl ComplianceCheckResponse {
    /// A compliance check passes when either status string ZATCA might
    /// return for a sample document contains "REPORTED" or "CLEARED".
    pub fn passed(&self) -> bool {
        status_indicates_success(self.reporting_status.as_deref())
            || status_indicates_success(self.clearance_status.as_deref())
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ReportingResponse {
    #[serde(default, rename = "reportingStatus")]
    pub reporting_status: Option<String>,
    #[serde(default, rename = "validationResults")]
    pub validation_results: serde_json::Value,
}

impl ReportingResponse {
    pub fn passed(&self) -> bool {
        status_indicates_success(self.reporting_status.as_deref())
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ClearanceResponse {
    #[serde(default, rename = "clearanceStatus")]
    pub clearance_status: Option<String>,
    #[serde(default)]
    #[serde(rename = "clearedInvoice")]
    pub cleared_invoice: Option<String>,
    #[serde(default, rename = "validationResults")]
    pub validation_results: serde_json::Value,
}

impl ClearanceResponse {
    pub fn passed(&self) -> bool {
        status_indicates_success(self.clearance_status.as_deref())
    }
}

/// ZATCA's documented success contract: the status string contains
/// "REPORTED" or "CLEARED" somewhere in it, not an exact match.
fn status_indicates_success(status: Option<&str>) -> bool {
    match status {
        Some(s) => s.contains("REPORTED") || s.contains("CLEARED"),
        None => false,
    }
}

/// Talks to ZATCA's onboarding and submission endpoints for one
/// environment profile.
pub struct ZatcaClient {
    http: reqwest::Client,
    environment: EnvironmentProfile,
}

impl ZatcaClient {
    pub fn new(environment: EnvironmentProfile) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("zatca-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client configuration is static and known to be valid");
        Self { http, environment }
    }

    fn base_url(&self) -> String {
        format!("{}/{}", BASE_HOST, self.environment.api_path_segment())
    }

    /// Headers every ZATCA endpoint expects regardless of which one is
    /// being called; `Content-Type` is set separately by `.json()`.
    fn common_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Accept", "application/json")
            .header("Accept-Language", "en")
            .header("Accept-Version", API_VERSION)
    }

    /// `POST {base}/compliance` — exchanges a CSR and one-time password for
    /// a compliance CSID credential.
    pub async fn compliance_csid(&self, csr_base64: &str, otp: &str) -> Result<ComplianceCsidResponse, ApiError> {
        let url = format!("{}/compliance", self.base_url());
        let body = ComplianceCsidRequest { csr: csr_base64 };
        self.send_with_retries(|| {
            self.common_headers(self.http.post(&url))
                .header("OTP", otp)
                .json(&body)
        })
        .await
    }

    /// `POST {base}/production/csids` — exchanges the compliance CSID's
    /// `requestID` for a production CSID credential.
    pub async fn production_csid(
        &self,
        compliance: &CsidCredential,
        compliance_request_id: &str,
    ) -> Result<ProductionCsidResponse, ApiError> {
        let url = format!("{}/production/csids", self.base_url());
        let body = ProductionCsidRequest {
            compliance_request_id,
        };
        self.send_with_retries(|| {
            self.common_headers(self.http.post(&url))
                .basic_auth(&compliance.binary_security_token, Some(&compliance.secret))
                .json(&body)
        })
        .await
    }

    /// `POST {base}/compliance/invoices` — validates a signed sample
    /// document against ZATCA's compliance rules during onboarding.
    pub async fn compliance_checks(
        &self,
        compliance: &CsidCredential,
        submission: &InvoiceSubmission<'_>,
    ) -> Result<ComplianceCheckResponse, ApiError> {
        let url = format!("{}/compliance/invoices", self.base_url());
        self.send_with_retries(|| {
            self.common_headers(self.http.post(&url))
                .basic_auth(&compliance.binary_security_token, Some(&compliance.secret))
                .json(submission)
        })
        .await
    }

    /// `POST {base}/invoices/reporting/single` — standard-invoice path;
    /// ZATCA reports the invoice asynchronously and does not echo it back.
    pub async fn invoice_reporting(
        &self,
        production: &CsidCredential,
        submission: &InvoiceSubmission<'_>,
    ) -> Result<ReportingResponse, ApiError> {
        let url = format!("{}/invoices/reporting/single", self.base_url());
        self.send_with_retries(|| {
            self.common_headers(self.http.post(&url))
                .basic_auth(&production.binary_security_token, Some(&production.secret))
                .json(submission)
        })
        .await
    }

    /// `POST {base}/invoices/clearance/single` — simplified/B2C-excluded
    /// path; ZATCA clears synchronously and returns the stamped invoice in
    /// `clearedInvoice`.
    pub async fn invoice_clearance(
        &self,
        production: &CsidCredential,
        submission: &InvoiceSubmission<'_>,
    ) -> Result<ClearanceResponse, ApiError> {
        let url = format!("{}/invoices/clearance/single", self.base_url());
        self.send_with_retries(|| {
            self.common_headers(self.http.post(&url))
                .header("Clearance-Status", "1")
                .basic_auth(&production.binary_security_token, Some(&production.secret))
                .json(submission)
        })
        .await
    }

    /// Sends `build_request()` up to `MAX_ATTEMPTS` times, sleeping
    /// `BACKOFF_FACTOR_SECONDS * 2^attempt` between attempts, but only when
    /// the failure is a connection-layer error. A response that arrives
    /// with a non-2xx status is returned (as `ApiError::Http`) on the first
    /// try, never retried.
    async fn send_with_retries<T, F>(&self, build_request: F) -> Result<T, ApiError>
    where
        T: for<'de> Deserialize<'de>,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build_request().send().await {
                Ok(response) => return Self::parse_response(response).await,
                Err(err) if is_connection_error(&err) && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = Duration::from_secs_f64(BACKOFF_FACTOR_SECONDS * 2f64.powi(attempt as i32));
                    tracing::warn!(attempt, delay_secs = delay.as_secs_f64(), "ZATCA API connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_timeout() => return Err(ApiError::Timeout),
                Err(err) => return Err(ApiError::Network(err)),
            }
        }
    }

    async fn parse_response<T>(response: reqwest::Response) -> Result<T, ApiError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Protocol(e.to_string()))
    }
}

fn is_connection_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_follows_environment_path_segment() {
        let client = ZatcaClient::new(EnvironmentProfile::Simulation);
        assert_eq!(
            client.base_url(),
            "https://gw-fatoora.zatca.gov.sa/e-invoicing/simulation"
        );
    }
}

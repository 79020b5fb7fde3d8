// [libs/zatca-core/src/csr.rs]
//! ECDSA/secp256k1 key generation and the ZATCA-flavored PKCS#10 CSR: a
//! custom extension (OID 1.3.6.1.4.1.311.20.2) carrying a DER UTF8String
//! template name, and a SubjectAlternativeName/DirectoryName RDN sequence
//! encoding the taxpayer's serial number, VAT, invoice-type bitmap, address
//! and industry category. Both extensions are non-critical.
//!
//! Grounded in `ZatcaPython/utilities/csr_generator.py`: its commented-out
//! native path (building the CSR with `cryptography`'s `x509` builder and
//! `asn1crypto.core.UTF8String`) is the reference behavior here; the live
//! path in that file shells out to ZATCA's Fatoora Java SDK, which is
//! explicitly out of scope (spec's Design Notes, "two divergent code paths
//! for simplified signing").

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use der::asn1::Utf8StringRef;
use der::{Encode, pem::LineEnding};
use k256::ecdsa::{DerSignature, SigningKey};
use k256::pkcs8::EncodePrivateKey;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::builder::{Builder, RequestBuilder};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::{AsExtension, Extension};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::CertReq;

use crate::error::CsrError;

/// Selects the ASN.1 template string embedded in the CSR and the ZATCA API
/// path segment. Immutable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvironmentProfile {
    NonProduction,
    Simulation,
    Production,
}

impl EnvironmentProfile {
    pub fn parse(raw: &str) -> Result<Self, CsrError> {
        match raw {
            "NonProduction" => Ok(Self::NonProduction),
            "Simulation" => Ok(Self::Simulation),
            "Production" => Ok(Self::Production),
            other => Err(CsrError::InvalidEnvironment(other.to_string())),
        }
    }

    /// The ASN.1 template string for OID 1.3.6.1.4.1.311.20.2.
    pub fn asn_template(&self) -> &'static str {
        match self {
            Self::NonProduction => "TSTZATCA-Code-Signing",
            Self::Simulation => "PREZATCA-Code-Signing",
            Self::Production => "ZATCA-Code-Signing",
        }
    }

    /// The `{path}` segment of `https://gw-fatoora.zatca.gov.sa/e-invoicing/{path}/...`.
    pub fn api_path_segment(&self) -> &'static str {
        match self {
            Self::NonProduction => "developer-portal",
            Self::Simulation => "simulation",
            Self::Production => "core",
        }
    }
}

/// Taxpayer and solution identity carried into the CSR subject and SAN.
/// Every field is required; an empty string is rejected at generation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrConfig {
    pub common_name: String,
    pub serial_number: String,
    pub organization_identifier: String,
    pub organization_unit_name: String,
    pub organization_name: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    pub invoice_type: String,
    pub location_address: String,
    pub industry_business_category: String,
}

fn default_country_code() -> String {
    "SA".to_string()
}

impl CsrConfig {
    fn validate(&self) -> Result<(), CsrError> {
        macro_rules! require {
            ($field:expr, $name:literal) => {
                if $field.trim().is_empty() {
                    return Err(CsrError::MissingField($name));
                }
            };
        }
        require!(self.common_name, "common_name");
        require!(self.serial_number, "serial_number");
        require!(self.organization_identifier, "organization_identifier");
        require!(self.organization_unit_name, "organization_unit_name");
        require!(self.organization_name, "organization_name");
        require!(self.country_code, "country_code");
        require!(self.invoice_type, "invoice_type");
        require!(self.location_address, "location_address");
        require!(self.industry_business_category, "industry_business_category");
        Ok(())
    }
}

/// The pair produced for one taxpayer: a PEM private key (header/footer
/// stripped, newlines removed) and a base64-encoded PEM CSR.
#[derive(Debug, Clone)]
pub struct GeneratedCsr {
    pub private_key_content: String,
    pub csr_base64: String,
}

const ZATCA_TEMPLATE_OID: &str = "1.3.6.1.4.1.311.20.2";
const OID_SERIAL_NUMBER: &str = "2.5.4.4";
const OID_ORGANIZATION_IDENTIFIER: &str = "0.9.2342.19200300.100.1.1";
const OID_INVOICE_TYPE: &str = "2.5.4.12";
const OID_LOCATION_ADDRESS: &str = "2.5.4.26";
const OID_INDUSTRY_CATEGORY: &str = "2.5.4.15";

/// Generates a fresh secp256k1 key pair and the ZATCA CSR described above.
pub fn generate_csr(config: &CsrConfig, environment: EnvironmentProfile) -> Result<GeneratedCsr, CsrError> {
    config.validate()?;

    let signing_key = SigningKey::random(&mut OsRng);

    let subject = build_subject_name(config)?;

    let mut builder = RequestBuilder::new(subject, &signing_key)
        .map_err(|e| CsrError::Signing(e.to_string()))?;

    builder
        .add_extension(&ZatcaTemplateExtension::new(environment.asn_template())?)
        .map_err(CsrError::Encoding)?;
    builder
        .add_extension(&build_san_extension(config)?)
        .map_err(CsrError::Encoding)?;

    let cert_req: CertReq = builder
        .build::<DerSignature>()
        .map_err(|e| CsrError::Signing(e.to_string()))?;

    let csr_pem = cert_req
        .to_pem(LineEnding::LF)
        .map_err(|e| CsrError::Encoding(e.into()))?;
    let csr_base64 = BASE64.encode(csr_pem.as_bytes());

    let private_key_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CsrError::KeyGeneration(e.to_string()))?;
    let private_key_content = strip_pem_envelope(&private_key_pem);

    Ok(GeneratedCsr { private_key_content, csr_base64 })
}

/// Subject DN in the exact order ZATCA's verifier expects: C, OU, O, CN.
fn build_subject_name(config: &CsrConfig) -> Result<Name, CsrError> {
    const OID_COUNTRY: &str = "2.5.4.6";
    const OID_ORG_UNIT: &str = "2.5.4.11";
    const OID_ORGANIZATION: &str = "2.5.4.10";
    const OID_COMMON_NAME: &str = "2.5.4.3";

    let rdns = vec![
        single_attribute_rdn(OID_COUNTRY, &config.country_code)?,
        single_attribute_rdn(OID_ORG_UNIT, &config.organization_unit_name)?,
        single_attribute_rdn(OID_ORGANIZATION, &config.organization_name)?,
        single_attribute_rdn(OID_COMMON_NAME, &config.common_name)?,
    ];
    Ok(Name::from(RdnSequence::from(rdns)))
}

fn single_attribute_rdn(oid: &str, value: &str) -> Result<RelativeDistinguishedName, CsrError> {
    let oid = const_oid::ObjectIdentifier::new(oid).map_err(der::Error::from)?;
    let value = Utf8StringRef::new(value).map_err(der::Error::from)?;
    let atv = AttributeTypeAndValue {
        oid,
        value: value.into(),
    };
    Ok(RelativeDistinguishedName::from(vec![atv]))
}

/// The custom ZATCA extension: OID 1.3.6.1.4.1.311.20.2, non-critical,
/// whose value is a DER-encoded UTF8String (tag 0x0C) — not raw bytes, a
/// known source of interop failure the spec calls out explicitly.
struct ZatcaTemplateExtension {
    der_utf8_string: Vec<u8>,
}

impl ZatcaTemplateExtension {
    fn new(template: &str) -> Result<Self, CsrError> {
        let utf8 = Utf8StringRef::new(template).map_err(der::Error::from)?;
        let der_utf8_string = utf8.to_der().map_err(CsrError::Encoding)?;
        Ok(Self { der_utf8_string })
    }
}

impl AsExtension for ZatcaTemplateExtension {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }

    fn to_extension(&self, _subject: &Name, _extensions: &[Extension]) -> Result<Extension, der::Error> {
        Extension::new(
            const_oid::ObjectIdentifier::new(ZATCA_TEMPLATE_OID)?,
            false,
            self.der_utf8_string.clone(),
        )
    }
}

/// SAN carrying a single `directoryName`, RDN sequence in the order:
/// serial number, organization identifier (VAT), invoice type, location
/// address, industry business category.
fn build_san_extension(config: &CsrConfig) -> Result<SubjectAltName, CsrError> {
    let rdns = vec![
        single_attribute_rdn(OID_SERIAL_NUMBER, &config.serial_number)?,
        single_attribute_rdn(OID_ORGANIZATION_IDENTIFIER, &config.organization_identifier)?,
        single_attribute_rdn(OID_INVOICE_TYPE, &config.invoice_type)?,
        single_attribute_rdn(OID_LOCATION_ADDRESS, &config.location_address)?,
        single_attribute_rdn(OID_INDUSTRY_CATEGORY, &config.industry_business_category)?,
    ];
    let directory_name = Name::from(RdnSequence::from(rdns));
    Ok(SubjectAltName(vec![GeneralName::DirectoryName(directory_name)]))
}

fn strip_pem_envelope(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> CsrConfig {
        CsrConfig {
            common_name: "TST-886431145-399999999900003".into(),
            serial_number: "1-TST|2-TST|3-ed22f1d8-e6a2-1118-9b58-d9a8f11e445f".into(),
            organization_identifier: "399999999900003".into(),
            organization_unit_name: "Riyadh Branch".into(),
            organization_name: "Maximum Speed Tech Supply LTD".into(),
            country_code: "SA".into(),
            invoice_type: "1100".into(),
            location_address: "RRRD2929".into(),
            industry_business_category: "Supply activities".into(),
        }
    }

    #[test]
    fn rejects_empty_required_field() {
        let mut config = sample_config();
        config.organization_identifier = "".into();
        let err = generate_csr(&config, EnvironmentProfile::NonProduction).unwrap_err();
        assert!(matches!(err, CsrError::MissingField("organization_identifier")));
    }

    #[test]
    fn environment_selects_expected_asn_template() {
        assert_eq!(EnvironmentProfile::NonProduction.asn_template(), "TSTZATCA-Code-Signing");
        assert_eq!(EnvironmentProfile::Simulation.asn_template(), "PREZATCA-Code-Signing");
        assert_eq!(EnvironmentProfile::Production.asn_template(), "ZATCA-Code-Signing");
    }

    #[test]
    fn environment_selects_expected_api_path() {
        assert_eq!(EnvironmentProfile::Simulation.api_path_segment(), "simulation");
        assert_eq!(EnvironmentProfile::NonProduction.api_path_segment(), "developer-portal");
        assert_eq!(EnvironmentProfile::Production.api_path_segment(), "core");
    }

    #[test]
    fn generates_csr_and_strips_private_key_envelope() {
        let config = sample_config();
        let generated = generate_csr(&config, EnvironmentProfile::NonProduction).unwrap();
        assert!(!generated.private_key_content.contains("-----"));
        assert!(!generated.private_key_content.contains('\n'));
        assert!(!generated.csr_base64.is_empty());
    }
}

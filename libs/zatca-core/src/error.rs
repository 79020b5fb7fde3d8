// [libs/zatca-core/src/error.rs]
//! Error taxonomy for the crypto/XML core, per the ConfigError / CryptoError /
//! XmlError kinds named in the onboarding and submission contract.

use thiserror::Error;

/// Failures raised while building a CSR from taxpayer configuration.
#[derive(Error, Debug)]
pub enum CsrError {
    #[error("CONFIG_FAULT: missing or empty CSR field '{0}'")]
    MissingField(&'static str),
    #[error("CONFIG_FAULT: invalid environment profile '{0}'")]
    InvalidEnvironment(String),
    #[error("CRYPTO_FAULT: key generation failed: {0}")]
    KeyGeneration(String),
    #[error("CRYPTO_FAULT: CSR encoding failed: {0}")]
    Encoding(#[from] der::Error),
    #[error("CRYPTO_FAULT: CSR signing failed: {0}")]
    Signing(String),
}

/// Failures raised while mutating or classifying a UBL invoice tree.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML_FAULT: failed to parse document: {0}")]
    Parse(String),
    #[error("XML_FAULT: required node not found: {0}")]
    MissingNode(&'static str),
    #[error("XML_FAULT: XSLT-equivalent strip transform failed: {0}")]
    Transform(String),
    #[error("XML_FAULT: canonicalization failed: {0}")]
    Canonicalization(String),
    #[error("XML_FAULT: anchor '{0}' not found while splicing signature block")]
    MissingAnchor(&'static str),
}

/// Failures raised while assembling the XAdES signature or the QR payload.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("CRYPTO_FAULT: certificate parsing failed: {0}")]
    CertificateParse(String),
    #[error("CRYPTO_FAULT: signature generation failed: {0}")]
    Signature(String),
    #[error("CRYPTO_FAULT: base64/hex decoding failed: {0}")]
    Decoding(String),
    #[error("QR_FAULT: {0}")]
    Qr(#[from] QrError),
    #[error("CONFIG_FAULT: failed to read signing resource: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised while assembling the TLV QR payload.
#[derive(Error, Debug)]
pub enum QrError {
    #[error("QR_FAULT: invalid tag value: {0}")]
    InvalidTag(u32),
    #[error("QR_FAULT: missing required field '{0}'")]
    MissingField(&'static str),
}

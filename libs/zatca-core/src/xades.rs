// [libs/zatca-core/src/xades.rs]
//! XAdES signing: the core of the core. Produces the `xades:SignedProperties`
//! fragment, signs the canonicalized invoice, builds the UBL signature
//! block and QR reference node, and splices both into the invoice XML.
//!
//! Grounded in `ZatcaPython/utilities/einvoice_signer.py` end to end:
//! `generate_public_key_hashing`, `get_signed_properties_hash`,
//! `get_digital_signature`, `get_public_key_and_signature`,
//! `insert_ubl_into_xml`, `insert_signature_into_xml`, `get_issuer_name`.
//! Note that `wrap_certificate` (PEM-wrapping the certificate at 64
//! columns) is used there only to load the X.509 object for issuer/serial
//! extraction — `generate_public_key_hashing` and `populate_ubl_template`'s
//! `CERTIFICATE_CONTENT` both operate on the *unwrapped* base64 string, and
//! this module follows that: `cert_base64` (not a wrapped form) feeds both
//! the H1 digest and the `ds:X509Certificate` substitution.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{DerSignature, SigningKey};
use k256::pkcs8::DecodePrivateKey;
use sha2::{Digest, Sha256};
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use crate::canon::{canonicalize, hash_base64, strip_signing_artifacts};
use crate::error::SigningError;
use crate::qr::{encode_qr, extract_invoice_fields, QrFields};
use crate::resources::Resources;
use crate::time::RiyadhTimestamp;

/// Everything the signer needs about the taxpayer's assigned credential:
/// the ECDSA private key (the envelope-stripped PKCS#8 content the CSR
/// Builder returns — base64 of the DER, no `-----BEGIN/END-----` lines or
/// newlines) and the DER-encoded X.509 certificate ZATCA issued against
/// that key.
#[derive(Debug, Clone)]
pub struct SigningMaterial {
    pub private_key_pem: String,
    pub certificate_der: Vec<u8>,
}

/// The result of signing one invoice: the fully signed XML, the plain
/// (single-encoded) invoice hash, and the base64 QR payload.
#[derive(Debug, Clone)]
pub struct SignedInvoice {
    pub signed_xml: Vec<u8>,
    pub invoice_hash: String,
    pub qr_base64: String,
}

const SIGNED_PROPERTIES_ID: &str = "xadesSignedProperties";
const DIGEST_ALGORITHM_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const SIGNATURE_ALGORITHM_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";

/// Signs `modeled_xml` (the Invoice Modeler's output) and returns the signed
/// document along with the invoice hash and QR payload.
pub fn sign_invoice(
    resources: &Resources,
    modeled_xml: &[u8],
    material: &SigningMaterial,
) -> Result<SignedInvoice, SigningError> {
    let cleared = strip_signing_artifacts(modeled_xml)?;
    let canonical = canonicalize(&cleared)?;
    let invoice_hash = hash_base64(&canonical);
    let invoice_fields = extract_invoice_fields(&canonical)?;

    let certificate = Certificate::from_der(&material.certificate_der)
        .map_err(|e| SigningError::CertificateParse(e.to_string()))?;

    let cert_base64 = BASE64.encode(&material.certificate_der);
    let certificate_hash = double_encoded_hash(cert_base64.as_bytes());

    let issuer_name = render_issuer_name(&certificate);
    let serial_number = certificate.tbs_certificate.serial_number.to_string();

    let signing_time = RiyadhTimestamp::now().signing_timestamp();
    let signed_properties_xml = render_signed_properties(
        &signing_time,
        &certificate_hash,
        &issuer_name,
        &serial_number,
    );
    let signed_properties_hash = double_encoded_hash(signed_properties_xml.as_bytes());

    let private_key_der = BASE64
        .decode(&material.private_key_pem)
        .map_err(|e| SigningError::Decoding(e.to_string()))?;
    let signing_key = SigningKey::from_pkcs8_der(&private_key_der)
        .map_err(|e| SigningError::CertificateParse(e.to_string()))?;
    let invoice_digest = BASE64
        .decode(&invoice_hash)
        .map_err(|e| SigningError::Decoding(e.to_string()))?;
    let signature: DerSignature = signing_key
        .sign_prehash(&invoice_digest)
        .map_err(|e| SigningError::Signature(e.to_string()))?;
    let digital_signature_base64 = BASE64.encode(signature.to_bytes());

    let verifying_key = signing_key.verifying_key();
    let public_key_der = subject_public_key_der(verifying_key);
    let certificate_signature_der = extract_certificate_signature(&material.certificate_der)?;

    let qr_base64 = encode_qr(&QrFields {
        seller_name: invoice_fields.seller_name.clone(),
        vat_registration_number: invoice_fields.vat_registration_number.clone(),
        invoice_timestamp: invoice_fields.issue_date_time.clone(),
        invoice_total_with_vat: invoice_fields.payable_amount.clone(),
        vat_total: invoice_fields.tax_amount.clone(),
        invoice_hash: invoice_hash.clone(),
        digital_signature: BASE64
            .decode(&digital_signature_base64)
            .map_err(|e| SigningError::Decoding(e.to_string()))?,
        public_key_der: public_key_der.clone(),
        certificate_signature_der: certificate_signature_der.clone(),
    })?;

    let signature_block = render_signature_block(
        resources,
        &signed_properties_xml,
        &signed_properties_hash,
        &invoice_hash,
        &digital_signature_base64,
        &cert_base64,
        &issuer_name,
        &serial_number,
        &signing_time,
    )?;
    let qr_reference_block = render_qr_reference_block(resources, &qr_base64)?;

    let with_signature = insert_ubl_extensions(&canonical, &signature_block)?;
    let signed_xml = insert_before_supplier_party(&with_signature, &qr_reference_block)?;

    Ok(SignedInvoice {
        signed_xml,
        invoice_hash,
        qr_base64,
    })
}

/// `base64(hex(SHA-256(input)))` — ZATCA's non-standard double encoding,
/// used for both the certificate hash and the SignedProperties hash. This
/// is intentional, not a bug to "fix" to `base64(SHA-256(input))`: the
/// verifier recomputes the same double encoding on its side.
pub fn double_encoded_hash(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    BASE64.encode(hex::encode(digest))
}

/// Renders the exact `xades:SignedProperties` fragment whose hash (after
/// CRLF normalization and trimming) becomes `signed_properties_hash`. Every
/// leading space on every line below is hash-significant — this is a
/// literal template, not something a serializer is allowed to reformat.
fn render_signed_properties(
    signing_time: &str,
    certificate_hash: &str,
    issuer_name: &str,
    serial_number: &str,
) -> String {
    let raw = format!(
        "<xades:SignedProperties xmlns:xades=\"http://uri.etsi.org/01903/v1.3.2#\" Id=\"{id}\">\r\n                                    <xades:SignedSignatureProperties>\r\n                                        <xades:SigningTime>{ts}</xades:SigningTime>\r\n                                        <xades:SigningCertificate>\r\n                                            <xades:Cert>\r\n                                                <xades:CertDigest>\r\n                                                    <ds:DigestMethod xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\" Algorithm=\"{digest_alg}\"/>\r\n                                                    <ds:DigestValue xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">{h1}</ds:DigestValue>\r\n                                                </xades:CertDigest>\r\n                                                <xades:IssuerSerial>\r\n                                                    <ds:X509IssuerName xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">{issuer}</ds:X509IssuerName>\r\n                                                    <ds:X509SerialNumber xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">{serial}</ds:X509SerialNumber>\r\n                                                </xades:IssuerSerial>\r\n                                            </xades:Cert>\r\n                                        </xades:SigningCertificate>\r\n                                    </xades:SignedSignatureProperties>\r\n                                </xades:SignedProperties>",
        id = SIGNED_PROPERTIES_ID,
        ts = signing_time,
        digest_alg = DIGEST_ALGORITHM_URI,
        h1 = certificate_hash,
        issuer = issuer_name,
        serial = serial_number,
    );
    raw.replace("\r\n", "\n").trim().to_string()
}

/// CN first, then `domainComponent` RDNs in reverse order, comma-space
/// joined; every other attribute type is omitted. Mirrors `get_issuer_name`.
fn render_issuer_name(certificate: &Certificate) -> String {
    let issuer = &certificate.tbs_certificate.issuer;
    let mut common_name = None;
    let mut domain_components = Vec::new();

    for rdn in issuer.0.iter() {
        for atv in rdn.0.iter() {
            let oid = atv.oid.to_string();
            let value = atv
                .value
                .decode_as::<x509_cert::der::asn1::Utf8StringRef>()
                .map(|s| s.to_string())
                .unwrap_or_default();
            match oid.as_str() {
                "2.5.4.3" => common_name = Some(value),
                "0.9.2342.19200300.100.1.25" => domain_components.push(value),
                _ => {}
            }
        }
    }

    domain_components.reverse();
    let mut parts = Vec::new();
    if let Some(cn) = common_name {
        parts.push(cn);
    }
    parts.extend(domain_components);
    parts.join(", ")
}

/// The fixed 23-byte SPKI prefix for an uncompressed secp256k1 point
/// (`SEQUENCE { SEQUENCE { id-ecPublicKey, secp256k1 }, BIT STRING }`, up
/// to and including the unused-bits byte), followed by the uncompressed
/// point marker `0x04` and the raw X/Y coordinates.
const EC_SPKI_PREFIX: [u8; 23] = [
    0x30, 0x56, 0x30, 0x10, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x05, 0x2b,
    0x81, 0x04, 0x00, 0x0a, 0x03, 0x42, 0x00,
];

fn subject_public_key_der(verifying_key: &k256::ecdsa::VerifyingKey) -> Vec<u8> {
    let point = verifying_key.to_encoded_point(false);
    let mut der = Vec::with_capacity(EC_SPKI_PREFIX.len() + point.len());
    der.extend_from_slice(&EC_SPKI_PREFIX);
    der.extend_from_slice(point.as_bytes());
    der
}

/// Locates the certificate's own trailing ECDSA signature value: the last
/// top-level DER `SEQUENCE` (tag `0x30`) within the final 72 bytes of the
/// certificate, which is where `AlgorithmIdentifier || BIT STRING` puts
/// the `SEQUENCE { r, s }` signature value for an EC-signed certificate.
fn extract_certificate_signature(certificate_der: &[u8]) -> Result<Vec<u8>, SigningError> {
    let search_start = certificate_der.len().saturating_sub(72);
    let window = &certificate_der[search_start..];
    let relative_offset = window
        .iter()
        .rposition(|&b| b == 0x30)
        .ok_or_else(|| SigningError::CertificateParse("no trailing SEQUENCE found".to_string()))?;
    let absolute_offset = search_start + relative_offset;
    Ok(certificate_der[absolute_offset..].to_vec())
}

/// Reads the UBL signature block template and fills in every placeholder
/// token. The template is a fixed asset shipped with the system, not
/// parsed as XML here — it is filled in with plain string substitution
/// exactly as the original signer does.
#[allow(clippy::too_many_arguments)]
fn render_signature_block(
    resources: &Resources,
    signed_properties_xml: &str,
    signed_properties_hash: &str,
    invoice_hash: &str,
    digital_signature_base64: &str,
    cert_base64: &str,
    issuer_name: &str,
    serial_number: &str,
    signing_time: &str,
) -> Result<String, SigningError> {
    let template = std::fs::read_to_string(&resources.ubl_signature_block_template)?;
    Ok(template
        .replace("SET_SIGNED_PROPERTIES", signed_properties_xml)
        .replace("SET_SIGNED_PROPERTIES_DIGEST", signed_properties_hash)
        .replace("SET_INVOICE_DIGEST", invoice_hash)
        .replace("SET_DIGEST_ALGORITHM", DIGEST_ALGORITHM_URI)
        .replace("SET_SIGNATURE_ALGORITHM", SIGNATURE_ALGORITHM_URI)
        .replace("SET_SIGNATURE_VALUE", digital_signature_base64)
        .replace("SET_X509_CERTIFICATE", cert_base64)
        .replace("SET_ISSUER_NAME", issuer_name)
        .replace("SET_SERIAL_NUMBER", serial_number)
        .replace("SET_SIGNING_TIME", signing_time))
}

fn render_qr_reference_block(resources: &Resources, qr_base64: &str) -> Result<String, SigningError> {
    let template = std::fs::read_to_string(&resources.signature_qr_wrapper_template)?;
    Ok(template.replace("SET_QR_CODE", qr_base64))
}

/// Splices `fragment` immediately after the first `>` in `xml` — `xml` is
/// the already-canonicalized (and UBLExtensions/Signature-stripped)
/// document, so C14N has already dropped the XML declaration and the
/// first `>` closes the root element's opening tag, where
/// `ext:UBLExtensions` belongs. Mirrors `insert_ubl_into_xml`, which
/// splices into `canonical_xml` for the same reason.
fn insert_ubl_extensions(xml: &[u8], fragment: &str) -> Result<Vec<u8>, SigningError> {
    let text = std::str::from_utf8(xml).map_err(|e| SigningError::Decoding(e.to_string()))?;
    let split_at = text
        .find('>')
        .ok_or_else(|| SigningError::CertificateParse("no XML declaration found".to_string()))?
        + 1;
    let mut result = String::with_capacity(text.len() + fragment.len());
    result.push_str(&text[..split_at]);
    result.push_str(fragment);
    result.push_str(&text[split_at..]);
    Ok(result.into_bytes())
}

/// Splices `fragment` immediately before the first
/// `<cac:AccountingSupplierParty>` tag. Mirrors `insert_signature_into_xml`,
/// which raises when the anchor is absent rather than silently appending.
fn insert_before_supplier_party(xml: &[u8], fragment: &str) -> Result<Vec<u8>, SigningError> {
    const ANCHOR: &str = "<cac:AccountingSupplierParty>";
    let text = std::str::from_utf8(xml).map_err(|e| SigningError::Decoding(e.to_string()))?;
    let split_at = text.find(ANCHOR).ok_or(SigningError::Xml(
        crate::error::XmlError::MissingAnchor("cac:AccountingSupplierParty"),
    ))?;
    let mut result = String::with_capacity(text.len() + fragment.len());
    result.push_str(&text[..split_at]);
    result.push_str(fragment);
    result.push_str(&text[split_at..]);
    Ok(result.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_hash_and_content_use_the_unwrapped_base64_string() {
        let der = vec![0x30, 0x01, 0x02, 0x03];
        let cert_base64 = BASE64.encode(&der);
        let expected = double_encoded_hash(cert_base64.as_bytes());
        assert_eq!(expected, double_encoded_hash(BASE64.encode(&der).as_bytes()));
        assert!(!cert_base64.contains('\n'));
    }

    #[test]
    fn double_encoded_hash_is_base64_of_hex_of_sha256() {
        let got = double_encoded_hash(b"0");
        let digest = Sha256::digest(b"0");
        let expected = BASE64.encode(hex::encode(digest));
        assert_eq!(got, expected);
    }

    #[test]
    fn signed_properties_has_no_trailing_whitespace_or_crlf() {
        let xml = render_signed_properties("2022-03-13T14:40:40", "HASH", "CN=X", "1");
        assert!(!xml.contains('\r'));
        assert_eq!(xml, xml.trim());
        assert!(xml.starts_with("<xades:SignedProperties"));
    }

    #[test]
    fn insert_ubl_extensions_splices_after_root_open_tag() {
        let xml = b"<Invoice xmlns=\"urn:x\"></Invoice>";
        let out = insert_ubl_extensions(xml, "<ext/>").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "<Invoice xmlns=\"urn:x\"><ext/></Invoice>");
    }

    #[test]
    fn insert_before_supplier_party_requires_anchor() {
        let xml = b"<Invoice></Invoice>";
        let err = insert_before_supplier_party(xml, "<x/>").unwrap_err();
        assert!(matches!(err, SigningError::Xml(crate::error::XmlError::MissingAnchor(_))));
    }
}

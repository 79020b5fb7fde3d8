// [libs/zatca-core/src/qr.rs]
//! Tag-Length-Value encoder for the simplified-invoice QR payload, base64
//! encoded for embedding in `cac:Signature/.../cbc:EmbeddedDocumentBinaryObject`
//! and for the human-readable QR code printed on the receipt.
//!
//! Grounded in `ZatcaPython/utilities/qr_code_generator.py`'s `write_tag` /
//! `write_length` / `write_tlv`: one byte for the tag, one byte for the
//! length (values here never approach 255 bytes, so no multi-byte DER
//! length form is needed), then the raw field bytes. Tags 1-5 are read
//! straight out of the canonicalized invoice body by XPath-equivalent
//! path matching (no arithmetic over them — this system does not compute
//! invoice totals, it only relays what the document already carries).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::QrError;

/// Tags 1-5 as extracted verbatim from the canonical invoice XML.
#[derive(Debug, Clone, Default)]
pub struct QrInvoiceFields {
    pub seller_name: String,
    pub vat_registration_number: String,
    pub issue_date_time: String,
    pub payable_amount: String,
    pub tax_amount: String,
}

/// Extracts the five UBL-sourced QR fields from a canonicalized invoice
/// document: `AccountingSupplierParty/Party/PartyLegalEntity/RegistrationName`,
/// `.../PartyTaxScheme/CompanyID`, the top-level issue date/time joined with
/// `T`, `LegalMonetaryTotal/PayableAmount`, and `TaxTotal/TaxAmount`.
pub fn extract_invoice_fields(canonical_xml: &[u8]) -> Result<QrInvoiceFields, QrError> {
    let mut reader = Reader::from_reader(canonical_xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();

    let mut fields = QrInvoiceFields::default();
    let mut issue_date = String::new();
    let mut issue_time = String::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|_| QrError::MissingField("malformed canonical invoice XML"))?;
        match event {
            Event::Eof => break,
            Event::Start(tag) => {
                path.push(String::from_utf8_lossy(tag.local_name().as_ref()).into_owned());
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(text) => {
                let leaf = path.last().map(String::as_str).unwrap_or_default();
                let parent = path.get(path.len().wrapping_sub(2)).map(String::as_str);
                let value = text.unescape().unwrap_or_default().into_owned();

                match leaf {
                    "IssueDate" if path.len() == 2 => issue_date = value,
                    "IssueTime" if path.len() == 2 => issue_time = value,
                    "RegistrationName"
                        if parent == Some("PartyLegalEntity")
                            && path.contains(&"AccountingSupplierParty".to_string()) =>
                    {
                        fields.seller_name = value;
                    }
                    "CompanyID"
                        if parent == Some("PartyTaxScheme")
                            && path.contains(&"AccountingSupplierParty".to_string()) =>
                    {
                        fields.vat_registration_number = value;
                    }
                    "PayableAmount" if parent == Some("LegalMonetaryTotal") => {
                        fields.payable_amount = value;
                    }
                    "TaxAmount" if parent == Some("TaxTotal") && fields.tax_amount.is_empty() => {
                        fields.tax_amount = value;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fields.issue_date_time = format!("{}T{}", issue_date, issue_time);

    if fields.seller_name.is_empty() {
        return Err(QrError::MissingField("AccountingSupplierParty/Party/PartyLegalEntity/RegistrationName"));
    }
    if fields.vat_registration_number.is_empty() {
        return Err(QrError::MissingField("AccountingSupplierParty/Party/PartyTaxScheme/CompanyID"));
    }
    if fields.payable_amount.is_empty() {
        return Err(QrError::MissingField("LegalMonetaryTotal/PayableAmount"));
    }
    if fields.tax_amount.is_empty() {
        return Err(QrError::MissingField("TaxTotal/TaxAmount"));
    }

    Ok(fields)
}

/// The nine TLV fields ZATCA's simplified-invoice QR payload carries, in
/// tag order. Tags 1-5 come from the invoice body; 6-9 are produced by the
/// XAdES Signer once the document is signed.
#[derive(Debug, Clone)]
pub struct QrFields {
    pub seller_name: String,
    pub vat_registration_number: String,
    pub invoice_timestamp: String,
    pub invoice_total_with_vat: String,
    pub vat_total: String,
    pub invoice_hash: String,
    pub digital_signature: Vec<u8>,
    pub public_key_der: Vec<u8>,
    pub certificate_signature_der: Vec<u8>,
}

/// DER length form: `0x00..=0x7F` as a single byte, otherwise `0x80 | n`
/// followed by `n` big-endian length bytes. A seller's legal name can run
/// past 127 UTF-8 bytes (long Arabic/Latin combined names), so the short
/// form alone is not enough.
fn write_length(buf: &mut Vec<u8>, length: usize) {
    if length <= 0x7F {
        buf.push(length as u8);
        return;
    }
    let mut length_bytes = Vec::new();
    let mut remaining = length;
    while remaining > 0 {
        length_bytes.insert(0, (remaining & 0xFF) as u8);
        remaining >>= 8;
    }
    buf.push(0x80 | length_bytes.len() as u8);
    buf.extend_from_slice(&length_bytes);
}

/// Appends one TLV entry: a one-byte tag, a DER-form length, then `value`.
/// `tag` must fit in a `u8` (1-9 for every field this system emits).
fn write_tlv(buf: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<(), QrError> {
    buf.push(tag);
    write_length(buf, value.len());
    buf.extend_from_slice(value);
    Ok(())
}

/// Encodes `fields` into the TLV byte sequence and returns it base64
/// encoded, ready to splice into the signed XML or to render as a QR code.
pub fn encode_qr(fields: &QrFields) -> Result<String, QrError> {
    let mut buf = Vec::new();
    write_tlv(&mut buf, 1, fields.seller_name.as_bytes())?;
    write_tlv(&mut buf, 2, fields.vat_registration_number.as_bytes())?;
    write_tlv(&mut buf, 3, fields.invoice_timestamp.as_bytes())?;
    write_tlv(&mut buf, 4, fields.invoice_total_with_vat.as_bytes())?;
    write_tlv(&mut buf, 5, fields.vat_total.as_bytes())?;
    write_tlv(&mut buf, 6, fields.invoice_hash.as_bytes())?;
    write_tlv(&mut buf, 7, &fields.digital_signature)?;
    write_tlv(&mut buf, 8, &fields.public_key_der)?;
    write_tlv(&mut buf, 9, &fields.certificate_signature_der)?;
    Ok(BASE64.encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> QrFields {
        QrFields {
            seller_name: "Maximum Speed Tech Supply LTD".into(),
            vat_registration_number: "399999999900003".into(),
            invoice_timestamp: "2022-03-13T14:40:40".into(),
            invoice_total_with_vat: "100.00".into(),
            vat_total: "15.00".into(),
            invoice_hash: "NzA2YmNhNzY0MWQ1NGY2ZDI5NjM3ODE2ODA2MDBjZjA5ZDc1ZWY4NGY5Y2Q4ZDY0MjFiNzM0ZGQ0ZGYxNDMzZA==".into(),
            digital_signature: vec![1, 2, 3, 4],
            public_key_der: vec![5; 91],
            certificate_signature_der: vec![6; 70],
        }
    }

    #[test]
    fn round_trips_every_field_in_tag_order() {
        let fields = sample_fields();
        let encoded = encode_qr(&fields).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();

        let mut cursor = 0usize;
        let mut tags = Vec::new();
        while cursor < decoded.len() {
            let tag = decoded[cursor];
            let len = decoded[cursor + 1] as usize;
            tags.push(tag);
            cursor += 2 + len;
        }
        assert_eq!(tags, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn long_field_uses_der_long_form_length() {
        let mut fields = sample_fields();
        fields.seller_name = "x".repeat(300);
        let encoded = encode_qr(&fields).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded[0], 1);
        assert_eq!(decoded[1], 0x82);
        assert_eq!(decoded[2], 0x01);
        assert_eq!(decoded[3], 0x2C);
        assert_eq!(&decoded[4..4 + 300], fields.seller_name.as_bytes());
    }

    #[test]
    fn short_field_uses_der_short_form_length() {
        let buf_len = write_length_roundtrip(100);
        assert_eq!(buf_len, vec![100]);
        let long_len = write_length_roundtrip(300);
        assert_eq!(long_len, vec![0x82, 0x01, 0x2C]);
    }

    fn write_length_roundtrip(length: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        write_length(&mut buf, length);
        buf
    }
}

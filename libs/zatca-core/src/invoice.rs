// [libs/zatca-core/src/invoice.rs]
//! UBL 2.1 invoice template mutation: clones the resource template, rewrites
//! the taxpayer- and transaction-specific nodes, and produces the UTF-8 XML
//! bytes the Canonicalizer and XAdES Signer operate on.
//!
//! Grounded in `ZatcaPython/utilities/invoice_helper.py`'s `modify_xml`: the
//! field list, the XPath each field is located by, and the ICV/PIH/CRN node
//! locations it reads and writes. `quick-xml` has no XPath or DOM, so the
//! same mutations are done by tracking an ancestor-tag-name stack over the
//! event stream and matching on path suffixes.

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::io::Cursor;
use uuid::Uuid;

use crate::error::XmlError;
use crate::resources::SampleDocumentType;
use crate::time::RiyadhTimestamp;

/// Per-document values the Invoice Modeler writes into the UBL template.
/// `icv` is the monotonically increasing Invoice Counter Value for this
/// taxpayer; `previous_invoice_hash` is the base64(hex(SHA-256(...))) value
/// produced for the prior document in the chain (or the seed value for the
/// first document ever issued).
#[derive(Debug, Clone)]
pub struct InvoiceFields {
    pub document_id: String,
    pub invoice_type_code_value: String,
    pub invoice_type_code_name: String,
    pub commercial_registration_number: String,
    pub vat_registration_number: String,
    pub icv: u64,
    pub previous_invoice_hash: String,
    pub timestamp: RiyadhTimestamp,
    /// When non-empty, appended as `cbc:InstructionNote` under
    /// `cac:PaymentMeans`; when empty, every `cac:BillingReference` element
    /// is removed from the document instead.
    pub instruction_note: String,
}

impl InvoiceFields {
    /// Builds the field set for one of the six onboarding sample documents.
    pub fn for_sample_document(
        document_type: &SampleDocumentType,
        commercial_registration_number: &str,
        vat_registration_number: &str,
        icv: u64,
        previous_invoice_hash: &str,
    ) -> Self {
        Self {
            document_id: document_type.document_id(),
            invoice_type_code_value: document_type.type_code_value.to_string(),
            invoice_type_code_name: document_type.name_attribute().to_string(),
            commercial_registration_number: commercial_registration_number.to_string(),
            vat_registration_number: vat_registration_number.to_string(),
            icv,
            previous_invoice_hash: previous_invoice_hash.to_string(),
            timestamp: RiyadhTimestamp::now(),
            instruction_note: document_type.instruction_note.to_string(),
        }
    }
}

/// Which `AdditionalDocumentReference` block the reader currently sits in,
/// identified by its `cbc:ID` marker text ("ICV" or "PIH").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocRefMarker {
    Icv,
    Pih,
    Other,
}

#[derive(Debug, Default)]
struct FoundNodes {
    icv: bool,
    pih: bool,
    crn: bool,
    vat: bool,
    invoice_type_code: bool,
}

/// Rewrites the UBL template's transaction-specific nodes and returns the
/// resulting XML as UTF-8 bytes. Mutated in this order, mirroring
/// `modify_xml`:
///
/// - top-level `cbc:ID` → `fields.document_id`
/// - top-level `cbc:UUID` → a freshly generated, uppercase v4 UUID
/// - `cbc:IssueDate` / `cbc:IssueTime` → the same captured instant, split
/// - `cac:InvoiceDocumentReference/cbc:ID` → a descriptive reference string,
///   carried forward unconditionally regardless of whether the caller's
///   fields mention it
/// - `cac:AccountingSupplierParty//cac:PartyIdentification/cbc:ID` → `fields.commercial_registration_number`
/// - `cac:AccountingSupplierParty//cac:PartyTaxScheme/cbc:CompanyID` → `fields.vat_registration_number`
/// - `cac:AdditionalDocumentReference[cbc:ID='ICV']/cbc:UUID` → `fields.icv`
/// - `cac:AdditionalDocumentReference[cbc:ID='PIH']/cac:Attachment/cbc:EmbeddedDocumentBinaryObject`
///   → `fields.previous_invoice_hash`
/// - `cbc:InvoiceTypeCode` text and `@name` attribute → type code value and
///   the simplified/standard name code
/// - `cac:Delivery/cbc:ActualDeliveryDate` → the same issue date
/// - `fields.instruction_note` non-empty → append `cbc:InstructionNote` as
///   the last child of `cac:PaymentMeans`; empty → drop every
///   `cac:BillingReference` subtree instead
pub fn modify_invoice_xml(template_xml: &[u8], fields: &InvoiceFields) -> Result<Vec<u8>, XmlError> {
    let mut reader = Reader::from_reader(template_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let uuid = Uuid::new_v4().to_string().to_uppercase();
    let issue_date = fields.timestamp.issue_date();
    let issue_time = fields.timestamp.issue_time();
    let invoice_document_reference = format!(
        "Invoice Number: {}; Invoice Issue Date: {}",
        fields.icv, issue_date
    );
    let drop_billing_reference = fields.instruction_note.trim().is_empty();

    let mut path: Vec<String> = Vec::new();
    let mut doc_ref_marker: Vec<DocRefMarker> = Vec::new();
    let mut found = FoundNodes::default();
    let mut billing_reference_skip_depth: u32 = 0;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| XmlError::Parse(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(tag) => {
                let local = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();

                if drop_billing_reference && (billing_reference_skip_depth > 0 || local == "BillingReference") {
                    billing_reference_skip_depth += 1;
                    path.push(local);
                    continue;
                }

                if local == "AdditionalDocumentReference" {
                    doc_ref_marker.push(DocRefMarker::Other);
                }
                path.push(local.clone());

                if local == "InvoiceTypeCode" {
                    let rewritten = rewrite_invoice_type_attribute(&tag, &fields.invoice_type_code_name)?;
                    writer
                        .write_event(Event::Start(rewritten))
                        .map_err(write_err)?;
                } else {
                    writer.write_event(Event::Start(tag)).map_err(write_err)?;
                }
            }
            Event::End(tag) => {
                if billing_reference_skip_depth > 0 {
                    billing_reference_skip_depth -= 1;
                    path.pop();
                    continue;
                }

                let local = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
                if !drop_billing_reference && local == "PaymentMeans" {
                    writer
                        .write_event(Event::Start(BytesStart::new("cbc:InstructionNote")))
                        .map_err(write_err)?;
                    writer
                        .write_event(Event::Text(BytesText::new(&fields.instruction_note)))
                        .map_err(write_err)?;
                    writer
                        .write_event(Event::End(quick_xml::events::BytesEnd::new("cbc:InstructionNote")))
                        .map_err(write_err)?;
                }

                writer.write_event(Event::End(tag)).map_err(write_err)?;
                if let Some(top) = path.last() {
                    if top == "AdditionalDocumentReference" {
                        doc_ref_marker.pop();
                    }
                }
                path.pop();
            }
            Event::Empty(tag) => {
                if billing_reference_skip_depth > 0 {
                    continue;
                }
                if tag.local_name().as_ref() == b"InvoiceTypeCode" {
                    let rewritten = rewrite_invoice_type_attribute(&tag, &fields.invoice_type_code_name)?;
                    writer.write_event(Event::Empty(rewritten)).map_err(write_err)?;
                } else {
                    writer.write_event(Event::Empty(tag)).map_err(write_err)?;
                }
            }
            Event::Text(text) if billing_reference_skip_depth > 0 => {
                let _ = text;
            }
            Event::Text(text) => {
                let replacement = resolve_replacement(
                    &path,
                    doc_ref_marker.last().copied(),
                    &text,
                    fields,
                    &uuid,
                    &issue_date,
                    &issue_time,
                    &invoice_document_reference,
                    &mut found,
                );

                // A text node directly under an `AdditionalDocumentReference`
                // whose own tag is `ID` names the marker for every sibling
                // leaf inside that block; record it on the open frame.
                if path.last().map(String::as_str) == Some("ID")
                    && path.len() >= 2
                    && path[path.len() - 2] == "AdditionalDocumentReference"
                {
                    if let Some(marker) = doc_ref_marker.last_mut() {
                        *marker = match text.unescape().unwrap_or_default().as_ref() {
                            "ICV" => DocRefMarker::Icv,
                            "PIH" => DocRefMarker::Pih,
                            _ => DocRefMarker::Other,
                        };
                    }
                }

                match replacement {
                    Some(value) => writer
                        .write_event(Event::Text(BytesText::new(&value)))
                        .map_err(write_err)?,
                    None => writer.write_event(Event::Text(text)).map_err(write_err)?,
                }
            }
            other => writer.write_event(other).map_err(write_err)?,
        }
    }

    if !found.icv {
        return Err(XmlError::MissingNode("AdditionalDocumentReference[ICV]/cbc:UUID"));
    }
    if !found.pih {
        return Err(XmlError::MissingNode(
            "AdditionalDocumentReference[PIH]/cac:Attachment/cbc:EmbeddedDocumentBinaryObject",
        ));
    }
    if !found.invoice_type_code {
        return Err(XmlError::MissingNode("cbc:InvoiceTypeCode"));
    }

    Ok(writer.into_inner().into_inner())
}

/// An invoice is simplified iff the top-level `cbc:InvoiceTypeCode`'s `name`
/// attribute begins with "02" (standard invoices begin with "01").
pub fn is_simplified_invoice(xml: &[u8]) -> Result<bool, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| XmlError::Parse(e.to_string()))?;
        match event {
            Event::Eof => return Err(XmlError::MissingNode("cbc:InvoiceTypeCode")),
            Event::Start(tag) | Event::Empty(tag) if tag.local_name().as_ref() == b"InvoiceTypeCode" => {
                for attr in tag.attributes() {
                    let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
                    if attr.key.as_ref() == b"name" {
                        let value = attr.unescape_value().map_err(|e| XmlError::Parse(e.to_string()))?;
                        return Ok(value.starts_with("02"));
                    }
                }
                return Err(XmlError::MissingNode("cbc:InvoiceTypeCode/@name"));
            }
            _ => continue,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_replacement(
    path: &[String],
    marker: Option<DocRefMarker>,
    text: &BytesText,
    fields: &InvoiceFields,
    uuid: &str,
    issue_date: &str,
    issue_time: &str,
    invoice_document_reference: &str,
    found: &mut FoundNodes,
) -> Option<String> {
    let leaf = path.last()?.as_str();
    let parent = path.get(path.len().wrapping_sub(2)).map(String::as_str);
    let _ = text;

    match leaf {
        "ID" if path.len() == 2 => Some(fields.document_id.clone()),
        "UUID" if path.len() == 2 => Some(uuid.to_string()),
        "IssueDate" => Some(issue_date.to_string()),
        "IssueTime" => Some(issue_time.to_string()),
        "ID" if parent == Some("InvoiceDocumentReference") => {
            Some(invoice_document_reference.to_string())
        }
        "CompanyID" if parent == Some("PartyTaxScheme") && path.contains(&"AccountingSupplierParty".to_string()) => {
            found.vat = true;
            Some(fields.vat_registration_number.clone())
        }
        "ID" if parent == Some("PartyIdentification") && path.contains(&"AccountingSupplierParty".to_string()) => {
            found.crn = true;
            Some(fields.commercial_registration_number.clone())
        }
        "InvoiceTypeCode" => {
            found.invoice_type_code = true;
            Some(fields.invoice_type_code_value.clone())
        }
        "ActualDeliveryDate" => Some(issue_date.to_string()),
        "UUID" if marker == Some(DocRefMarker::Icv) => {
            found.icv = true;
            Some(fields.icv.to_string())
        }
        "EmbeddedDocumentBinaryObject" if marker == Some(DocRefMarker::Pih) => {
            found.pih = true;
            Some(fields.previous_invoice_hash.clone())
        }
        _ => None,
    }
}

fn rewrite_invoice_type_attribute<'a>(
    tag: &BytesStart<'a>,
    name_value: &str,
) -> Result<BytesStart<'static>, XmlError> {
    let mut rewritten = BytesStart::new(String::from_utf8_lossy(tag.name().as_ref()).into_owned());
    for attr in tag.attributes() {
        let attr: Attribute = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        if attr.key.as_ref() == b"name" {
            rewritten.push_attribute(("name", name_value));
        } else {
            let value = attr.unescape_value().map_err(|e| XmlError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            rewritten.push_attribute((key.as_str(), value.as_ref()));
        }
    }
    Ok(rewritten)
}

fn write_err(e: quick_xml::Error) -> XmlError {
    XmlError::Transform(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns:cbc="urn:cbc" xmlns:cac="urn:cac">
  <cbc:ID>SME00023</cbc:ID>
  <cbc:UUID>00000000-0000-0000-0000-000000000000</cbc:UUID>
  <cbc:IssueDate>2000-01-01</cbc:IssueDate>
  <cbc:IssueTime>00:00:00</cbc:IssueTime>
  <cbc:InvoiceTypeCode name="0100000">388</cbc:InvoiceTypeCode>
  <cac:InvoiceDocumentReference><cbc:ID>placeholder</cbc:ID></cac:InvoiceDocumentReference>
  <cac:AccountingSupplierParty><cac:Party><cac:PartyIdentification><cbc:ID schemeID="CRN">0</cbc:ID></cac:PartyIdentification><cac:PartyTaxScheme><cbc:CompanyID>0</cbc:CompanyID></cac:PartyTaxScheme></cac:Party></cac:AccountingSupplierParty>
  <cac:Delivery><cbc:ActualDeliveryDate>2000-01-01</cbc:ActualDeliveryDate></cac:Delivery>
  <cac:BillingReference><cac:InvoiceDocumentReference><cbc:ID>placeholder</cbc:ID></cac:InvoiceDocumentReference></cac:BillingReference>
  <cac:PaymentMeans><cbc:PaymentMeansCode>10</cbc:PaymentMeansCode></cac:PaymentMeans>
  <cac:AdditionalDocumentReference><cbc:ID>ICV</cbc:ID><cbc:UUID>0</cbc:UUID></cac:AdditionalDocumentReference>
  <cac:AdditionalDocumentReference><cbc:ID>PIH</cbc:ID><cac:Attachment><cbc:EmbeddedDocumentBinaryObject mimeCode="text/plain">seed</cbc:EmbeddedDocumentBinaryObject></cac:Attachment></cac:AdditionalDocumentReference>
</Invoice>"#;

    fn sample_fields() -> InvoiceFields {
        InvoiceFields {
            document_id: "SME00023".into(),
            invoice_type_code_value: "388".into(),
            invoice_type_code_name: "0200000".into(),
            commercial_registration_number: "2051153711".into(),
            vat_registration_number: "399999999900003".into(),
            icv: 4,
            previous_invoice_hash: "NWZlY2ViNjZmZmM4NmYzOGQ5NTI3ODZjNmQ2OTZjNzljMmRiYzIzOWRkNGU5MWI0NjcyOWQ3M2EyN2ZiNTdlOQ==".into(),
            timestamp: RiyadhTimestamp::now(),
            instruction_note: String::new(),
        }
    }

    #[test]
    fn rewrites_icv_pih_and_vat_nodes() {
        let fields = sample_fields();
        let out = modify_invoice_xml(TEMPLATE.as_bytes(), &fields).unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.contains("<cbc:UUID>4</cbc:UUID>") || xml.contains(">4<"));
        assert!(xml.contains(&fields.previous_invoice_hash));
        assert!(xml.contains(&fields.vat_registration_number));
        assert!(xml.contains(&fields.commercial_registration_number));
        assert!(xml.contains("name=\"0200000\""));
    }

    #[test]
    fn rejects_template_missing_icv_node() {
        let broken = TEMPLATE.replace("ICV", "XXX");
        let fields = sample_fields();
        let err = modify_invoice_xml(broken.as_bytes(), &fields).unwrap_err();
        assert!(matches!(err, XmlError::MissingNode(_)));
    }

    #[test]
    fn empty_instruction_note_removes_billing_reference() {
        let fields = sample_fields();
        let out = modify_invoice_xml(TEMPLATE.as_bytes(), &fields).unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(!xml.contains("BillingReference"));
        assert!(!xml.contains("InstructionNote"));
    }

    #[test]
    fn classifies_standard_and_simplified_by_type_code_name() {
        assert!(!is_simplified_invoice(TEMPLATE.as_bytes()).unwrap());
        let simplified = TEMPLATE.replace("name=\"0100000\"", "name=\"0200000\"");
        assert!(is_simplified_invoice(simplified.as_bytes()).unwrap());
    }

    #[test]
    fn non_empty_instruction_note_is_appended_to_payment_means() {
        let mut fields = sample_fields();
        fields.instruction_note = "InstructionNotes for Standard CreditNote".into();
        let out = modify_invoice_xml(TEMPLATE.as_bytes(), &fields).unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert!(xml.contains("BillingReference"));
        assert!(xml.contains("<cbc:InstructionNote>InstructionNotes for Standard CreditNote</cbc:InstructionNote>"));
    }
}

// [libs/zatca-core/src/lib.rs]
//! Crypto and XML core for taxpayer-side ZATCA Fatoora e-invoicing: CSR
//! generation, UBL invoice modeling, XML canonicalization, XAdES signing,
//! and QR/TLV encoding. Stateless and network-free — everything that talks
//! to ZATCA's API lives in `zatca-api-client`, and the onboarding/submission
//! state machines live in `zatca-orchestrator`.

pub mod canon;
pub mod csr;
pub mod error;
pub mod invoice;
pub mod qr;
pub mod resources;
pub mod time;
pub mod xades;

pub use canon::{canonicalize, hash_base64, strip_canonicalize_and_hash, strip_signing_artifacts};
pub use csr::{generate_csr, CsrConfig, EnvironmentProfile, GeneratedCsr};
pub use invoice::{is_simplified_invoice, modify_invoice_xml, InvoiceFields};
pub use qr::{encode_qr, extract_invoice_fields, QrFields, QrInvoiceFields};
pub use resources::{Resources, SampleDocumentType, SAMPLE_DOCUMENT_TYPES, SEED_PREVIOUS_INVOICE_HASH};
pub use time::RiyadhTimestamp;
pub use xades::{sign_invoice, SignedInvoice, SigningMaterial};

// [libs/zatca-core/src/time.rs]
//! Asia/Riyadh (UTC+03:00, no DST) timestamp helpers shared by the Invoice
//! Modeler (date/time split) and the XAdES Signer (combined timestamp). Both
//! call sites must observe the same wall-clock instant when a caller needs
//! them to agree (the signer's contract requires the *same* string used
//! twice — callers take a single `RiyadhTimestamp` and read both halves off
//! of it rather than formatting "now" twice).

use chrono::{DateTime, Utc};
use chrono_tz::Asia::Riyadh;

/// A point in time already resolved to the Asia/Riyadh civil calendar.
#[derive(Debug, Clone, Copy)]
pub struct RiyadhTimestamp(DateTime<chrono_tz::Tz>);

impl RiyadhTimestamp {
    /// Captures the current instant and resolves it to Asia/Riyadh.
    pub fn now() -> Self {
        Self(Utc::now().with_timezone(&Riyadh))
    }

    /// `YYYY-MM-DD`, used for `cbc:IssueDate` / `cbc:ActualDeliveryDate`.
    pub fn issue_date(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// `HH:MM:SS`, used for `cbc:IssueTime`.
    pub fn issue_time(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }

    /// `YYYY-MM-DDTHH:MM:SS` with no timezone suffix, used for the XAdES
    /// `SigningTime` and, verbatim, for the `xades:SignedProperties` hash
    /// input. Both uses must read the same string.
    pub fn signing_timestamp(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

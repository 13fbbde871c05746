//! # Filing Processors
//!
//! One processor per [`FilingType`]. A processor applies a single filing to
//! the business aggregate held in a [`ProcessingContext`] and records derived
//! meta for the filing. Processors do no I/O and never read the wall clock:
//! given the same aggregate, payload and `now` they produce the same mutation.
//!
//! ## Layout
//!
//! - [`payload`] - typed access to payload fields and date parsing
//! - [`shared`] - office, party, share structure and court order helpers
//! - one module per family of filing types

pub mod annual_report;
pub mod business_changes;
pub mod correction;
pub mod dissolution;
pub mod firm_changes;
pub mod incorporation;
pub mod notices;
pub mod payload;
pub mod receivership;
pub mod registrar;
pub mod restoration;
pub mod shared;
pub mod withdrawal;

use crate::error::{FilerError, FilerResult};
use crate::models::{Business, Filing, FilingType};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

/// Applies one filing type to a business aggregate
pub trait FilingProcessor: Send + Sync + Debug {
    fn filing_type(&self) -> FilingType;

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()>;
}

/// Meta derived while processing a filing
///
/// Serialized onto the filing as `meta_data` and consulted by the outcome
/// publisher to decide which follow-on events to emit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilingMeta {
    pub filing_type: String,
    /// Type-specific details, stored under the filing type key
    pub details: Map<String, Value>,
    pub legal_name_change: Option<(String, String)>,
    pub legal_type_change: Option<(String, String)>,
}

impl FilingMeta {
    pub fn new(filing_type: impl Into<String>) -> Self {
        Self {
            filing_type: filing_type.into(),
            ..Default::default()
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    /// Record a legal name change; no-op when the name is unchanged
    pub fn record_name_change(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        self.set("fromLegalName", from);
        self.set("toLegalName", to);
        self.legal_name_change = Some((from.to_string(), to.to_string()));
    }

    /// Record a legal type change; no-op when the type is unchanged
    pub fn record_legal_type_change(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        self.set("fromLegalType", from);
        self.set("toLegalType", to);
        self.legal_type_change = Some((from.to_string(), to.to_string()));
    }

    pub fn to_value(&self, filing: &Filing) -> Value {
        let mut meta = json!({
            "legalFilings": [self.filing_type],
            "applicationDate": filing.effective_date,
        });
        meta[self.filing_type.as_str()] = Value::Object(self.details.clone());
        meta
    }
}

/// Everything a processor may read or mutate for one filing
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub filing: Filing,
    /// `None` only for filings that create their business
    pub business: Option<Business>,
    /// Filings referenced by this one (withdrawal target, correction chain)
    pub related: Vec<Filing>,
    /// Ids of related filings mutated by the processor
    pub touched: BTreeSet<i64>,
    pub meta: FilingMeta,
    pub now: DateTime<Utc>,
}

impl ProcessingContext {
    pub fn new(
        filing: Filing,
        business: Option<Business>,
        related: Vec<Filing>,
        now: DateTime<Utc>,
    ) -> Self {
        let meta = FilingMeta::new(filing.filing_type.clone());
        Self {
            filing,
            business,
            related,
            touched: BTreeSet::new(),
            meta,
            now,
        }
    }

    pub fn filing_type_name(&self) -> &str {
        &self.filing.filing_type
    }

    /// Owned copy of the payload sub-document for `key`
    pub fn document(&self, key: &str) -> FilerResult<Value> {
        self.filing
            .sub_document(key)
            .cloned()
            .ok_or_else(|| FilerError::payload(&self.filing.filing_type, key, "section is missing"))
    }

    pub fn optional_document(&self, key: &str) -> Option<Value> {
        self.filing.sub_document(key).cloned()
    }

    pub fn business(&self) -> FilerResult<&Business> {
        self.business.as_ref().ok_or(FilerError::BusinessNotFound {
            filing_id: self.filing.id,
            business_id: self.filing.business_id,
        })
    }

    pub fn business_mut(&mut self) -> FilerResult<&mut Business> {
        let filing_id = self.filing.id;
        let business_id = self.filing.business_id;
        self.business.as_mut().ok_or(FilerError::BusinessNotFound {
            filing_id,
            business_id,
        })
    }

    pub fn related_filing(&self, filing_id: i64) -> Option<&Filing> {
        self.related.iter().find(|f| f.id == filing_id)
    }

    /// Mutable access to a related filing; marks it for persistence
    pub fn related_filing_mut(&mut self, filing_id: i64) -> Option<&mut Filing> {
        let filing = self.related.iter_mut().find(|f| f.id == filing_id)?;
        self.touched.insert(filing_id);
        Some(filing)
    }
}

/// One processor instance per filing type
pub fn all_processors() -> Vec<Arc<dyn FilingProcessor>> {
    vec![
        Arc::new(registrar::AdminFreezeProcessor),
        Arc::new(notices::AgmExtensionProcessor),
        Arc::new(notices::AgmLocationChangeProcessor),
        Arc::new(business_changes::AlterationProcessor),
        Arc::new(dissolution::AmalgamationOutProcessor),
        Arc::new(annual_report::AnnualReportProcessor),
        Arc::new(receivership::AppointReceiverProcessor),
        Arc::new(receivership::CeaseReceiverProcessor),
        Arc::new(business_changes::ChangeOfAddressProcessor),
        Arc::new(business_changes::ChangeOfDirectorsProcessor),
        Arc::new(business_changes::ChangeOfNameProcessor),
        Arc::new(firm_changes::ChangeOfRegistrationProcessor),
        Arc::new(notices::ConsentAmalgamationOutProcessor),
        Arc::new(notices::ConsentContinuationOutProcessor),
        Arc::new(incorporation::ContinuationInProcessor),
        Arc::new(dissolution::ContinuationOutProcessor),
        Arc::new(firm_changes::ConversionProcessor),
        Arc::new(correction::CorrectionProcessor),
        Arc::new(registrar::CourtOrderProcessor),
        Arc::new(dissolution::DissolutionProcessor),
        Arc::new(incorporation::IncorporationApplicationProcessor),
        Arc::new(withdrawal::NoticeOfWithdrawalProcessor),
        Arc::new(dissolution::PutBackOffProcessor),
        Arc::new(restoration::PutBackOnProcessor),
        Arc::new(registrar::RegistrarsNotationProcessor),
        Arc::new(registrar::RegistrarsOrderProcessor),
        Arc::new(incorporation::RegistrationProcessor),
        Arc::new(restoration::RestorationProcessor),
        Arc::new(business_changes::SpecialResolutionProcessor),
        Arc::new(business_changes::TransitionProcessor),
        Arc::new(dissolution::VoluntaryDissolutionProcessor),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{Address, LegalType, Office};
    use chrono::TimeZone;

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 17, 30, 0).unwrap()
    }

    pub fn address(street: &str) -> Address {
        Address {
            street_address: street.to_string(),
            address_city: "Victoria".to_string(),
            address_region: Some("BC".to_string()),
            postal_code: "V8W 1A1".to_string(),
            address_country: "CA".to_string(),
            ..Default::default()
        }
    }

    pub fn business() -> Business {
        let mut business = Business::new(
            "BC1234567",
            LegalType::BC,
            "ACME LTD.",
            Utc.with_ymd_and_hms(2010, 1, 1, 8, 0, 0).unwrap(),
        );
        business.id = 10;
        business.offices.push(Office {
            id: 1,
            office_type: "registeredOffice".to_string(),
            delivery_address: Some(address("1 Main St")),
            mailing_address: Some(address("PO Box 1")),
        });
        business.offices.push(Office {
            id: 2,
            office_type: "recordsOffice".to_string(),
            delivery_address: Some(address("2 Main St")),
            mailing_address: Some(address("PO Box 2")),
        });
        business
    }

    pub fn context(filing_type: &str, payload: Value) -> ProcessingContext {
        let filing = Filing::new(100, Some(10), filing_type, now()).with_payload(payload);
        ProcessingContext::new(filing, Some(business()), Vec::new(), now())
    }
}

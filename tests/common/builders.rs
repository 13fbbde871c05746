//! Test data builders for filings and businesses

use super::fixed_now;
use chrono::{TimeZone, Utc};
use filing_processor::database::InMemoryStore;
use filing_processor::models::{Business, Filing, FilingStatus, LegalType, Office};
use serde_json::{json, Value};

/// Builder for committed businesses
pub struct BusinessBuilder {
    identifier: String,
    legal_type: LegalType,
    legal_name: String,
    offices: bool,
}

impl BusinessBuilder {
    pub fn new(identifier: &str, legal_type: LegalType) -> Self {
        Self {
            identifier: identifier.to_string(),
            legal_type,
            legal_name: "ACME LTD.".to_string(),
            offices: false,
        }
    }

    pub fn with_name(mut self, legal_name: &str) -> Self {
        self.legal_name = legal_name.to_string();
        self
    }

    /// Registered and records offices with placeholder addresses
    pub fn with_offices(mut self) -> Self {
        self.offices = true;
        self
    }

    pub fn build(self) -> Business {
        let mut business = Business::new(
            &self.identifier,
            self.legal_type,
            &self.legal_name,
            Utc.with_ymd_and_hms(2012, 3, 4, 8, 0, 0).unwrap(),
        );
        if self.offices {
            for (id, office_type) in [(1, "registeredOffice"), (2, "recordsOffice")] {
                business.offices.push(Office {
                    id,
                    office_type: office_type.to_string(),
                    delivery_address: None,
                    mailing_address: None,
                });
            }
        }
        business
    }

    /// Insert into `store` and return the assigned id
    pub fn insert(self, store: &InMemoryStore) -> i64 {
        store.insert_business(self.build())
    }
}

/// Builder for submitted filings
pub struct FilingBuilder {
    filing: Filing,
}

impl FilingBuilder {
    pub fn new(id: i64, filing_type: &str) -> Self {
        Self {
            filing: Filing::new(id, None, filing_type, fixed_now()),
        }
    }

    pub fn for_business(mut self, business_id: i64) -> Self {
        self.filing.business_id = Some(business_id);
        self
    }

    /// Wrap `section` under `filing.<filing_type>`
    pub fn with_section(mut self, section: Value) -> Self {
        let key = self.filing.filing_type.clone();
        self.filing.filing_json = json!({"filing": {key: section}});
        self
    }

    pub fn with_status(mut self, status: FilingStatus) -> Self {
        self.filing.status = status;
        self
    }

    pub fn build(self) -> Filing {
        self.filing
    }

    pub fn insert(self, store: &InMemoryStore) -> i64 {
        let id = self.filing.id;
        store.insert_filing(self.filing);
        id
    }
}

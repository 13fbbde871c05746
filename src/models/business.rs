//! # Business Aggregate
//!
//! The registry's record of a legal entity. A `Business` exclusively owns its
//! child collections (offices, parties, party roles, share classes, aliases,
//! resolutions); children are addressed by ids that are stable within the
//! aggregate. Filings reference a business by id only.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Legal entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegalType {
    /// BC limited company
    BC,
    /// Benefit company
    BEN,
    /// Unlimited liability company
    ULC,
    /// Community contribution company
    CC,
    /// Cooperative association
    CP,
    /// Sole proprietorship
    SP,
    /// General partnership
    GP,
    /// Continued-in limited company
    C,
    /// Continued-in benefit company
    CBEN,
    /// Continued-in unlimited liability company
    CUL,
    /// Continued-in community contribution company
    CCC,
}

impl LegalType {
    /// Identifier prefix assigned to new businesses of this type
    pub fn identifier_prefix(&self) -> &'static str {
        match self {
            Self::CP => "CP",
            Self::SP | Self::GP => "FM",
            _ => "BC",
        }
    }

    pub fn is_firm(&self) -> bool {
        matches!(self, Self::SP | Self::GP)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BC => "BC",
            Self::BEN => "BEN",
            Self::ULC => "ULC",
            Self::CC => "CC",
            Self::CP => "CP",
            Self::SP => "SP",
            Self::GP => "GP",
            Self::C => "C",
            Self::CBEN => "CBEN",
            Self::CUL => "CUL",
            Self::CCC => "CCC",
        }
    }
}

impl fmt::Display for LegalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LegalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BC" => Ok(Self::BC),
            "BEN" => Ok(Self::BEN),
            "ULC" => Ok(Self::ULC),
            "CC" => Ok(Self::CC),
            "CP" => Ok(Self::CP),
            "SP" => Ok(Self::SP),
            "GP" => Ok(Self::GP),
            "C" => Ok(Self::C),
            "CBEN" => Ok(Self::CBEN),
            "CUL" => Ok(Self::CUL),
            "CCC" => Ok(Self::CCC),
            _ => Err(format!("Invalid legal type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessState {
    Active,
    Historical,
}

impl BusinessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Historical => "HISTORICAL",
        }
    }
}

impl std::str::FromStr for BusinessState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "HISTORICAL" => Ok(Self::Historical),
            _ => Err(format!("Invalid business state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address_additional: Option<String>,
    #[serde(default)]
    pub address_city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_region: Option<String>,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub address_country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Office {
    pub id: i64,
    /// e.g. `registeredOffice`, `recordsOffice`, `businessOffice`
    pub office_type: String,
    pub delivery_address: Option<Address>,
    pub mailing_address: Option<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Person,
    Organization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: i64,
    pub party_type: PartyType,
    pub first_name: Option<String>,
    pub middle_initial: Option<String>,
    pub last_name: Option<String>,
    pub organization_name: Option<String>,
    pub email: Option<String>,
    pub delivery_address: Option<Address>,
    pub mailing_address: Option<Address>,
}

impl Party {
    pub fn display_name(&self) -> String {
        match self.party_type {
            PartyType::Organization => self.organization_name.clone().unwrap_or_default(),
            PartyType::Person => [
                self.first_name.as_deref(),
                self.middle_initial.as_deref(),
                self.last_name.as_deref(),
            ]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Director,
    Incorporator,
    Proprietor,
    Partner,
    Completing,
    Custodian,
    Receiver,
    Applicant,
}

impl std::str::FromStr for RoleType {
    type Err = String;

    /// Accepts both the display form (`Director`) and the stored form (`director`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(' ', "_").as_str() {
            "director" => Ok(Self::Director),
            "incorporator" => Ok(Self::Incorporator),
            "proprietor" => Ok(Self::Proprietor),
            "partner" => Ok(Self::Partner),
            "completing_party" | "completing" => Ok(Self::Completing),
            "custodian" => Ok(Self::Custodian),
            "receiver" => Ok(Self::Receiver),
            "applicant" => Ok(Self::Applicant),
            _ => Err(format!("Invalid role type: {s}")),
        }
    }
}

/// Role a party holds in the business over a period of time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyRole {
    pub id: i64,
    pub party_id: i64,
    pub role: RoleType,
    pub appointment_date: Option<DateTime<Utc>>,
    pub cessation_date: Option<DateTime<Utc>>,
    pub filing_id: Option<i64>,
}

impl PartyRole {
    pub fn is_active(&self) -> bool {
        self.cessation_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareSeries {
    pub id: i64,
    pub name: String,
    pub priority: Option<i64>,
    pub max_number_of_shares: Option<i64>,
    pub has_rights_or_restrictions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareClass {
    pub id: i64,
    pub name: String,
    pub priority: Option<i64>,
    pub max_number_of_shares: Option<i64>,
    pub par_value: Option<f64>,
    pub currency: Option<String>,
    pub has_rights_or_restrictions: bool,
    pub series: Vec<ShareSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub id: i64,
    pub alias: String,
    pub alias_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: i64,
    pub resolution_type: String,
    pub resolution_date: Option<NaiveDate>,
    pub signing_date: Option<NaiveDate>,
    pub text: Option<String>,
    pub filing_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    /// Store id; `0` until a newly created business is first saved
    pub id: i64,
    pub identifier: String,
    pub legal_type: LegalType,
    pub legal_name: String,
    pub state: BusinessState,
    pub state_filing_id: Option<i64>,
    pub founding_date: DateTime<Utc>,
    pub dissolution_date: Option<DateTime<Utc>>,
    pub restoration_expiry_date: Option<DateTime<Utc>>,
    pub last_ar_date: Option<NaiveDate>,
    pub last_ar_year: Option<i32>,
    pub last_agm_date: Option<NaiveDate>,
    pub last_modified: DateTime<Utc>,
    pub admin_freeze: bool,
    pub restriction_ind: bool,
    pub jurisdiction: Option<String>,
    pub naics_description: Option<String>,
    pub offices: Vec<Office>,
    pub parties: Vec<Party>,
    pub party_roles: Vec<PartyRole>,
    pub share_classes: Vec<ShareClass>,
    pub aliases: Vec<Alias>,
    pub resolutions: Vec<Resolution>,
    pub version: i64,
}

/// Largest filing id that still fits the numeric part of an identifier
pub const MAX_IDENTIFIER_SEQUENCE: i64 = 9_999_999;

fn identifier_pattern(prefix: &str) -> &'static Regex {
    static BC: OnceLock<Regex> = OnceLock::new();
    static CP: OnceLock<Regex> = OnceLock::new();
    static FM: OnceLock<Regex> = OnceLock::new();

    let (cell, pattern) = match prefix {
        "CP" => (&CP, r"^CP\d{7}$"),
        "FM" => (&FM, r"^FM\d{7}$"),
        _ => (&BC, r"^BC\d{7}$"),
    };
    cell.get_or_init(|| Regex::new(pattern).expect("identifier pattern is a valid regex"))
}

impl Business {
    /// New active business with no child records
    pub fn new(
        identifier: impl Into<String>,
        legal_type: LegalType,
        legal_name: impl Into<String>,
        founding_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            identifier: identifier.into(),
            legal_type,
            legal_name: legal_name.into(),
            state: BusinessState::Active,
            state_filing_id: None,
            founding_date,
            dissolution_date: None,
            restoration_expiry_date: None,
            last_ar_date: None,
            last_ar_year: None,
            last_agm_date: None,
            last_modified: founding_date,
            admin_freeze: false,
            restriction_ind: false,
            jurisdiction: None,
            naics_description: None,
            offices: Vec::new(),
            parties: Vec::new(),
            party_roles: Vec::new(),
            share_classes: Vec::new(),
            aliases: Vec::new(),
            resolutions: Vec::new(),
            version: 0,
        }
    }

    /// Identifier for a business created by `filing_id`; deterministic so a
    /// redelivered creation filing assigns the same identifier.
    ///
    /// Filing ids outside the seven-digit range are rejected rather than
    /// wrapped, since a wrapped id would collide with an earlier business.
    pub fn identifier_for(legal_type: LegalType, filing_id: i64) -> Result<String, String> {
        if !(1..=MAX_IDENTIFIER_SEQUENCE).contains(&filing_id) {
            return Err(format!(
                "filing id {filing_id} does not fit a seven digit business identifier"
            ));
        }
        Ok(format!("{}{:07}", legal_type.identifier_prefix(), filing_id))
    }

    /// Check the identifier against the format required by the legal type
    pub fn validate_identifier(&self) -> Result<(), String> {
        let prefix = self.legal_type.identifier_prefix();
        if identifier_pattern(prefix).is_match(&self.identifier) {
            Ok(())
        } else {
            Err(format!(
                "Identifier {} is not valid for legal type {}",
                self.identifier, self.legal_type
            ))
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == BusinessState::Active
    }

    pub fn office(&self, office_type: &str) -> Option<&Office> {
        self.offices.iter().find(|o| o.office_type == office_type)
    }

    pub fn office_mut(&mut self, office_type: &str) -> Option<&mut Office> {
        self.offices.iter_mut().find(|o| o.office_type == office_type)
    }

    pub fn party(&self, party_id: i64) -> Option<&Party> {
        self.parties.iter().find(|p| p.id == party_id)
    }

    /// Active roles of the given type
    pub fn active_roles(&self, role: RoleType) -> impl Iterator<Item = &PartyRole> {
        self.party_roles
            .iter()
            .filter(move |r| r.role == role && r.is_active())
    }

    pub fn in_receivership(&self) -> bool {
        self.active_roles(RoleType::Receiver).next().is_some()
    }

    /// Next free id for a child collection
    pub fn next_id<T>(items: &[T], id_of: impl Fn(&T) -> i64) -> i64 {
        items.iter().map(id_of).max().unwrap_or(0) + 1
    }

    /// Add a party and return its id
    pub fn add_party(&mut self, mut party: Party) -> i64 {
        party.id = Self::next_id(&self.parties, |p| p.id);
        let id = party.id;
        self.parties.push(party);
        id
    }

    /// Add a role for an existing party and return the role id
    pub fn add_role(
        &mut self,
        party_id: i64,
        role: RoleType,
        appointment_date: Option<DateTime<Utc>>,
        filing_id: i64,
    ) -> i64 {
        let id = Self::next_id(&self.party_roles, |r| r.id);
        self.party_roles.push(PartyRole {
            id,
            party_id,
            role,
            appointment_date,
            cessation_date: None,
            filing_id: Some(filing_id),
        });
        id
    }

    /// Take the business off the active register
    pub fn mark_historical(&mut self, filing_id: i64, dissolution_date: DateTime<Utc>) {
        self.state = BusinessState::Historical;
        self.state_filing_id = Some(filing_id);
        self.dissolution_date = Some(dissolution_date);
    }

    /// Put the business back on the active register
    pub fn mark_active(&mut self, filing_id: i64) {
        self.state = BusinessState::Active;
        self.state_filing_id = Some(filing_id);
        self.dissolution_date = None;
    }
}

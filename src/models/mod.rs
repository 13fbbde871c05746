//! # Data Models
//!
//! Filing and business aggregates as the processor sees them. Persistence is
//! handled by the [`crate::database`] adapters; these types carry no I/O.

pub mod business;
pub mod filing;
pub mod filing_type;

pub use business::{
    Address, Alias, Business, BusinessState, LegalType, Office, Party, PartyRole, PartyType,
    Resolution, RoleType, ShareClass, ShareSeries,
};
pub use filing::{Comment, Filing, FilingStatus, ProcessingError};
pub use filing_type::FilingType;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of filing types the processor understands
///
/// The wire name (`as_str`) is also the key of the filing's payload
/// sub-document, e.g. `filing.changeOfName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilingType {
    AdminFreeze,
    AgmExtension,
    AgmLocationChange,
    Alteration,
    AmalgamationOut,
    AnnualReport,
    AppointReceiver,
    CeaseReceiver,
    ChangeOfAddress,
    ChangeOfDirectors,
    ChangeOfName,
    ChangeOfRegistration,
    ConsentAmalgamationOut,
    ConsentContinuationOut,
    ContinuationIn,
    ContinuationOut,
    Conversion,
    Correction,
    CourtOrder,
    Dissolution,
    IncorporationApplication,
    NoticeOfWithdrawal,
    PutBackOff,
    PutBackOn,
    RegistrarsNotation,
    RegistrarsOrder,
    Registration,
    Restoration,
    SpecialResolution,
    Transition,
    VoluntaryDissolution,
}

impl FilingType {
    pub const ALL: [FilingType; 31] = [
        Self::AdminFreeze,
        Self::AgmExtension,
        Self::AgmLocationChange,
        Self::Alteration,
        Self::AmalgamationOut,
        Self::AnnualReport,
        Self::AppointReceiver,
        Self::CeaseReceiver,
        Self::ChangeOfAddress,
        Self::ChangeOfDirectors,
        Self::ChangeOfName,
        Self::ChangeOfRegistration,
        Self::ConsentAmalgamationOut,
        Self::ConsentContinuationOut,
        Self::ContinuationIn,
        Self::ContinuationOut,
        Self::Conversion,
        Self::Correction,
        Self::CourtOrder,
        Self::Dissolution,
        Self::IncorporationApplication,
        Self::NoticeOfWithdrawal,
        Self::PutBackOff,
        Self::PutBackOn,
        Self::RegistrarsNotation,
        Self::RegistrarsOrder,
        Self::Registration,
        Self::Restoration,
        Self::SpecialResolution,
        Self::Transition,
        Self::VoluntaryDissolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminFreeze => "adminFreeze",
            Self::AgmExtension => "agmExtension",
            Self::AgmLocationChange => "agmLocationChange",
            Self::Alteration => "alteration",
            Self::AmalgamationOut => "amalgamationOut",
            Self::AnnualReport => "annualReport",
            Self::AppointReceiver => "appointReceiver",
            Self::CeaseReceiver => "ceaseReceiver",
            Self::ChangeOfAddress => "changeOfAddress",
            Self::ChangeOfDirectors => "changeOfDirectors",
            Self::ChangeOfName => "changeOfName",
            Self::ChangeOfRegistration => "changeOfRegistration",
            Self::ConsentAmalgamationOut => "consentAmalgamationOut",
            Self::ConsentContinuationOut => "consentContinuationOut",
            Self::ContinuationIn => "continuationIn",
            Self::ContinuationOut => "continuationOut",
            Self::Conversion => "conversion",
            Self::Correction => "correction",
            Self::CourtOrder => "courtOrder",
            Self::Dissolution => "dissolution",
            Self::IncorporationApplication => "incorporationApplication",
            Self::NoticeOfWithdrawal => "noticeOfWithdrawal",
            Self::PutBackOff => "putBackOff",
            Self::PutBackOn => "putBackOn",
            Self::RegistrarsNotation => "registrarsNotation",
            Self::RegistrarsOrder => "registrarsOrder",
            Self::Registration => "registration",
            Self::Restoration => "restoration",
            Self::SpecialResolution => "specialResolution",
            Self::Transition => "transition",
            Self::VoluntaryDissolution => "voluntaryDissolution",
        }
    }

    /// Filing types that create their owning business instead of loading one
    pub fn creates_business(&self) -> bool {
        matches!(
            self,
            Self::IncorporationApplication | Self::Registration | Self::ContinuationIn
        )
    }

    /// Filing types that take the business out of the active register
    pub fn is_dissolution(&self) -> bool {
        matches!(
            self,
            Self::Dissolution
                | Self::VoluntaryDissolution
                | Self::PutBackOff
                | Self::ContinuationOut
                | Self::AmalgamationOut
        )
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|filing_type| filing_type.as_str() == s)
            .ok_or_else(|| format!("Invalid filing type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_parses_from_its_wire_name() {
        for filing_type in FilingType::ALL {
            assert_eq!(
                filing_type.as_str().parse::<FilingType>().unwrap(),
                filing_type
            );
        }
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        assert!("ChangeOfName".parse::<FilingType>().is_err());
        assert!("".parse::<FilingType>().is_err());
        assert!("lear".parse::<FilingType>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_name() {
        let json = serde_json::to_string(&FilingType::CeaseReceiver).unwrap();
        assert_eq!(json, "\"ceaseReceiver\"");
    }

    #[test]
    fn test_creating_types() {
        assert!(FilingType::IncorporationApplication.creates_business());
        assert!(FilingType::Registration.creates_business());
        assert!(!FilingType::ChangeOfName.creates_business());
    }
}

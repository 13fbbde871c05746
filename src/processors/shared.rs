//! Helpers shared by several processors: offices, parties and roles, share
//! structure, and court order fields.

use super::payload::{self, parse_date, DateParseError};
use super::FilingMeta;
use crate::error::{FilerError, FilerResult};
use crate::models::{
    Business, Filing, LegalType, Office, Party, PartyType, RoleType, ShareClass, ShareSeries,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// Update the addresses of existing offices named in `offices`
///
/// Every named office must already exist and carry both addresses; anything
/// else fails the filing rather than silently skipping the office.
pub fn update_office_addresses(
    business: &mut Business,
    offices: &Value,
    filing_type: &str,
) -> FilerResult<Vec<String>> {
    let entries = offices
        .as_object()
        .ok_or_else(|| FilerError::payload(filing_type, "offices", "expected an object"))?;

    let mut updated = Vec::with_capacity(entries.len());
    for (office_type, doc) in entries {
        let field = format!("offices.{office_type}");
        let delivery = payload::address(doc, "deliveryAddress", filing_type)?.ok_or_else(|| {
            FilerError::payload(filing_type, format!("{field}.deliveryAddress"), "address is missing")
        })?;
        let mailing = payload::address(doc, "mailingAddress", filing_type)?.ok_or_else(|| {
            FilerError::payload(filing_type, format!("{field}.mailingAddress"), "address is missing")
        })?;

        let office = business.office_mut(office_type).ok_or_else(|| {
            FilerError::payload(filing_type, &field, "business has no such office")
        })?;
        if office.delivery_address.is_none() || office.mailing_address.is_none() {
            return Err(FilerError::payload(
                filing_type,
                &field,
                "stored office is missing an address row",
            ));
        }

        office.delivery_address = Some(delivery);
        office.mailing_address = Some(mailing);
        updated.push(office_type.clone());
    }

    Ok(updated)
}

/// Create offices named in `offices`, replacing any office of the same type
pub fn upsert_offices(
    business: &mut Business,
    offices: &Value,
    filing_type: &str,
) -> FilerResult<()> {
    let Some(entries) = offices.as_object() else {
        return Ok(());
    };

    for (office_type, doc) in entries {
        let delivery = payload::address(doc, "deliveryAddress", filing_type)?;
        let mailing = payload::address(doc, "mailingAddress", filing_type)?;

        match business.office_mut(office_type) {
            Some(office) => {
                office.delivery_address = delivery;
                office.mailing_address = mailing;
            }
            None => {
                let id = Business::next_id(&business.offices, |o| o.id);
                business.offices.push(Office {
                    id,
                    office_type: office_type.clone(),
                    delivery_address: delivery,
                    mailing_address: mailing,
                });
            }
        }
    }
    Ok(())
}

/// Build a party from a payload party entry (`officer` plus addresses)
pub fn parse_party(entry: &Value, filing_type: &str) -> FilerResult<Party> {
    let officer = entry
        .get("officer")
        .ok_or_else(|| FilerError::payload(filing_type, "parties.officer", "officer is missing"))?;

    let organization_name = payload::optional_str(officer, "organizationName");
    let party_type = match officer.get("partyType").and_then(Value::as_str) {
        Some("organization") => PartyType::Organization,
        Some(_) => PartyType::Person,
        None if organization_name.is_some() => PartyType::Organization,
        None => PartyType::Person,
    };

    let party = Party {
        id: 0,
        party_type,
        first_name: payload::optional_str(officer, "firstName"),
        middle_initial: payload::optional_str(officer, "middleInitial")
            .or_else(|| payload::optional_str(officer, "middleName")),
        last_name: payload::optional_str(officer, "lastName"),
        organization_name,
        email: payload::optional_str(officer, "email"),
        delivery_address: payload::address(entry, "deliveryAddress", filing_type)?,
        mailing_address: payload::address(entry, "mailingAddress", filing_type)?,
    };

    if party.display_name().is_empty() {
        return Err(FilerError::payload(
            filing_type,
            "parties.officer",
            "party has no name",
        ));
    }
    Ok(party)
}

/// Role types listed on a payload party entry
pub fn parse_roles(entry: &Value, filing_type: &str) -> FilerResult<Vec<(RoleType, Option<DateTime<Utc>>)>> {
    payload::array(entry, "roles")
        .iter()
        .map(|role| {
            let name = payload::required_str(role, "roleType", filing_type)?;
            let role_type = name
                .parse::<RoleType>()
                .map_err(|e| FilerError::payload(filing_type, "roles.roleType", e))?;
            let appointment = payload::optional_date(role, "appointmentDate", filing_type)?;
            Ok((role_type, appointment))
        })
        .collect()
}

/// Add every party in `entries` with its roles
///
/// Roles without an appointment date use `appointed_on`. Entries listing no
/// roles receive `default_role` when one is given.
pub fn add_parties(
    business: &mut Business,
    entries: &[Value],
    filing_id: i64,
    appointed_on: DateTime<Utc>,
    default_role: Option<RoleType>,
    filing_type: &str,
) -> FilerResult<Vec<i64>> {
    let mut added = Vec::with_capacity(entries.len());
    for entry in entries {
        let party = parse_party(entry, filing_type)?;
        let mut roles = parse_roles(entry, filing_type)?;
        if roles.is_empty() {
            if let Some(role) = default_role {
                roles.push((role, None));
            }
        }

        let party_id = business.add_party(party);
        for (role, appointment) in roles {
            business.add_role(party_id, role, Some(appointment.unwrap_or(appointed_on)), filing_id);
        }
        added.push(party_id);
    }
    Ok(added)
}

/// Locate the stored party a payload entry refers to
///
/// `officer.id` wins when it names a party of this business; otherwise the
/// party is matched on its display name.
pub fn find_party_id(business: &Business, entry: &Value) -> Option<i64> {
    let officer = entry.get("officer")?;
    if let Some(id) = payload::optional_i64(officer, "id") {
        if business.party(id).is_some() {
            return Some(id);
        }
    }

    let wanted = parse_party(entry, "").ok()?.display_name().to_lowercase();
    business
        .parties
        .iter()
        .find(|p| p.display_name().to_lowercase() == wanted)
        .map(|p| p.id)
}

/// Set the cessation date on the party's active roles (of `role`, if given)
pub fn cease_roles(
    business: &mut Business,
    party_id: i64,
    role: Option<RoleType>,
    ceased_on: DateTime<Utc>,
) -> usize {
    let mut ceased = 0;
    for party_role in business
        .party_roles
        .iter_mut()
        .filter(|r| r.party_id == party_id && r.is_active())
        .filter(|r| role.map_or(true, |wanted| r.role == wanted))
    {
        party_role.cessation_date = Some(ceased_on);
        ceased += 1;
    }
    ceased
}

/// Replace the share structure with `shareClasses` from the payload
pub fn replace_share_structure(
    business: &mut Business,
    share_structure: &Value,
    filing_type: &str,
) -> FilerResult<()> {
    let mut classes = Vec::new();
    for (index, class) in payload::array(share_structure, "shareClasses").iter().enumerate() {
        let name = payload::required_str(class, "name", filing_type)?;
        let series = payload::array(class, "series")
            .iter()
            .enumerate()
            .map(|(series_index, series)| {
                Ok(ShareSeries {
                    id: series_index as i64 + 1,
                    name: payload::required_str(series, "name", filing_type)?,
                    priority: payload::optional_i64(series, "priority"),
                    max_number_of_shares: payload::optional_i64(series, "maxNumberOfShares"),
                    has_rights_or_restrictions: payload::optional_bool(
                        series,
                        "hasRightsOrRestrictions",
                    )
                    .unwrap_or(false),
                })
            })
            .collect::<FilerResult<Vec<_>>>()?;

        classes.push(ShareClass {
            id: index as i64 + 1,
            name,
            priority: payload::optional_i64(class, "priority"),
            max_number_of_shares: payload::optional_i64(class, "maxNumberOfShares"),
            par_value: class.get("parValue").and_then(Value::as_f64),
            currency: payload::optional_str(class, "currency"),
            has_rights_or_restrictions: payload::optional_bool(class, "hasRightsOrRestrictions")
                .unwrap_or(false),
            series,
        });
    }

    business.share_classes = classes;
    Ok(())
}

/// Copy court order fields from `doc` onto the filing
///
/// File number, effect of order and details are always overwritten. An
/// unparsable order date leaves `court_order_date` unset and is returned to
/// the caller instead of failing the filing.
pub fn apply_court_order(filing: &mut Filing, doc: &Value) -> Result<(), DateParseError> {
    filing.court_order_file_number = payload::optional_str(doc, "fileNumber");
    filing.court_order_effect_of_order = payload::optional_str(doc, "effectOfOrder");
    filing.order_details = payload::optional_str(doc, "orderDetails");

    match payload::optional_str(doc, "orderDate") {
        None => {
            filing.court_order_date = None;
            Ok(())
        }
        Some(raw) => match parse_date(&raw) {
            Ok(date) => {
                filing.court_order_date = Some(date);
                Ok(())
            }
            Err(err) => {
                filing.court_order_date = None;
                warn!(filing_id = filing.id, order_date = %raw, "Court order date could not be parsed");
                Err(err)
            }
        },
    }
}

/// Apply an optional nested `courtOrder` section, tolerating a bad date
///
/// An unparsable order date is noted as `orderDateInvalid` in the meta and
/// the filing still completes.
pub fn apply_optional_court_order(filing: &mut Filing, meta: &mut FilingMeta, doc: &Value) {
    if let Some(court_order) = doc.get("courtOrder") {
        if apply_court_order(filing, court_order).is_err() {
            meta.set("orderDateInvalid", true);
        }
    }
}

/// Name given to a numbered company: `1234567 B.C. LTD.`
pub fn numbered_name(identifier: &str, legal_type: LegalType) -> String {
    let number = identifier.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    match legal_type {
        LegalType::ULC | LegalType::CUL => format!("{number} B.C. UNLIMITED LIABILITY COMPANY"),
        LegalType::CC | LegalType::CCC => format!("{number} B.C. COMMUNITY CONTRIBUTION COMPANY LTD."),
        _ => format!("{number} B.C. LTD."),
    }
}

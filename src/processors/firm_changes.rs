//! Changes to sole proprietorships and general partnerships.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::{FilerError, FilerResult};
use crate::models::{Business, FilingType, LegalType, RoleType};
use chrono::{DateTime, Utc};
use serde_json::Value;

fn ensure_firm(ctx: &ProcessingContext) -> FilerResult<()> {
    let business = ctx.business()?;
    if !business.legal_type.is_firm() {
        return Err(FilerError::InvalidFilingState {
            filing_id: ctx.filing.id,
            status: ctx.filing.status.to_string(),
            reason: format!("{} is a {}, not a firm", business.identifier, business.legal_type),
        });
    }
    Ok(())
}

fn has_action(entry: &Value, action: &str) -> bool {
    payload::array(entry, "actions")
        .iter()
        .any(|a| a.as_str() == Some(action))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PartyChanges {
    added: usize,
    removed: usize,
    edited: usize,
}

/// Reconcile the firm's proprietor or partners against the payload party list
///
/// Entries marked `removed` cease every active role of the matched party.
/// Unknown parties are added as proprietor or partner. Matched parties
/// marked `edited` have their name and addresses replaced.
fn apply_party_changes(
    business: &mut Business,
    entries: &[Value],
    filing_id: i64,
    effective: DateTime<Utc>,
    ft: &str,
) -> FilerResult<PartyChanges> {
    let default_role = match business.legal_type {
        LegalType::SP => RoleType::Proprietor,
        _ => RoleType::Partner,
    };
    let mut changes = PartyChanges::default();

    for entry in entries {
        let existing = shared::find_party_id(business, entry);
        match existing {
            Some(party_id) if has_action(entry, "removed") => {
                if shared::cease_roles(business, party_id, None, effective) > 0 {
                    changes.removed += 1;
                }
            }
            Some(party_id) if has_action(entry, "edited") || has_action(entry, "nameChanged") => {
                let mut updated = shared::parse_party(entry, ft)?;
                updated.id = party_id;
                if let Some(party) = business.parties.iter_mut().find(|p| p.id == party_id) {
                    *party = updated;
                    changes.edited += 1;
                }
            }
            Some(_) => {}
            None if has_action(entry, "removed") => {
                return Err(FilerError::payload(ft, "parties", "removed party does not exist"));
            }
            None => {
                shared::add_parties(
                    business,
                    std::slice::from_ref(entry),
                    filing_id,
                    effective,
                    Some(default_role),
                    ft,
                )?;
                changes.added += 1;
            }
        }
    }
    Ok(changes)
}

/// Name, nature of business, business office and parties
fn apply_firm_changes(ctx: &mut ProcessingContext, doc: &Value, ft: &str) -> FilerResult<()> {
    ensure_firm(ctx)?;
    let filing_id = ctx.filing.id;
    let effective = ctx.filing.effective_date;
    let new_name = payload::legal_name(doc);
    let naics = doc
        .get("business")
        .and_then(|b| b.get("naics"))
        .and_then(|n| payload::optional_str(n, "naicsDescription"));

    let business = ctx.business_mut()?;
    let renamed = new_name.map(|name| {
        let old = std::mem::replace(&mut business.legal_name, name.clone());
        (old, name)
    });
    if let Some(naics) = naics {
        business.naics_description = Some(naics);
    }
    if let Some(offices) = doc.get("offices") {
        shared::upsert_offices(business, offices, ft)?;
    }
    let changes = apply_party_changes(
        business,
        payload::array(doc, "parties"),
        filing_id,
        effective,
        ft,
    )?;

    if let Some((old, new)) = renamed {
        ctx.meta.record_name_change(&old, &new);
    }
    ctx.meta.set("partiesAdded", changes.added);
    ctx.meta.set("partiesRemoved", changes.removed);
    ctx.meta.set("partiesEdited", changes.edited);
    shared::apply_optional_court_order(&mut ctx.filing, &mut ctx.meta, doc);
    Ok(())
}

#[derive(Debug)]
pub struct ChangeOfRegistrationProcessor;

impl FilingProcessor for ChangeOfRegistrationProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ChangeOfRegistration
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::ChangeOfRegistration.as_str();
        let doc = ctx.document(ft)?;
        apply_firm_changes(ctx, &doc, ft)
    }
}

/// Staff conversion of a firm record; may also correct the start date
#[derive(Debug)]
pub struct ConversionProcessor;

impl FilingProcessor for ConversionProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::Conversion
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::Conversion.as_str();
        let doc = ctx.document(ft)?;
        let start_date = payload::optional_date(&doc, "startDate", ft)?;

        apply_firm_changes(ctx, &doc, ft)?;
        if let Some(start_date) = start_date {
            ctx.business_mut()?.founding_date = start_date;
            ctx.meta.set("startDate", start_date.date_naive().to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support;
    use serde_json::json;

    fn partnership_context(filing_type: &str, payload: Value) -> ProcessingContext {
        let mut ctx = test_support::context(filing_type, payload);
        let business = ctx.business.as_mut().unwrap();
        business.identifier = "FM1000001".to_string();
        business.legal_type = LegalType::GP;
        business.legal_name = "SMITH & JONES".to_string();
        shared::add_parties(
            business,
            &[
                json!({"officer": {"firstName": "Ann", "lastName": "Smith"}}),
                json!({"officer": {"firstName": "Bob", "lastName": "Jones"}}),
            ],
            1,
            test_support::now(),
            Some(RoleType::Partner),
            "registration",
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_change_of_registration_reconciles_partners() {
        let mut ctx = partnership_context(
            "changeOfRegistration",
            json!({"changeOfRegistration": {
                "nameRequest": {"legalName": "SMITH & LEE"},
                "business": {"naics": {"naicsDescription": "Consulting"}},
                "parties": [
                    {"officer": {"id": 2, "firstName": "Bob", "lastName": "Jones"}, "actions": ["removed"]},
                    {"officer": {"firstName": "Cat", "lastName": "Lee"}}
                ]
            }}),
        );

        ChangeOfRegistrationProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        assert_eq!(business.legal_name, "SMITH & LEE");
        assert_eq!(business.naics_description.as_deref(), Some("Consulting"));
        assert_eq!(business.active_roles(RoleType::Partner).count(), 2);
        assert!(business
            .party_roles
            .iter()
            .any(|r| r.party_id == 2 && r.cessation_date.is_some()));
        assert_eq!(ctx.meta.get("partiesAdded"), Some(&json!(1)));
        assert_eq!(ctx.meta.get("toLegalName"), Some(&json!("SMITH & LEE")));
    }

    #[test]
    fn test_change_of_registration_rejects_corporations() {
        let mut ctx = test_support::context(
            "changeOfRegistration",
            json!({"changeOfRegistration": {}}),
        );
        let err = ChangeOfRegistrationProcessor.process(&mut ctx).unwrap_err();
        assert!(matches!(err, FilerError::InvalidFilingState { .. }));
    }

    #[test]
    fn test_conversion_edits_party_and_start_date() {
        let mut ctx = partnership_context(
            "conversion",
            json!({"conversion": {
                "startDate": "2001-04-01",
                "parties": [{"officer": {"id": 1, "firstName": "Anne", "lastName": "Smith"},
                             "actions": ["edited"]}]
            }}),
        );

        ConversionProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        assert_eq!(business.party(1).unwrap().display_name(), "Anne Smith");
        assert_eq!(business.founding_date.date_naive().to_string(), "2001-04-01");
        assert!(ctx.meta.legal_name_change.is_none());
    }
}

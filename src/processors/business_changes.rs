//! Changes to an active business: name, addresses, directors, alteration,
//! transition and special resolutions.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::{FilerError, FilerResult};
use crate::models::{Business, FilingType, LegalType, Resolution, RoleType};
use serde_json::Value;
use tracing::debug;

/// Apply a name change from a `changeOfName`-shaped document
fn apply_name_change(ctx: &mut ProcessingContext, doc: &Value, filing_type: &str) -> FilerResult<()> {
    let new_name = payload::legal_name(doc)
        .ok_or_else(|| FilerError::payload(filing_type, "legalName", "required value is missing"))?;

    let business = ctx.business_mut()?;
    let old_name = std::mem::replace(&mut business.legal_name, new_name.clone());
    ctx.meta.record_name_change(&old_name, &new_name);
    Ok(())
}

#[derive(Debug)]
pub struct ChangeOfNameProcessor;

impl FilingProcessor for ChangeOfNameProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ChangeOfName
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::ChangeOfName.as_str();
        let doc = ctx.document(ft)?;
        apply_name_change(ctx, &doc, ft)
    }
}

/// Updates only the offices named in the payload
#[derive(Debug)]
pub struct ChangeOfAddressProcessor;

impl FilingProcessor for ChangeOfAddressProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ChangeOfAddress
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::ChangeOfAddress.as_str();
        let doc = ctx.document(ft)?;
        let offices = doc
            .get("offices")
            .ok_or_else(|| FilerError::payload(ft, "offices", "section is missing"))?;

        let updated = shared::update_office_addresses(ctx.business_mut()?, offices, ft)?;
        ctx.meta.set("offices", updated);
        Ok(())
    }
}

#[derive(Debug)]
pub struct ChangeOfDirectorsProcessor;

impl ChangeOfDirectorsProcessor {
    fn stored_party(business: &Business, entry: &Value, ft: &str) -> FilerResult<i64> {
        shared::find_party_id(business, entry)
            .ok_or_else(|| FilerError::payload(ft, "directors.officer", "director not found"))
    }
}

impl FilingProcessor for ChangeOfDirectorsProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ChangeOfDirectors
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::ChangeOfDirectors.as_str();
        let doc = ctx.document(ft)?;
        let filing_id = ctx.filing.id;
        let effective = ctx.filing.effective_date;

        let (mut appointed, mut ceased, mut changed) = (0usize, 0usize, 0usize);
        let business = ctx.business_mut()?;

        for entry in payload::array(&doc, "directors") {
            let actions: Vec<&str> = payload::array(entry, "actions")
                .iter()
                .filter_map(Value::as_str)
                .collect();

            if actions.contains(&"appointed") {
                let appointed_on = payload::optional_date(entry, "appointmentDate", ft)?.unwrap_or(effective);
                shared::add_parties(
                    business,
                    std::slice::from_ref(entry),
                    filing_id,
                    appointed_on,
                    Some(RoleType::Director),
                    ft,
                )?;
                appointed += 1;
                continue;
            }

            if actions.contains(&"ceased") {
                let party_id = Self::stored_party(business, entry, ft)?;
                let ceased_on = payload::optional_date(entry, "cessationDate", ft)?.unwrap_or(effective);
                shared::cease_roles(business, party_id, Some(RoleType::Director), ceased_on);
                ceased += 1;
                continue;
            }

            let name_changed = actions.contains(&"nameChanged");
            let address_changed = actions.contains(&"addressChanged");
            if !(name_changed || address_changed) {
                continue;
            }

            // renamed directors can only be located by id
            let party_id = entry
                .get("officer")
                .and_then(|officer| payload::optional_i64(officer, "id"))
                .filter(|id| business.party(*id).is_some())
                .map_or_else(|| Self::stored_party(business, entry, ft), Ok)?;
            let incoming = shared::parse_party(entry, ft)?;

            let party = business
                .parties
                .iter_mut()
                .find(|p| p.id == party_id)
                .ok_or_else(|| FilerError::payload(ft, "directors.officer", "director not found"))?;
            if name_changed {
                party.first_name = incoming.first_name;
                party.middle_initial = incoming.middle_initial;
                party.last_name = incoming.last_name;
                party.organization_name = incoming.organization_name;
            }
            if address_changed {
                party.delivery_address = incoming.delivery_address;
                party.mailing_address = incoming.mailing_address;
            }
            changed += 1;
        }

        debug!(appointed, ceased, changed, "Directors updated");
        ctx.meta.set("appointed", appointed as u64);
        ctx.meta.set("ceased", ceased as u64);
        ctx.meta.set("changed", changed as u64);
        Ok(())
    }
}

#[derive(Debug)]
pub struct AlterationProcessor;

impl FilingProcessor for AlterationProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::Alteration
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::Alteration.as_str();
        let doc = ctx.document(ft)?;

        let new_type = doc
            .get("business")
            .and_then(|b| payload::optional_str(b, "legalType"))
            .map(|raw| {
                raw.parse::<LegalType>()
                    .map_err(|e| FilerError::payload(ft, "business.legalType", e))
            })
            .transpose()?;

        if let Some(new_type) = new_type {
            let business = ctx.business_mut()?;
            let old_type = std::mem::replace(&mut business.legal_type, new_type);
            business
                .validate_identifier()
                .map_err(|e| FilerError::payload(ft, "business.legalType", e))?;
            ctx.meta
                .record_legal_type_change(old_type.as_str(), new_type.as_str());
        }

        if payload::legal_name(&doc).is_some() {
            apply_name_change(ctx, &doc, ft)?;
        }

        if let Some(share_structure) = doc.get("shareStructure") {
            shared::replace_share_structure(ctx.business_mut()?, share_structure, ft)?;
        }

        if payload::optional_bool(&doc, "provisionsRemoved") == Some(true) {
            ctx.business_mut()?.restriction_ind = false;
            ctx.meta.set("provisionsRemoved", true);
        }

        shared::apply_optional_court_order(&mut ctx.filing, &mut ctx.meta, &doc);
        Ok(())
    }
}

/// Post-Business-Corporations-Act transition application
#[derive(Debug)]
pub struct TransitionProcessor;

impl FilingProcessor for TransitionProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::Transition
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::Transition.as_str();
        let doc = ctx.document(ft)?;
        let business = ctx.business_mut()?;

        if let Some(has_provisions) = payload::optional_bool(&doc, "hasProvisions") {
            business.restriction_ind = has_provisions;
        }
        if let Some(share_structure) = doc.get("shareStructure") {
            shared::replace_share_structure(business, share_structure, ft)?;
        }
        if let Some(offices) = doc.get("offices") {
            shared::upsert_offices(business, offices, ft)?;
        }

        let restriction_ind = business.restriction_ind;
        ctx.meta.set("hasProvisions", restriction_ind);
        Ok(())
    }
}

/// Appends a resolution; a `changeOfName` section in the same filing renames the business
#[derive(Debug)]
pub struct SpecialResolutionProcessor;

impl FilingProcessor for SpecialResolutionProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::SpecialResolution
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::SpecialResolution.as_str();
        let doc = ctx.document(ft)?;
        let filing_id = ctx.filing.id;

        let text = payload::required_str(&doc, "resolution", ft)?;
        let resolution_date = payload::optional_naive_date(&doc, "resolutionDate", ft)?;
        let signing_date = payload::optional_naive_date(&doc, "signingDate", ft)?;
        let resolution_type =
            payload::optional_str(&doc, "resolutionType").unwrap_or_else(|| "SPECIAL".to_string());

        let business = ctx.business_mut()?;
        let id = Business::next_id(&business.resolutions, |r| r.id);
        business.resolutions.push(Resolution {
            id,
            resolution_type,
            resolution_date,
            signing_date,
            text: Some(text),
            filing_id,
        });

        if let Some(date) = resolution_date {
            ctx.meta.set("resolutionDate", date.to_string());
        }

        if let Some(name_doc) = ctx.optional_document(FilingType::ChangeOfName.as_str()) {
            apply_name_change(ctx, &name_doc, ft)?;
        }
        Ok(())
    }
}

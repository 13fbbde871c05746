//! Filings that bring a business into existence: incorporation applications,
//! firm registrations and continuations in from another jurisdiction.
//!
//! The new business identifier is derived from the legal type prefix and the
//! filing id, so a redelivered creation filing yields the same identifier.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::{FilerError, FilerResult};
use crate::models::{Business, FilingType, LegalType};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

fn legal_type(doc: &Value, ft: &str) -> FilerResult<LegalType> {
    let raw = doc
        .get("nameRequest")
        .and_then(|nr| payload::optional_str(nr, "legalType"))
        .or_else(|| doc.get("business").and_then(|b| payload::optional_str(b, "legalType")))
        .ok_or_else(|| FilerError::payload(ft, "nameRequest.legalType", "required value is missing"))?;
    raw.parse()
        .map_err(|e| FilerError::payload(ft, "nameRequest.legalType", e))
}

/// Build the business described by a creation filing and place it in the context
fn create_business(
    ctx: &mut ProcessingContext,
    doc: &Value,
    ft: &str,
    founding_date: DateTime<Utc>,
) -> FilerResult<()> {
    if ctx.business.is_some() {
        return Err(FilerError::InvalidFilingState {
            filing_id: ctx.filing.id,
            status: ctx.filing.status.to_string(),
            reason: "business already exists for creation filing".to_string(),
        });
    }

    let legal_type = legal_type(doc, ft)?;
    let identifier = Business::identifier_for(legal_type, ctx.filing.id)
        .map_err(|e| FilerError::payload(ft, "filing.header.filingId", e))?;
    let legal_name =
        payload::legal_name(doc).unwrap_or_else(|| shared::numbered_name(&identifier, legal_type));

    let mut business = Business::new(identifier, legal_type, legal_name, founding_date);
    business.last_modified = ctx.now;
    business
        .validate_identifier()
        .map_err(|e| FilerError::payload(ft, "nameRequest.legalType", e))?;

    if let Some(offices) = doc.get("offices") {
        shared::upsert_offices(&mut business, offices, ft)?;
    }
    shared::add_parties(
        &mut business,
        payload::array(doc, "parties"),
        ctx.filing.id,
        founding_date,
        None,
        ft,
    )?;
    if let Some(share_structure) = doc.get("shareStructure") {
        shared::replace_share_structure(&mut business, share_structure, ft)?;
    }

    info!(
        filing_id = ctx.filing.id,
        identifier = %business.identifier,
        legal_type = %business.legal_type,
        "🏢 Business created"
    );
    ctx.meta.set("identifier", business.identifier.clone());
    ctx.meta.set("legalType", business.legal_type.as_str());
    ctx.meta.set("legalName", business.legal_name.clone());
    ctx.business = Some(business);
    Ok(())
}

#[derive(Debug)]
pub struct IncorporationApplicationProcessor;

impl FilingProcessor for IncorporationApplicationProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::IncorporationApplication
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::IncorporationApplication.as_str();
        let doc = ctx.document(ft)?;
        let founded = ctx.filing.effective_date;
        create_business(ctx, &doc, ft, founded)?;

        if payload::legal_name(&doc).is_none() {
            ctx.meta.set("isNumberedCompany", true);
        }
        Ok(())
    }
}

/// Sole proprietorship and general partnership registration
#[derive(Debug)]
pub struct RegistrationProcessor;

impl FilingProcessor for RegistrationProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::Registration
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::Registration.as_str();
        let doc = ctx.document(ft)?;

        let legal_type = legal_type(&doc, ft)?;
        if !legal_type.is_firm() {
            return Err(FilerError::payload(
                ft,
                "nameRequest.legalType",
                format!("{legal_type} cannot be registered as a firm"),
            ));
        }
        if payload::legal_name(&doc).is_none() {
            return Err(FilerError::payload(ft, "nameRequest.legalName", "required value is missing"));
        }

        let business_doc = doc.get("business").cloned().unwrap_or(Value::Null);
        let founded = payload::optional_date(&doc, "startDate", ft)?
            .or(payload::optional_date(&business_doc, "foundingDate", ft)?)
            .unwrap_or(ctx.filing.effective_date);

        create_business(ctx, &doc, ft, founded)?;

        let naics = business_doc
            .get("naics")
            .and_then(|n| payload::optional_str(n, "naicsDescription"));
        if let Some(business) = ctx.business.as_mut() {
            business.naics_description = naics;
        }
        Ok(())
    }
}

/// Continuation in from a foreign jurisdiction
#[derive(Debug)]
pub struct ContinuationInProcessor;

impl FilingProcessor for ContinuationInProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ContinuationIn
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::ContinuationIn.as_str();
        let doc = ctx.document(ft)?;

        let foreign = doc
            .get("foreignJurisdiction")
            .ok_or_else(|| FilerError::payload(ft, "foreignJurisdiction", "section is missing"))?;
        let country = payload::required_str(foreign, "country", ft)?;
        let jurisdiction = match payload::optional_str(foreign, "region") {
            Some(region) => format!("{country}-{region}"),
            None => country,
        };
        let foreign_identifier = payload::optional_str(foreign, "identifier");

        let founded = ctx.filing.effective_date;
        create_business(ctx, &doc, ft, founded)?;

        if let Some(business) = ctx.business.as_mut() {
            business.jurisdiction = Some(jurisdiction.clone());
        }
        ctx.meta.set("foreignJurisdiction", jurisdiction);
        if let Some(identifier) = foreign_identifier {
            ctx.meta.set("foreignIdentifier", identifier);
        }
        Ok(())
    }
}

//! Filings that take a business off the active register.

use super::payload::{self, parse_date};
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::{FilerError, FilerResult};
use crate::models::{FilingType, RoleType};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

fn ensure_active(ctx: &ProcessingContext) -> FilerResult<()> {
    let business = ctx.business()?;
    if !business.is_active() {
        return Err(FilerError::InvalidFilingState {
            filing_id: ctx.filing.id,
            status: ctx.filing.status.to_string(),
            reason: format!("business {} is not active", business.identifier),
        });
    }
    Ok(())
}

/// Voluntary dissolutions must carry their own date
fn voluntary_date(ctx: &ProcessingContext, doc: &Value, ft: &str) -> FilerResult<DateTime<Utc>> {
    let raw = payload::optional_str(doc, "dissolutionDate").ok_or(FilerError::DissolutionDateMissing {
        filing_id: ctx.filing.id,
    })?;
    parse_date(&raw).map_err(|e| FilerError::payload(ft, "dissolutionDate", e.to_string()))
}

fn dissolve(ctx: &mut ProcessingContext, date: DateTime<Utc>) -> FilerResult<()> {
    let filing_id = ctx.filing.id;
    let business = ctx.business_mut()?;
    business.mark_historical(filing_id, date);
    info!(identifier = %business.identifier, filing_id, "Business marked historical");
    Ok(())
}

#[derive(Debug)]
pub struct DissolutionProcessor;

impl FilingProcessor for DissolutionProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::Dissolution
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::Dissolution.as_str();
        let doc = ctx.document(ft)?;
        ensure_active(ctx)?;

        let dissolution_type =
            payload::optional_str(&doc, "dissolutionType").unwrap_or_else(|| "voluntary".to_string());
        let date = match dissolution_type.as_str() {
            "voluntary" | "voluntaryLiquidation" => voluntary_date(ctx, &doc, ft)?,
            "administrative" | "involuntary" => ctx.filing.effective_date,
            other => {
                return Err(FilerError::payload(
                    ft,
                    "dissolutionType",
                    format!("unsupported dissolution type {other}"),
                ))
            }
        };

        let filing_id = ctx.filing.id;
        let effective = ctx.filing.effective_date;
        shared::add_parties(
            ctx.business_mut()?,
            payload::array(&doc, "parties"),
            filing_id,
            effective,
            Some(RoleType::Custodian),
            ft,
        )?;
        dissolve(ctx, date)?;
        shared::apply_optional_court_order(&mut ctx.filing, &mut ctx.meta, &doc);

        ctx.meta.set("dissolutionType", dissolution_type);
        ctx.meta.set("dissolutionDate", date.date_naive().to_string());
        Ok(())
    }
}

#[derive(Debug)]
pub struct VoluntaryDissolutionProcessor;

impl FilingProcessor for VoluntaryDissolutionProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::VoluntaryDissolution
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::VoluntaryDissolution.as_str();
        let doc = ctx.document(ft)?;
        ensure_active(ctx)?;

        let date = voluntary_date(ctx, &doc, ft)?;
        dissolve(ctx, date)?;
        ctx.meta.set("dissolutionDate", date.date_naive().to_string());
        Ok(())
    }
}

/// Expiry of a limited restoration
#[derive(Debug)]
pub struct PutBackOffProcessor;

impl FilingProcessor for PutBackOffProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::PutBackOff
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::PutBackOff.as_str();
        let doc = ctx.optional_document(ft).unwrap_or(Value::Null);
        let effective = ctx.filing.effective_date;
        let filing_id = ctx.filing.id;

        let business = ctx.business_mut()?;
        let expiry = business.restoration_expiry_date.take();
        business.mark_historical(filing_id, effective);

        ctx.meta.set(
            "reason",
            payload::optional_str(&doc, "reason")
                .unwrap_or_else(|| "Limited Restoration Expired".to_string()),
        );
        if let Some(expiry) = expiry {
            ctx.meta.set("expiryDate", expiry.date_naive().to_string());
        }
        Ok(())
    }
}

/// Shared handling for leaving the jurisdiction
fn depart(ctx: &mut ProcessingContext, ft: &str, date_field: &str) -> FilerResult<()> {
    let doc = ctx.document(ft)?;
    ensure_active(ctx)?;

    let date = payload::required_date(&doc, date_field, ft)?;
    let foreign = doc
        .get("foreignJurisdiction")
        .ok_or_else(|| FilerError::payload(ft, "foreignJurisdiction", "section is missing"))?;
    let country = payload::required_str(foreign, "country", ft)?;
    let jurisdiction = match payload::optional_str(foreign, "region") {
        Some(region) => format!("{country}-{region}"),
        None => country,
    };

    dissolve(ctx, date)?;
    ctx.business_mut()?.jurisdiction = Some(jurisdiction.clone());
    shared::apply_optional_court_order(&mut ctx.filing, &mut ctx.meta, &doc);

    ctx.meta.set(date_field, date.date_naive().to_string());
    ctx.meta.set("foreignJurisdiction", jurisdiction);
    if let Some(name) = payload::optional_str(&doc, "legalName") {
        ctx.meta.set("foreignLegalName", name);
    }
    Ok(())
}

#[derive(Debug)]
pub struct ContinuationOutProcessor;

impl FilingProcessor for ContinuationOutProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ContinuationOut
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        depart(ctx, FilingType::ContinuationOut.as_str(), "continuationOutDate")
    }
}

#[derive(Debug)]
pub struct AmalgamationOutProcessor;

impl FilingProcessor for AmalgamationOutProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::AmalgamationOut
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        depart(ctx, FilingType::AmalgamationOut.as_str(), "amalgamationOutDate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BusinessState;
    use crate::processors::test_support;
    use serde_json::json;

    #[test]
    fn test_voluntary_dissolution_without_date_is_fatal() {
        let mut ctx = test_support::context(
            "voluntaryDissolution",
            json!({"filing": {"voluntaryDissolution": {}}}),
        );
        let before = ctx.business.clone();

        let err = VoluntaryDissolutionProcessor.process(&mut ctx).unwrap_err();
        assert_eq!(err, FilerError::DissolutionDateMissing { filing_id: 100 });
        assert!(!err.is_retryable());
        assert_eq!(ctx.business, before);
    }

    #[test]
    fn test_dissolution_defaults_to_voluntary() {
        let mut ctx = test_support::context("dissolution", json!({"dissolution": {}}));
        let err = DissolutionProcessor.process(&mut ctx).unwrap_err();
        assert!(matches!(err, FilerError::DissolutionDateMissing { .. }));
    }

    #[test]
    fn test_voluntary_dissolution_marks_historical() {
        let mut ctx = test_support::context(
            "dissolution",
            json!({"dissolution": {"dissolutionType": "voluntary", "dissolutionDate": "2024-05-31",
                                   "parties": [{"officer": {"firstName": "Cus", "lastName": "Todian"}}]}}),
        );
        DissolutionProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        assert_eq!(business.state, BusinessState::Historical);
        assert_eq!(business.state_filing_id, Some(100));
        assert_eq!(business.dissolution_date.unwrap().date_naive().to_string(), "2024-05-31");
        assert_eq!(business.active_roles(RoleType::Custodian).count(), 1);
    }

    #[test]
    fn test_dissolution_with_bad_court_order_date_completes_flagged() {
        let mut ctx = test_support::context(
            "dissolution",
            json!({"dissolution": {"dissolutionType": "administrative",
                                   "courtOrder": {"fileNumber": "S-77", "orderDate": "never"}}}),
        );
        DissolutionProcessor.process(&mut ctx).unwrap();

        assert_eq!(ctx.meta.get("orderDateInvalid"), Some(&json!(true)));
        assert_eq!(ctx.filing.court_order_file_number.as_deref(), Some("S-77"));
        assert!(ctx.filing.court_order_date.is_none());
    }

    #[test]
    fn test_administrative_dissolution_uses_effective_date() {
        let mut ctx = test_support::context(
            "dissolution",
            json!({"dissolution": {"dissolutionType": "administrative"}}),
        );
        DissolutionProcessor.process(&mut ctx).unwrap();
        assert_eq!(ctx.business.unwrap().dissolution_date, Some(test_support::now()));
    }

    #[test]
    fn test_dissolving_historical_business_is_rejected() {
        let mut ctx = test_support::context(
            "dissolution",
            json!({"dissolution": {"dissolutionType": "administrative"}}),
        );
        ctx.business.as_mut().unwrap().state = BusinessState::Historical;
        let err = DissolutionProcessor.process(&mut ctx).unwrap_err();
        assert!(matches!(err, FilerError::InvalidFilingState { .. }));
    }

    #[test]
    fn test_put_back_off_clears_restoration_expiry() {
        let mut ctx = test_support::context("putBackOff", json!({}));
        ctx.business.as_mut().unwrap().restoration_expiry_date = Some(test_support::now());

        PutBackOffProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        assert_eq!(business.state, BusinessState::Historical);
        assert!(business.restoration_expiry_date.is_none());
        assert_eq!(ctx.meta.get("reason"), Some(&json!("Limited Restoration Expired")));
    }

    #[test]
    fn test_continuation_out_requires_date() {
        let mut ctx = test_support::context(
            "continuationOut",
            json!({"continuationOut": {"foreignJurisdiction": {"country": "CA", "region": "ON"}}}),
        );
        assert!(matches!(
            ContinuationOutProcessor.process(&mut ctx).unwrap_err(),
            FilerError::PayloadValidation { .. }
        ));
    }

    #[test]
    fn test_amalgamation_out_records_jurisdiction() {
        let mut ctx = test_support::context(
            "amalgamationOut",
            json!({"amalgamationOut": {"amalgamationOutDate": "2024-05-15",
                                       "foreignJurisdiction": {"country": "US", "region": "WA"}}}),
        );
        AmalgamationOutProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        assert_eq!(business.state, BusinessState::Historical);
        assert_eq!(business.jurisdiction.as_deref(), Some("US-WA"));
    }
}

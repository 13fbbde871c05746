//! Filings that return a business to the active register.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::{FilerError, FilerResult};
use crate::models::{FilingType, RoleType};
use serde_json::Value;
use tracing::info;

fn ensure_historical(ctx: &ProcessingContext) -> FilerResult<()> {
    let business = ctx.business()?;
    if business.is_active() {
        return Err(FilerError::InvalidFilingState {
            filing_id: ctx.filing.id,
            status: ctx.filing.status.to_string(),
            reason: format!("business {} is already active", business.identifier),
        });
    }
    Ok(())
}

/// Registrar reversal of a dissolution
#[derive(Debug)]
pub struct PutBackOnProcessor;

impl FilingProcessor for PutBackOnProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::PutBackOn
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::PutBackOn.as_str();
        let doc = ctx.optional_document(ft).unwrap_or(Value::Null);
        ensure_historical(ctx)?;

        let filing_id = ctx.filing.id;
        let business = ctx.business_mut()?;
        business.mark_active(filing_id);
        business.restoration_expiry_date = None;
        info!(identifier = %business.identifier, filing_id, "Business put back on");

        shared::apply_optional_court_order(&mut ctx.filing, &mut ctx.meta, &doc);
        if let Some(details) = payload::optional_str(&doc, "details") {
            ctx.meta.set("details", details);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestorationType {
    Full,
    Limited,
    LimitedExtension,
    LimitedToFull,
}

impl RestorationType {
    fn parse(raw: &str, ft: &str) -> FilerResult<Self> {
        match raw {
            "fullRestoration" => Ok(Self::Full),
            "limitedRestoration" => Ok(Self::Limited),
            "limitedRestorationExtension" => Ok(Self::LimitedExtension),
            "limitedRestorationToFull" => Ok(Self::LimitedToFull),
            other => Err(FilerError::payload(
                ft,
                "type",
                format!("unsupported restoration type {other}"),
            )),
        }
    }

    fn is_limited(self) -> bool {
        matches!(self, Self::Limited | Self::LimitedExtension)
    }

    /// Full and limited restorations revive a historical business; the other
    /// two adjust a business already under limited restoration.
    fn revives(self) -> bool {
        matches!(self, Self::Full | Self::Limited)
    }
}

#[derive(Debug)]
pub struct RestorationProcessor;

impl FilingProcessor for RestorationProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::Restoration
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::Restoration.as_str();
        let doc = ctx.document(ft)?;
        let raw_type = payload::required_str(&doc, "type", ft)?;
        let restoration_type = RestorationType::parse(&raw_type, ft)?;

        if restoration_type.revives() {
            ensure_historical(ctx)?;
        } else if !ctx.business()?.is_active() {
            return Err(FilerError::InvalidFilingState {
                filing_id: ctx.filing.id,
                status: ctx.filing.status.to_string(),
                reason: "business is not under limited restoration".to_string(),
            });
        }

        let expiry = if restoration_type.is_limited() {
            Some(payload::required_date(&doc, "expiry", ft)?)
        } else {
            None
        };
        let new_name = payload::legal_name(&doc);
        let filing_id = ctx.filing.id;
        let effective = ctx.filing.effective_date;

        let business = ctx.business_mut()?;
        if restoration_type.revives() {
            business.mark_active(filing_id);
        }
        business.restoration_expiry_date = expiry;

        let renamed = new_name.map(|name| {
            let old = std::mem::replace(&mut business.legal_name, name.clone());
            (old, name)
        });

        if let Some(offices) = doc.get("offices") {
            shared::upsert_offices(business, offices, ft)?;
        }
        shared::add_parties(
            business,
            payload::array(&doc, "parties"),
            filing_id,
            effective,
            Some(RoleType::Applicant),
            ft,
        )?;

        if let Some((old, new)) = renamed {
            ctx.meta.record_name_change(&old, &new);
        }
        if payload::optional_str(&doc, "approvalType").as_deref() == Some("courtOrder") {
            shared::apply_optional_court_order(&mut ctx.filing, &mut ctx.meta, &doc);
        }

        ctx.meta.set("type", raw_type);
        if let Some(expiry) = expiry {
            ctx.meta.set("expiry", expiry.date_naive().to_string());
        }
        Ok(())
    }
}

//! Registrar and court actions recorded against a business.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::FilerResult;
use crate::models::FilingType;
use tracing::warn;

/// Record the court order fields of `ft`'s section on the filing
///
/// A bad order date is logged and noted in the meta; the filing still completes.
fn record_order(ctx: &mut ProcessingContext, ft: &str) -> FilerResult<()> {
    let doc = ctx.document(ft)?;
    if let Err(err) = shared::apply_court_order(&mut ctx.filing, &doc) {
        warn!(filing_id = ctx.filing.id, filing_type = ft, error = %err, "Order date ignored");
        ctx.meta.set("orderDateInvalid", true);
    }

    if let Some(file_number) = &ctx.filing.court_order_file_number {
        ctx.meta.set("fileNumber", file_number.clone());
    }
    if let Some(effect) = &ctx.filing.court_order_effect_of_order {
        ctx.meta.set("effectOfOrder", effect.clone());
    }
    if let Some(details) = &ctx.filing.order_details {
        ctx.meta.set("orderDetails", details.clone());
    }
    Ok(())
}

#[derive(Debug)]
pub struct RegistrarsNotationProcessor;

impl FilingProcessor for RegistrarsNotationProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::RegistrarsNotation
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        record_order(ctx, FilingType::RegistrarsNotation.as_str())
    }
}

#[derive(Debug)]
pub struct RegistrarsOrderProcessor;

impl FilingProcessor for RegistrarsOrderProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::RegistrarsOrder
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        record_order(ctx, FilingType::RegistrarsOrder.as_str())
    }
}

#[derive(Debug)]
pub struct CourtOrderProcessor;

impl FilingProcessor for CourtOrderProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::CourtOrder
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        record_order(ctx, FilingType::CourtOrder.as_str())
    }
}

#[derive(Debug)]
pub struct AdminFreezeProcessor;

impl FilingProcessor for AdminFreezeProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::AdminFreeze
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::AdminFreeze.as_str();
        let doc = ctx.document(ft)?;
        let freeze = payload::optional_bool(&doc, "freeze").unwrap_or(true);

        ctx.business_mut()?.admin_freeze = freeze;
        ctx.meta.set("freeze", freeze);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support;
    use serde_json::json;

    #[test]
    fn test_registrars_order_with_unparsable_date_completes() {
        let mut ctx = test_support::context(
            "registrarsOrder",
            json!({"filing": {"registrarsOrder": {
                "fileNumber": "#1234-5678/90",
                "effectOfOrder": "planOfArrangement",
                "orderDetails": "Note for business",
                "orderDate": "31-31-2024"
            }}}),
        );

        RegistrarsOrderProcessor.process(&mut ctx).unwrap();

        assert_eq!(ctx.filing.court_order_file_number.as_deref(), Some("#1234-5678/90"));
        assert_eq!(ctx.filing.court_order_effect_of_order.as_deref(), Some("planOfArrangement"));
        assert_eq!(ctx.filing.order_details.as_deref(), Some("Note for business"));
        assert!(ctx.filing.court_order_date.is_none());
        assert_eq!(ctx.meta.get("orderDateInvalid"), Some(&json!(true)));
    }

    #[test]
    fn test_court_order_overwrites_unconditionally() {
        let mut ctx = test_support::context(
            "courtOrder",
            json!({"courtOrder": {"orderDetails": "Only details", "orderDate": "2024-02-01"}}),
        );
        ctx.filing.court_order_file_number = Some("OLD".to_string());

        CourtOrderProcessor.process(&mut ctx).unwrap();

        assert!(ctx.filing.court_order_file_number.is_none());
        assert_eq!(ctx.filing.order_details.as_deref(), Some("Only details"));
        assert!(ctx.filing.court_order_date.is_some());
    }

    #[test]
    fn test_registrars_notation_leaves_business_untouched() {
        let mut ctx = test_support::context(
            "registrarsNotation",
            json!({"registrarsNotation": {"orderDetails": "Notation"}}),
        );
        let before = ctx.business.clone();
        RegistrarsNotationProcessor.process(&mut ctx).unwrap();
        assert_eq!(ctx.business, before);
    }

    #[test]
    fn test_admin_freeze_toggles() {
        let mut ctx = test_support::context("adminFreeze", json!({"adminFreeze": {"freeze": true}}));
        AdminFreezeProcessor.process(&mut ctx).unwrap();
        assert!(ctx.business.as_ref().unwrap().admin_freeze);

        let mut unfreeze = test_support::context("adminFreeze", json!({"adminFreeze": {"freeze": false}}));
        unfreeze.business = ctx.business.clone();
        AdminFreezeProcessor.process(&mut unfreeze).unwrap();
        assert!(!unfreeze.business.unwrap().admin_freeze);
    }
}

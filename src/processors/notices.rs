//! Consents and AGM notices. These record meta and a comment on the filing;
//! the business itself is never modified.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::FilerResult;
use crate::models::FilingType;
use chrono::Months;
use serde_json::Value;

/// Months a consent to leave the jurisdiction remains valid
const CONSENT_VALIDITY_MONTHS: u32 = 6;

fn consent(ctx: &mut ProcessingContext, ft: &str, label: &str) -> FilerResult<()> {
    let doc = ctx.document(ft)?;
    ctx.business()?;

    let expiry = ctx
        .filing
        .effective_date
        .checked_add_months(Months::new(CONSENT_VALIDITY_MONTHS))
        .unwrap_or(ctx.filing.effective_date);

    if let Some(foreign) = doc.get("foreignJurisdiction") {
        if let Some(country) = payload::optional_str(foreign, "country") {
            let jurisdiction = match payload::optional_str(foreign, "region") {
                Some(region) => format!("{country}-{region}"),
                None => country,
            };
            ctx.meta.set("country", jurisdiction);
        }
    }
    ctx.meta.set("expiry", expiry.date_naive().to_string());
    shared::apply_optional_court_order(&mut ctx.filing, &mut ctx.meta, &doc);

    let comment = format!(
        "Approved {label}. Consent expires {}.",
        expiry.date_naive()
    );
    let now = ctx.now;
    ctx.filing.add_comment(comment, now);
    Ok(())
}

#[derive(Debug)]
pub struct ConsentContinuationOutProcessor;

impl FilingProcessor for ConsentContinuationOutProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ConsentContinuationOut
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        consent(
            ctx,
            FilingType::ConsentContinuationOut.as_str(),
            "consent to continue out",
        )
    }
}

#[derive(Debug)]
pub struct ConsentAmalgamationOutProcessor;

impl FilingProcessor for ConsentAmalgamationOutProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::ConsentAmalgamationOut
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        consent(
            ctx,
            FilingType::ConsentAmalgamationOut.as_str(),
            "consent to amalgamate out",
        )
    }
}

/// Copy the named payload fields into the meta, skipping absent ones
fn copy_fields(ctx: &mut ProcessingContext, doc: &Value, fields: &[&str]) {
    for field in fields {
        if let Some(value) = doc.get(*field).filter(|v| !v.is_null()) {
            ctx.meta.set(field, value.clone());
        }
    }
}

#[derive(Debug)]
pub struct AgmExtensionProcessor;

impl FilingProcessor for AgmExtensionProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::AgmExtension
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::AgmExtension.as_str();
        let doc = ctx.document(ft)?;
        ctx.business()?;

        let year = payload::required_str(&doc, "year", ft)?;
        let duration = payload::optional_i64(&doc, "extensionDuration");
        copy_fields(
            ctx,
            &doc,
            &[
                "year",
                "isFirstAgm",
                "prevAgmRefDate",
                "expireDateCurrExt",
                "totalApprovedExt",
                "extensionDuration",
                "expireDateApprovedExt",
            ],
        );

        let comment = match duration {
            Some(months) => format!("Approved AGM extension of {months} months for {year}."),
            None => format!("Approved AGM extension for {year}."),
        };
        let now = ctx.now;
        ctx.filing.add_comment(comment, now);
        Ok(())
    }
}

#[derive(Debug)]
pub struct AgmLocationChangeProcessor;

impl FilingProcessor for AgmLocationChangeProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::AgmLocationChange
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::AgmLocationChange.as_str();
        let doc = ctx.document(ft)?;
        ctx.business()?;

        let year = payload::required_str(&doc, "year", ft)?;
        let location = payload::required_str(&doc, "agmLocation", ft)?;
        copy_fields(ctx, &doc, &["year", "agmLocation", "reason"]);

        let now = ctx.now;
        ctx.filing
            .add_comment(format!("AGM for {year} relocated to {location}."), now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support;
    use serde_json::json;

    #[test]
    fn test_consent_records_expiry_and_comment_only() {
        let mut ctx = test_support::context(
            "consentContinuationOut",
            json!({"consentContinuationOut": {
                "foreignJurisdiction": {"country": "CA", "region": "ON"},
                "courtOrder": {"fileNumber": "S-1"}
            }}),
        );
        let before = ctx.business.clone();

        ConsentContinuationOutProcessor.process(&mut ctx).unwrap();

        assert_eq!(ctx.business, before);
        assert_eq!(ctx.meta.get("expiry"), Some(&json!("2024-12-01")));
        assert_eq!(ctx.meta.get("country"), Some(&json!("CA-ON")));
        assert_eq!(ctx.filing.court_order_file_number.as_deref(), Some("S-1"));
        assert_eq!(ctx.filing.comments.len(), 1);
        assert_eq!(ctx.filing.comments[0].timestamp, test_support::now());
    }

    #[test]
    fn test_consent_amalgamation_out_requires_business() {
        let mut ctx = test_support::context(
            "consentAmalgamationOut",
            json!({"consentAmalgamationOut": {}}),
        );
        ctx.business = None;
        assert!(ConsentAmalgamationOutProcessor.process(&mut ctx).is_err());
    }

    #[test]
    fn test_agm_extension_copies_meta() {
        let mut ctx = test_support::context(
            "agmExtension",
            json!({"agmExtension": {"year": "2023", "isFirstAgm": false, "extensionDuration": 6}}),
        );
        AgmExtensionProcessor.process(&mut ctx).unwrap();

        assert_eq!(ctx.meta.get("extensionDuration"), Some(&json!(6)));
        assert_eq!(ctx.meta.get("isFirstAgm"), Some(&json!(false)));
        assert!(ctx.filing.comments[0].comment.contains("6 months"));
    }

    #[test]
    fn test_agm_location_change_requires_location() {
        let mut ctx = test_support::context(
            "agmLocationChange",
            json!({"agmLocationChange": {"year": "2023"}}),
        );
        assert!(AgmLocationChangeProcessor.process(&mut ctx).is_err());

        let mut ctx = test_support::context(
            "agmLocationChange",
            json!({"agmLocationChange": {"year": "2023", "agmLocation": "Calgary, AB", "reason": "Travel"}}),
        );
        AgmLocationChangeProcessor.process(&mut ctx).unwrap();
        assert_eq!(ctx.meta.get("agmLocation"), Some(&json!("Calgary, AB")));
    }
}

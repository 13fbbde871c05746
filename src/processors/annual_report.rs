use super::payload;
use super::{FilingProcessor, ProcessingContext};
use crate::error::FilerResult;
use crate::models::FilingType;
use chrono::Datelike;
use tracing::debug;

/// Records the annual report and AGM dates; directors and offices are untouched
#[derive(Debug)]
pub struct AnnualReportProcessor;

impl FilingProcessor for AnnualReportProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::AnnualReport
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::AnnualReport.as_str();
        let doc = ctx.document(ft)?;

        let report_date = payload::optional_naive_date(&doc, "annualReportDate", ft)?
            .unwrap_or_else(|| ctx.filing.effective_date.date_naive());
        let agm_date = payload::optional_naive_date(&doc, "annualGeneralMeetingDate", ft)?;

        let business = ctx.business_mut()?;
        business.last_ar_date = Some(report_date);
        business.last_ar_year = Some(report_date.year());
        if let Some(agm_date) = agm_date {
            business.last_agm_date = Some(agm_date);
        }
        debug!(identifier = %business.identifier, year = report_date.year(), "Annual report applied");

        ctx.meta.set("annualReportDate", report_date.to_string());
        if let Some(agm_date) = agm_date {
            ctx.meta.set("annualGeneralMeetingDate", agm_date.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_annual_report_sets_dates() {
        let mut ctx = test_support::context(
            "annualReport",
            json!({"filing": {"annualReport": {
                "annualReportDate": "2023-11-30",
                "annualGeneralMeetingDate": "2023-11-01"
            }}}),
        );
        let offices_before = ctx.business.as_ref().unwrap().offices.clone();

        AnnualReportProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        assert_eq!(business.last_ar_date, NaiveDate::from_ymd_opt(2023, 11, 30));
        assert_eq!(business.last_ar_year, Some(2023));
        assert_eq!(business.last_agm_date, NaiveDate::from_ymd_opt(2023, 11, 1));
        assert_eq!(business.offices, offices_before);
    }

    #[test]
    fn test_annual_report_without_agm_keeps_previous_agm() {
        let mut ctx = test_support::context("annualReport", json!({"annualReport": {}}));
        let previous = NaiveDate::from_ymd_opt(2020, 5, 5);
        ctx.business.as_mut().unwrap().last_agm_date = previous;

        AnnualReportProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        assert_eq!(business.last_agm_date, previous);
        assert_eq!(business.last_ar_year, Some(2024));
    }
}

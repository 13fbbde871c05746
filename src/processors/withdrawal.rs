use super::payload;
use super::{FilingProcessor, ProcessingContext};
use crate::error::{FilerError, FilerResult};
use crate::models::{Filing, FilingStatus, FilingType};
use tracing::info;

/// Id of the filing a notice of withdrawal withdraws
pub fn withdrawn_filing_id(filing: &Filing) -> Option<i64> {
    filing.withdrawn_filing_id.or_else(|| {
        filing
            .sub_document(FilingType::NoticeOfWithdrawal.as_str())
            .and_then(|doc| payload::optional_i64(doc, "filingId"))
    })
}

/// Withdraws a future-effective filing before it is applied
#[derive(Debug)]
pub struct NoticeOfWithdrawalProcessor;

impl FilingProcessor for NoticeOfWithdrawalProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::NoticeOfWithdrawal
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::NoticeOfWithdrawal.as_str();
        let doc = ctx.optional_document(ft);
        let target_id = withdrawn_filing_id(&ctx.filing)
            .ok_or_else(|| FilerError::payload(ft, "filingId", "required value is missing"))?;

        let filing_id = ctx.filing.id;
        let now = ctx.now;
        let target = ctx
            .related_filing_mut(target_id)
            .ok_or(FilerError::FilingNotFound { filing_id: target_id })?;

        if target.status == FilingStatus::Completed {
            return Err(FilerError::InvalidFilingState {
                filing_id: target.id,
                status: target.status.to_string(),
                reason: "a completed filing cannot be withdrawn".to_string(),
            });
        }
        let target_type = target.filing_type.clone();
        target
            .transition_status(FilingStatus::Withdrawn)
            .map_err(|reason| FilerError::InvalidFilingState {
                filing_id: target_id,
                status: target.status.to_string(),
                reason,
            })?;
        target.add_comment(format!("Withdrawn by filing {filing_id}."), now);
        info!(filing_id, withdrawn_filing_id = target_id, "📦 Filing withdrawn");

        ctx.filing.withdrawn_filing_id = Some(target_id);
        ctx.meta.set("withdrawnFilingId", target_id);
        ctx.meta.set("withdrawnFilingType", target_type);
        if let Some(comment) = doc.as_ref().and_then(|d| payload::optional_str(d, "comment")) {
            ctx.filing.add_comment(comment, now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support;
    use serde_json::json;

    fn withdrawal_context(target: Filing) -> ProcessingContext {
        let mut ctx = test_support::context(
            "noticeOfWithdrawal",
            json!({"filing": {"noticeOfWithdrawal": {"filingId": target.id}}}),
        );
        ctx.related.push(target);
        ctx
    }

    #[test]
    fn test_withdraws_paid_filing() {
        let target = Filing::new(77, Some(10), "changeOfName", test_support::now());
        let mut ctx = withdrawal_context(target);

        NoticeOfWithdrawalProcessor.process(&mut ctx).unwrap();

        assert_eq!(ctx.related[0].status, FilingStatus::Withdrawn);
        assert_eq!(ctx.filing.withdrawn_filing_id, Some(77));
        assert!(ctx.touched.contains(&77));
        assert_eq!(ctx.meta.get("withdrawnFilingType"), Some(&json!("changeOfName")));
    }

    #[test]
    fn test_completed_target_is_rejected() {
        let target = Filing::new(77, Some(10), "changeOfName", test_support::now())
            .with_status(FilingStatus::Completed);
        let mut ctx = withdrawal_context(target);

        let err = NoticeOfWithdrawalProcessor.process(&mut ctx).unwrap_err();
        assert!(matches!(err, FilerError::InvalidFilingState { filing_id: 77, .. }));
        assert!(!err.is_retryable());
        assert_eq!(ctx.related[0].status, FilingStatus::Completed);
    }

    #[test]
    fn test_missing_target_is_not_found() {
        let mut ctx = test_support::context(
            "noticeOfWithdrawal",
            json!({"noticeOfWithdrawal": {"filingId": 5}}),
        );
        assert_eq!(
            NoticeOfWithdrawalProcessor.process(&mut ctx).unwrap_err(),
            FilerError::FilingNotFound { filing_id: 5 }
        );
    }
}

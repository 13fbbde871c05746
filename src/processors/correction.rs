//! Corrections of previously completed filings.
//!
//! A correction may itself correct another correction. The chain of corrected
//! filings is preloaded by the loader; the processor walks it to find the
//! original filing being fixed.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::{FilerError, FilerResult};
use crate::models::{Filing, FilingType};
use std::collections::HashSet;
use tracing::debug;

/// Id of the filing a correction corrects
///
/// The stored column wins; otherwise `correction.correctedFilingId` from the payload.
pub fn corrected_filing_id(filing: &Filing) -> Option<i64> {
    filing.corrected_filing_id.or_else(|| {
        filing
            .sub_document(FilingType::Correction.as_str())
            .and_then(|doc| payload::optional_i64(doc, "correctedFilingId"))
    })
}

/// Walk from `filing` through corrected filings to the first one that is not a
/// correction
///
/// `lookup` resolves ancestors; the walk fails on a cycle, a missing ancestor,
/// or a chain longer than `max_depth`.
pub fn first_non_correction<'a>(
    filing: &Filing,
    max_depth: usize,
    mut lookup: impl FnMut(i64) -> Option<&'a Filing>,
) -> FilerResult<&'a Filing> {
    let invalid = |reason: String| FilerError::CorrectionChainInvalid {
        filing_id: filing.id,
        reason,
    };

    let mut visited = HashSet::from([filing.id]);
    let mut next = corrected_filing_id(filing)
        .ok_or_else(|| invalid("correction does not name a corrected filing".to_string()))?;

    for _ in 0..max_depth {
        if !visited.insert(next) {
            return Err(invalid(format!("cycle through filing {next}")));
        }
        let ancestor = lookup(next).ok_or_else(|| invalid(format!("filing {next} is not available")))?;
        if ancestor.kind() != Some(FilingType::Correction) {
            return Ok(ancestor);
        }
        next = corrected_filing_id(ancestor)
            .ok_or_else(|| invalid(format!("correction {} has no corrected filing", ancestor.id)))?;
    }

    Err(invalid(format!("chain deeper than {max_depth}")))
}

#[derive(Debug)]
pub struct CorrectionProcessor;

impl FilingProcessor for CorrectionProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::Correction
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::Correction.as_str();
        let doc = ctx.document(ft)?;

        let corrected_id = corrected_filing_id(&ctx.filing).ok_or_else(|| {
            FilerError::payload(ft, "correctedFilingId", "required value is missing")
        })?;
        // related holds the whole chain; its length bounds the walk
        let depth = ctx.related.len() + 1;
        let (original_id, original_type) = {
            let related = &ctx.related;
            let original = first_non_correction(&ctx.filing, depth, |id| {
                related.iter().find(|f| f.id == id)
            })?;
            (original.id, original.filing_type.clone())
        };
        let is_special_resolution = original_type == FilingType::SpecialResolution.as_str();
        debug!(
            filing_id = ctx.filing.id,
            corrected_id, original_id, original_type = %original_type, "Resolved correction chain"
        );

        let new_name = payload::legal_name(&doc);
        let resolution_text = payload::optional_str(&doc, "resolution");
        let filing_id = ctx.filing.id;

        let business = ctx.business_mut()?;
        let renamed = new_name.map(|name| {
            let old = std::mem::replace(&mut business.legal_name, name.clone());
            (old, name)
        });
        if let Some(offices) = doc.get("offices") {
            shared::upsert_offices(business, offices, ft)?;
        }
        if let Some(share_structure) = doc.get("shareStructure") {
            shared::replace_share_structure(business, share_structure, ft)?;
        }
        if is_special_resolution {
            if let Some(text) = resolution_text {
                if let Some(resolution) = business
                    .resolutions
                    .iter_mut()
                    .find(|r| r.filing_id == original_id)
                {
                    resolution.text = Some(text);
                }
            }
        }

        if let Some((old, new)) = renamed {
            ctx.meta.record_name_change(&old, &new);
        }
        ctx.filing.corrected_filing_id = Some(corrected_id);
        ctx.meta.set("correctedFilingId", corrected_id);
        ctx.meta.set("correctedFilingType", original_type);
        ctx.meta.set("isSpecialResolutionCorrection", is_special_resolution);

        let now = ctx.now;
        if let Some(comment) = payload::optional_str(&doc, "comment") {
            ctx.filing.add_comment(comment, now);
        }
        if let Some(corrected) = ctx.related_filing_mut(corrected_id) {
            corrected.add_comment(
                format!("This filing was corrected by filing {filing_id}."),
                now,
            );
        }
        Ok(())
    }
}

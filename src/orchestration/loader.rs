//! # Filing Aggregate Loader
//!
//! Reads a filing, its business and the filings it references through an
//! open unit of work, so everything the processor sees is read under the
//! per-filing lock.

use crate::database::UnitOfWork;
use crate::error::{FilerError, FilerResult};
use crate::models::{Business, Filing, FilingType};
use crate::processors::{correction, withdrawal};
use std::collections::HashSet;
use tracing::debug;

/// Filing plus everything a processor may need
#[derive(Debug, Clone)]
pub struct LoadedAggregate {
    pub filing: Filing,
    pub business: Option<Business>,
    /// Withdrawal target or correction chain, nearest first
    pub related: Vec<Filing>,
}

#[derive(Debug, Clone)]
pub struct FilingLoader {
    correction_chain_max_depth: usize,
}

impl FilingLoader {
    pub fn new(correction_chain_max_depth: usize) -> Self {
        Self {
            correction_chain_max_depth: correction_chain_max_depth.max(1),
        }
    }

    pub async fn load(
        &self,
        uow: &mut dyn UnitOfWork,
        filing_id: i64,
    ) -> FilerResult<LoadedAggregate> {
        let filing = uow
            .find_filing(filing_id)
            .await?
            .ok_or(FilerError::FilingNotFound { filing_id })?;

        let business = match filing.business_id {
            Some(business_id) => Some(uow.find_business(business_id).await?.ok_or(
                FilerError::BusinessNotFound {
                    filing_id,
                    business_id: Some(business_id),
                },
            )?),
            // unknown types load and fail at dispatch
            None => match filing.kind() {
                Some(kind) if !kind.creates_business() => {
                    return Err(FilerError::BusinessNotFound {
                        filing_id,
                        business_id: None,
                    })
                }
                _ => None,
            },
        };

        let related = match filing.kind() {
            Some(FilingType::NoticeOfWithdrawal) => self.load_withdrawal_target(uow, &filing).await?,
            Some(FilingType::Correction) => self.load_correction_chain(uow, &filing).await?,
            _ => Vec::new(),
        };

        debug!(
            filing_id,
            filing_type = %filing.filing_type,
            business_id = ?filing.business_id,
            related = related.len(),
            "Loaded filing aggregate"
        );

        Ok(LoadedAggregate {
            filing,
            business,
            related,
        })
    }

    /// A missing target is left for the processor to report
    async fn load_withdrawal_target(
        &self,
        uow: &mut dyn UnitOfWork,
        filing: &Filing,
    ) -> FilerResult<Vec<Filing>> {
        let Some(target_id) = withdrawal::withdrawn_filing_id(filing) else {
            return Ok(Vec::new());
        };
        Ok(uow.find_filing(target_id).await?.into_iter().collect())
    }

    /// Corrected filings from the nearest up to the first non-correction
    async fn load_correction_chain(
        &self,
        uow: &mut dyn UnitOfWork,
        filing: &Filing,
    ) -> FilerResult<Vec<Filing>> {
        let invalid = |reason: String| FilerError::CorrectionChainInvalid {
            filing_id: filing.id,
            reason,
        };

        let Some(mut next) = correction::corrected_filing_id(filing) else {
            return Ok(Vec::new());
        };
        let mut visited = HashSet::from([filing.id]);
        let mut chain = Vec::new();

        while chain.len() < self.correction_chain_max_depth {
            if !visited.insert(next) {
                return Err(invalid(format!("cycle through filing {next}")));
            }
            let ancestor = uow
                .find_filing(next)
                .await?
                .ok_or_else(|| invalid(format!("corrected filing {next} does not exist")))?;

            let is_correction = ancestor.kind() == Some(FilingType::Correction);
            let parent = correction::corrected_filing_id(&ancestor);
            chain.push(ancestor);

            if !is_correction {
                return Ok(chain);
            }
            next = parent.ok_or_else(|| invalid(format!("correction {next} has no corrected filing")))?;
        }

        Err(invalid(format!(
            "chain deeper than {}",
            self.correction_chain_max_depth
        )))
    }
}

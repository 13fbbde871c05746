//! Receiver appointments and cessations.

use super::payload;
use super::shared;
use super::{FilingProcessor, ProcessingContext};
use crate::error::FilerResult;
use crate::models::{FilingType, RoleType};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug)]
pub struct AppointReceiverProcessor;

impl FilingProcessor for AppointReceiverProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::AppointReceiver
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::AppointReceiver.as_str();
        let doc = ctx.document(ft)?;
        let filing_id = ctx.filing.id;
        let effective = ctx.filing.effective_date;

        // every receiver is appointed as of the filing's effective date
        let entries: Vec<Value> = payload::array(&doc, "parties")
            .iter()
            .map(|entry| {
                let mut entry = entry.clone();
                if let Some(obj) = entry.as_object_mut() {
                    obj.remove("roles");
                }
                entry
            })
            .collect();

        let added = shared::add_parties(
            ctx.business_mut()?,
            &entries,
            filing_id,
            effective,
            Some(RoleType::Receiver),
            ft,
        )?;
        ctx.meta.set("receiversAppointed", added.len());
        Ok(())
    }
}

/// Ends receiver roles for the parties listed in the filing
///
/// Only active RECEIVER roles of listed parties are ceased; other roles held
/// by the same party and receivers not listed are left alone.
#[derive(Debug)]
pub struct CeaseReceiverProcessor;

impl FilingProcessor for CeaseReceiverProcessor {
    fn filing_type(&self) -> FilingType {
        FilingType::CeaseReceiver
    }

    fn process(&self, ctx: &mut ProcessingContext) -> FilerResult<()> {
        let ft = FilingType::CeaseReceiver.as_str();
        let doc = ctx.document(ft)?;
        let party_ids: HashSet<i64> = payload::array(&doc, "parties")
            .iter()
            .filter_map(|entry| {
                entry
                    .get("officer")
                    .and_then(|officer| payload::optional_i64(officer, "id"))
                    .or_else(|| payload::optional_i64(entry, "id"))
            })
            .collect();

        let now = ctx.now;
        let business = ctx.business_mut()?;
        let mut ceased = 0usize;
        for role in business.party_roles.iter_mut().filter(|r| {
            party_ids.contains(&r.party_id) && r.role == RoleType::Receiver && r.is_active()
        }) {
            role.cessation_date = Some(now);
            ceased += 1;
        }
        debug!(identifier = %business.identifier, ceased, "Receiver roles ceased");

        ctx.meta.set("receiversCeased", ceased);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Party, PartyType};
    use crate::processors::test_support;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn person(first: &str) -> Party {
        Party {
            id: 0,
            party_type: PartyType::Person,
            first_name: Some(first.to_string()),
            middle_initial: None,
            last_name: Some("Receiver".to_string()),
            organization_name: None,
            email: None,
            delivery_address: None,
            mailing_address: None,
        }
    }

    #[test]
    fn test_appoint_receiver_uses_effective_date() {
        let mut ctx = test_support::context(
            "appointReceiver",
            json!({"appointReceiver": {"parties": [
                {"officer": {"organizationName": "RECEIVERS INC.", "partyType": "organization"},
                 "roles": [{"roleType": "Director"}]}
            ]}}),
        );
        ctx.filing.effective_date = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        AppointReceiverProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        let roles: Vec<_> = business.active_roles(RoleType::Receiver).collect();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].appointment_date, Some(ctx.filing.effective_date));
        assert_eq!(business.active_roles(RoleType::Director).count(), 0);
        assert!(business.in_receivership());
    }

    #[test]
    fn test_cease_receiver_only_touches_listed_active_receivers() {
        let mut ctx = test_support::context(
            "ceaseReceiver",
            json!({"ceaseReceiver": {"parties": [{"officer": {"id": 1}}]}}),
        );
        let earlier = test_support::now() - Duration::days(30);
        let business = ctx.business.as_mut().unwrap();
        let listed = business.add_party(person("Listed"));
        let other = business.add_party(person("Other"));
        let listed_receiver = business.add_role(listed, RoleType::Receiver, Some(earlier), 1);
        let listed_director = business.add_role(listed, RoleType::Director, Some(earlier), 1);
        let other_receiver = business.add_role(other, RoleType::Receiver, Some(earlier), 1);
        let already_ceased = business.add_role(listed, RoleType::Receiver, Some(earlier), 1);
        business
            .party_roles
            .iter_mut()
            .find(|r| r.id == already_ceased)
            .unwrap()
            .cessation_date = Some(earlier);

        CeaseReceiverProcessor.process(&mut ctx).unwrap();

        let business = ctx.business.as_ref().unwrap();
        let cessation = |id: i64| {
            business
                .party_roles
                .iter()
                .find(|r| r.id == id)
                .unwrap()
                .cessation_date
        };
        assert_eq!(cessation(listed_receiver), Some(test_support::now()));
        assert_eq!(cessation(listed_director), None);
        assert_eq!(cessation(other_receiver), None);
        assert_eq!(cessation(already_ceased), Some(earlier));
        assert_eq!(ctx.meta.get("receiversCeased"), Some(&json!(1)));
    }
}

//! # Outcome Publisher
//!
//! Emits follow-on events for a committed filing: the completion email, the
//! business-number sync and digital credential revocation. Publishing happens
//! after commit, so a failed send is logged and counted but never undoes the
//! filing.

use crate::config::BrokerConfig;
use crate::constants::{events, outbound};
use crate::messaging::{MessageBroker, MessagingResult};
use crate::metrics;
use crate::models::{Business, Filing, FilingType};
use crate::processors::FilingMeta;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Follow-on event body as written to its topic queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FollowOnEvent {
    #[serde(rename_all = "camelCase")]
    Email {
        filing_id: i64,
        email_type: String,
        option: String,
    },
    #[serde(rename_all = "camelCase")]
    BnSync { business_id: i64, identifier: String },
    #[serde(rename_all = "camelCase")]
    CredentialRevocation { business_id: i64, reason: String },
}

impl FollowOnEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Email { .. } => outbound::EMAIL,
            Self::BnSync { .. } => outbound::BN_SYNC,
            Self::CredentialRevocation { .. } => outbound::CREDENTIAL_REVOCATION,
        }
    }
}

/// Why a digital business credential is no longer valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Dissolved,
    NameChanged,
    LegalTypeChanged,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dissolved => "DISSOLVED",
            Self::NameChanged => "NAME_CHANGED",
            Self::LegalTypeChanged => "LEGAL_TYPE_CHANGED",
        }
    }
}

/// Result of publishing one filing's follow-on events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: Vec<FollowOnEvent>,
    /// Events that could not be sent, with the broker's reason
    pub failed: Vec<(FollowOnEvent, String)>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.published.iter().map(FollowOnEvent::topic).collect()
    }
}

#[derive(Debug, Clone)]
pub struct OutcomePublisher {
    broker: Arc<dyn MessageBroker>,
    email_queue: String,
    bn_queue: String,
    credential_queue: String,
}

impl OutcomePublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, config: &BrokerConfig) -> Self {
        Self {
            broker,
            email_queue: config.email_queue.clone(),
            bn_queue: config.bn_queue.clone(),
            credential_queue: config.credential_queue.clone(),
        }
    }

    /// Create the outbound queues if they do not exist
    pub async fn ensure_queues(&self) -> MessagingResult<()> {
        for queue in [&self.email_queue, &self.bn_queue, &self.credential_queue] {
            self.broker.ensure_queue(queue).await?;
        }
        Ok(())
    }

    /// Follow-on events for a completed filing, in publish order
    pub fn follow_on_events(
        filing: &Filing,
        business: Option<&Business>,
        meta: &FilingMeta,
    ) -> Vec<FollowOnEvent> {
        let mut follow_ons = vec![FollowOnEvent::Email {
            filing_id: filing.id,
            email_type: filing.filing_type.clone(),
            option: outbound::COMPLETED_OPTION.to_string(),
        }];

        let Some(business) = business else {
            return follow_ons;
        };

        if Self::requires_bn_sync(filing, business) {
            follow_ons.push(FollowOnEvent::BnSync {
                business_id: business.id,
                identifier: business.identifier.clone(),
            });
        }

        if let Some(reason) = Self::revocation_reason(filing, meta) {
            follow_ons.push(FollowOnEvent::CredentialRevocation {
                business_id: business.id,
                reason: reason.as_str().to_string(),
            });
        }

        follow_ons
    }

    /// Filings that create or restructure the business at the CRA
    fn requires_bn_sync(filing: &Filing, business: &Business) -> bool {
        match filing.kind() {
            Some(
                FilingType::IncorporationApplication
                | FilingType::Registration
                | FilingType::ContinuationIn
                | FilingType::ChangeOfRegistration
                | FilingType::Conversion
                | FilingType::PutBackOn
                | FilingType::Restoration,
            ) => true,
            Some(FilingType::Dissolution) => business.legal_type.is_firm(),
            _ => false,
        }
    }

    fn revocation_reason(filing: &Filing, meta: &FilingMeta) -> Option<RevocationReason> {
        if filing.kind().is_some_and(|kind| kind.is_dissolution()) {
            Some(RevocationReason::Dissolved)
        } else if meta.legal_name_change.is_some() {
            Some(RevocationReason::NameChanged)
        } else if meta.legal_type_change.is_some() {
            Some(RevocationReason::LegalTypeChanged)
        } else {
            None
        }
    }

    fn queue_for(&self, event: &FollowOnEvent) -> &str {
        match event {
            FollowOnEvent::Email { .. } => &self.email_queue,
            FollowOnEvent::BnSync { .. } => &self.bn_queue,
            FollowOnEvent::CredentialRevocation { .. } => &self.credential_queue,
        }
    }

    /// Publish every follow-on event; failures are reported, never returned
    pub async fn publish(
        &self,
        filing: &Filing,
        business: Option<&Business>,
        meta: &FilingMeta,
    ) -> PublishReport {
        let mut report = PublishReport::default();

        for event in Self::follow_on_events(filing, business, meta) {
            let queue = self.queue_for(&event);
            let sent = match serde_json::to_value(&event) {
                Ok(body) => self.broker.send(queue, &body).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match sent {
                Ok(msg_id) => {
                    debug!(
                        filing_id = filing.id,
                        topic = event.topic(),
                        queue,
                        msg_id,
                        event_name = events::FOLLOW_ON_PUBLISHED,
                        "Published follow-on event"
                    );
                    report.published.push(event);
                }
                Err(reason) => {
                    warn!(
                        filing_id = filing.id,
                        filing_type = %filing.filing_type,
                        topic = event.topic(),
                        queue,
                        error = %reason,
                        event_name = events::FOLLOW_ON_FAILED,
                        "⚠️ Follow-on event not published"
                    );
                    metrics::publish_failures()
                        .add(1, &[KeyValue::new("topic", event.topic())]);
                    report.failed.push((event, reason));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryBroker;
    use crate::models::LegalType;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn business(legal_type: LegalType) -> Business {
        let mut business = Business::new(
            "FM0000001",
            legal_type,
            "SOLE CO.",
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        );
        business.id = 5;
        business
    }

    fn filing(filing_type: &str) -> Filing {
        Filing::new(70, Some(5), filing_type, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn publisher(broker: Arc<InMemoryBroker>) -> OutcomePublisher {
        OutcomePublisher::new(broker, &BrokerConfig::default())
    }

    #[test]
    fn test_follow_on_wire_format() {
        let email = FollowOnEvent::Email {
            filing_id: 1,
            email_type: "changeOfName".to_string(),
            option: "COMPLETED".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&email).unwrap(),
            json!({"type": "email", "filingId": 1, "emailType": "changeOfName", "option": "COMPLETED"})
        );

        let bn = FollowOnEvent::BnSync {
            business_id: 2,
            identifier: "FM0000002".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&bn).unwrap(),
            json!({"type": "bn-sync", "businessId": 2, "identifier": "FM0000002"})
        );
    }

    #[test]
    fn test_name_change_revokes_credentials() {
        let mut meta = FilingMeta::new("changeOfName");
        meta.record_name_change("OLD LTD.", "NEW LTD.");
        let events =
            OutcomePublisher::follow_on_events(&filing("changeOfName"), Some(&business(LegalType::BC)), &meta);

        let topics: Vec<_> = events.iter().map(FollowOnEvent::topic).collect();
        assert_eq!(topics, vec!["email", "credential-revocation"]);
        assert!(matches!(
            &events[1],
            FollowOnEvent::CredentialRevocation { reason, .. } if reason == "NAME_CHANGED"
        ));
    }

    #[test]
    fn test_firm_dissolution_syncs_bn_and_revokes() {
        let meta = FilingMeta::new("dissolution");
        let firm = OutcomePublisher::follow_on_events(&filing("dissolution"), Some(&business(LegalType::SP)), &meta);
        assert_eq!(
            firm.iter().map(FollowOnEvent::topic).collect::<Vec<_>>(),
            vec!["email", "bn-sync", "credential-revocation"]
        );

        let corp = OutcomePublisher::follow_on_events(&filing("dissolution"), Some(&business(LegalType::BC)), &meta);
        assert_eq!(
            corp.iter().map(FollowOnEvent::topic).collect::<Vec<_>>(),
            vec!["email", "credential-revocation"]
        );
    }

    #[test]
    fn test_plain_filing_only_emails() {
        let events = OutcomePublisher::follow_on_events(
            &filing("annualReport"),
            Some(&business(LegalType::BC)),
            &FilingMeta::new("annualReport"),
        );
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_routes_to_configured_queues() {
        let broker = Arc::new(InMemoryBroker::new());
        let report = publisher(broker.clone())
            .publish(
                &filing("registration"),
                Some(&business(LegalType::SP)),
                &FilingMeta::new("registration"),
            )
            .await;

        assert!(report.is_complete());
        assert_eq!(report.topics(), vec!["email", "bn-sync"]);
        assert_eq!(broker.len("emailer"), 1);
        assert_eq!(broker.messages("business_bn")[0]["identifier"], "FM0000001");
    }

    #[tokio::test]
    async fn test_publish_failures_are_reported_not_raised() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_unavailable("emailer", true);
        let mut meta = FilingMeta::new("alteration");
        meta.record_legal_type_change("BC", "BEN");

        let report = publisher(broker.clone())
            .publish(&filing("alteration"), Some(&business(LegalType::BEN)), &meta)
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.topic(), "email");
        assert_eq!(report.topics(), vec!["credential-revocation"]);
        assert_eq!(
            broker.messages("digital_credentials")[0]["reason"],
            "LEGAL_TYPE_CHANGED"
        );
    }
}

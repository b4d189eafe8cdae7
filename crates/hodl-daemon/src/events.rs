// crates/hodl-daemon/src/events.rs
//
// Inbound event adapter: one JSON object per line in, one JSON reply per
// line out.
//
//   {"type":"transfer","sender_id":1,"receiver_ids":[2],"amount":"5"}
//   {"type":"points_log","content":"<@1> gave <@2> <:points:...>5"}
//   {"type":"enrollment","user_id":1,"intent":"opt_in"}
//   {"type":"status","user_id":1}
//
// An optional "id" is echoed back so callers can match replies.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hodl_core::error::HodlError;
use hodl_core::event::{EnrollmentIntent, TransferEvent};
use hodl_core::model::UserId;
use hodl_ledger::StakingStatus;

use crate::shared::LedgerServices;

/// A ledger event received from the chat front end.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Transfer(TransferEvent),
    PointsLog { content: String },
    Enrollment(EnrollmentIntent),
    Status { user_id: UserId },
}

impl InboundEvent {
    fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Transfer(_) => "transfer",
            InboundEvent::PointsLog { .. } => "points_log",
            InboundEvent::Enrollment(_) => "enrollment",
            InboundEvent::Status { .. } => "status",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(flatten)]
    event: InboundEvent,
}

/// Reply written for every inbound line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Staking status text, for status requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transient: Option<bool>,
}

impl Reply {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            text: None,
            error: None,
            transient: None,
        }
    }

    fn err(id: Option<Value>, error: &HodlError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            text: None,
            error: Some(error.to_string()),
            transient: Some(error.is_transient()),
        }
    }
}

/// Parse and handle one input line.
pub async fn handle_line(services: Arc<LedgerServices>, line: &str) -> Reply {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Rejected malformed event: {}", e);
            return Reply::err(None, &HodlError::InvalidEvent(e.to_string()));
        }
    };
    let kind = envelope.event.kind();
    let id = envelope.id;
    match dispatch(services.clone(), envelope.event, Utc::now()).await {
        Ok((result, text)) => {
            let mut reply = Reply::ok(id, result);
            reply.text = text;
            reply
        }
        Err(e) => {
            if e.is_invariant_violation() {
                services.reporter.report(kind, &e);
            } else {
                tracing::warn!(event = kind, "Event rejected: {}", e);
            }
            Reply::err(id, &e)
        }
    }
}

/// Route an event to its ledger component. Store work runs on the blocking
/// pool; opt-in awaits the balance oracle first.
pub async fn dispatch(
    services: Arc<LedgerServices>,
    event: InboundEvent,
    now: DateTime<Utc>,
) -> Result<(Value, Option<String>), HodlError> {
    match event {
        InboundEvent::Enrollment(intent) => {
            let outcome = services.enrollment.handle(&intent, now).await?;
            Ok((serde_json::to_value(outcome)?, None))
        }
        other => {
            tokio::task::spawn_blocking(move || dispatch_blocking(&services, other, now))
                .await
                .map_err(|e| HodlError::Storage(format!("event worker failed: {}", e)))?
        }
    }
}

fn dispatch_blocking(
    services: &LedgerServices,
    event: InboundEvent,
    now: DateTime<Utc>,
) -> Result<(Value, Option<String>), HodlError> {
    match event {
        InboundEvent::Transfer(transfer) => {
            let outcome = services.engine.apply_event(&transfer, now)?;
            Ok((serde_json::to_value(outcome)?, None))
        }
        InboundEvent::PointsLog { content } => {
            let transfer = services.points_log.parse(&content)?;
            let outcome = services.engine.apply_event(&transfer, now)?;
            Ok((serde_json::to_value(outcome)?, None))
        }
        InboundEvent::Status { user_id } => {
            let status = StakingStatus::load(&services.store, user_id, now)?;
            let text = status.render(&services.points_emoji);
            Ok((serde_json::to_value(status)?, Some(text)))
        }
        InboundEvent::Enrollment(_) => Err(HodlError::InvalidEvent(
            "enrollment must be handled asynchronously".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hodl_core::params::EpochParams;
    use hodl_core::points::Points;
    use hodl_core::traits::{BalanceOracle, ErrorReporter};
    use hodl_store::LedgerStore;
    use uuid::Uuid;

    const MARKER: &str = "<:points:819648258112225316>";

    fn temp_db_path(label: &str) -> String {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("hodl_events_{}_{}", label, Uuid::now_v7()));
        path.to_string_lossy().to_string()
    }

    struct FixedOracle(HashMap<UserId, Points>);

    #[async_trait]
    impl BalanceOracle for FixedOracle {
        async fn balance(&self, user: UserId) -> Result<Points, HodlError> {
            Ok(self.0.get(&user).copied().unwrap_or(Points::ZERO))
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl ErrorReporter for Recording {
        fn report(&self, context: &str, _error: &HodlError) {
            self.0.lock().unwrap().push(context.to_string());
        }
    }

    fn services(label: &str) -> (Arc<LedgerServices>, Arc<Recording>) {
        let store = Arc::new(LedgerStore::open(&temp_db_path(label)).unwrap());
        let oracle = FixedOracle(HashMap::from([(UserId(1), Points::from_whole(100))]));
        let reporter = Arc::new(Recording::default());
        let services = LedgerServices::new(
            store,
            EpochParams::default(),
            Arc::new(oracle),
            reporter.clone(),
            ":p:",
            MARKER,
        )
        .unwrap();
        (Arc::new(services), reporter)
    }

    #[test]
    fn test_parse_events() {
        let e: Envelope = serde_json::from_str(
            r#"{"id": 7, "type": "transfer", "sender_id": 1, "receiver_ids": [2, 3], "amount": "2.5"}"#,
        )
        .unwrap();
        assert_eq!(e.id, Some(Value::from(7)));
        assert_eq!(
            e.event,
            InboundEvent::Transfer(TransferEvent {
                sender_id: UserId(1),
                receiver_ids: vec![UserId(2), UserId(3)],
                amount: "2.5".parse().unwrap(),
            })
        );

        let e: Envelope =
            serde_json::from_str(r#"{"type": "status", "user_id": 4}"#).unwrap();
        assert!(e.id.is_none());
        assert_eq!(e.event, InboundEvent::Status { user_id: UserId(4) });
    }

    #[tokio::test]
    async fn test_malformed_line() {
        let (services, _) = services("malformed");
        let reply = handle_line(services, "{\"type\": \"teleport\"}").await;
        assert!(!reply.ok);
        assert_eq!(reply.transient, Some(false));
    }

    #[tokio::test]
    async fn test_end_to_end_lines() {
        let (services, reporter) = services("e2e");
        services.keeper.check_increment_epoch(Utc::now()).unwrap();

        let reply = handle_line(
            services.clone(),
            r#"{"id": "a", "type": "enrollment", "user_id": 1, "intent": "opt_in"}"#,
        )
        .await;
        assert!(reply.ok, "{:?}", reply);
        assert_eq!(reply.id, Some(Value::from("a")));

        let line = serde_json::json!({
            "type": "points_log",
            "content": format!("<@1> gave <@2> {}40", MARKER),
        })
        .to_string();
        let reply = handle_line(services.clone(), &line).await;
        assert!(reply.ok, "{:?}", reply);

        let reply = handle_line(services.clone(), r#"{"type": "status", "user_id": 1}"#).await;
        let text = reply.text.unwrap();
        assert!(text.starts_with("Your Points Balance: `60`:p:"));
        assert!(text.contains("How many Points you are staking: `12`:p:"));

        // Overdraft is an invariant violation and gets reported.
        let reply = handle_line(
            services.clone(),
            r#"{"type": "transfer", "sender_id": 1, "receiver_ids": [2], "amount": 1000}"#,
        )
        .await;
        assert!(!reply.ok);
        assert_eq!(*reporter.0.lock().unwrap(), vec!["transfer".to_string()]);
    }

    #[tokio::test]
    async fn test_status_of_unknown_user() {
        let (services, reporter) = services("unknown");
        services.keeper.check_increment_epoch(Utc::now()).unwrap();
        let reply = handle_line(services, r#"{"type": "status", "user_id": 99}"#).await;
        assert!(!reply.ok);
        assert!(reply.error.unwrap().contains("Not found"));
        assert!(reporter.0.lock().unwrap().is_empty());
    }
}

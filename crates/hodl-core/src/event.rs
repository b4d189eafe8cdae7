// crates/hodl-core/src/event.rs
//
// Inbound events produced by the chat-platform collaborator.
//
// Transfers arrive as points-log messages of the form
//   "<@sender> gave <@receiver1> <@receiver2> <:points:819648258112225316>1,250.5"
// where the first mention is the sender, the remaining mentions are the
// receivers, and the amount follows the points marker. Enrollment intents
// arrive from interactive controls and are already structured.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HodlError;
use crate::model::UserId;
use crate::points::Points;

/// A user mention: `<@123>` or `<@!123>`.
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("mention pattern is valid"));

/// A points transfer from one sender to one or more receivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub sender_id: UserId,
    pub receiver_ids: Vec<UserId>,
    /// Amount credited to each receiver and debited from the sender once.
    pub amount: Points,
}

/// Parser for points-log messages, compiled once per points marker.
#[derive(Debug, Clone)]
pub struct PointsLogParser {
    marker: String,
    amount: Regex,
}

impl PointsLogParser {
    /// Build a parser for messages whose amount follows `marker`.
    pub fn new(marker: &str) -> Result<Self, HodlError> {
        let pattern = format!(r"{}(\d*\.?\d+)", regex::escape(marker));
        let amount = Regex::new(&pattern)
            .map_err(|e| HodlError::Config(format!("invalid points marker {:?}: {}", marker, e)))?;
        Ok(Self {
            marker: marker.to_string(),
            amount,
        })
    }

    /// Parse one message into a transfer.
    ///
    /// Thousands separators are stripped before the amount is read. The
    /// amount is the first `\d*\.?\d+` run directly after the marker.
    pub fn parse(&self, content: &str) -> Result<TransferEvent, HodlError> {
        let mentions = parse_mentions(content);
        let (sender_id, receiver_ids) = match mentions.split_first() {
            Some((sender, rest)) => (*sender, rest.to_vec()),
            None => {
                return Err(HodlError::InvalidEvent(
                    "points log message has no mentions".to_string(),
                ))
            }
        };

        let cleaned = content.replace(',', "");
        let amount = self
            .amount
            .captures(&cleaned)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| {
                HodlError::InvalidEvent(format!("no amount after points marker {:?}", self.marker))
            })?;

        Ok(TransferEvent {
            sender_id,
            receiver_ids,
            amount: amount.as_str().parse()?,
        })
    }
}

/// User mentions in order of appearance.
fn parse_mentions(content: &str) -> Vec<UserId> {
    MENTION_PATTERN
        .captures_iter(content)
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .map(UserId)
        .collect()
}

/// What a user asked for through the enrollment controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    OptIn,
    OptOut,
    Confirm,
}

/// An enrollment request for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentIntent {
    pub user_id: UserId,
    pub intent: Intent,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "<:points:819648258112225316>";

    fn parse(msg: &str) -> Result<TransferEvent, HodlError> {
        PointsLogParser::new(MARKER).unwrap().parse(msg)
    }

    #[test]
    fn test_parse_single_receiver() {
        let msg = format!("<@111> gave <@!222> {}40", MARKER);
        let ev = parse(&msg).unwrap();
        assert_eq!(ev.sender_id, UserId(111));
        assert_eq!(ev.receiver_ids, vec![UserId(222)]);
        assert_eq!(ev.amount, Points::from_whole(40));
    }

    #[test]
    fn test_parse_strips_thousands_separator() {
        let msg = format!("<@1> gave <@2> <@3> {}1,250.5 each", MARKER);
        let ev = parse(&msg).unwrap();
        assert_eq!(ev.receiver_ids, vec![UserId(2), UserId(3)]);
        assert_eq!(ev.amount, "1250.5".parse().unwrap());
    }

    #[test]
    fn test_parse_leading_dot_amount() {
        let msg = format!("<@1> gave <@2> {}.5", MARKER);
        let ev = parse(&msg).unwrap();
        assert_eq!(ev.amount, "0.5".parse().unwrap());
    }

    #[test]
    fn test_parse_trailing_dot_is_ignored() {
        let msg = format!("<@1> gave <@2> {}10.", MARKER);
        let ev = parse(&msg).unwrap();
        assert_eq!(ev.amount, Points::from_whole(10));
    }

    #[test]
    fn test_parse_rejects_missing_parts() {
        assert!(parse("no mentions here").is_err());
        assert!(parse("<@1> gave <@2> 40").is_err());
        let msg = format!("<@1> gave <@2> {}lots", MARKER);
        assert!(parse(&msg).is_err());
    }

    #[test]
    fn test_mentions_skip_malformed() {
        let ids = parse_mentions("<@> <@12x> <@!34> <@56>");
        assert_eq!(ids, vec![UserId(34), UserId(56)]);
    }

    #[test]
    fn test_marker_is_matched_literally() {
        // Regex metacharacters in the marker must not be interpreted.
        let parser = PointsLogParser::new("(pts)+").unwrap();
        let ev = parser.parse("<@1> gave <@2> (pts)+7.25").unwrap();
        assert_eq!(ev.amount, "7.25".parse().unwrap());
        assert!(parser.parse("<@1> gave <@2> ptsptspts7").is_err());
    }

    #[test]
    fn test_intent_serde() {
        let intent: EnrollmentIntent =
            serde_json::from_str(r#"{"user_id": 5, "intent": "opt_out"}"#).unwrap();
        assert_eq!(intent.user_id, UserId(5));
        assert_eq!(intent.intent, Intent::OptOut);
    }
}

// crates/hodl-daemon/src/oracle.rs
//
// HTTP client for the external points API, used as the balance oracle at
// opt-in.
//
//   POST {base_url}/balances   {"ids": ["<user id>"]}
//   -> [{"points": "<amount>"}]    (empty array: the user has no points)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hodl_core::error::HodlError;
use hodl_core::model::UserId;
use hodl_core::points::Points;
use hodl_core::traits::BalanceOracle;

#[derive(Debug, Serialize)]
struct BalancesRequest {
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    points: Points,
}

/// `BalanceOracle` backed by the points API.
#[derive(Debug, Clone)]
pub struct HttpBalanceOracle {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpBalanceOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: format!("{}/balances", base_url.trim_end_matches('/')),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// The first entry's balance; no entry means no points.
fn first_balance(entries: Vec<BalanceEntry>) -> Points {
    entries
        .into_iter()
        .next()
        .map(|e| e.points)
        .unwrap_or(Points::ZERO)
}

#[async_trait]
impl BalanceOracle for HttpBalanceOracle {
    async fn balance(&self, user: UserId) -> Result<Points, HodlError> {
        let body = BalancesRequest {
            ids: vec![user.to_string()],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| HodlError::Oracle(format!("request to {} failed: {}", self.endpoint, e)))?;

        if !resp.status().is_success() {
            return Err(HodlError::Oracle(format!(
                "{} returned status {}",
                self.endpoint,
                resp.status()
            )));
        }

        let entries: Vec<BalanceEntry> = resp
            .json()
            .await
            .map_err(|e| HodlError::Oracle(format!("malformed balance response: {}", e)))?;
        let balance = first_balance(entries);
        tracing::debug!(user = %user, balance = %balance, "Fetched balance from points API");
        Ok(balance)
    }
}

//! Paginated GraphQL (subgraph) source
//!
//! Posts the all-activity query against a subgraph endpoint, one page per
//! call, at most [`PAGE_SIZE`](crate::source::PAGE_SIZE) records per
//! collection. The caller drives pagination by advancing `skip` past the
//! records received until an empty page comes back; results are ordered by
//! ascending timestamp within the window.

use crate::error::SourceError;
use crate::source::{PageSource, RawActivityPage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Swaps, mints, burns and flash loans within a half-open time window.
/// `timestamp_lt` keeps window boundaries non-overlapping across cycles.
const ALL_ACTIVITY_QUERY: &str = r#"
query GetAllActivity($startTimestamp: Int!, $endTimestamp: Int!, $skip: Int!) {
    swaps(
        first: 1000, skip: $skip,
        orderBy: timestamp, orderDirection: asc,
        where: { timestamp_gte: $startTimestamp, timestamp_lt: $endTimestamp }
    ) {
        id
        timestamp
        blockNumber
        sender
        recipient
        token0 { id symbol decimals }
        token1 { id symbol decimals }
        amount0
        amount1
        amountUSD
        pool { token0Price token1Price liquidity }
    }
    mints(
        first: 1000, skip: $skip,
        orderBy: timestamp, orderDirection: asc,
        where: { timestamp_gte: $startTimestamp, timestamp_lt: $endTimestamp }
    ) {
        id
        timestamp
        blockNumber
        pool { id token0 { id symbol decimals } token1 { id symbol decimals } }
        amount0
        amount1
        amountUSD
        sender
    }
    burns(
        first: 1000, skip: $skip,
        orderBy: timestamp, orderDirection: asc,
        where: { timestamp_gte: $startTimestamp, timestamp_lt: $endTimestamp }
    ) {
        id
        timestamp
        blockNumber
        pool { id token0 { id symbol decimals } token1 { id symbol decimals } }
        amount0
        amount1
        amountUSD
        sender
    }
    flashLoans(
        first: 1000, skip: $skip,
        orderBy: timestamp, orderDirection: asc,
        where: { timestamp_gte: $startTimestamp, timestamp_lt: $endTimestamp }
    ) {
        id
        timestamp
        blockNumber
        token { id symbol decimals }
        amount
        amountUSD
        initiator
        fee
    }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<RawActivityPage>,
    errors: Option<Vec<serde_json::Value>>,
}

pub struct GraphSource {
    client: reqwest::Client,
    url: String,
}

impl GraphSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PageSource for GraphSource {
    async fn fetch_page(
        &self,
        start_ts: i64,
        end_ts: i64,
        skip: usize,
    ) -> Result<RawActivityPage, SourceError> {
        let body = json!({
            "query": ALL_ACTIVITY_QUERY,
            "variables": {
                "startTimestamp": start_ts,
                "endTimestamp": end_ts,
                "skip": skip,
            }
        });

        let response = self.client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let decoded = response.json::<GraphResponse>().await?;

        if let Some(errors) = decoded.errors {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SourceError::Graph(joined));
        }

        let page = decoded
            .data
            .ok_or_else(|| SourceError::Decode("response carried no data".to_string()))?;

        log::debug!(
            "Fetched page: window=[{}, {}) skip={} records={}",
            start_ts,
            end_ts,
            skip,
            page.record_count()
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_response_with_data() {
        let body = r#"{
            "data": {
                "swaps": [{
                    "id": "0xswap1",
                    "timestamp": "1700000100",
                    "blockNumber": "18500000",
                    "sender": "0xalice",
                    "recipient": "0xbob",
                    "token0": {"id": "0xt0", "symbol": "WETH", "decimals": "18"},
                    "token1": {"id": "0xt1", "symbol": "USDC", "decimals": "6"},
                    "amount0": "-1.25",
                    "amount1": "2400.50",
                    "amountUSD": "2400.73"
                }],
                "mints": [],
                "burns": [],
                "flashLoans": []
            }
        }"#;

        let response: GraphResponse = serde_json::from_str(body).unwrap();
        let page = response.data.unwrap();
        assert_eq!(page.swaps.len(), 1);
        assert_eq!(page.swaps[0].timestamp.as_ref().unwrap().as_i64(), Some(1_700_000_100));
        assert_eq!(page.swaps[0].amount0.as_ref().unwrap().as_f64(), Some(-1.25));
    }

    #[test]
    fn test_graph_response_with_errors() {
        let body = r#"{"errors": [{"message": "Failed to decide on indexing"}]}"#;
        let response: GraphResponse = serde_json::from_str(body).unwrap();
        assert!(response.errors.is_some());
        assert!(response.data.is_none());
    }
}

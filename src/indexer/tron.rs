//! Tron full-node HTTP client.
//!
//! Tron encodes addresses as 21 bytes with a `0x41` network prefix. Everything leaving this
//! module is normalized to the 20-byte body so registry keys compare equal across chains.

use alloy::primitives::{Address, Bytes, B256};
use serde::Deserialize;
use serde_json::json;

use crate::error::ChainError;
use crate::indexer::client::{retry_rpc, ChainClient};
use crate::indexer::types::{selector_topic, ChainEvent, ChainKind, EventFilter};

const MAX_RETRIES: u32 = 3;
/// `getblockbylimitnext` refuses ranges wider than this.
const MAX_BLOCKS_PER_REQUEST: u64 = 100;
const TRIGGER_SMART_CONTRACT: &str = "TriggerSmartContract";

pub struct TronChainClient {
    http: reqwest::Client,
    base_url: String,
}

impl TronChainClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T>(&self, path: &str, body: serde_json::Value) -> Result<T, ChainError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = retry_rpc(MAX_RETRIES, || async {
            self.http
                .post(&url)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| ChainError::Transport(format!("{}: {}", path, e)))
        })
        .await?;

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ChainError::InvalidResponse(format!("{}: {}", path, e))
            } else {
                ChainError::Transport(format!("{}: {}", path, e))
            }
        })
    }
}

#[async_trait::async_trait]
impl ChainClient for TronChainClient {
    fn kind(&self) -> ChainKind {
        ChainKind::Tron
    }

    async fn current_head(&self) -> Result<u64, ChainError> {
        let block: TronBlock = self.post("/wallet/getnowblock", json!({})).await?;
        block.number().ok_or_else(|| {
            ChainError::InvalidResponse("getnowblock returned no block number".to_string())
        })
    }

    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<ChainEvent>, ChainError> {
        let mut events = Vec::new();
        for num in filter.from_block..=filter.to_block {
            let infos: Vec<TransactionInfo> = self
                .post("/wallet/gettransactioninfobyblocknum", json!({ "num": num }))
                .await?;
            events.extend(
                events_from_transaction_infos(&infos)
                    .into_iter()
                    .filter(|e| filter.descriptor.matches(e)),
            );
        }
        Ok(events)
    }

    async fn fetch_transactions(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>, ChainError> {
        let mut events = Vec::new();
        let mut start = from_block;
        while start <= to_block {
            let end = std::cmp::min(start + MAX_BLOCKS_PER_REQUEST - 1, to_block);
            // endNum is exclusive
            let list: BlockList = self
                .post(
                    "/wallet/getblockbylimitnext",
                    json!({ "startNum": start, "endNum": end + 1 }),
                )
                .await?;
            events.extend(events_from_blocks(&list.block));
            start = end + 1;
        }
        Ok(events)
    }
}

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Deserialize)]
pub struct BlockList {
    #[serde(default)]
    pub block: Vec<TronBlock>,
}

#[derive(Debug, Deserialize)]
pub struct TronBlock {
    #[serde(default)]
    pub block_header: Option<BlockHeader>,
    #[serde(default)]
    pub transactions: Vec<TronTransaction>,
}

impl TronBlock {
    fn number(&self) -> Option<u64> {
        self.block_header.as_ref()?.raw_data.number
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockHeader {
    pub raw_data: BlockRawData,
}

#[derive(Debug, Deserialize)]
pub struct BlockRawData {
    #[serde(default)]
    pub number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TronTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    #[serde(default)]
    pub ret: Vec<TransactionResult>,
    pub raw_data: TransactionRawData,
}

impl TronTransaction {
    fn succeeded(&self) -> bool {
        self.ret
            .first()
            .and_then(|r| r.contract_ret.as_deref())
            .is_some_and(|r| r == "SUCCESS")
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionResult {
    #[serde(rename = "contractRet", default)]
    pub contract_ret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRawData {
    #[serde(default)]
    pub contract: Vec<TransactionContract>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionContract {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameter: ContractParameter,
}

#[derive(Debug, Deserialize)]
pub struct ContractParameter {
    pub value: TriggerValue,
}

#[derive(Debug, Deserialize)]
pub struct TriggerValue {
    #[serde(default)]
    pub owner_address: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionInfo {
    pub id: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: u64,
    #[serde(default)]
    pub log: Vec<TronLog>,
}

#[derive(Debug, Deserialize)]
pub struct TronLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

// ============================================================
// Conversion
// ============================================================

/// Parse a Tron hex address (`41…`, `0x41…` or a bare 20-byte body) into its 20-byte form.
pub fn parse_tron_address(raw: &str) -> Option<Address> {
    let bytes = hex::decode(raw.trim().trim_start_matches("0x")).ok()?;
    match bytes.len() {
        21 if bytes[0] == 0x41 => Some(Address::from_slice(&bytes[1..])),
        20 => Some(Address::from_slice(&bytes)),
        _ => None,
    }
}

fn parse_hash(raw: &str) -> Option<B256> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
    (bytes.len() == 32).then(|| B256::from_slice(&bytes))
}

/// Flatten transaction-info logs of one block into chain events.
pub fn events_from_transaction_infos(infos: &[TransactionInfo]) -> Vec<ChainEvent> {
    let mut events = Vec::new();
    for info in infos {
        let Some(tx_hash) = parse_hash(&info.id) else {
            tracing::warn!(tx = %info.id, "Skipping transaction info with malformed id");
            continue;
        };
        for (index, log) in info.log.iter().enumerate() {
            let address = parse_tron_address(&log.address);
            let topics: Option<Vec<B256>> = log.topics.iter().map(|t| parse_hash(t)).collect();
            let data = hex::decode(&log.data);
            match (address, topics, data) {
                (Some(address), Some(topics), Ok(data)) => events.push(ChainEvent {
                    address,
                    topics,
                    data: Bytes::from(data),
                    tx_hash,
                    block_number: info.block_number,
                    log_index: index as u64,
                }),
                _ => {
                    tracing::warn!(tx = %info.id, log_index = index, "Skipping malformed Tron log");
                }
            }
        }
    }
    events
}

/// Turn successful smart-contract calls into transaction-style chain events.
pub fn events_from_blocks(blocks: &[TronBlock]) -> Vec<ChainEvent> {
    let mut events = Vec::new();
    for block in blocks {
        let Some(number) = block.number() else {
            tracing::warn!("Skipping Tron block without a number");
            continue;
        };
        for tx in &block.transactions {
            if !tx.succeeded() {
                continue;
            }
            let Some(tx_hash) = parse_hash(&tx.tx_id) else {
                continue;
            };
            for (index, contract) in tx.raw_data.contract.iter().enumerate() {
                if contract.kind != TRIGGER_SMART_CONTRACT {
                    continue;
                }
                if let Some(event) = call_event(&contract.parameter.value, tx_hash, number, index)
                {
                    events.push(event);
                }
            }
        }
    }
    events
}

fn call_event(value: &TriggerValue, tx_hash: B256, block_number: u64, index: usize) -> Option<ChainEvent> {
    let address = parse_tron_address(value.contract_address.as_deref()?)?;
    let caller = parse_tron_address(value.owner_address.as_deref()?)?;
    let calldata = hex::decode(value.data.as_deref()?).ok()?;
    if calldata.len() < 4 {
        return None;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&calldata[..4]);

    Some(ChainEvent {
        address,
        topics: vec![selector_topic(selector), caller.into_word()],
        data: Bytes::copy_from_slice(&calldata[4..]),
        tx_hash,
        block_number,
        log_index: index as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "41a614f803b6fd780986a42c78ec9c7f77e6ded13c";
    const TX: &str = "8e1b8ac6a6ab3e2f7d4c3f0d2a9a1b0c5d6e7f8091a2b3c4d5e6f708192a3b4c";

    #[test]
    fn test_parse_tron_address_forms() {
        let expected = Address::from_slice(&hex::decode(&TOKEN[2..]).unwrap());
        assert_eq!(parse_tron_address(TOKEN), Some(expected));
        assert_eq!(parse_tron_address(&format!("0x{}", TOKEN)), Some(expected));
        assert_eq!(parse_tron_address(&TOKEN[2..]), Some(expected));
        assert_eq!(parse_tron_address("42a614f803b6fd780986a42c78ec9c7f77e6ded13c"), None);
        assert_eq!(parse_tron_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"), None);
    }

    #[test]
    fn test_head_number_parsing() {
        let block: TronBlock = serde_json::from_str(
            r#"{"blockID":"00","block_header":{"raw_data":{"number":61234567,"timestamp":1}}}"#,
        )
        .unwrap();
        assert_eq!(block.number(), Some(61234567));

        let empty: TronBlock = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.number(), None);
    }

    #[test]
    fn test_events_from_transaction_infos() {
        let body = format!(
            r#"[{{
                "id": "{TX}",
                "blockNumber": 100,
                "log": [{{
                    "address": "a614f803b6fd780986a42c78ec9c7f77e6ded13c",
                    "topics": [
                        "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                        "000000000000000000000000e552f6487585c2b58bc2c9bb4492bc1f17132cd0"
                    ],
                    "data": "0000000000000000000000000000000000000000000000000000000000000064"
                }}, {{
                    "address": "not-hex",
                    "topics": [],
                    "data": ""
                }}]
            }}, {{ "id": "{TX}", "blockNumber": 100 }}]"#
        );
        let infos: Vec<TransactionInfo> = serde_json::from_str(&body).unwrap();
        let events = events_from_transaction_infos(&infos);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.address, parse_tron_address(TOKEN).unwrap());
        assert_eq!(event.block_number, 100);
        assert_eq!(event.topics.len(), 2);
        assert_eq!(event.data.len(), 32);
        assert_eq!(event.tx_hash, parse_hash(TX).unwrap());
    }

    #[test]
    fn test_events_from_blocks_keeps_successful_calls_only() {
        let call = format!(
            "a9059cbb{:0>64}{:0>64}",
            "e552f6487585c2b58bc2c9bb4492bc1f17132cd0", "64"
        );
        let body = format!(
            r#"{{"block": [{{
                "block_header": {{"raw_data": {{"number": 7}}}},
                "transactions": [
                    {{
                        "txID": "{TX}",
                        "ret": [{{"contractRet": "SUCCESS"}}],
                        "raw_data": {{"contract": [{{
                            "type": "TriggerSmartContract",
                            "parameter": {{"value": {{
                                "owner_address": "41b3c2b2f0a1d7e6c5b4a39281706f5e4d3c2b1a09",
                                "contract_address": "{TOKEN}",
                                "data": "{call}"
                            }}}}
                        }}]}}
                    }},
                    {{
                        "txID": "{TX}",
                        "ret": [{{"contractRet": "REVERT"}}],
                        "raw_data": {{"contract": [{{
                            "type": "TriggerSmartContract",
                            "parameter": {{"value": {{
                                "owner_address": "41b3c2b2f0a1d7e6c5b4a39281706f5e4d3c2b1a09",
                                "contract_address": "{TOKEN}",
                                "data": "{call}"
                            }}}}
                        }}]}}
                    }},
                    {{
                        "txID": "{TX}",
                        "ret": [{{"contractRet": "SUCCESS"}}],
                        "raw_data": {{"contract": [{{
                            "type": "TransferContract",
                            "parameter": {{"value": {{"amount": 1000}}}}
                        }}]}}
                    }}
                ]
            }}]}}"#
        );
        let list: BlockList = serde_json::from_str(&body).unwrap();
        let events = events_from_blocks(&list.block);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.block_number, 7);
        assert_eq!(event.signature(), Some(selector_topic([0xa9, 0x05, 0x9c, 0xbb])));
        assert_eq!(
            Address::from_word(event.topics[1]),
            parse_tron_address("41b3c2b2f0a1d7e6c5b4a39281706f5e4d3c2b1a09").unwrap()
        );
        assert_eq!(event.data.len(), 64);
    }
}

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};

use crate::error::ConsumeError;
use crate::indexer::types::{selector_topic, ChainEvent};

// Signatures only. Payloads are decoded word by word below so that Tron logs, which carry no
// removed/blockHash metadata, go through the same path as EVM ones.
sol! {
    event Deposited(
        address indexed sender,
        address indexed srcToken,
        address dstToken,
        address recipient,
        uint256 amount,
        uint256 fee,
        uint256 networkId
    );

    event Claimed(bytes32 indexed requestId, address indexed recipient, address token, uint256 amount);

    function transfer(address to, uint256 value) returns (bool);
}

pub fn deposited_topic() -> B256 {
    Deposited::SIGNATURE_HASH
}

pub fn claimed_topic() -> B256 {
    Claimed::SIGNATURE_HASH
}

/// `topics[0]` of a transaction-style TRC-20 `transfer` call.
pub fn transfer_call_topic() -> B256 {
    selector_topic(transferCall::SELECTOR)
}

/// A `Deposited` log on either bridge contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub tx_hash: B256,
    pub block_number: u64,
    pub sender: Address,
    pub src_token: Address,
    pub dst_token: Address,
    pub recipient: Address,
    pub amount: U256,
    pub fee: U256,
    pub network_id: u64,
}

/// A `Claimed` log on either bridge contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimEvent {
    pub tx_hash: B256,
    pub block_number: u64,
    pub request_id: B256,
    pub recipient: Address,
    pub token: Address,
    pub amount: U256,
}

/// A successful TRC-20 `transfer(to, value)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub tx_hash: B256,
    pub block_number: u64,
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

fn decode_error(what: &str, event: &ChainEvent, detail: &str) -> ConsumeError {
    ConsumeError::Decode(format!("{} in tx {}: {}", what, event.tx_hash, detail))
}

/// 32-byte ABI word at `index`.
fn word(data: &[u8], index: usize) -> Option<B256> {
    let start = index * 32;
    data.get(start..start + 32).map(B256::from_slice)
}

fn expect_topics(
    what: &str,
    event: &ChainEvent,
    signature: B256,
    count: usize,
) -> Result<(), ConsumeError> {
    if event.signature() != Some(signature) {
        return Err(decode_error(what, event, "signature mismatch"));
    }
    if event.topics.len() != count {
        return Err(decode_error(
            what,
            event,
            &format!("expected {} topics, got {}", count, event.topics.len()),
        ));
    }
    Ok(())
}

pub fn decode_deposit(event: &ChainEvent) -> Result<DepositEvent, ConsumeError> {
    expect_topics("Deposited", event, Deposited::SIGNATURE_HASH, 3)?;

    let data = event.data.as_ref();
    let words: Option<Vec<B256>> = (0..5).map(|i| word(data, i)).collect();
    let Some(words) = words else {
        return Err(decode_error(
            "Deposited",
            event,
            &format!("data is {} bytes, expected 160", data.len()),
        ));
    };

    let network_id = U256::from_be_bytes(words[4].0);
    let network_id = u64::try_from(network_id)
        .map_err(|_| decode_error("Deposited", event, "networkId out of range"))?;

    Ok(DepositEvent {
        tx_hash: event.tx_hash,
        block_number: event.block_number,
        sender: Address::from_word(event.topics[1]),
        src_token: Address::from_word(event.topics[2]),
        dst_token: Address::from_word(words[0]),
        recipient: Address::from_word(words[1]),
        amount: U256::from_be_bytes(words[2].0),
        fee: U256::from_be_bytes(words[3].0),
        network_id,
    })
}

pub fn decode_claim(event: &ChainEvent) -> Result<ClaimEvent, ConsumeError> {
    expect_topics("Claimed", event, Claimed::SIGNATURE_HASH, 3)?;

    let data = event.data.as_ref();
    let (Some(token), Some(amount)) = (word(data, 0), word(data, 1)) else {
        return Err(decode_error(
            "Claimed",
            event,
            &format!("data is {} bytes, expected 64", data.len()),
        ));
    };

    Ok(ClaimEvent {
        tx_hash: event.tx_hash,
        block_number: event.block_number,
        request_id: event.topics[1],
        recipient: Address::from_word(event.topics[2]),
        token: Address::from_word(token),
        amount: U256::from_be_bytes(amount.0),
    })
}

/// Decode a transaction-style `transfer` call. `topics[1]` carries the caller.
pub fn decode_token_transfer(event: &ChainEvent) -> Result<TokenTransfer, ConsumeError> {
    expect_topics("transfer", event, transfer_call_topic(), 2)?;

    let data = event.data.as_ref();
    let (Some(to), Some(amount)) = (word(data, 0), word(data, 1)) else {
        return Err(decode_error(
            "transfer",
            event,
            &format!("calldata is {} bytes, expected 64", data.len()),
        ));
    };

    Ok(TokenTransfer {
        tx_hash: event.tx_hash,
        block_number: event.block_number,
        token: event.address,
        from: Address::from_word(event.topics[1]),
        to: Address::from_word(to),
        amount: U256::from_be_bytes(amount.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    const BRIDGE: Address = Address::repeat_byte(0xb0);
    const SENDER: Address = Address::repeat_byte(0x01);
    const SRC: Address = Address::repeat_byte(0x02);
    const DST: Address = Address::repeat_byte(0x03);
    const RECIPIENT: Address = Address::repeat_byte(0x04);

    fn u256_word(value: u64) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    fn deposit_event(data: Vec<u8>) -> ChainEvent {
        ChainEvent {
            address: BRIDGE,
            topics: vec![deposited_topic(), SENDER.into_word(), SRC.into_word()],
            data: Bytes::from(data),
            tx_hash: B256::repeat_byte(0xab),
            block_number: 42,
            log_index: 3,
        }
    }

    fn deposit_payload() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(DST.into_word().as_slice());
        data.extend_from_slice(RECIPIENT.into_word().as_slice());
        data.extend_from_slice(&u256_word(1_000_000));
        data.extend_from_slice(&u256_word(2_500));
        data.extend_from_slice(&u256_word(728126428));
        data
    }

    #[test]
    fn test_signature_hashes() {
        assert_eq!(
            deposited_topic(),
            alloy::primitives::keccak256(
                "Deposited(address,address,address,address,uint256,uint256,uint256)"
            )
        );
        assert_eq!(
            claimed_topic(),
            alloy::primitives::keccak256("Claimed(bytes32,address,address,uint256)")
        );
        // transfer(address,uint256)
        assert_eq!(&transfer_call_topic()[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_decode_deposit() {
        let decoded = decode_deposit(&deposit_event(deposit_payload())).unwrap();
        assert_eq!(decoded.sender, SENDER);
        assert_eq!(decoded.src_token, SRC);
        assert_eq!(decoded.dst_token, DST);
        assert_eq!(decoded.recipient, RECIPIENT);
        assert_eq!(decoded.amount, U256::from(1_000_000u64));
        assert_eq!(decoded.fee, U256::from(2_500u64));
        assert_eq!(decoded.network_id, 728126428);
        assert_eq!(decoded.block_number, 42);
    }

    #[test]
    fn test_decode_deposit_truncated() {
        let mut payload = deposit_payload();
        payload.truncate(128);
        let err = decode_deposit(&deposit_event(payload)).unwrap_err();
        assert!(matches!(err, ConsumeError::Decode(ref m) if m.contains("expected 160")));
    }

    #[test]
    fn test_decode_deposit_network_id_overflow() {
        let mut payload = deposit_payload();
        payload[128..160].copy_from_slice(&U256::MAX.to_be_bytes::<32>());
        assert!(decode_deposit(&deposit_event(payload)).is_err());
    }

    #[test]
    fn test_decode_claim() {
        let request = B256::repeat_byte(0x77);
        let mut data = Vec::new();
        data.extend_from_slice(DST.into_word().as_slice());
        data.extend_from_slice(&u256_word(100));
        let event = ChainEvent {
            address: BRIDGE,
            topics: vec![claimed_topic(), request, RECIPIENT.into_word()],
            data: Bytes::from(data),
            tx_hash: B256::repeat_byte(0xcd),
            block_number: 7,
            log_index: 0,
        };

        let claim = decode_claim(&event).unwrap();
        assert_eq!(claim.request_id, request);
        assert_eq!(claim.recipient, RECIPIENT);
        assert_eq!(claim.token, DST);
        assert_eq!(claim.amount, U256::from(100u64));

        // A Deposited log is not a claim.
        assert!(decode_claim(&deposit_event(deposit_payload())).is_err());
    }

    #[test]
    fn test_decode_token_transfer() {
        let mut data = Vec::new();
        data.extend_from_slice(RECIPIENT.into_word().as_slice());
        data.extend_from_slice(&u256_word(5_000_000));
        let event = ChainEvent {
            address: SRC,
            topics: vec![transfer_call_topic(), SENDER.into_word()],
            data: Bytes::from(data),
            tx_hash: B256::repeat_byte(0xee),
            block_number: 9,
            log_index: 0,
        };

        let transfer = decode_token_transfer(&event).unwrap();
        assert_eq!(transfer.token, SRC);
        assert_eq!(transfer.from, SENDER);
        assert_eq!(transfer.to, RECIPIENT);
        assert_eq!(transfer.amount, U256::from(5_000_000u64));
    }
}

use alloy::primitives::{keccak256, Address, B256, U256};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Which way value moves across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeDirection {
    /// Tron deposit, EVM claim.
    Cashin,
    /// EVM deposit, Tron claim.
    Cashout,
}

impl BridgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cashin => "cashin",
            Self::Cashout => "cashout",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Cashin => "cashin_transactions",
            Self::Cashout => "cashout_transactions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepositStatus {
    Unconfirmed,
    Pending,
    Confirmed,
    Failed,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfirmed => "unconfirmed",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for DepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unconfirmed" => Ok(Self::Unconfirmed),
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown deposit status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimStatus {
    Pending,
    Success,
    DoubleClaimed,
    Expired,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::DoubleClaimed => "double_claimed",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "double_claimed" => Ok(Self::DoubleClaimed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown claim status '{}'", other)),
        }
    }
}

/// Both status axes of a transaction, used as the expected value of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    pub deposit: DepositStatus,
    pub claim: ClaimStatus,
}

/// One cross-chain transfer, as stored in the cash-in or cash-out table.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeTransaction {
    pub id: B256,
    pub direction: BridgeDirection,
    pub deposit_tx_hash: B256,
    pub claim_tx_hash: Option<B256>,
    pub src_token: Address,
    pub dst_token: Address,
    pub sender: Address,
    pub recipient: Address,
    pub network_id: u64,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub deposit_status: DepositStatus,
    pub claim_status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BridgeTransaction {
    pub fn state(&self) -> TransferState {
        TransferState {
            deposit: self.deposit_status,
            claim: self.claim_status,
        }
    }
}

/// The immutable fields a transaction id is derived from.
#[derive(Debug, Clone, Copy)]
pub struct TransactionKey {
    pub src_token: Address,
    pub dst_token: Address,
    pub recipient: Address,
    pub network_id: u64,
    pub deposit_tx_hash: B256,
    pub amount: U256,
}

/// Content-derived transaction id: redelivering the same deposit always yields the same id.
///
/// `keccak256(srcToken ‖ dstToken ‖ recipient ‖ uint256(networkId) ‖ depositTxHash ‖ uint256(amount))`
pub fn transaction_id(key: &TransactionKey) -> B256 {
    let mut buf = Vec::with_capacity(20 * 3 + 32 * 3);
    buf.extend_from_slice(key.src_token.as_slice());
    buf.extend_from_slice(key.dst_token.as_slice());
    buf.extend_from_slice(key.recipient.as_slice());
    buf.extend_from_slice(&U256::from(key.network_id).to_be_bytes::<32>());
    buf.extend_from_slice(key.deposit_tx_hash.as_slice());
    buf.extend_from_slice(&key.amount.to_be_bytes::<32>());
    keccak256(&buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreasuryStatus {
    Unconfirmed,
    IsCashin,
    Expired,
}

impl TreasuryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfirmed => "unconfirmed",
            Self::IsCashin => "is_cashin",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for TreasuryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unconfirmed" => Ok(Self::Unconfirmed),
            "is_cashin" => Ok(Self::IsCashin),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown treasury status '{}'", other)),
        }
    }
}

/// A plain token transfer into the treasury wallet, waiting to be promoted to a cash-in.
#[derive(Debug, Clone, PartialEq)]
pub struct TreasuryTransfer {
    pub tx_id: B256,
    pub from_address: Address,
    pub treasury_address: Address,
    pub token_address: Address,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub status: TreasuryStatus,
    pub block_number: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Front-end request turning a treasury transfer into a cash-in.
#[derive(Debug, Clone)]
pub struct CashinRequest {
    pub treasury_tx: B256,
    pub dst_token: Address,
    pub recipient: Address,
    pub network_id: u64,
    pub fee: BigDecimal,
}

/// Convert an on-chain integer amount into the stored decimal form.
pub fn to_decimal(value: &U256) -> BigDecimal {
    // U256's decimal rendering is always a valid integer literal.
    BigDecimal::from_str(&value.to_string()).unwrap_or_default()
}

/// Convert a stored decimal amount back to an on-chain integer. Fractions are rejected.
pub fn to_u256(value: &BigDecimal) -> Option<U256> {
    if !value.is_integer() {
        return None;
    }
    let (digits, _) = value.with_scale(0).as_bigint_and_exponent();
    U256::from_str(&digits.to_string()).ok()
}

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use std::sync::Arc;

use crate::bridge::decoder::{ClaimEvent, DepositEvent, TokenTransfer};
use crate::bridge::types::{
    to_decimal, to_u256, transaction_id, BridgeDirection, BridgeTransaction, CashinRequest,
    ClaimStatus, DepositStatus, TransactionKey, TreasuryStatus, TreasuryTransfer,
};
use crate::db::repository::{BridgeTransactionRepository, TreasuryTransferRepository};
use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositOutcome {
    /// New record inserted as (Confirmed, Pending).
    Created,
    /// Provisional record promoted to Confirmed in place.
    Confirmed,
    /// Record was already confirmed, or a concurrent delivery inserted it first.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Same claim transaction seen before.
    AlreadyClaimed,
}

/// Transfer state machine of one bridge direction.
pub struct Reconciler {
    direction: BridgeDirection,
    transactions: Arc<dyn BridgeTransactionRepository>,
    treasury: Option<Arc<dyn TreasuryTransferRepository>>,
}

impl Reconciler {
    pub fn new(
        direction: BridgeDirection,
        transactions: Arc<dyn BridgeTransactionRepository>,
    ) -> Self {
        Self {
            direction,
            transactions,
            treasury: None,
        }
    }

    /// Attach the treasury repository. Only meaningful for cash-in.
    pub fn with_treasury(mut self, treasury: Arc<dyn TreasuryTransferRepository>) -> Self {
        self.treasury = Some(treasury);
        self
    }

    pub fn direction(&self) -> BridgeDirection {
        self.direction
    }

    fn treasury(&self) -> Result<&Arc<dyn TreasuryTransferRepository>, ReconcileError> {
        match (&self.treasury, self.direction) {
            (Some(treasury), BridgeDirection::Cashin) => Ok(treasury),
            _ => Err(ReconcileError::NoTreasury),
        }
    }

    pub async fn on_deposit(&self, event: &DepositEvent) -> Result<DepositOutcome, ReconcileError> {
        let id = transaction_id(&TransactionKey {
            src_token: event.src_token,
            dst_token: event.dst_token,
            recipient: event.recipient,
            network_id: event.network_id,
            deposit_tx_hash: event.tx_hash,
            amount: event.amount,
        });

        // A different id under the same tx hash is only this deposit if it is still the
        // provisional row a cash-in promotion created. Confirmed rows are other deposits.
        let existing = match self.transactions.select_by_id(id).await? {
            Some(tx) => Some(tx),
            None => self
                .transactions
                .select_by_deposit_hash(event.tx_hash)
                .await?
                .into_iter()
                .find(|tx| tx.deposit_status != DepositStatus::Confirmed),
        };

        let Some(existing) = existing else {
            let now = Utc::now();
            let tx = BridgeTransaction {
                id,
                direction: self.direction,
                deposit_tx_hash: event.tx_hash,
                claim_tx_hash: None,
                src_token: event.src_token,
                dst_token: event.dst_token,
                sender: event.sender,
                recipient: event.recipient,
                network_id: event.network_id,
                amount: to_decimal(&event.amount),
                fee: to_decimal(&event.fee),
                deposit_status: DepositStatus::Confirmed,
                claim_status: ClaimStatus::Pending,
                created_at: now,
                updated_at: now,
            };

            if !self.transactions.create(&tx).await? {
                tracing::debug!(direction = self.direction.as_str(), id = %id, "Deposit already recorded");
                return Ok(DepositOutcome::Duplicate);
            }

            tracing::info!(
                direction = self.direction.as_str(),
                id = %id,
                tx = %event.tx_hash,
                recipient = %event.recipient,
                amount = %tx.amount,
                "Deposit recorded"
            );
            return Ok(DepositOutcome::Created);
        };

        if existing.deposit_status == DepositStatus::Confirmed {
            return Ok(DepositOutcome::Duplicate);
        }

        let mut confirmed = existing.clone();
        confirmed.recipient = event.recipient;
        confirmed.amount = to_decimal(&event.amount);
        confirmed.fee = to_decimal(&event.fee);
        confirmed.deposit_status = DepositStatus::Confirmed;

        if !self.transactions.update(&confirmed, existing.state()).await? {
            // Lost the race; fine if the winner confirmed it.
            return match self.transactions.select_by_id(existing.id).await? {
                Some(tx) if tx.deposit_status == DepositStatus::Confirmed => {
                    Ok(DepositOutcome::Duplicate)
                }
                _ => Err(ReconcileError::ConcurrentUpdate(existing.id)),
            };
        }

        tracing::info!(
            direction = self.direction.as_str(),
            id = %existing.id,
            tx = %event.tx_hash,
            previous = existing.deposit_status.as_str(),
            "Provisional deposit confirmed"
        );
        Ok(DepositOutcome::Confirmed)
    }

    pub async fn on_claim(&self, event: &ClaimEvent) -> Result<ClaimOutcome, ReconcileError> {
        let id = event.request_id;
        let tx = self
            .transactions
            .select_by_id(id)
            .await?
            .ok_or(ReconcileError::UnknownRequest(id))?;

        let claimed = to_decimal(&event.amount);
        if claimed != tx.amount {
            return Err(ReconcileError::AmountMismatch {
                id,
                expected: tx.amount,
                actual: claimed,
            });
        }
        if event.recipient != tx.recipient {
            return Err(ReconcileError::RecipientMismatch {
                id,
                expected: tx.recipient,
                actual: event.recipient,
            });
        }
        if tx.deposit_status != DepositStatus::Confirmed {
            return Err(ReconcileError::DepositNotConfirmed(id));
        }

        match tx.claim_status {
            ClaimStatus::Pending => {
                let mut success = tx.clone();
                success.claim_status = ClaimStatus::Success;
                success.claim_tx_hash = Some(event.tx_hash);

                if self.transactions.update(&success, tx.state()).await? {
                    tracing::info!(
                        direction = self.direction.as_str(),
                        id = %id,
                        claim_tx = %event.tx_hash,
                        amount = %claimed,
                        "Claim settled"
                    );
                    return Ok(ClaimOutcome::Claimed);
                }

                match self.transactions.select_by_id(id).await? {
                    Some(current)
                        if current.claim_status == ClaimStatus::Success
                            && current.claim_tx_hash == Some(event.tx_hash) =>
                    {
                        Ok(ClaimOutcome::AlreadyClaimed)
                    }
                    _ => Err(ReconcileError::ConcurrentUpdate(id)),
                }
            }
            ClaimStatus::Success | ClaimStatus::DoubleClaimed
                if tx.claim_tx_hash == Some(event.tx_hash) =>
            {
                Ok(ClaimOutcome::AlreadyClaimed)
            }
            ClaimStatus::Success => {
                let first = tx.claim_tx_hash.unwrap_or_default();
                let mut flagged = tx.clone();
                flagged.claim_status = ClaimStatus::DoubleClaimed;
                if !self.transactions.update(&flagged, tx.state()).await? {
                    tracing::warn!(id = %id, "Record changed while flagging double claim");
                }
                Err(ReconcileError::DoubleClaim {
                    id,
                    first,
                    second: event.tx_hash,
                })
            }
            ClaimStatus::DoubleClaimed => Err(ReconcileError::DoubleClaim {
                id,
                first: tx.claim_tx_hash.unwrap_or_default(),
                second: event.tx_hash,
            }),
            ClaimStatus::Expired => Err(ReconcileError::ClaimExpired(id)),
        }
    }

    /// Record a transfer into the treasury wallet as Unconfirmed. Returns whether it was new.
    pub async fn record_treasury_transfer(
        &self,
        transfer: &TokenTransfer,
    ) -> Result<bool, ReconcileError> {
        let treasury = self.treasury()?;
        let now = Utc::now();
        let record = TreasuryTransfer {
            tx_id: transfer.tx_hash,
            from_address: transfer.from,
            treasury_address: transfer.to,
            token_address: transfer.token,
            amount: to_decimal(&transfer.amount),
            fee: BigDecimal::zero(),
            status: TreasuryStatus::Unconfirmed,
            block_number: transfer.block_number,
            created_at: now,
            updated_at: now,
        };

        let inserted = treasury.create(&record).await?;
        if inserted {
            tracing::info!(
                tx = %transfer.tx_hash,
                from = %transfer.from,
                token = %transfer.token,
                amount = %record.amount,
                "Treasury transfer recorded"
            );
        }
        Ok(inserted)
    }

    /// Promote an Unconfirmed treasury transfer to a provisional cash-in.
    pub async fn create_cashin(
        &self,
        request: &CashinRequest,
    ) -> Result<BridgeTransaction, ReconcileError> {
        let treasury = self.treasury()?;
        let tx_id = request.treasury_tx;

        let transfer = treasury
            .select_by_tx_id(tx_id)
            .await?
            .ok_or(ReconcileError::TreasuryTransferNotFound(tx_id))?;
        if transfer.status != TreasuryStatus::Unconfirmed {
            return Err(ReconcileError::TreasuryTransferNotPromotable {
                tx: tx_id,
                status: transfer.status,
            });
        }

        let invalid_fee = || ReconcileError::InvalidFee {
            tx: tx_id,
            amount: transfer.amount.clone(),
            fee: request.fee.clone(),
        };
        if request.fee < BigDecimal::zero() {
            return Err(invalid_fee());
        }
        let amount = &transfer.amount - &request.fee;
        if amount <= BigDecimal::zero() {
            return Err(invalid_fee());
        }
        let raw_amount = to_u256(&amount).ok_or_else(invalid_fee)?;

        if !treasury
            .update_status(tx_id, TreasuryStatus::Unconfirmed, TreasuryStatus::IsCashin)
            .await?
        {
            let status = treasury
                .select_by_tx_id(tx_id)
                .await?
                .map(|t| t.status)
                .unwrap_or(TreasuryStatus::Unconfirmed);
            return Err(ReconcileError::TreasuryTransferNotPromotable { tx: tx_id, status });
        }

        let id = transaction_id(&TransactionKey {
            src_token: transfer.token_address,
            dst_token: request.dst_token,
            recipient: request.recipient,
            network_id: request.network_id,
            deposit_tx_hash: tx_id,
            amount: raw_amount,
        });
        let now = Utc::now();
        let tx = BridgeTransaction {
            id,
            direction: self.direction,
            deposit_tx_hash: tx_id,
            claim_tx_hash: None,
            src_token: transfer.token_address,
            dst_token: request.dst_token,
            sender: transfer.from_address,
            recipient: request.recipient,
            network_id: request.network_id,
            amount,
            fee: request.fee.clone(),
            deposit_status: DepositStatus::Pending,
            claim_status: ClaimStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        if !self.transactions.create(&tx).await? {
            return self
                .transactions
                .select_by_id(id)
                .await?
                .ok_or(ReconcileError::ConcurrentUpdate(id));
        }

        tracing::info!(
            id = %id,
            treasury_tx = %tx_id,
            recipient = %request.recipient,
            amount = %tx.amount,
            "Treasury transfer promoted to cash-in"
        );
        Ok(tx)
    }
}

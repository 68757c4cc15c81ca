//! # Ledger Batch Executor
//!
//! Forwards a payout as an ordered list of transfers out of its own
//! account. The first failing call aborts the batch; the gateway then
//! restores custody, so no call in a failed batch leaves a trace. The calls
//! together may spend at most the funded amount, and after the last call the
//! unspent part of that amount goes to the refund address. Anything the
//! account held before the batch stays where it is.

use conduit_protocol::bridge::{
    decode_calls, BatchError, BatchExecutor, BatchFunding, Custody, MessageDirection, NetworkId,
    RelayedMessage,
};
use conduit_protocol::crypto::Address;

#[derive(Debug, Clone)]
pub struct LedgerBatchExecutor {
    address: Address,
    network: NetworkId,
}

impl LedgerBatchExecutor {
    /// `network` is the ledger the executor runs on; forwarded payloads are
    /// recorded against it.
    pub fn new(address: Address, network: NetworkId) -> Self {
        Self { address, network }
    }
}

impl BatchExecutor for LedgerBatchExecutor {
    fn address(&self) -> Address {
        self.address
    }

    fn execute(
        &self,
        custody: &mut Custody,
        funding: &BatchFunding,
        calls: &[u8],
    ) -> Result<(), BatchError> {
        if funding.refund.is_zero() {
            return Err(BatchError::ZeroRefund);
        }
        let calls = decode_calls(calls)?;

        let mut spent: u128 = 0;
        for (index, call) in calls.iter().enumerate() {
            if call.target.is_zero() {
                return Err(BatchError::ZeroTarget { index });
            }
            spent = spent
                .checked_add(call.value)
                .filter(|total| *total <= funding.amount)
                .ok_or(BatchError::ExceedsFunding {
                    index,
                    funded: funding.amount,
                })?;
            custody
                .transfer(funding.asset, self.address, call.target, call.value)
                .map_err(|e| BatchError::CallFailed {
                    index,
                    reason: e.to_string(),
                })?;
            if !call.payload.is_empty() {
                custody.push_message(RelayedMessage {
                    direction: MessageDirection::Forwarded,
                    network: self.network.clone(),
                    from: self.address,
                    to: call.target,
                    payload: call.payload.clone(),
                });
            }
        }

        let remainder = funding.amount - spent;
        if remainder > 0 {
            custody.transfer(funding.asset, self.address, funding.refund, remainder)?;
        }
        tracing::debug!(
            calls = calls.len(),
            funded = funding.amount,
            refunded = remainder,
            "batch executed"
        );
        Ok(())
    }
}

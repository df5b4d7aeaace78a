//! Block validation
//!
//! Everything a receiving node re-derives before it accepts a block. All
//! checks read the ledger through one [`Snapshot`], so the chain length
//! cannot move underneath a validation run. Any failed check rejects the
//! whole block.

use crate::core::constants::{FEE_THRESHOLD, MINING_REWARD, STORAGE_FEE, TXS_LIMIT};
use crate::core::proof_of_work::ProofOfWork;
use crate::core::{Address, Block, Snapshot};
use crate::error::{BlockchainError, Result};
use crate::utils::{ecdsa_p256_sha256_sign_verify, parse_timestamp};
use std::collections::{BTreeMap, HashSet};
use time::OffsetDateTime;

/// Runs every check against the ledger state captured in `snapshot`.
pub fn validate_block(block: &Block, snapshot: &Snapshot<'_>) -> Result<()> {
    check_difficulty(block, snapshot)?;
    check_hash(block, snapshot)?;
    check_signature(block)?;
    check_proof_of_work(block)?;
    check_balances_structure(block)?;
    check_timestamp(block, snapshot)?;
    validate_transactions(block, snapshot)
}

pub fn check_difficulty(block: &Block, snapshot: &Snapshot<'_>) -> Result<()> {
    if block.get_difficulty() != snapshot.difficulty() {
        return Err(BlockchainError::Consensus(format!(
            "Difficulty {} differs from chain difficulty {}",
            block.get_difficulty(),
            snapshot.difficulty()
        )));
    }
    Ok(())
}

/// Stored hash recomputes, and `prevHash` names the block at the tail.
pub fn check_hash(block: &Block, snapshot: &Snapshot<'_>) -> Result<()> {
    if block.compute_hash() != block.get_hash() {
        return Err(BlockchainError::Authentication(
            "Block hash does not match its fields".to_string(),
        ));
    }
    if snapshot.tail_hash()? != block.get_prev_hash() {
        return Err(BlockchainError::Consensus(
            "Previous hash is not the chain tail".to_string(),
        ));
    }
    Ok(())
}

pub fn check_signature(block: &Block) -> Result<()> {
    let public_key = block
        .get_miner()
        .public_key()
        .map_err(|e| BlockchainError::Authentication(format!("Miner has no public key: {e}")))?;
    if !ecdsa_p256_sha256_sign_verify(&public_key, block.get_signature(), block.get_hash()) {
        return Err(BlockchainError::Authentication(
            "Miner signature does not verify".to_string(),
        ));
    }
    Ok(())
}

pub fn check_proof_of_work(block: &Block) -> Result<()> {
    if !ProofOfWork::validate(block.get_hash(), block.get_difficulty(), block.get_nonce()) {
        return Err(BlockchainError::Consensus(
            "Proof-of-work target not met".to_string(),
        ));
    }
    Ok(())
}

/// Every overlay entry except the storage account belongs to an address
/// some transaction touches.
pub fn check_balances_structure(block: &Block) -> Result<()> {
    for address in block.get_balances().keys() {
        if address.is_storage() {
            continue;
        }
        let referenced = block
            .get_transactions()
            .iter()
            .any(|tx| tx.get_sender() == address || tx.get_receiver() == address);
        if !referenced {
            return Err(BlockchainError::Accounting(format!(
                "Balance entry for untouched address {address}"
            )));
        }
    }
    Ok(())
}

/// Timestamp parses, is not in the future and is strictly after the tail's.
pub fn check_timestamp(block: &Block, snapshot: &Snapshot<'_>) -> Result<()> {
    let block_time = parse_timestamp(block.get_timestamp())?;
    if block_time > OffsetDateTime::now_utc() {
        return Err(BlockchainError::Temporal(format!(
            "{} is in the future",
            block.get_timestamp()
        )));
    }
    let previous = snapshot.tail()?;
    let previous_time = parse_timestamp(previous.get_timestamp()).map_err(|e| {
        BlockchainError::Temporal(format!("Previous block timestamp is unreadable: {e}"))
    })?;
    if block_time <= previous_time {
        return Err(BlockchainError::Temporal(format!(
            "{} is not after previous block time {}",
            block.get_timestamp(),
            previous.get_timestamp()
        )));
    }
    Ok(())
}

/// Transaction-list rules: count, nonce uniqueness, reward shape, per-transaction
/// authenticity and exact reconciliation of the overlay by replay.
pub fn validate_transactions(block: &Block, snapshot: &Snapshot<'_>) -> Result<()> {
    let transactions = block.get_transactions();
    let reward_slots = transactions.iter().filter(|tx| tx.is_reward()).count();
    if transactions.is_empty() {
        return Err(BlockchainError::Structural(
            "Block has no transactions".to_string(),
        ));
    }
    if reward_slots > 1 {
        return Err(BlockchainError::Structural(
            "More than one reward transaction".to_string(),
        ));
    }
    if transactions.len() > TXS_LIMIT + reward_slots {
        return Err(BlockchainError::Structural(format!(
            "{} transactions exceed the limit of {TXS_LIMIT}",
            transactions.len() - reward_slots
        )));
    }

    let mut nonces = HashSet::new();
    for tx in transactions {
        if !nonces.insert(tx.get_nonce()) {
            return Err(BlockchainError::Structural(
                "Duplicate transaction nonce".to_string(),
            ));
        }
    }

    for tx in transactions {
        if tx.get_value() == 0 {
            return Err(BlockchainError::Structural(
                "Transaction value must be positive".to_string(),
            ));
        }
        if !tx.hash_is_valid() {
            return Err(BlockchainError::Authentication(
                "Transaction hash does not match its fields".to_string(),
            ));
        }
        if tx.is_reward() {
            if tx.get_receiver() != block.get_miner()
                || tx.get_value() != MINING_REWARD
                || tx.get_fee() != 0
            {
                return Err(BlockchainError::Accounting(
                    "Reward transaction must pay the mining reward to the miner".to_string(),
                ));
            }
        } else {
            if !tx.signature_is_valid() {
                return Err(BlockchainError::Authentication(
                    "Transaction signature does not verify".to_string(),
                ));
            }
            if tx.get_value() > FEE_THRESHOLD && tx.get_fee() != STORAGE_FEE {
                return Err(BlockchainError::Accounting(format!(
                    "Transfers above {FEE_THRESHOLD} must pay a fee of {STORAGE_FEE}"
                )));
            }
        }
    }

    reconcile_balances(block, snapshot)
}

/// Replays the block in order from settled balances and demands the overlay
/// match exactly.
fn reconcile_balances(block: &Block, snapshot: &Snapshot<'_>) -> Result<()> {
    let storage = Address::storage();
    let mut running: BTreeMap<Address, u64> = BTreeMap::new();

    for tx in block.get_transactions() {
        let sender_balance = running_balance(&mut running, snapshot, tx.get_sender())?;
        let cost = tx.get_cost();
        let remaining =
            sender_balance
                .checked_sub(cost)
                .ok_or(BlockchainError::InsufficientFunds {
                    required: cost,
                    available: sender_balance,
                })?;
        running.insert(tx.get_sender().clone(), remaining);
        credit(&mut running, snapshot, tx.get_receiver(), tx.get_value())?;
        credit(&mut running, snapshot, &storage, tx.get_fee())?;
    }

    for tx in block.get_transactions() {
        for address in [tx.get_sender(), tx.get_receiver()] {
            if !block.get_balances().contains_key(address) {
                return Err(BlockchainError::Accounting(format!(
                    "Missing balance entry for {address}"
                )));
            }
        }
    }

    for (address, expected) in &running {
        match block.get_balances().get(address) {
            Some(stated) if stated == expected => {}
            Some(stated) => {
                return Err(BlockchainError::Accounting(format!(
                    "Balance of {address} is {stated}, replay gives {expected}"
                )))
            }
            // Only the storage account can be touched without an entry, and
            // only when its balance did not move.
            None => {
                if snapshot.balance(address)? != *expected {
                    return Err(BlockchainError::Accounting(format!(
                        "Missing balance entry for {address}"
                    )));
                }
            }
        }
    }

    for (address, stated) in block.get_balances() {
        if !running.contains_key(address) && snapshot.balance(address)? != *stated {
            return Err(BlockchainError::Accounting(format!(
                "Balance of untouched {address} changed"
            )));
        }
    }
    Ok(())
}

fn running_balance(
    running: &mut BTreeMap<Address, u64>,
    snapshot: &Snapshot<'_>,
    address: &Address,
) -> Result<u64> {
    if let Some(balance) = running.get(address) {
        return Ok(*balance);
    }
    let settled = snapshot.balance(address)?;
    running.insert(address.clone(), settled);
    Ok(settled)
}

fn credit(
    running: &mut BTreeMap<Address, u64>,
    snapshot: &Snapshot<'_>,
    address: &Address,
    amount: u64,
) -> Result<()> {
    let balance = running_balance(running, snapshot, address)?;
    let credited = balance
        .checked_add(amount)
        .ok_or_else(|| BlockchainError::Accounting(format!("Balance overflow for {address}")))?;
    running.insert(address.clone(), credited);
    Ok(())
}

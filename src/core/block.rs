use crate::core::constants::{
    FEE_THRESHOLD, GENESIS_PREV_HASH, GENESIS_REWARD, MINING_REWARD, STORAGE_FEE, STORAGE_SEED,
    TXS_LIMIT,
};
use crate::core::proof_of_work::{CancelToken, PowOutcome, ProofOfWork};
use crate::core::validation;
use crate::core::{Address, Snapshot, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::serialization::base64_bytes;
use crate::utils::{current_timestamp, hash_sum};
use crate::wallet::Wallet;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    difficulty: u8,
    #[serde(with = "base64_bytes")]
    prev_hash: Vec<u8>,
    miner: Address,
    transactions: Vec<Transaction>,
    balances: BTreeMap<Address, u64>, // balance of every touched address after this block
    timestamp: String,
    #[serde(with = "base64_bytes")]
    hash: Vec<u8>,
    #[serde(with = "base64_bytes")]
    signature: Vec<u8>,
    nonce: u64,
}

impl Block {
    /// Empty draft on top of `prev_hash`.
    pub fn new(miner: Address, prev_hash: &[u8], difficulty: u8) -> Block {
        Block {
            difficulty,
            prev_hash: prev_hash.to_vec(),
            miner,
            transactions: vec![],
            balances: BTreeMap::new(),
            timestamp: String::new(),
            hash: vec![],
            signature: vec![],
            nonce: 0,
        }
    }

    /// First block: seeds the storage account and credits `creator`. No
    /// transactions, no signature and no proof-of-work.
    pub fn genesis(creator: &Address, difficulty: u8) -> Result<Block> {
        let mut block = Block::new(creator.clone(), GENESIS_PREV_HASH.as_bytes(), difficulty);
        block.balances.insert(Address::storage(), STORAGE_SEED);
        block.balances.insert(creator.clone(), GENESIS_REWARD);
        block.timestamp = current_timestamp()?;
        block.hash = block.compute_hash();
        Ok(block)
    }

    /// Folds transaction hashes, then the overlay in address order, then the header.
    pub fn compute_hash(&self) -> Vec<u8> {
        let mut folded: Vec<u8> = vec![];
        for tx in &self.transactions {
            folded = hash_sum(&[&folded, tx.get_hash()]);
        }
        for (address, balance) in &self.balances {
            folded = hash_sum(&[&folded, address.as_bytes(), &balance.to_be_bytes()]);
        }
        hash_sum(&[
            &folded,
            &(self.difficulty as u64).to_be_bytes(),
            &self.prev_hash,
            self.miner.as_bytes(),
            self.timestamp.as_bytes(),
        ])
    }

    /// Admits `tx` into the draft, checking it against the running balance
    /// (overlay entry if present, settled balance at `snapshot` otherwise).
    /// A rejected transaction leaves the draft untouched.
    pub fn add_transaction(&mut self, snapshot: &Snapshot<'_>, tx: Transaction) -> Result<()> {
        if !self.hash.is_empty() {
            return Err(BlockchainError::Structural(
                "Block is already sealed".to_string(),
            ));
        }
        if tx.get_value() == 0 {
            return Err(BlockchainError::Structural(
                "Transaction value must be positive".to_string(),
            ));
        }
        if self.transactions.len() >= TXS_LIMIT && !tx.is_reward() {
            return Err(BlockchainError::Structural(format!(
                "Block already holds {TXS_LIMIT} transactions"
            )));
        }
        if snapshot.tail_hash()? != self.prev_hash {
            return Err(BlockchainError::Consensus(
                "Draft does not extend the chain tail".to_string(),
            ));
        }
        if self
            .transactions
            .iter()
            .any(|existing| existing.get_nonce() == tx.get_nonce())
        {
            return Err(BlockchainError::Structural(
                "Duplicate transaction nonce".to_string(),
            ));
        }
        if !tx.hash_is_valid() {
            return Err(BlockchainError::Authentication(
                "Transaction hash does not match its fields".to_string(),
            ));
        }
        if tx.is_reward() {
            if self.transactions.iter().any(|existing| existing.is_reward()) {
                return Err(BlockchainError::Structural(
                    "Block already holds a reward transaction".to_string(),
                ));
            }
            if tx.get_receiver() != &self.miner || tx.get_value() != MINING_REWARD || tx.get_fee() != 0
            {
                return Err(BlockchainError::Accounting(
                    "Reward transaction must pay the mining reward to the miner".to_string(),
                ));
            }
        } else if !tx.signature_is_valid() {
            return Err(BlockchainError::Authentication(
                "Transaction signature does not verify".to_string(),
            ));
        }
        if tx.get_value() > FEE_THRESHOLD && tx.get_fee() != STORAGE_FEE {
            return Err(BlockchainError::Accounting(format!(
                "Transfers above {FEE_THRESHOLD} must pay a fee of {STORAGE_FEE}"
            )));
        }

        let available = self.effective_balance(snapshot, tx.get_sender())?;
        let required = tx.get_cost();
        if available < required {
            return Err(BlockchainError::InsufficientFunds {
                required,
                available,
            });
        }

        // Stage every overlay change first so a failure here commits nothing.
        let mut staged: BTreeMap<Address, u64> = BTreeMap::new();
        staged.insert(tx.get_sender().clone(), available - required);
        self.stage_credit(snapshot, &mut staged, tx.get_receiver(), tx.get_value())?;
        self.stage_credit(snapshot, &mut staged, &Address::storage(), tx.get_fee())?;

        self.balances.extend(staged);
        self.transactions.push(tx);
        Ok(())
    }

    fn effective_balance(&self, snapshot: &Snapshot<'_>, address: &Address) -> Result<u64> {
        match self.balances.get(address) {
            Some(balance) => Ok(*balance),
            None => snapshot.balance(address),
        }
    }

    fn stage_credit(
        &self,
        snapshot: &Snapshot<'_>,
        staged: &mut BTreeMap<Address, u64>,
        address: &Address,
        amount: u64,
    ) -> Result<()> {
        let current = match staged.get(address) {
            Some(balance) => *balance,
            None => self.effective_balance(snapshot, address)?,
        };
        let credited = current
            .checked_add(amount)
            .ok_or_else(|| BlockchainError::Accounting(format!("Balance overflow for {address}")))?;
        staged.insert(address.clone(), credited);
        Ok(())
    }

    /// Seals the draft: mints the reward, stamps the time, hashes, signs and
    /// runs proof-of-work. The draft is only replaced on success, so an
    /// aborted or failed seal leaves it as it was.
    pub fn accept(
        &mut self,
        snapshot: &Snapshot<'_>,
        wallet: &Wallet,
        cancel: &CancelToken,
    ) -> Result<()> {
        if wallet.address() != self.miner {
            return Err(BlockchainError::Authentication(
                "Sealing wallet is not the block miner".to_string(),
            ));
        }
        validation::validate_transactions(self, snapshot)?;

        let mut sealed = self.clone();
        let reward = Transaction::reward(&sealed.miner, &sealed.prev_hash)?;
        sealed.add_transaction(snapshot, reward)?;
        sealed.timestamp = current_timestamp()?;
        sealed.hash = sealed.compute_hash();
        sealed.signature = wallet.sign(&sealed.hash)?;

        info!(
            "Starting proof-of-work for block with {} transactions (difficulty {})",
            sealed.transactions.len(),
            sealed.difficulty
        );
        match ProofOfWork::new(&sealed.hash, sealed.difficulty).run(cancel) {
            PowOutcome::Found(nonce) => sealed.nonce = nonce,
            PowOutcome::Aborted => {
                info!("Proof-of-work aborted");
                return Err(BlockchainError::Aborted);
            }
            PowOutcome::Exhausted => {
                return Err(BlockchainError::Consensus(
                    "No nonce meets the proof-of-work target".to_string(),
                ));
            }
        }
        info!(
            "Sealed block {} (nonce {})",
            crate::utils::base64_encode(&sealed.hash),
            sealed.nonce
        );

        *self = sealed;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(data: &str) -> Result<Block> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn get_difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn get_prev_hash(&self) -> &[u8] {
        self.prev_hash.as_slice()
    }

    pub fn get_miner(&self) -> &Address {
        &self.miner
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_balances(&self) -> &BTreeMap<Address, u64> {
        &self.balances
    }

    pub fn get_timestamp(&self) -> &str {
        self.timestamp.as_str()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }
}

/// Field access for tests that need to forge or corrupt blocks.
#[cfg(test)]
impl Block {
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }

    pub(crate) fn balances_mut(&mut self) -> &mut BTreeMap<Address, u64> {
        &mut self.balances
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: &str) {
        self.timestamp = timestamp.to_string();
    }

    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    pub(crate) fn set_difficulty(&mut self, difficulty: u8) {
        self.difficulty = difficulty;
    }

    /// Re-hashes, re-signs and re-mines after a field was changed.
    pub(crate) fn reseal(&mut self, wallet: &Wallet) {
        self.hash = self.compute_hash();
        self.signature = wallet.sign(&self.hash).unwrap();
        match ProofOfWork::new(&self.hash, self.difficulty).run(&CancelToken::new()) {
            PowOutcome::Found(nonce) => self.nonce = nonce,
            other => panic!("reseal did not find a nonce: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{test_chain, TEST_DIFFICULTY};

    #[test]
    fn test_genesis_allocations() {
        let creator = Wallet::new().unwrap().address();
        let genesis = Block::genesis(&creator, TEST_DIFFICULTY).unwrap();
        assert_eq!(genesis.get_prev_hash(), GENESIS_PREV_HASH.as_bytes());
        assert_eq!(genesis.get_balances()[&Address::storage()], STORAGE_SEED);
        assert_eq!(genesis.get_balances()[&creator], GENESIS_REWARD);
        assert!(genesis.get_transactions().is_empty());
        assert_eq!(genesis.get_hash(), genesis.compute_hash().as_slice());
    }

    #[test]
    fn test_overlay_scenario_with_and_without_fee() {
        let (chain, creator) = test_chain();
        let aaa = Wallet::new().unwrap().address();
        let bbb = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);

        block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, aaa.clone(), 5).unwrap())
            .unwrap();
        assert_eq!(block.get_balances()[&creator.address()], 95);
        assert_eq!(block.get_balances()[&aaa], 5);
        assert_eq!(block.get_balances()[&Address::storage()], 100);

        block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, bbb.clone(), 50).unwrap())
            .unwrap();
        assert_eq!(block.get_balances()[&creator.address()], 44);
        assert_eq!(block.get_balances()[&bbb], 50);
        assert_eq!(block.get_balances()[&Address::storage()], 101);
    }

    #[test]
    fn test_rejected_transaction_leaves_draft_untouched() {
        let (chain, creator) = test_chain();
        let receiver = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);

        let overdraft = Transaction::new(&creator, &tip, receiver.clone(), 100).unwrap();
        let err = block.add_transaction(&snapshot, overdraft).unwrap_err();
        assert_eq!(
            err,
            BlockchainError::InsufficientFunds {
                required: 101,
                available: 100
            }
        );
        assert!(block.get_transactions().is_empty());
        assert!(block.get_balances().is_empty());
    }

    #[test]
    fn test_running_balance_within_one_block() {
        let (chain, creator) = test_chain();
        let receiver = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);

        // 60 + 1 fee leaves 39, so a second transfer of 39 + 1 fee must fail.
        block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, receiver.clone(), 60).unwrap())
            .unwrap();
        let err = block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, receiver, 39).unwrap())
            .unwrap_err();
        assert!(matches!(err, BlockchainError::InsufficientFunds { available: 39, .. }));
    }

    #[test]
    fn test_limit_applies_to_user_transactions_only() {
        let (chain, creator) = test_chain();
        let receiver = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);

        for _ in 0..TXS_LIMIT {
            block
                .add_transaction(&snapshot, Transaction::new(&creator, &tip, receiver.clone(), 1).unwrap())
                .unwrap();
        }
        let err = block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, receiver, 1).unwrap())
            .unwrap_err();
        assert!(matches!(err, BlockchainError::Structural(_)));

        let reward = Transaction::reward(&creator.address(), &tip).unwrap();
        block.add_transaction(&snapshot, reward).unwrap();
        assert_eq!(block.get_transactions().len(), TXS_LIMIT + 1);
    }

    #[test]
    fn test_duplicate_nonce_and_fee_evasion_rejected() {
        let (chain, creator) = test_chain();
        let receiver = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);

        let first = Transaction::new(&creator, &tip, receiver.clone(), 1).unwrap();
        let mut copy = Transaction::new(&creator, &tip, receiver.clone(), 2).unwrap();
        copy.set_nonce(first.get_nonce());
        copy.reseal(&creator);
        block.add_transaction(&snapshot, first).unwrap();
        assert!(matches!(
            block.add_transaction(&snapshot, copy).unwrap_err(),
            BlockchainError::Structural(_)
        ));

        let mut evasive = Transaction::new(&creator, &tip, receiver, 50).unwrap();
        evasive.set_fee(0);
        evasive.reseal(&creator);
        assert!(matches!(
            block.add_transaction(&snapshot, evasive).unwrap_err(),
            BlockchainError::Accounting(_)
        ));
    }

    #[test]
    fn test_forged_and_foreign_reward_rejected() {
        let (chain, creator) = test_chain();
        let stranger = Wallet::new().unwrap();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);

        // Reward aimed at someone other than the miner.
        let foreign = Transaction::reward(&stranger.address(), &tip).unwrap();
        assert!(matches!(
            block.add_transaction(&snapshot, foreign).unwrap_err(),
            BlockchainError::Accounting(_)
        ));

        // Signed by someone other than the sender.
        let mut forged = Transaction::new(&creator, &tip, stranger.address(), 5).unwrap();
        forged.set_value(6);
        forged.reseal(&stranger);
        assert!(matches!(
            block.add_transaction(&snapshot, forged).unwrap_err(),
            BlockchainError::Authentication(_)
        ));
    }

    #[test]
    fn test_accept_seals_a_valid_block() {
        let (chain, creator) = test_chain();
        let receiver = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);
        block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, receiver, 5).unwrap())
            .unwrap();

        block.accept(&snapshot, &creator, &CancelToken::new()).unwrap();

        assert_eq!(block.get_transactions().len(), 2);
        assert!(block.get_transactions()[1].is_reward());
        assert_eq!(block.get_balances()[&creator.address()], 96);
        assert_eq!(block.get_balances()[&Address::storage()], 99);
        assert_eq!(block.get_hash(), block.compute_hash().as_slice());
        assert!(ProofOfWork::validate(block.get_hash(), TEST_DIFFICULTY, block.get_nonce()));
        validation::validate_block(&block, &snapshot).unwrap();
    }

    #[test]
    fn test_accept_rejects_empty_draft() {
        let (chain, creator) = test_chain();
        let snapshot = chain.snapshot().unwrap();
        let mut block = Block::new(creator.address(), &snapshot.tail_hash().unwrap(), TEST_DIFFICULTY);
        assert!(matches!(
            block.accept(&snapshot, &creator, &CancelToken::new()).unwrap_err(),
            BlockchainError::Structural(_)
        ));
    }

    #[test]
    fn test_aborted_accept_leaves_draft_unsealed() {
        let (chain, creator) = test_chain();
        let receiver = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);
        block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, receiver, 5).unwrap())
            .unwrap();
        let draft = block.clone();

        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            block.accept(&snapshot, &creator, &cancel).unwrap_err(),
            BlockchainError::Aborted
        );
        assert_eq!(block, draft);
        assert!(block.get_hash().is_empty());
    }

    #[test]
    fn test_json_round_trip_preserves_hash() {
        let (chain, creator) = test_chain();
        let receiver = Wallet::new().unwrap().address();
        let snapshot = chain.snapshot().unwrap();
        let tip = snapshot.tail_hash().unwrap();
        let mut block = Block::new(creator.address(), &tip, TEST_DIFFICULTY);
        block
            .add_transaction(&snapshot, Transaction::new(&creator, &tip, receiver, 20).unwrap())
            .unwrap();
        block.accept(&snapshot, &creator, &CancelToken::new()).unwrap();

        let decoded = Block::from_json(&block.to_json().unwrap()).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.compute_hash(), block.get_hash());
    }
}

use crate::core::constants::TXS_LIMIT;
use crate::core::{Address, Block, Blockchain, CancelToken, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::server::{send, OpCode, Package, REPLY_OK};
use crate::network::Nodes;
use crate::utils::base64_encode;
use crate::wallet::Wallet;
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// State a running node shares between its connection handlers and its
/// mining thread. Built once at startup and passed around as `Arc<NodeContext>`.
pub struct NodeContext {
    identity: Wallet,
    peers: Nodes,
    chain: Blockchain,
    draft: Mutex<Block>,
    mining: Mutex<Option<CancelToken>>, // set while a seal is running
}

impl NodeContext {
    pub fn new(identity: Wallet, chain: Blockchain, peers: Nodes) -> Result<Arc<NodeContext>> {
        let draft = chain.new_block(identity.address())?;
        Ok(Arc::new(NodeContext {
            identity,
            peers,
            chain,
            draft: Mutex::new(draft),
            mining: Mutex::new(None),
        }))
    }

    pub fn last_hash(&self) -> Result<Vec<u8>> {
        self.chain.last_hash()
    }

    pub fn balance_of(&self, address: &Address) -> Result<u64> {
        self.chain.balance_of(address)
    }

    pub fn chain_size(&self) -> Result<u64> {
        self.chain.size()
    }

    /// Block at `index` as JSON, `None` past the tail.
    pub fn block_at(&self, index: u64) -> Result<Option<String>> {
        match self.chain.block_at(index)? {
            Some(block) => Ok(Some(block.to_json()?)),
            None => Ok(None),
        }
    }

    /// Adds a transaction to the draft. Once the draft holds `TXS_LIMIT`
    /// transactions it is sealed on a worker thread.
    pub fn submit_transaction(self: &Arc<Self>, data: &str) -> Result<()> {
        let tx = Transaction::from_json(data)?;
        // Only the sealing node mints the reward.
        if tx.is_reward() {
            warn!("Rejected transaction: reward submitted by a client");
            return Err(BlockchainError::Structural(
                "Reward transactions cannot be submitted".to_string(),
            ));
        }
        let mut draft = self.lock_draft()?;
        let snapshot = self.chain.snapshot()?;
        if let Err(e) = draft.add_transaction(&snapshot, tx) {
            warn!("Rejected transaction: {e}");
            return Err(e);
        }
        let pending = draft
            .get_transactions()
            .iter()
            .filter(|tx| !tx.is_reward())
            .count();
        if pending >= TXS_LIMIT {
            self.start_mining(draft.clone())?;
        }
        Ok(())
    }

    /// Validates and appends a block mined elsewhere. A seal in progress here
    /// has lost the race, so it is cancelled and the draft starts over.
    pub fn receive_block(&self, data: &str) -> Result<()> {
        let block = Block::from_json(data)?;
        let mut draft = self.lock_draft()?;
        self.chain.add_block(&block)?;
        info!(
            "Accepted block {} from a peer",
            base64_encode(block.get_hash())
        );
        if let Some(cancel) = self.lock_mining()?.take() {
            cancel.cancel();
        }
        *draft = self.chain.new_block(self.identity.address())?;
        Ok(())
    }

    fn reset_draft(&self) -> Result<()> {
        let mut draft = self.lock_draft()?;
        *draft = self.chain.new_block(self.identity.address())?;
        Ok(())
    }

    fn start_mining(self: &Arc<Self>, block: Block) -> Result<()> {
        let mut mining = self.lock_mining()?;
        if mining.is_some() {
            return Ok(());
        }
        let cancel = CancelToken::new();
        *mining = Some(cancel.clone());

        let context = Arc::clone(self);
        thread::spawn(move || {
            if let Err(e) = context.mine(block, &cancel) {
                warn!("Mining stopped: {e}");
                // A failed seal would otherwise leave a full draft behind.
                if !cancel.is_cancelled() {
                    if let Err(e) = context.reset_draft() {
                        warn!("Failed to reset draft: {e}");
                    }
                }
            }
            if let Ok(mut mining) = context.lock_mining() {
                // A newer seal may already own the slot.
                if mining.as_ref().is_some_and(|current| current.same_as(&cancel)) {
                    *mining = None;
                }
            }
        });
        Ok(())
    }

    fn mine(&self, mut block: Block, cancel: &CancelToken) -> Result<()> {
        {
            let snapshot = self.chain.snapshot()?;
            block.accept(&snapshot, &self.identity, cancel)?;
        }

        let mut draft = self.lock_draft()?;
        if cancel.is_cancelled() {
            return Err(BlockchainError::Aborted);
        }
        self.chain.add_block(&block)?;
        *draft = self.chain.new_block(self.identity.address())?;
        drop(draft);

        self.broadcast(&block)
    }

    /// Pushes `block` to every known peer. Unreachable peers are only logged.
    fn broadcast(&self, block: &Block) -> Result<()> {
        let pkg = Package::new(OpCode::AddBlock, block.to_json()?);
        for node in self.peers.get_nodes() {
            match send(node.get_addr(), &pkg) {
                Ok(reply) if reply.data == REPLY_OK => {
                    info!("Peer {} accepted the block", node.get_addr())
                }
                Ok(reply) => warn!("Peer {} refused the block: {}", node.get_addr(), reply.data),
                Err(e) => warn!("Failed to push block to {}: {e}", node.get_addr()),
            }
        }
        Ok(())
    }

    fn lock_draft(&self) -> Result<MutexGuard<'_, Block>> {
        self.draft
            .lock()
            .map_err(|_| BlockchainError::Database("Draft block lock poisoned".to_string()))
    }

    fn lock_mining(&self) -> Result<MutexGuard<'_, Option<CancelToken>>> {
        self.mining
            .lock()
            .map_err(|_| BlockchainError::Database("Mining state lock poisoned".to_string()))
    }

    /// Blocks until the running seal, if any, has finished.
    #[cfg(test)]
    pub(crate) fn wait_for_mining(&self) {
        while self.mining.lock().unwrap().is_some() {
            thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::network::NodeContext;
use crate::utils::base64_encode;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TCP_WRITE_TIMEOUT: u64 = 5000;
const TCP_READ_TIMEOUT: u64 = 60;

/// Reply to a successful `AddTransaction` or `AddBlock`.
pub const REPLY_OK: &str = "ok";

/// Request kinds a node answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCode {
    /// `data` is a decimal block index; reply is the block JSON or empty.
    GetBlock,
    /// Reply is the base64 hash of the last block.
    GetLastHash,
    /// `data` is a transaction JSON; reply is `ok` or the rejection reason.
    AddTransaction,
    /// `data` is an address; reply is the decimal balance.
    GetBalance,
    /// `data` is a block JSON pushed by the peer that mined it.
    AddBlock,
    /// Reply is the decimal number of blocks.
    GetChainSize,
}

/// One request or one response. Every connection carries exactly one of each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub option: OpCode,
    pub data: String,
}

impl Package {
    pub fn new(option: OpCode, data: impl Into<String>) -> Package {
        Package {
            option,
            data: data.into(),
        }
    }
}

pub struct Server {
    context: Arc<NodeContext>,
}

impl Server {
    pub fn new(context: Arc<NodeContext>) -> Self {
        Self { context }
    }

    /// Accepts connections forever, one handler thread per connection.
    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        info!("Server listening on {addr}");
        self.serve(listener);
        Ok(())
    }

    pub(crate) fn serve(&self, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };
                    let context = Arc::clone(&self.context);
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(&context, stream, peer_addr) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
    }

    fn handle_connection(
        context: &Arc<NodeContext>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_secs(TCP_READ_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let request = Deserializer::from_reader(reader)
            .into_iter::<Package>()
            .next()
            .ok_or_else(|| BlockchainError::Network("Connection closed before request".to_string()))?
            .map_err(|e| BlockchainError::Network(format!("Failed to deserialize package: {e}")))?;
        info!("Received {:?} from {peer_addr}", request.option);

        let response = Package::new(request.option, Self::process_request(context, &request));
        serde_json::to_writer(&stream, &response)
            .map_err(|e| BlockchainError::Network(format!("Failed to send response: {e}")))?;
        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    /// Answers `request`. Rejections are reported in the reply text.
    fn process_request(context: &Arc<NodeContext>, request: &Package) -> String {
        let result = match request.option {
            OpCode::GetBlock => Self::handle_get_block(context, &request.data),
            OpCode::GetLastHash => context.last_hash().map(|hash| base64_encode(&hash)),
            OpCode::AddTransaction => context
                .submit_transaction(&request.data)
                .map(|_| REPLY_OK.to_string()),
            OpCode::GetBalance => Self::handle_get_balance(context, &request.data),
            OpCode::AddBlock => context
                .receive_block(&request.data)
                .map(|_| REPLY_OK.to_string()),
            OpCode::GetChainSize => context.chain_size().map(|size| size.to_string()),
        };
        result.unwrap_or_else(|e| {
            info!("{:?} request failed: {e}", request.option);
            format!("fail: {e}")
        })
    }

    fn handle_get_block(context: &NodeContext, data: &str) -> Result<String> {
        let index: u64 = data
            .trim()
            .parse()
            .map_err(|e| BlockchainError::Structural(format!("Invalid block index {data:?}: {e}")))?;
        Ok(context.block_at(index)?.unwrap_or_default())
    }

    fn handle_get_balance(context: &NodeContext, data: &str) -> Result<String> {
        let address = data.trim().parse()?;
        Ok(context.balance_of(&address)?.to_string())
    }
}

/// Sends `pkg` to `addr` and waits for the single reply.
pub fn send(addr: &str, pkg: &Package) -> Result<Package> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?;
    let mut stream =
        TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_WRITE_TIMEOUT))
            .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(TCP_READ_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

    serde_json::to_writer(&stream, pkg)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data: {e}")))?;
    stream.flush()?;
    stream
        .shutdown(Shutdown::Write)
        .map_err(|e| BlockchainError::Network(format!("Failed to finish request: {e}")))?;

    serde_json::from_reader(BufReader::new(&stream))
        .map_err(|e| BlockchainError::Network(format!("Failed to read reply from {addr}: {e}")))
}

/// Asks `addr` for the block at `index`. `None` once `index` is past its tail.
pub fn fetch_block(addr: &str, index: u64) -> Result<Option<Block>> {
    let reply = send(addr, &Package::new(OpCode::GetBlock, index.to_string()))?;
    if reply.data.is_empty() {
        return Ok(None);
    }
    if reply.data.starts_with("fail") {
        return Err(BlockchainError::Network(reply.data));
    }
    Ok(Some(Block::from_json(&reply.data)?))
}

/// Walks a peer's chain from genesis until it runs out of blocks.
pub fn fetch_chain(addr: &str) -> Result<Vec<Block>> {
    let mut blocks = vec![];
    while let Some(block) = fetch_block(addr, blocks.len() as u64)? {
        blocks.push(block);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, Transaction};
    use crate::network::Nodes;
    use crate::testnet::{sealed_block, test_chain};
    use crate::wallet::Wallet;

    fn spawn_server(context: Arc<NodeContext>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || Server::new(context).serve(listener));
        addr
    }

    #[test]
    fn test_package_wire_format() {
        let pkg = Package::new(OpCode::GetBalance, "STORAGE-CHAIN");
        let json = serde_json::to_string(&pkg).unwrap();
        assert_eq!(json, r#"{"option":"GetBalance","data":"STORAGE-CHAIN"}"#);
        assert_eq!(serde_json::from_str::<Package>(&json).unwrap(), pkg);
        assert!(serde_json::from_str::<Package>(r#"{"option":"Mine","data":""}"#).is_err());
    }

    #[test]
    fn test_queries_over_tcp() {
        let (chain, creator) = test_chain();
        let context = NodeContext::new(creator.clone(), chain.clone(), Nodes::new()).unwrap();
        let addr = spawn_server(context);

        let size = send(&addr, &Package::new(OpCode::GetChainSize, "")).unwrap();
        assert_eq!(size.data, "1");

        let hash = send(&addr, &Package::new(OpCode::GetLastHash, "")).unwrap();
        assert_eq!(hash.data, base64_encode(&chain.last_hash().unwrap()));

        let balance = send(
            &addr,
            &Package::new(OpCode::GetBalance, creator.address().to_string()),
        )
        .unwrap();
        assert_eq!(balance.data, "100");

        let genesis = send(&addr, &Package::new(OpCode::GetBlock, "0")).unwrap();
        assert_eq!(
            Block::from_json(&genesis.data).unwrap(),
            chain.block_at(0).unwrap().unwrap()
        );
        let missing = send(&addr, &Package::new(OpCode::GetBlock, "7")).unwrap();
        assert!(missing.data.is_empty());

        let garbled = send(&addr, &Package::new(OpCode::GetBalance, "not-an-address")).unwrap();
        assert!(garbled.data.starts_with("fail"));
    }

    #[test]
    fn test_submit_transaction_over_tcp() {
        let (chain, creator) = test_chain();
        let context = NodeContext::new(creator.clone(), chain.clone(), Nodes::new()).unwrap();
        let addr = spawn_server(Arc::clone(&context));

        let receiver = Wallet::new().unwrap().address();
        let tx = Transaction::new(&creator, &chain.last_hash().unwrap(), receiver, 5).unwrap();
        let reply = send(&addr, &Package::new(OpCode::AddTransaction, tx.to_json().unwrap())).unwrap();
        assert_eq!(reply.data, REPLY_OK);

        let overdraft =
            Transaction::new(&creator, &chain.last_hash().unwrap(), Address::storage(), 500).unwrap();
        let reply = send(
            &addr,
            &Package::new(OpCode::AddTransaction, overdraft.to_json().unwrap()),
        )
        .unwrap();
        assert!(reply.data.starts_with("fail"));
    }

    #[test]
    fn test_pushed_block_is_appended() {
        let (chain, creator) = test_chain();
        let context = NodeContext::new(creator.clone(), chain.clone(), Nodes::new()).unwrap();
        let addr = spawn_server(context);

        let block = sealed_block(&chain, &creator, &[5]);
        let reply = send(&addr, &Package::new(OpCode::AddBlock, block.to_json().unwrap())).unwrap();
        assert_eq!(reply.data, REPLY_OK);
        assert_eq!(chain.size().unwrap(), 2);

        let replay = send(&addr, &Package::new(OpCode::AddBlock, block.to_json().unwrap())).unwrap();
        assert!(replay.data.starts_with("fail"));
        assert_eq!(chain.size().unwrap(), 2);
    }

    #[test]
    fn test_fetch_chain_walks_remote_blocks() {
        let (chain, creator) = test_chain();
        let block = sealed_block(&chain, &creator, &[5]);
        chain.add_block(&block).unwrap();
        let context = NodeContext::new(creator.clone(), chain.clone(), Nodes::new()).unwrap();
        let addr = spawn_server(context);

        let blocks = fetch_chain(&addr).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], chain.block_at(0).unwrap().unwrap());
        assert_eq!(blocks[1], block);
        assert!(fetch_block(&addr, 2).unwrap().is_none());
    }
}

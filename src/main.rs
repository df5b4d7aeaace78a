use clap::Parser;
use log::{error, info, LevelFilter};
use powledger::core::constants::DIFFICULTY;
use powledger::{
    base64_decode, base64_encode, fetch_chain, send, Address, Block, Blockchain, BlockchainError,
    Command, Config, LedgerStore, NodeContext, Nodes, OpCode, Opt, Package, Result, Server,
    SledLedger, Transaction, Wallet, Wallets, REPLY_OK,
};
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<()> {
    let config = Config::load(opt.config.as_deref())?;
    match opt.command {
        Command::Createwallet { name } => {
            let mut wallets = Wallets::open(&config.wallet_file)?;
            let address = wallets.create_wallet(&name)?;
            println!("Your new address: {address}");
        }
        Command::Address { name } => {
            let wallets = Wallets::open(&config.wallet_file)?;
            let name = user_name(&config, name)?;
            println!("{}", wallets.get_wallet(&name)?.address());
        }
        Command::ListWallets => {
            let wallets = Wallets::open(&config.wallet_file)?;
            for name in wallets.get_names() {
                println!("{name}: {}", wallets.get_wallet(&name)?.address());
            }
        }
        Command::Createchain { name } => {
            let wallets = Wallets::open(&config.wallet_file)?;
            let creator = wallets.get_wallet(&user_name(&config, name)?)?.address();
            let chain = Blockchain::create(open_store(&config)?, &creator, DIFFICULTY)?;
            println!(
                "Chain at {} has {} block(s), tail {}",
                config.chain_path().display(),
                chain.size()?,
                base64_encode(&chain.last_hash()?)
            );
        }
        Command::StartNode { name } => {
            let wallets = Wallets::open(&config.wallet_file)?;
            let identity = wallets.get_wallet(&user_name(&config, name)?)?.clone();
            let chain = Blockchain::open(open_store(&config)?, DIFFICULTY)?;
            let peers: Nodes = config.peer_list().into_iter().collect();
            info!(
                "Starting node {} as {} with {} peer(s)",
                config.node_addr,
                identity.address(),
                peers.len()
            );
            let context = NodeContext::new(identity, chain, peers)?;
            Server::new(context).run(&config.node_addr)?;
        }
        Command::Send { from, to, value } => {
            let wallets = Wallets::open(&config.wallet_file)?;
            let sender = wallets.get_wallet(&user_name(&config, from)?)?;
            let receiver: Address = to.parse()?;
            for peer in config.peer_list() {
                match submit_to_peer(&peer, sender, &receiver, value) {
                    Ok(()) => println!("ok: ({peer})"),
                    Err(e) => println!("fail: ({peer}) {e}"),
                }
            }
        }
        Command::Balance { address } => {
            let address: Address = address.parse()?;
            for peer in config.peer_list() {
                match send(&peer, &Package::new(OpCode::GetBalance, address.to_string())) {
                    Ok(reply) => println!("Balance ({peer}): {}", reply.data),
                    Err(e) => println!("Balance ({peer}): unreachable, {e}"),
                }
            }
        }
        Command::Printchain { peer: Some(peer) } => {
            for (position, block) in fetch_chain(&peer)?.iter().enumerate() {
                print_block(position, block);
            }
        }
        Command::Printchain { peer: None } => {
            let chain = Blockchain::open(open_store(&config)?, DIFFICULTY)?;
            for (position, block) in chain.iter()?.enumerate() {
                print_block(position, &block?);
            }
        }
    }
    Ok(())
}

fn user_name(config: &Config, name: Option<String>) -> Result<String> {
    name.or_else(|| config.user.clone()).ok_or_else(|| {
        BlockchainError::Config("No wallet name given and no user configured".to_string())
    })
}

fn open_store(config: &Config) -> Result<Arc<dyn LedgerStore>> {
    Ok(Arc::new(SledLedger::open(&config.chain_path())?))
}

/// Builds the transfer against the peer's own tail and submits it there.
fn submit_to_peer(
    peer: &str,
    sender: &Wallet,
    receiver: &Address,
    value: u64,
) -> Result<()> {
    let tail = send(peer, &Package::new(OpCode::GetLastHash, ""))?;
    let tail_hash = base64_decode(&tail.data)?;
    let tx = Transaction::new(sender, &tail_hash, receiver.clone(), value)?;
    let reply = send(peer, &Package::new(OpCode::AddTransaction, tx.to_json()?))?;
    if reply.data != REPLY_OK {
        return Err(BlockchainError::Network(reply.data));
    }
    Ok(())
}

fn print_block(position: usize, block: &Block) {
    println!("[{position}] {}", base64_encode(block.get_hash()));
    println!("  prev hash: {}", base64_encode(block.get_prev_hash()));
    println!("  miner:     {}", block.get_miner());
    println!("  time:      {}", block.get_timestamp());
    println!("  nonce:     {}", block.get_nonce());
    for tx in block.get_transactions() {
        println!(
            "  - {} -> {}: {} (fee {})",
            tx.get_sender(),
            tx.get_receiver(),
            tx.get_value(),
            tx.get_fee()
        );
    }
    for (address, balance) in block.get_balances() {
        println!("  = {address}: {balance}");
    }
    println!();
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "powledger", about = "Account-based proof-of-work ledger node and client")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new named wallet")]
    Createwallet {
        #[arg(help = "Wallet name")]
        name: String,
    },
    #[command(name = "address", about = "Print the address of a wallet")]
    Address {
        #[arg(help = "Wallet name (defaults to the configured user)")]
        name: Option<String>,
    },
    #[command(name = "listwallets", about = "Print local wallet names and addresses")]
    ListWallets,
    #[command(
        name = "createchain",
        about = "Create this node's chain, crediting the genesis allocation to a wallet"
    )]
    Createchain {
        #[arg(help = "Wallet name (defaults to the configured user)")]
        name: Option<String>,
    },
    #[command(name = "startnode", about = "Serve the chain and mine with a wallet")]
    StartNode {
        #[arg(help = "Wallet name (defaults to the configured user)")]
        name: Option<String>,
    },
    #[command(name = "send", about = "Submit a transfer to every configured peer")]
    Send {
        #[arg(long = "from", help = "Sending wallet name (defaults to the configured user)")]
        from: Option<String>,
        #[arg(help = "Destination address")]
        to: String,
        #[arg(help = "Amount to send")]
        value: u64,
    },
    #[command(name = "balance", about = "Ask every configured peer for a balance")]
    Balance {
        #[arg(help = "Address to look up")]
        address: String,
    },
    #[command(
        name = "printchain",
        about = "Print all blocks of the local chain, or of a peer's chain with --peer"
    )]
    Printchain {
        #[arg(long = "peer", help = "Node address to read the chain from")]
        peer: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_with_global_config() {
        let opt = Opt::try_parse_from([
            "powledger",
            "send",
            "--from",
            "alice",
            "STORAGE-CHAIN",
            "12",
            "--config",
            "node.toml",
        ])
        .unwrap();
        assert_eq!(opt.config, Some(PathBuf::from("node.toml")));
        match opt.command {
            Command::Send { from, to, value } => {
                assert_eq!(from.as_deref(), Some("alice"));
                assert_eq!(to, "STORAGE-CHAIN");
                assert_eq!(value, 12);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_value_must_be_numeric() {
        assert!(Opt::try_parse_from(["powledger", "send", "STORAGE-CHAIN", "lots"]).is_err());
    }

    #[test]
    fn test_printchain_peer_is_optional() {
        let opt = Opt::try_parse_from(["powledger", "printchain"]).unwrap();
        assert!(matches!(opt.command, Command::Printchain { peer: None }));

        let opt =
            Opt::try_parse_from(["powledger", "printchain", "--peer", "127.0.0.1:2002"]).unwrap();
        match opt.command {
            Command::Printchain { peer } => assert_eq!(peer.as_deref(), Some("127.0.0.1:2002")),
            other => panic!("unexpected command {other:?}"),
        }
    }
}

//! Node networking
//!
//! One JSON request and one JSON reply per TCP connection. Handlers call into
//! a shared [`NodeContext`], which owns the chain, the draft block and the
//! mining thread.

pub mod context;
pub mod node;
pub mod server;

pub use context::NodeContext;
pub use node::{Node, Nodes};
pub use server::{fetch_block, fetch_chain, send, OpCode, Package, Server, REPLY_OK};

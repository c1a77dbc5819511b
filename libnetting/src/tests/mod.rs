//! Scenario tests that run several nodes against a shared in-memory ledger.


use crate::amount::TokenAmount;
use crate::config::NettingConfig;
use crate::crypto::{Address, KeyPair};
use crate::ledger::InMemoryLedger;
use crate::node::NettingNode;
use std::sync::Arc;

pub const ASSET: Address = Address::new([0x42; 20]);
pub const SETTLE_TIMEOUT: u64 = 10;

pub type TestNode = NettingNode<InMemoryLedger>;

pub fn test_config() -> NettingConfig {
    NettingConfig { settle_timeout: SETTLE_TIMEOUT, reveal_timeout: 3, default_lock_expiration: 8, channel_dir: None }
}

pub fn node(name: &str, ledger: &Arc<InMemoryLedger>) -> TestNode {
    NettingNode::new(KeyPair::from_seed(name.as_bytes()), Arc::clone(ledger), test_config()).expect("valid config")
}

/// Opens a channel from `a` to `b` with equal deposits and returns its address.
pub async fn connect(a: &TestNode, b: &TestNode, deposit: u64) -> Address {
    let deposit = TokenAmount::new(deposit);
    let channel = a.open_channel(ASSET, *b.public_key(), deposit, deposit).await.expect("channel to open");
    b.join_channel(ASSET, channel).await.expect("partner to join");
    channel
}

//! Two-party scenarios played against an in-memory ledger.

use anyhow::anyhow;
use libnetting::amount::TokenAmount;
use libnetting::config::NettingConfig;
use libnetting::crypto::{Address, KeyPair, Secret};
use libnetting::ledger::{InMemoryLedger, Ledger, NettingContract};
use libnetting::node::NettingNode;
use libnetting::transfer::BlockHeight;
use log::*;
use prettytable::{row, Table};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

pub const SCENARIO_ASSET: Address = Address::new([0xee; 20]);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Alice,
    Bob,
}

impl Party {
    pub fn other(self) -> Self {
        match self {
            Party::Alice => Party::Bob,
            Party::Bob => Party::Alice,
        }
    }
}

impl Display for Party {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Party::Alice => write!(f, "alice"),
            Party::Bob => write!(f, "bob"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Direct { from: Party, amount: u64 },
    Locked { from: Party, amount: u64, secret: String, expiration: Option<BlockHeight> },
    Reveal { to: Party, secret: String },
    Close { by: Party },
    Update { by: Party },
    Unlock { by: Party },
    Wait(u64),
    Settle,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Direct { from, amount } => write!(f, "{from} pays {amount}"),
            Step::Locked { from, amount, secret, .. } => write!(f, "{from} locks {amount} under \"{secret}\""),
            Step::Reveal { to, secret } => write!(f, "{to} learns \"{secret}\""),
            Step::Close { by } => write!(f, "{by} closes"),
            Step::Update { by } => write!(f, "{by} updates"),
            Step::Unlock { by } => write!(f, "{by} unlocks"),
            Step::Wait(blocks) => write!(f, "wait {blocks} blocks"),
            Step::Settle => write!(f, "settle"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Alice's and Bob's deposits.
    pub deposits: [u64; 2],
    /// Written as single-key maps (`- close: { by: alice }`) rather than YAML tags.
    #[serde(with = "serde_yml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let scenario = serde_yml::from_reader(reader)?;
        Ok(scenario)
    }
}

/// The state after one step, as each participant sees it.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub step: Step,
    pub block: BlockHeight,
    pub alice: Option<TokenAmount>,
    pub bob: Option<TokenAmount>,
}

pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    pub record: NettingContract,
    pub alice: Address,
    pub bob: Address,
}

impl ScenarioReport {
    pub fn netted(&self, party: Party) -> Option<TokenAmount> {
        let address = match party {
            Party::Alice => self.alice,
            Party::Bob => self.bob,
        };
        self.record.netted(&address)
    }

    pub fn steps_table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row!["#", "Step", "Block", "Alice", "Bob"]);
        for (i, outcome) in self.outcomes.iter().enumerate() {
            table.add_row(row![
                i + 1,
                outcome.step,
                outcome.block,
                show(outcome.alice),
                show(outcome.bob)
            ]);
        }
        table
    }

    pub fn record_table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row!["Participant", "Deposit", "Transferred", "Nonce", "Unlocked", "Netted"]);
        for p in self.record.participants() {
            table.add_row(row![
                p.address,
                p.deposit,
                p.transferred_amount,
                p.nonce,
                p.unlocked_amount(),
                show(p.netted)
            ]);
        }
        table
    }
}

fn show(amount: Option<TokenAmount>) -> String {
    amount.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string())
}

type Node = NettingNode<InMemoryLedger>;

struct Simulation {
    ledger: Arc<InMemoryLedger>,
    alice: Node,
    bob: Node,
    channel: Address,
}

impl Simulation {
    async fn new(deposits: [u64; 2], config: NettingConfig) -> Result<Self, anyhow::Error> {
        let ledger = Arc::new(InMemoryLedger::new());
        let alice = NettingNode::new(KeyPair::from_seed(b"alice"), Arc::clone(&ledger), config.clone())?;
        let bob = NettingNode::new(KeyPair::from_seed(b"bob"), Arc::clone(&ledger), config)?;
        let [ours, theirs] = deposits.map(TokenAmount::new);
        let channel = alice.open_channel(SCENARIO_ASSET, *bob.public_key(), ours, theirs).await?;
        bob.join_channel(SCENARIO_ASSET, channel).await?;
        Ok(Simulation { ledger, alice, bob, channel })
    }

    fn node(&self, party: Party) -> &Node {
        match party {
            Party::Alice => &self.alice,
            Party::Bob => &self.bob,
        }
    }

    async fn run_step(&self, step: &Step) -> Result<(), anyhow::Error> {
        let asset = SCENARIO_ASSET;
        match step {
            Step::Direct { from, amount } => {
                let (sender, receiver) = (self.node(*from), self.node(from.other()));
                let signed = sender.send_direct(asset, receiver.address(), TokenAmount::new(*amount)).await?;
                receiver.receive(sender.address(), &signed).await?;
            }
            Step::Locked { from, amount, secret, expiration } => {
                let (sender, receiver) = (self.node(*from), self.node(from.other()));
                let hashlock = Secret::from(secret.as_str()).hashlock();
                let amount = TokenAmount::new(*amount);
                let signed = sender.send_locked(asset, receiver.address(), amount, hashlock, *expiration).await?;
                receiver.receive(sender.address(), &signed).await?;
            }
            Step::Reveal { to, secret } => {
                let affected = self.node(*to).register_secret(&Secret::from(secret.as_str())).await;
                if affected.is_empty() {
                    warn!("{to} has no lock that \"{secret}\" opens");
                }
            }
            Step::Close { by } => self.node(*by).close(asset, self.node(by.other()).address()).await?,
            Step::Update { by } => self.node(*by).update_transfer(asset, self.node(by.other()).address()).await?,
            Step::Unlock { by } => {
                let count = self.node(*by).unlock(asset, self.node(by.other()).address()).await?;
                debug!("{by} submitted {count} unlock(s)");
            }
            Step::Wait(blocks) => {
                self.ledger.mine(*blocks).await;
            }
            Step::Settle => {
                self.alice.settle(asset, self.bob.address()).await?;
                self.bob.settle(asset, self.alice.address()).await?;
            }
        }
        Ok(())
    }

    /// A participant's balance, or its netted amount once the channel is settled.
    async fn balance_of(&self, party: Party) -> Option<TokenAmount> {
        let node = self.node(party);
        let partner = self.node(party.other()).address();
        match node.balance(SCENARIO_ASSET, partner).await {
            Ok(balance) => Some(balance),
            Err(_) => {
                let record = self.ledger.channel_record(SCENARIO_ASSET, self.channel).await.ok()?;
                record.netted(&node.address())
            }
        }
    }
}

/// Plays `scenario` from an empty ledger. Stops at the first step that fails.
pub async fn run(scenario: &Scenario, config: NettingConfig) -> Result<ScenarioReport, anyhow::Error> {
    let sim = Simulation::new(scenario.deposits, config).await?;
    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (i, step) in scenario.steps.iter().enumerate() {
        info!("Step {}: {step}", i + 1);
        sim.run_step(step).await.map_err(|e| anyhow!("Step {} ({step}) failed: {e}", i + 1))?;
        outcomes.push(StepOutcome {
            step: step.clone(),
            block: sim.ledger.current_block().await,
            alice: sim.balance_of(Party::Alice).await,
            bob: sim.balance_of(Party::Bob).await,
        });
    }
    let record = sim.ledger.channel_record(SCENARIO_ASSET, sim.channel).await?;
    Ok(ScenarioReport { outcomes, record, alice: sim.alice.address(), bob: sim.bob.address() })
}

#[cfg(test)]
mod test {
    use super::*;
    use libnetting::ledger::SettlementState;

    const SETTLEMENT: &str = r#"
deposits: [100, 100]
steps:
  - locked: { from: alice, amount: 10, secret: "secret", expiration: 10 }
  - reveal: { to: bob, secret: "secret" }
  - close: { by: alice }
  - update: { by: bob }
  - unlock: { by: bob }
  - wait: 50
  - settle
"#;

    #[tokio::test]
    async fn settlement_scenario() {
        env_logger::try_init().ok();
        let scenario: Scenario = serde_yml::from_str(SETTLEMENT).unwrap();
        assert_eq!(scenario.steps.len(), 7);
        assert_eq!(scenario.steps[6], Step::Settle);
        let report = run(&scenario, NettingConfig::default()).await.unwrap();
        assert_eq!(report.record.state(), SettlementState::Settled);
        assert_eq!(report.netted(Party::Alice), Some(TokenAmount::new(90)));
        assert_eq!(report.netted(Party::Bob), Some(TokenAmount::new(110)));
        let last = report.outcomes.last().unwrap();
        assert_eq!(last.alice, Some(TokenAmount::new(90)));
        assert_eq!(report.steps_table().len(), 7);
        assert_eq!(report.record_table().len(), 2);
    }

    #[tokio::test]
    async fn shipped_scenarios_play_out() {
        env_logger::try_init().ok();
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        let mut loaded = 0;
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            let scenario = Scenario::load(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
            assert!(!scenario.steps.is_empty());
            loaded += 1;
        }
        assert_eq!(loaded, 2);

        let settlement = Scenario::load(dir.join("settlement.yml")).unwrap();
        let report = run(&settlement, NettingConfig::default()).await.unwrap();
        assert_eq!(report.netted(Party::Alice), Some(TokenAmount::new(95)));
        assert_eq!(report.netted(Party::Bob), Some(TokenAmount::new(105)));

        let expired = Scenario::load(dir.join("expired_lock.yml")).unwrap();
        assert_eq!(expired.steps[3], Step::Wait(50));
        let err = run(&expired, NettingConfig::default()).await.err().unwrap();
        assert!(err.to_string().starts_with("Step 6 (bob unlocks) failed"));
    }

    #[test]
    fn steps_read_from_single_key_maps() {
        let yaml = "deposits: [1, 2]\nsteps:\n  - direct: { from: bob, amount: 1 }\n  - wait: 3\n  - settle\n";
        let scenario: Scenario = serde_yml::from_str(yaml).unwrap();
        assert_eq!(scenario.steps, vec![Step::Direct { from: Party::Bob, amount: 1 }, Step::Wait(3), Step::Settle]);
    }

    #[tokio::test]
    async fn failing_step_is_reported() {
        let scenario = Scenario { deposits: [10, 10], steps: vec![Step::Direct { from: Party::Bob, amount: 11 }] };
        let err = run(&scenario, NettingConfig::default()).await.err().unwrap();
        assert!(err.to_string().starts_with("Step 1 (bob pays 11) failed"));
    }
}

use std::{
    sync::{
        mpsc::{self, Receiver},
        Arc,
    },
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use ledger_consensus::{
    consensus::{ConsensusEngine, ConsensusParameters, ThresholdQuorum},
    events::Event,
    ledger::snapshot::Ledger,
    networking::network::Network,
    types::{
        data_types::{CryptoHash, LedgerSequence, NetClockTime},
        validator_set::ValidatorSet,
    },
};

use super::{
    fetcher::SharedFetcher,
    fixtures::GENESIS_CLOSE_TIME,
    network::{mock_network, NetworkStub},
};

/// Duration of one simulated tick.
pub(crate) const TICK: Duration = Duration::from_millis(100);

/// A consensus engine, the network it receives through, and every event it has published so far.
pub(crate) struct SimNode {
    pub(crate) engine: ConsensusEngine<NetworkStub>,
    network: NetworkStub,
    event_subscriber: Receiver<Event>,
    pub(crate) events: Vec<Event>,
}

impl SimNode {
    /// Hash of the ledger with sequence `seq` that this node accepted, if it has.
    pub(crate) fn accepted(&self, seq: LedgerSequence) -> Option<CryptoHash> {
        self.events.iter().find_map(|event| match event {
            Event::AcceptLedger(accept_ledger_event) if accept_ledger_event.sequence() == seq => {
                Some(accept_ledger_event.hash())
            }
            _ => None,
        })
    }

    /// The ledgers this node switched from and to.
    pub(crate) fn switches(&self) -> Vec<(CryptoHash, CryptoHash)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::SwitchLedger(switch_ledger_event) => {
                    Some((switch_ledger_event.from, switch_ledger_event.to))
                }
                _ => None,
            })
            .collect()
    }

    pub(crate) fn went_wrong_ledger(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, Event::WrongLedger(_)))
    }

    fn collect_events(&mut self) {
        while let Ok(event) = self.event_subscriber.try_recv() {
            self.events.push(event);
        }
    }
}

/// Drives a group of engines with a simulated clock. Every engine runs on the test thread, and every
/// message is delivered by the next tick.
pub(crate) struct Simulation {
    pub(crate) nodes: Vec<SimNode>,
    start: Instant,
    elapsed: Duration,
}

impl Simulation {
    /// Start one engine for each of `keys`, the `i`-th one on `genesis[i]`. Every engine trusts
    /// `validators`, and shares one node store.
    pub(crate) fn new(
        keys: Vec<SigningKey>,
        genesis: Vec<Ledger>,
        validators: ValidatorSet,
        params: ConsensusParameters,
    ) -> Simulation {
        let start = Instant::now();
        let fetcher = SharedFetcher::new();
        let networks = mock_network(keys.iter().map(|key| key.verifying_key()));

        let nodes = keys
            .into_iter()
            .zip(networks)
            .zip(genesis)
            .map(|((key, network), genesis)| {
                let (event_publisher, event_subscriber) = mpsc::channel();
                let engine = ConsensusEngine::new(
                    key,
                    true,
                    params.clone(),
                    0,
                    network.clone(),
                    Box::new(fetcher.clone()),
                    Box::new(ThresholdQuorum::new(params.quorum_percent)),
                    Arc::new(genesis),
                    validators.clone(),
                    Some(event_publisher),
                    start,
                );
                SimNode {
                    engine,
                    network,
                    event_subscriber,
                    events: Vec::new(),
                }
            })
            .collect();

        Simulation {
            nodes,
            start,
            elapsed: Duration::ZERO,
        }
    }

    /// Advance the clock by one tick, then deliver each node's messages and tick it.
    pub(crate) fn step(&mut self) {
        self.elapsed += TICK;
        let now = self.start + self.elapsed;
        let net_time = NetClockTime::new(GENESIS_CLOSE_TIME + 10 + self.elapsed.as_secs());

        for node in self.nodes.iter_mut() {
            while let Some((origin, msg)) = node.network.recv() {
                node.engine.on_receive_msg(now, origin, msg);
            }
            node.engine.on_tick(now, net_time);
            node.collect_events();
        }
    }

    /// Step until `done` holds or `limit` of simulated time has passed. Returns whether `done` held.
    pub(crate) fn run_until(&mut self, limit: Duration, done: impl Fn(&[SimNode]) -> bool) -> bool {
        while self.elapsed < limit {
            self.step();
            if done(&self.nodes) {
                return true;
            }
        }
        false
    }
}

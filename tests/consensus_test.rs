//! Tests that drive groups of consensus engines with a simulated clock and network.
//!
//! Every test starts from genesis ledgers built with [`genesis`], and checks that the engines agree on the
//! ledger that follows.

mod common;

use std::time::Duration;

use ledger_consensus::{
    applier::result::ApplyOutcome,
    consensus::ConsensusParameters,
    types::data_types::{CryptoHash, LedgerSequence},
};

use crate::common::{
    fixtures::{
        account, balance, genesis, genesis_at, payment, signing_keys, validator_set, FEE,
        GENESIS_CLOSE_TIME, STARTING_BALANCE,
    },
    logging::setup_logger,
    simulation::{SimNode, Simulation},
};

const SEQ_2: LedgerSequence = LedgerSequence::new(2);

fn all_accepted(nodes: &[SimNode]) -> bool {
    nodes.iter().all(|node| node.accepted(SEQ_2).is_some())
}

fn agreed_hash(nodes: &[SimNode]) -> CryptoHash {
    let hash = nodes[0].accepted(SEQ_2).unwrap();
    for node in nodes {
        assert_eq!(node.accepted(SEQ_2), Some(hash));
    }
    hash
}

#[test]
fn validators_agree_on_the_next_ledger_test() {
    setup_logger(log::LevelFilter::Info);

    let (alice, bob) = (account(1), account(2));
    let keys = signing_keys(5);
    let validators = validator_set(&keys);
    let mut simulation = Simulation::new(
        keys,
        (0..5).map(|_| genesis(&[alice, bob])).collect(),
        validators,
        ConsensusParameters::default(),
    );

    // 1. Node 0 relays a payment to every node. Only node 4 hears of another one.
    let relayed = payment(alice, 1, bob, 1_000);
    let unrelayed = payment(bob, 1, alice, 500);
    assert!(matches!(
        simulation.nodes[0]
            .engine
            .on_submit_transaction(relayed.clone()),
        Some(ApplyOutcome::Applied { .. })
    ));
    simulation.nodes[4]
        .engine
        .on_receive_transaction(unrelayed.clone());

    // 2. Node 4 is outvoted on the payment only it holds.
    assert!(simulation.run_until(Duration::from_secs(60), all_accepted));
    let hash = agreed_hash(&simulation.nodes);

    let ledger = simulation.nodes[0].engine.ledger(&hash).unwrap();
    let included: Vec<_> = ledger
        .transactions()
        .iter()
        .map(|applied| applied.transaction.id())
        .collect();
    assert_eq!(included, vec![relayed.id()]);
    assert!(!included.contains(&unrelayed.id()));
    assert_eq!(balance(&ledger, &alice), Some(STARTING_BALANCE - 1_000 - FEE));
    assert_eq!(balance(&ledger, &bob), Some(STARTING_BALANCE + 1_000));

    // 3. Every node sees the ledger fully validated.
    assert!(simulation.run_until(Duration::from_secs(60), |nodes| {
        nodes
            .iter()
            .all(|node| node.engine.last_fully_validated().is_some())
    }));
    for node in &simulation.nodes {
        let (seq, validated) = node.engine.last_fully_validated().unwrap();
        assert!(seq >= SEQ_2);
        if seq == SEQ_2 {
            assert_eq!(validated, hash);
        }
        assert!(!node.went_wrong_ledger());
    }
}

#[test]
fn idle_validators_close_empty_ledgers_test() {
    setup_logger(log::LevelFilter::Info);

    let keys = signing_keys(4);
    let validators = validator_set(&keys);
    let genesis_ledger = genesis(&[account(1)]);
    let mut simulation = Simulation::new(
        keys,
        (0..4).map(|_| genesis_ledger.clone()).collect(),
        validators,
        ConsensusParameters::default(),
    );

    // The idle interval passes before any node closes.
    assert!(!simulation.run_until(Duration::from_secs(14), all_accepted));
    assert!(simulation.run_until(Duration::from_secs(60), all_accepted));

    let hash = agreed_hash(&simulation.nodes);
    let ledger = simulation.nodes[0].engine.ledger(&hash).unwrap();
    assert!(ledger.transactions().is_empty());
    assert_eq!(ledger.parent_hash(), genesis_ledger.hash());
    assert!(ledger.close_time() > genesis_ledger.close_time());
}

#[test]
fn untrusted_node_follows_the_validators_test() {
    setup_logger(log::LevelFilter::Info);

    let keys = signing_keys(5);
    // Node 4 is not a trusted validator, so it only observes.
    let validators = validator_set(&keys[..4]);
    let mut simulation = Simulation::new(
        keys,
        (0..5).map(|_| genesis(&[account(1)])).collect(),
        validators,
        ConsensusParameters::default(),
    );

    assert!(simulation.run_until(Duration::from_secs(60), all_accepted));
    agreed_hash(&simulation.nodes);

    let observer = &simulation.nodes[4];
    assert!(observer.events.iter().all(|event| !matches!(
        event,
        ledger_consensus::events::Event::Propose(_) | ledger_consensus::events::Event::Validate(_)
    )));
}

#[test]
fn node_on_a_forked_ledger_switches_to_the_network_ledger_test() {
    setup_logger(log::LevelFilter::Info);

    let accounts = [account(1), account(2)];
    let network_genesis = genesis(&accounts);
    let forked_genesis = genesis_at(&accounts, GENESIS_CLOSE_TIME - 100);
    assert_ne!(network_genesis.hash(), forked_genesis.hash());

    let keys = signing_keys(5);
    let validators = validator_set(&keys);
    let mut genesis_ledgers: Vec<_> = (0..4).map(|_| network_genesis.clone()).collect();
    genesis_ledgers.push(forked_genesis.clone());
    let mut simulation = Simulation::new(
        keys,
        genesis_ledgers,
        validators,
        ConsensusParameters::default(),
    );

    assert!(simulation.run_until(Duration::from_secs(60), all_accepted));

    // 1. Only node 4 noticed that it was on the wrong ledger, and it switched to the network's.
    let forked = &simulation.nodes[4];
    assert!(forked.went_wrong_ledger());
    assert_eq!(
        forked.switches(),
        vec![(forked_genesis.hash(), network_genesis.hash())]
    );
    for node in &simulation.nodes[..4] {
        assert!(!node.went_wrong_ledger());
        assert!(node.switches().is_empty());
    }

    // 2. After switching, it accepted the same ledger as everyone else.
    let hash = agreed_hash(&simulation.nodes);
    let ledger = simulation.nodes[4].engine.ledger(&hash).unwrap();
    assert_eq!(ledger.parent_hash(), network_genesis.hash());
}

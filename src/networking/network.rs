/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Network`] trait that users implement to connect nodes to each other.

use ed25519_dalek::VerifyingKey;

use crate::types::validator_set::ValidatorSet;

use super::messages::Message;

pub trait Network: Clone + Send {
    /// Inform the network provider of the trusted validator set on wake-up.
    fn init_validator_set(&mut self, validator_set: ValidatorSet);

    /// Inform the network provider that the trusted validator set will be `validator_set` from the next
    /// round on.
    fn update_validator_set(&mut self, validator_set: ValidatorSet);

    /// Send a message to all peers (including observers) without blocking.
    fn broadcast(&mut self, message: Message);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}

/// Handle for informing the network provider about changes to the trusted validator set.
///
/// The network provider may want to know, e.g., to establish connections to newly trusted validators.
#[derive(Clone)]
pub(crate) struct ValidatorSetUpdateHandle<N: Network> {
    network: N,
}

impl<N: Network> ValidatorSetUpdateHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn update_validator_set(&mut self, validator_set: ValidatorSet) {
        self.network.update_validator_set(validator_set)
    }
}

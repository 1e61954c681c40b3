use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use ledger_consensus::{tx_set::NodeFetcher, types::data_types::CryptoHash};

/// A node store shared by every node of a test, so that a node published by one node can be fetched by
/// all others right away.
#[derive(Clone, Default)]
pub(crate) struct SharedFetcher {
    nodes: Arc<Mutex<HashMap<CryptoHash, Vec<u8>>>>,
}

impl SharedFetcher {
    pub(crate) fn new() -> SharedFetcher {
        SharedFetcher::default()
    }
}

impl NodeFetcher for SharedFetcher {
    fn have(&mut self, hash: &CryptoHash) -> Option<Vec<u8>> {
        self.nodes.lock().unwrap().get(hash).cloned()
    }

    fn got(&mut self, hash: CryptoHash, bytes: Vec<u8>) {
        self.nodes.lock().unwrap().insert(hash, bytes);
    }
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! The consensus core does not implement a transport. Users provide one by implementing [`Network`],
//! and the core only ever talks to it in non-blocking calls.

pub mod messages;

pub mod network;

pub(crate) mod sending;

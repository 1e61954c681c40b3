/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Ledgers and the entries they hold.

pub mod accepted;

pub mod entry;

pub mod history;

pub mod keys;

pub mod snapshot;

pub(crate) mod fetcher;

pub(crate) mod fixtures;

pub(crate) mod logging;

pub(crate) mod network;

pub(crate) mod simulation;

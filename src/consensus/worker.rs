/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pool of threads that do the heavy work of consensus off the engine's thread.
//!
//! The engine hands [`Job`]s to the [`ApplyWorker`] and folds each [`JobResult`] back into its state the
//! next time it drains [`results`](ApplyWorker::try_recv_result). Results carry enough identity (the
//! round, or the set hash) for the engine to discard those that arrive after the state they were meant
//! for has moved on.
//!
//! A pool of zero threads runs every job inline in [`submit`](ApplyWorker::submit). Results are still
//! delivered through the result channel, so the engine handles both cases the same way.

use std::{
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use crate::{
    applier::{build_ledger, ApplyReport},
    ledger::snapshot::Ledger,
    tx_set::{acquire::FetchedNodes, TxSet, TxSetError},
    types::{
        data_types::{CloseResolution, CryptoHash, NetClockTime, RoundID},
        transaction::Transaction,
    },
};

/// Everything needed to build the ledger a round agreed on.
pub(crate) struct BuildLedgerJob {
    pub(crate) round: RoundID,
    pub(crate) parent: Arc<Ledger>,
    pub(crate) transactions: Vec<Transaction>,
    pub(crate) salt: CryptoHash,
    pub(crate) close_time: NetClockTime,
    pub(crate) close_resolution: CloseResolution,
    pub(crate) close_agree: bool,
    pub(crate) max_passes: u32,
    pub(crate) retry_passes: u32,
}

pub(crate) enum Job {
    BuildLedger(BuildLedgerJob),
    AssembleTxSet(FetchedNodes),
}

pub(crate) enum JobResult {
    LedgerBuilt {
        round: RoundID,
        ledger: Ledger,
        report: ApplyReport,
    },
    TxSetAssembled {
        hash: CryptoHash,
        result: Result<TxSet, TxSetError>,
    },
}

fn run(job: Job) -> JobResult {
    match job {
        Job::BuildLedger(job) => {
            let (ledger, report) = build_ledger(
                &job.parent,
                job.transactions,
                job.salt,
                job.close_time,
                job.close_resolution,
                job.close_agree,
                job.max_passes,
                job.retry_passes,
            );
            JobResult::LedgerBuilt {
                round: job.round,
                ledger,
                report,
            }
        }
        Job::AssembleTxSet(nodes) => JobResult::TxSetAssembled {
            hash: nodes.hash,
            result: nodes.assemble(),
        },
    }
}

pub(crate) struct ApplyWorker {
    // `None` in inline mode, and after the pool starts shutting down.
    job_sender: Option<Sender<Job>>,
    result_sender: Sender<JobResult>,
    result_receiver: Receiver<JobResult>,
    threads: Vec<JoinHandle<()>>,
}

impl ApplyWorker {
    /// Start a pool of `threads` worker threads. Zero threads means every job runs inline.
    pub(crate) fn new(threads: usize) -> Self {
        let (result_sender, result_receiver) = mpsc::channel();

        if threads == 0 {
            return Self {
                job_sender: None,
                result_sender,
                result_receiver,
                threads: Vec::new(),
            };
        }

        let (job_sender, job_receiver) = mpsc::channel::<Job>();
        let job_receiver = Arc::new(Mutex::new(job_receiver));
        let threads = (0..threads)
            .map(|_| {
                let job_receiver = job_receiver.clone();
                let result_sender = result_sender.clone();
                thread::spawn(move || loop {
                    // The lock is only held while waiting for the next job.
                    let job = match job_receiver.lock() {
                        Ok(job_receiver) => job_receiver.recv(),
                        Err(_) => return,
                    };
                    match job {
                        Ok(job) => {
                            if result_sender.send(run(job)).is_err() {
                                return;
                            }
                        }
                        // The pool was dropped.
                        Err(_) => return,
                    }
                })
            })
            .collect();

        Self {
            job_sender: Some(job_sender),
            result_sender,
            result_receiver,
            threads,
        }
    }

    pub(crate) fn submit(&self, job: Job) {
        match &self.job_sender {
            Some(job_sender) => {
                if let Err(mpsc::SendError(job)) = job_sender.send(job) {
                    log::warn!("Worker threads are gone, running job inline");
                    let _ = self.result_sender.send(run(job));
                }
            }
            None => {
                let _ = self.result_sender.send(run(job));
            }
        }
    }

    /// Get a finished job's result, if one is available right now.
    pub(crate) fn try_recv_result(&self) -> Option<JobResult> {
        match self.result_receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for ApplyWorker {
    fn drop(&mut self) {
        // Closing the job channel makes every worker thread return once it finishes its current job.
        self.job_sender = None;
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

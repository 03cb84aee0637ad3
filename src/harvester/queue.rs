//! Work queue and completion barrier
//!
//! This module handles:
//! - Enumerating one work item per (chapter, edition) pair
//! - Sharing a single receiver between all workers
//! - Counting outstanding items so the run can wait for the queue to drain
//!
//! Every queued [`Job`] carries a [`Ticket`]. Acknowledging consumes the
//! ticket, so an item cannot be acknowledged twice through it; a ticket that
//! is dropped unacknowledged (a worker bailing out on an error) still
//! releases its slot so the barrier never waits on a dead worker.

use crate::catalog::Edition;
use crate::model::WorkItem;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

/// Receiver shared by every worker of a run
pub type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Job>>>;

/// Counts enqueued minus acknowledged work items
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    outstanding: Arc<watch::Sender<usize>>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(sender),
        }
    }

    fn register(&self) {
        self.outstanding.send_modify(|n| *n += 1);
    }

    /// Marks one item as done
    ///
    /// Returns false, and leaves the count untouched, if nothing was
    /// outstanding.
    pub fn acknowledge(&self) -> bool {
        let mut accepted = true;
        self.outstanding.send_modify(|n| {
            if *n == 0 {
                accepted = false;
            } else {
                *n -= 1;
            }
        });

        if !accepted {
            tracing::error!("Acknowledged a work item while none were outstanding");
        }
        accepted
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Suspends until every enqueued item has been acknowledged
    pub async fn wait_drained(&self) {
        let mut receiver = self.outstanding.subscribe();
        // The sender lives in self, so the channel cannot close while waiting
        let _ = receiver.wait_for(|n| *n == 0).await;
    }
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that a dequeued item still has to be acknowledged
#[derive(Debug)]
pub struct Ticket {
    barrier: CompletionBarrier,
    done: bool,
}

impl Ticket {
    pub fn acknowledge(mut self) {
        self.done = true;
        self.barrier.acknowledge();
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!("Releasing an unacknowledged work item");
            self.barrier.acknowledge();
        }
    }
}

/// A work item together with its acknowledgement ticket
#[derive(Debug)]
pub struct Job {
    pub item: WorkItem,
    pub ticket: Ticket,
}

/// Unbounded FIFO of work items feeding the worker pool
pub struct WorkQueue {
    sender: mpsc::UnboundedSender<Job>,
    receiver: SharedReceiver,
    barrier: CompletionBarrier,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            barrier: CompletionBarrier::new(),
        }
    }

    /// Queues one work item
    pub fn enqueue(&self, item: WorkItem) -> bool {
        self.barrier.register();
        let job = Job {
            item,
            ticket: Ticket {
                barrier: self.barrier.clone(),
                done: false,
            },
        };
        // A failed send hands the job back and its ticket releases the slot
        self.sender.send(job).is_ok()
    }

    /// Queues every chapter of a unit for every edition
    ///
    /// Items are queued chapter by chapter, ascending, with all editions of
    /// a chapter next to each other. Returns the number of items queued.
    pub fn enqueue_unit(&self, unit: &str, chapters: u32, editions: &[Edition]) -> usize {
        let mut queued = 0;
        for chapter in 1..=chapters {
            for edition in editions {
                let item = WorkItem {
                    unit: unit.to_string(),
                    chapter,
                    edition: edition.label.clone(),
                    edition_id: edition.id.clone(),
                };
                if self.enqueue(item) {
                    queued += 1;
                }
            }
        }
        queued
    }

    pub fn receiver(&self) -> SharedReceiver {
        Arc::clone(&self.receiver)
    }

    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    /// Items enqueued but not yet acknowledged
    pub fn depth(&self) -> usize {
        self.barrier.outstanding()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Takes the next job, or `None` once the queue is dropped and empty
pub async fn next_job(receiver: &SharedReceiver) -> Option<Job> {
    receiver.lock().await.recv().await
}

use std::thread::JoinHandle;

use log::{debug, error, warn};
use tokio::sync::mpsc;
use twenty48_core::engine::Score;

use crate::session::Identity;
use crate::store::ScoreStore;

/// Where the controller hands final scores. Implementations must return
/// immediately; persistence outcome is never reported back to the game.
pub trait ScoreSink {
    fn submit(&self, identity: &Identity, score: Score);
}

/// A final score on its way to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub user_id: String,
    pub score: Score,
}

/// Background writer that drains submissions into a [`ScoreStore`].
///
/// Usage: let (submitter, handle) = ScoreSubmitter::new();
///        let worker = submitter.spawn(store);
///        // give `handle` to the controller; drop it, then `worker.shutdown()`.
///
/// The channel closes once every [`SubmitHandle`] is dropped.
pub struct ScoreSubmitter {
    rx: mpsc::UnboundedReceiver<Submission>,
}

/// Cheap, cloneable sending side of a [`ScoreSubmitter`].
#[derive(Clone)]
pub struct SubmitHandle {
    tx: mpsc::UnboundedSender<Submission>,
}

impl ScoreSubmitter {
    pub fn new() -> (Self, SubmitHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, SubmitHandle { tx })
    }

    /// Run the writer on its own thread. The thread exits once every
    /// handle is dropped and the queue is drained.
    pub fn spawn(self, store: ScoreStore) -> SubmitWorker {
        SubmitWorker {
            thread: std::thread::spawn(move || self.run(&store)),
        }
    }

    /// Drain submissions on the current thread until all handles are gone.
    pub fn run(mut self, store: &ScoreStore) -> usize {
        let mut saved = 0;
        while let Some(submission) = self.rx.blocking_recv() {
            match store.save_score(&submission.user_id, submission.score) {
                Ok(record) => {
                    saved += 1;
                    debug!("saved score {} for {} as #{}", record.score, record.user_id, record.id);
                }
                // Not retried: a lost leaderboard row never affects play.
                Err(err) => error!(
                    "failed to save score {} for {}: {err:#}",
                    submission.score, submission.user_id
                ),
            }
        }
        saved
    }
}

/// The running writer thread.
pub struct SubmitWorker {
    thread: JoinHandle<usize>,
}

impl SubmitWorker {
    /// Wait for the queue to drain and the thread to exit; returns the
    /// number of scores saved. Blocks until every handle has been dropped.
    pub fn shutdown(self) -> usize {
        match self.thread.join() {
            Ok(saved) => {
                debug!("score writer saved {saved} score(s)");
                saved
            }
            Err(_) => {
                error!("score writer panicked");
                0
            }
        }
    }
}

impl ScoreSink for SubmitHandle {
    fn submit(&self, identity: &Identity, score: Score) {
        let submission = Submission {
            user_id: identity.user_id.clone(),
            score,
        };
        if self.tx.send(submission).is_err() {
            warn!("score writer has stopped; dropping score {score} for {}", identity.user_id);
        }
    }
}

//! Execution contexts for property assignment.
//!
//! Assignments are funneled through an [`Executor`] so that fields owned by a
//! single-threaded consumer (typically a UI loop) are only written there.

use tokio::sync::mpsc;
use tracing::trace;

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs on a designated execution context.
///
/// Implementations must run jobs in submission order.
pub trait Executor: Send + Sync + 'static {
    /// Schedules `job` on this context.
    fn execute(&self, job: Job);
}

/// Runs each job immediately on the submitting thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Sending half of a job queue.
#[derive(Clone, Debug)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
}

/// Receiving half of a job queue, owned by the context that runs the jobs.
#[derive(Debug)]
pub struct JobRunner {
    receiver: mpsc::UnboundedReceiver<Job>,
}

/// Creates a FIFO job queue and the runner that drains it.
#[must_use]
pub fn job_queue() -> (JobQueue, JobRunner) {
    let (sender, receiver) = mpsc::unbounded_channel();

    (JobQueue { sender }, JobRunner { receiver })
}

impl Executor for JobQueue {
    fn execute(&self, job: Job) {
        if self.sender.send(job).is_err() {
            trace!("job runner dropped; discarding job");
        }
    }
}

impl JobRunner {
    /// Runs every job queued so far, returning how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;

        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }

        ran
    }

    /// Runs jobs as they arrive until every [`JobQueue`] handle is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            job();
        }
    }
}

use super::orchestrator::PayoutOrchestrator;
use crate::domain::ports::PaymentJob;
use crate::domain::user::UserId;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// Counters collected while draining the job queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub jobs_received: usize,
    pub payments_created: usize,
    /// Users for whom nothing positive could be claimed.
    pub users_skipped: usize,
    pub failures: usize,
}

type UnitResult = (UserId, crate::error::Result<bool>);

/// Consumes payout jobs and runs one task per user, bounded by a semaphore.
///
/// Failed units are logged and counted, never retried.
pub struct PayoutWorker {
    orchestrator: Arc<PayoutOrchestrator>,
    jobs: mpsc::Receiver<PaymentJob>,
    permits: Arc<Semaphore>,
}

/// Handle to a running worker.
pub struct WorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    /// Stops accepting jobs, finishes everything already queued and
    /// returns the final report.
    pub async fn shutdown(self) -> Result<WorkerReport, JoinError> {
        // The worker may already have stopped because every sender dropped
        let _ = self.shutdown.send(());
        self.join.await
    }
}

impl PayoutWorker {
    pub fn new(
        orchestrator: Arc<PayoutOrchestrator>,
        jobs: mpsc::Receiver<PaymentJob>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            orchestrator,
            jobs,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle { shutdown, join }
    }

    /// Main loop. Returns once shutdown is requested (after draining) or
    /// every queue handle has been dropped.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> WorkerReport {
        let mut report = WorkerReport::default();
        let mut tasks: JoinSet<UnitResult> = JoinSet::new();
        info!("payout worker started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    self.jobs.close();
                    while let Some(job) = self.jobs.recv().await {
                        self.dispatch(job, &mut tasks, &mut report);
                    }
                    break;
                }

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    record(result, &mut report);
                }

                job = self.jobs.recv() => match job {
                    Some(job) => self.dispatch(job, &mut tasks, &mut report),
                    None => break,
                },
            }
        }

        while let Some(result) = tasks.join_next().await {
            record(result, &mut report);
        }
        info!(
            jobs = report.jobs_received,
            payments = report.payments_created,
            skipped = report.users_skipped,
            failures = report.failures,
            "payout worker stopped"
        );
        report
    }

    fn dispatch(
        &self,
        job: PaymentJob,
        tasks: &mut JoinSet<UnitResult>,
        report: &mut WorkerReport,
    ) {
        report.jobs_received += 1;
        debug!(processor = %job.processor, date = %job.date, users = job.user_ids.len(), "payout job received");

        for user_id in job.user_ids {
            let orchestrator = self.orchestrator.clone();
            let permits = self.permits.clone();
            let (date, processor, payout_type) = (job.date, job.processor, job.payout_type);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = orchestrator
                    .create_payment(date, processor, user_id, payout_type)
                    .await
                    .map(|created| created.is_some());
                (user_id, result)
            });
        }
    }
}

fn record(result: Result<UnitResult, JoinError>, report: &mut WorkerReport) {
    match result {
        Ok((_, Ok(true))) => report.payments_created += 1,
        Ok((_, Ok(false))) => report.users_skipped += 1,
        Ok((user_id, Err(e))) => {
            report.failures += 1;
            error!(%user_id, error = %e, "payout job failed");
        }
        Err(e) => {
            report.failures += 1;
            error!(error = %e, "payout task panicked or was cancelled");
        }
    }
}

use super::batch::{DayBatch, DayState, HourJob};
use crate::compactor::{CompactError, HourProcessor, HourReport};
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DayError {
    #[error(transparent)]
    Hour(#[from] CompactError),

    #[error("worker for {day} hour {hour:02} exited abnormally: {reason}")]
    WorkerExited {
        day: String,
        hour: u32,
        reason: String,
    },

    #[error("workers for {day} stopped before hours {hours:?} were archived")]
    PoolDrained { day: String, hours: Vec<u32> },
}

/// Totals for one finished day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayReport {
    pub hours_archived: usize,
    pub hours_empty: usize,
    pub fragments_deleted: usize,
    pub archive_bytes: u64,
}

impl DayReport {
    fn record(&mut self, report: &HourReport) {
        if report.archived() {
            self.hours_archived += 1;
        } else {
            self.hours_empty += 1;
        }
        self.fragments_deleted += report.fragments;
        self.archive_bytes += report.archive_bytes;
    }
}

/// How an assigned hour ended, as reported by its worker.
enum HourOutcome {
    Done(HourReport),
    Failed(CompactError),
    Panicked(String),
}

struct WorkerEvent {
    worker: usize,
    hour: u32,
    outcome: HourOutcome,
}

struct WorkerSlot {
    assignments: Option<mpsc::Sender<HourJob>>,
    handle: JoinHandle<()>,
    current: Option<u32>,
}

/// Runs every pending hour of a day on a bounded pool of workers.
///
/// Hours are handed out in ascending order, one at a time per worker. The
/// orchestrator alone owns the batch; workers only report back over a
/// channel.
pub struct DayOrchestrator {
    processor: Arc<dyn HourProcessor>,
    max_workers: usize,
}

impl DayOrchestrator {
    pub fn new(processor: Arc<dyn HourProcessor>, max_workers: usize) -> Self {
        Self {
            processor,
            max_workers: max_workers.max(1),
        }
    }

    pub async fn run(&self, batch: &mut DayBatch) -> Result<DayReport, DayError> {
        let mut pending: VecDeque<u32> = batch.pending_hours().into();
        let mut report = DayReport::default();
        let day = batch.to_string();

        batch.set_state(DayState::Running);
        if pending.is_empty() {
            batch.set_state(DayState::Complete);
            return Ok(report);
        }

        let pool_size = self.max_workers.min(pending.len());
        info!(
            day = %day,
            start_hour = batch.start_hour,
            hours = pending.len(),
            workers = pool_size,
            "Processing day"
        );

        // Room for one report per worker, so late results never block
        let (result_tx, mut result_rx) = mpsc::channel::<WorkerEvent>(pool_size);
        let mut workers: Vec<WorkerSlot> = (0..pool_size)
            .map(|id| spawn_worker(id, self.processor.clone(), result_tx.clone()))
            .collect();
        drop(result_tx);

        for worker in workers.iter_mut() {
            assign_next(worker, &mut pending, batch).await;
        }

        let mut failure: Option<DayError> = None;

        while let Some(event) = result_rx.recv().await {
            workers[event.worker].current = None;

            match event.outcome {
                HourOutcome::Done(hour_report) => {
                    batch.mark_complete(event.hour);
                    report.record(&hour_report);
                    debug!(day = %day, hour = event.hour, "Hour complete");

                    if batch.is_complete() {
                        break;
                    }
                    assign_next(&mut workers[event.worker], &mut pending, batch).await;
                }
                HourOutcome::Failed(e) => {
                    error!(day = %day, hour = event.hour, error = %e, "Hour failed, stopping day");
                    batch.set_state(DayState::Failed);
                    failure = Some(DayError::Hour(e));
                    break;
                }
                HourOutcome::Panicked(reason) => {
                    error!(day = %day, hour = event.hour, reason = %reason, "Worker panicked, stopping day");
                    batch.set_state(DayState::Failed);
                    failure = Some(DayError::WorkerExited {
                        day: day.clone(),
                        hour: event.hour,
                        reason,
                    });
                    break;
                }
            }
        }

        // No further assignments; idle workers exit as soon as their queue closes
        pending.clear();
        for worker in workers.iter_mut() {
            worker.assignments = None;
        }

        // Let in-flight hours finish so no archive is left half written
        while let Some(event) = result_rx.recv().await {
            workers[event.worker].current = None;
            match event.outcome {
                HourOutcome::Done(hour_report) => {
                    batch.mark_complete(event.hour);
                    report.record(&hour_report);
                    debug!(day = %day, hour = event.hour, "In-flight hour finished after stop");
                }
                HourOutcome::Failed(e) => {
                    warn!(day = %day, hour = event.hour, error = %e, "In-flight hour also failed");
                }
                HourOutcome::Panicked(reason) => {
                    warn!(day = %day, hour = event.hour, reason = %reason, "In-flight worker also panicked");
                }
            }
        }

        for worker in workers {
            let hour = worker.current;
            if let Err(e) = worker.handle.await {
                warn!(day = %day, error = %e, "Worker task ended abnormally");
                if failure.is_none() {
                    failure = Some(DayError::WorkerExited {
                        day: day.clone(),
                        hour: hour.unwrap_or(batch.start_hour),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if failure.is_none() && !batch.is_complete() {
            failure = Some(DayError::PoolDrained {
                day: day.clone(),
                hours: batch.pending_hours(),
            });
        }

        match failure {
            Some(e) => {
                batch.set_state(DayState::Failed);
                Err(e)
            }
            None => {
                batch.set_state(DayState::Complete);
                info!(
                    day = %day,
                    archived = report.hours_archived,
                    empty = report.hours_empty,
                    fragments = report.fragments_deleted,
                    "Finished processing day"
                );
                Ok(report)
            }
        }
    }
}

fn spawn_worker(
    id: usize,
    processor: Arc<dyn HourProcessor>,
    results: mpsc::Sender<WorkerEvent>,
) -> WorkerSlot {
    let (assign_tx, mut assign_rx) = mpsc::channel::<HourJob>(1);

    let handle = tokio::spawn(async move {
        while let Some(job) = assign_rx.recv().await {
            let hour = job.hour;
            let outcome = match AssertUnwindSafe(processor.process(job)).catch_unwind().await {
                Ok(Ok(report)) => HourOutcome::Done(report),
                Ok(Err(e)) => HourOutcome::Failed(e),
                Err(panic) => HourOutcome::Panicked(panic_message(panic.as_ref())),
            };

            let event = WorkerEvent {
                worker: id,
                hour,
                outcome,
            };
            if results.send(event).await.is_err() {
                break;
            }
        }
    });

    WorkerSlot {
        assignments: Some(assign_tx),
        handle,
        current: None,
    }
}

/// Give the worker the lowest unassigned hour, or retire it if none remain.
async fn assign_next(worker: &mut WorkerSlot, pending: &mut VecDeque<u32>, batch: &DayBatch) {
    let Some(sender) = worker.assignments.as_ref() else {
        return;
    };

    match pending.pop_front() {
        Some(hour) => {
            debug!(day = %batch, hour, "Assigning hour");
            worker.current = Some(hour);
            if sender.send(batch.job(hour)).await.is_err() {
                // The worker is gone; its task handle will report why
                worker.current = None;
                worker.assignments = None;
            }
        }
        None => worker.assignments = None,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

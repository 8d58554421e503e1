// Day orchestration with a scripted hour processor standing in for S3 work.

use async_trait::async_trait;
use cf_log_compactor::compactor::{CompactError, HourProcessor, HourReport, Stage, StageError};
use cf_log_compactor::day::{DayBatch, DayError, DayOrchestrator, DayState, HourJob};
use cf_log_compactor::fragment::LogDate;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ScriptedProcessor {
        started: Mutex<Vec<u32>>,
        active: AtomicUsize,
        peak: AtomicUsize,
        fail_hour: Option<u32>,
        panic_hour: Option<u32>,
        empty_hours: HashSet<u32>,
        /// Vary run time per hour so hours finish out of order.
        staggered: bool,
    }

    impl ScriptedProcessor {
        fn started(&self) -> Vec<u32> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HourProcessor for ScriptedProcessor {
        async fn process(&self, job: HourJob) -> Result<HourReport, CompactError> {
            self.started.lock().unwrap().push(job.hour);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let millis = if self.staggered {
                u64::from((job.hour * 7) % 5 + 1) * 3
            } else {
                5
            };
            tokio::time::sleep(Duration::from_millis(millis)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.panic_hour == Some(job.hour) {
                panic!("processor blew up on hour {}", job.hour);
            }
            if self.fail_hour == Some(job.hour) {
                return Err(CompactError {
                    job,
                    stage: Stage::Upload,
                    source: StageError::Io(std::io::Error::other("upload refused")),
                });
            }

            let archived = !self.empty_hours.contains(&job.hour);
            Ok(HourReport {
                archive_key: archived.then(|| job.archive_key()),
                fragments: if archived { 2 } else { 0 },
                bytes_downloaded: 0,
                lines_kept: 0,
                archive_bytes: if archived { 100 } else { 0 },
                job,
            })
        }
    }

    fn batch(start_hour: u32) -> DayBatch {
        DayBatch::new("web123", LogDate::new(2023, 5, 1), start_hour, "")
    }

    #[tokio::test]
    async fn test_every_hour_processed_once_in_order() {
        let processor = Arc::new(ScriptedProcessor::default());
        let orchestrator = DayOrchestrator::new(processor.clone(), 4);
        let mut day = batch(0);

        let report = orchestrator.run(&mut day).await.unwrap();

        let started = processor.started();
        assert_eq!(started.len(), 24);
        let unique: HashSet<u32> = started.iter().copied().collect();
        assert_eq!(unique.len(), 24);

        assert_eq!(report.hours_archived, 24);
        assert_eq!(report.fragments_deleted, 48);
        assert_eq!(report.archive_bytes, 2400);
        assert!(day.is_complete());
        assert_eq!(day.state(), DayState::Complete);
    }

    #[tokio::test]
    async fn test_single_worker_runs_hours_ascending() {
        let processor = Arc::new(ScriptedProcessor::default());
        let orchestrator = DayOrchestrator::new(processor.clone(), 1);
        let mut day = batch(0);

        orchestrator.run(&mut day).await.unwrap();

        assert_eq!(processor.started(), (0..24).collect::<Vec<u32>>());
        assert_eq!(processor.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_many_workers_take_hours_in_ascending_order() {
        let processor = Arc::new(ScriptedProcessor {
            staggered: true,
            ..Default::default()
        });
        let orchestrator = DayOrchestrator::new(processor.clone(), 4);
        let mut day = batch(3);

        orchestrator.run(&mut day).await.unwrap();

        // Each worker starts its hour as soon as it is handed over, so start
        // order is hand-out order even though hours finish out of order
        let started = processor.started();
        assert_eq!(started, (3..24).collect::<Vec<u32>>());

        let unique: HashSet<u32> = started.iter().copied().collect();
        assert_eq!(unique.len(), started.len());

        let peak = processor.peak.load(Ordering::SeqCst);
        assert!((2..=4).contains(&peak), "peak concurrency was {}", peak);
        assert_eq!(day.state(), DayState::Complete);
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_max_workers() {
        let processor = Arc::new(ScriptedProcessor::default());
        let orchestrator = DayOrchestrator::new(processor.clone(), 3);
        let mut day = batch(0);

        orchestrator.run(&mut day).await.unwrap();

        let peak = processor.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
    }

    #[tokio::test]
    async fn test_hours_before_start_are_skipped() {
        let processor = Arc::new(ScriptedProcessor::default());
        let orchestrator = DayOrchestrator::new(processor.clone(), 8);
        let mut day = batch(20);

        let report = orchestrator.run(&mut day).await.unwrap();

        let mut started = processor.started();
        started.sort_unstable();
        assert_eq!(started, vec![20, 21, 22, 23]);
        assert_eq!(report.hours_archived, 4);
        assert_eq!(day.state(), DayState::Complete);
    }

    #[tokio::test]
    async fn test_empty_hours_still_complete() {
        let processor = Arc::new(ScriptedProcessor {
            empty_hours: (0..24).filter(|h| h % 2 == 1).collect(),
            ..Default::default()
        });
        let orchestrator = DayOrchestrator::new(processor, 4);
        let mut day = batch(0);

        let report = orchestrator.run(&mut day).await.unwrap();

        assert_eq!(report.hours_archived, 12);
        assert_eq!(report.hours_empty, 12);
        assert!(day.is_complete());
    }

    #[tokio::test]
    async fn test_failed_hour_stops_the_day() {
        let processor = Arc::new(ScriptedProcessor {
            fail_hour: Some(2),
            ..Default::default()
        });
        let orchestrator = DayOrchestrator::new(processor.clone(), 1);
        let mut day = batch(0);

        let err = orchestrator.run(&mut day).await.unwrap_err();

        match err {
            DayError::Hour(e) => {
                assert_eq!(e.job.hour, 2);
                assert_eq!(e.stage, Stage::Upload);
            }
            other => panic!("expected an hour failure, got {}", other),
        }

        // Nothing is assigned after the failure
        assert_eq!(processor.started(), vec![0, 1, 2]);
        assert_eq!(day.state(), DayState::Failed);
        assert!(!day.is_complete());
        assert_eq!(day.pending_hours(), (2..24).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn test_failure_with_many_workers_leaves_later_hours_untouched() {
        let processor = Arc::new(ScriptedProcessor {
            fail_hour: Some(0),
            ..Default::default()
        });
        let orchestrator = DayOrchestrator::new(processor.clone(), 4);
        let mut day = batch(0);

        assert!(orchestrator.run(&mut day).await.is_err());

        // At most the first wave plus one reassignment per early finisher
        let started = processor.started();
        assert!(started.len() < 24, "started {:?}", started);
        assert!(!day.completion()[0]);
        assert_eq!(day.state(), DayState::Failed);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let processor = Arc::new(ScriptedProcessor {
            panic_hour: Some(1),
            ..Default::default()
        });
        let orchestrator = DayOrchestrator::new(processor, 2);
        let mut day = batch(0);

        let err = orchestrator.run(&mut day).await.unwrap_err();

        match err {
            DayError::WorkerExited { hour, reason, .. } => {
                assert_eq!(hour, 1);
                assert!(reason.contains("blew up"), "{}", reason);
            }
            other => panic!("expected a worker exit, got {}", other),
        }
        assert_eq!(day.state(), DayState::Failed);
    }

    #[tokio::test]
    async fn test_already_complete_batch_is_a_no_op() {
        let processor = Arc::new(ScriptedProcessor::default());
        let orchestrator = DayOrchestrator::new(processor.clone(), 4);
        let mut day = batch(24);

        let report = orchestrator.run(&mut day).await.unwrap();

        assert_eq!(report.hours_archived, 0);
        assert!(processor.started().is_empty());
        assert_eq!(day.state(), DayState::Complete);
    }
}

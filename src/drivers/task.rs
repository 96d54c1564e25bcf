//! Acquisition as a cancellable background task.
//!
//! A producer thread owns the bench session and acts as the tick source: it
//! reads one sample per period and pushes it into a bounded queue. The caller
//! drains that queue in [`AcquisitionTask::join`], which is where the series is
//! assembled and summarised. Pacing is the same fixed-period wait as
//! [`Sampler`](crate::drivers::Sampler).
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::drivers::sampler::{AcquisitionPlan, Pacer};
use crate::drivers::session::BenchSession;
use crate::drivers::source::{Board, Instrument};
use crate::drivers::stats::SummaryStats;
use crate::drivers::{BenchError, SampleSeries};
use crate::types::LeakageSample;

/// Upper bound on the series capacity reserved up front in [`AcquisitionTask::join`].
const PREALLOCATED_SAMPLES: usize = 4096;

/// Requests a running task to stop before its next tick.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum StopReason {
    Completed,
    Cancelled,
    Failed(BenchError),
}

pub struct TaskOutcome<I, B> {
    /// Handed back so the caller can still shut the bench down.
    pub session: BenchSession<I, B>,
    pub series: SampleSeries,
    /// Present only when every scheduled sample was read.
    pub summary: Option<SummaryStats>,
    pub stop: StopReason,
}

pub struct AcquisitionTask<I, B> {
    records: Receiver<LeakageSample>,
    producer: JoinHandle<(BenchSession<I, B>, StopReason)>,
    cancel: CancelHandle,
    plan: AcquisitionPlan,
}

/// Starts sampling on a background thread.
///
/// `queue_depth` bounds how many unread samples may pile up before the
/// producer blocks.
pub fn spawn_acquisition<I, B, P>(
    mut session: BenchSession<I, B>,
    plan: AcquisitionPlan,
    queue_depth: usize,
    mut pacer: P,
) -> Result<AcquisitionTask<I, B>, BenchError>
where
    I: Instrument + Send + 'static,
    B: Board + Send + 'static,
    P: Pacer + Send + 'static,
{
    if queue_depth == 0 {
        return Err(BenchError::InvalidParameter(
            "queue depth must be at least 1".into(),
        ));
    }
    let (tx, rx) = sync_channel(queue_depth);
    let cancel = CancelHandle::default();
    let flag = cancel.clone();
    let producer = thread::Builder::new()
        .name("ldc-acquisition".into())
        .spawn(move || {
            let period = plan.period();
            for index in 0..plan.count {
                if flag.is_cancelled() {
                    debug!("acquisition cancelled before sample {index}");
                    return (session, StopReason::Cancelled);
                }
                let (measured_ma, reference_ma) = match session.read_pair() {
                    Ok(pair) => pair,
                    Err(err) => return (session, StopReason::Failed(err)),
                };
                let sample = LeakageSample::new(plan.offset_of(index), measured_ma, reference_ma);
                if tx.send(sample).is_err() {
                    // aggregator went away; nothing left to feed
                    return (session, StopReason::Cancelled);
                }
                pacer.wait(period);
            }
            (session, StopReason::Completed)
        })
        .map_err(|err| BenchError::Task(format!("cannot start acquisition thread: {err}")))?;
    info!(
        "Acquisition task started: {} samples at {} Hz",
        plan.count, plan.sample_rate_hz
    );
    Ok(AcquisitionTask {
        records: rx,
        producer,
        cancel,
        plan,
    })
}

impl<I, B> AcquisitionTask<I, B> {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn plan(&self) -> &AcquisitionPlan {
        &self.plan
    }

    /// Aggregates every produced sample and waits for the producer to finish.
    pub fn join(self) -> Result<TaskOutcome<I, B>, BenchError> {
        let mut series = SampleSeries::with_capacity(self.plan.count.min(PREALLOCATED_SAMPLES));
        // ends once the producer drops its sender
        for sample in self.records.iter() {
            series.push(sample);
        }
        let (session, stop) = self
            .producer
            .join()
            .map_err(|_| BenchError::Task("acquisition thread panicked".into()))?;
        let summary = match stop {
            StopReason::Completed => Some(SummaryStats::from_series(&series)?),
            StopReason::Cancelled => {
                warn!("Acquisition cancelled after {} samples", series.len());
                None
            }
            StopReason::Failed(ref err) => {
                warn!("Acquisition aborted after {} samples: {err}", series.len());
                None
            }
        };
        Ok(TaskOutcome {
            session,
            series,
            summary,
            stop,
        })
    }
}

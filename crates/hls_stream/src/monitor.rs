use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, TokioClock};
use crate::{HlsSegment, HlsSession, HlsStreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Stopped,
}

/// Receives newly appended segments, in order, one at a time.
///
/// The monitor waits for each call to finish before delivering the next
/// segment or polling again.
#[async_trait]
pub trait SegmentConsumer: Send {
    async fn on_segment(&mut self, segment: HlsSegment) -> Result<(), HlsStreamError>;
}

#[async_trait]
impl SegmentConsumer for mpsc::UnboundedSender<HlsSegment> {
    async fn on_segment(&mut self, segment: HlsSegment) -> Result<(), HlsStreamError> {
        self.send(segment).map_err(|_| HlsStreamError::ConsumerClosed)
    }
}

/// Adapts a closure into a [`SegmentConsumer`].
pub struct FnConsumer<F>(pub F);

#[async_trait]
impl<F> SegmentConsumer for FnConsumer<F>
where
    F: FnMut(HlsSegment) -> Result<(), HlsStreamError> + Send,
{
    async fn on_segment(&mut self, segment: HlsSegment) -> Result<(), HlsStreamError> {
        (self.0)(segment)
    }
}

/// Observes and stops a running monitor from outside.
#[derive(Clone)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    state: watch::Receiver<MonitorState>,
}

impl MonitorHandle {
    /// Takes effect at the next poll or sleep boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Resolves once the monitor reached [`MonitorState::Stopped`].
    pub async fn stopped(&mut self) {
        let _ = self
            .state
            .wait_for(|state| *state == MonitorState::Stopped)
            .await;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// Manifest refreshes attempted.
    pub polls: u64,
    /// Segments accepted by the consumer.
    pub delivered: u64,
    /// Refreshes that failed to fetch or parse.
    pub failures: u64,
    /// Refreshes where the server had already evicted undelivered segments.
    pub gaps: u64,
}

/// Polls a live manifest and hands every newly appended segment to a consumer
/// until the stream ends or the monitor is cancelled.
pub struct LiveMonitor<C: Clock = TokioClock> {
    session: HlsSession,
    clock: C,
    deliver_existing: bool,
    cancel: CancellationToken,
    state: watch::Sender<MonitorState>,
}

impl LiveMonitor<TokioClock> {
    pub fn new(session: HlsSession) -> Self {
        Self::with_clock(session, TokioClock)
    }
}

impl<C: Clock + 'static> LiveMonitor<C> {
    pub fn with_clock(session: HlsSession, clock: C) -> Self {
        let (state, _) = watch::channel(MonitorState::Idle);
        Self {
            session,
            clock,
            deliver_existing: false,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Also deliver the segments already listed when the monitor starts.
    ///
    /// By default they are treated as already handed to the caller.
    pub fn deliver_existing(mut self) -> Self {
        self.deliver_existing = true;
        self
    }

    /// Stops the monitor when `token` is cancelled, e.g. an application-wide
    /// shutdown token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Runs the monitor on a new task.
    pub fn spawn<S>(self, mut consumer: S) -> (MonitorHandle, JoinHandle<MonitorReport>)
    where
        S: SegmentConsumer + 'static,
    {
        let handle = self.handle();
        let task = tokio::spawn(async move { self.run(&mut consumer).await });
        (handle, task)
    }

    /// Runs the polling loop to completion.
    pub async fn run<S>(self, consumer: &mut S) -> MonitorReport
    where
        S: SegmentConsumer + ?Sized,
    {
        let mut report = MonitorReport::default();
        let initial = self.session.snapshot().await;
        // Sequence number one past the last segment handed out.
        let mut cursor = if self.deliver_existing {
            initial.media_sequence
        } else {
            initial.next_sequence()
        };
        let mut delay = initial.target_duration;

        self.state.send_replace(MonitorState::Polling);

        if initial.is_terminated {
            log::info!("{} already ended, not polling", initial.source_url);
            if !self.cancel.is_cancelled() {
                Self::deliver(&initial.segments_from(cursor), consumer, &mut report).await;
            }
            self.state.send_replace(MonitorState::Stopped);
            return report;
        }

        log::info!("Monitoring live stream {}", initial.source_url);
        let mut consecutive_errors = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let refreshed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.session.reload() => result,
            };
            report.polls += 1;

            match refreshed {
                Ok(()) => {
                    consecutive_errors = 0;
                    let snapshot = self.session.snapshot().await;
                    if snapshot.media_sequence > cursor {
                        report.gaps += 1;
                        log::warn!(
                            "Segments {}..{} of {} were evicted before they were polled",
                            cursor,
                            snapshot.media_sequence,
                            snapshot.source_url
                        );
                    }

                    let new_segments = snapshot.segments_from(cursor);
                    log::debug!(
                        "Refreshed {}: {} segments, {} new",
                        snapshot.source_url,
                        snapshot.segments.len(),
                        new_segments.len()
                    );
                    if !Self::deliver(&new_segments, consumer, &mut report).await {
                        log::debug!("Segment consumer closed, stopping monitor");
                        break;
                    }

                    cursor = snapshot.next_sequence();
                    delay = snapshot.target_duration;
                    if snapshot.is_terminated {
                        log::info!("Stream {} ended", snapshot.source_url);
                        break;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    report.failures += 1;
                    log::warn!(
                        "Failed to refresh manifest (attempt {}): {}",
                        consecutive_errors,
                        e
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.clock.sleep(Duration::from_secs(delay)) => {}
            }
        }

        if self.cancel.is_cancelled() {
            log::info!("Monitor cancelled");
        }
        self.state.send_replace(MonitorState::Stopped);
        report
    }

    /// Returns false once the consumer reported it is closed.
    async fn deliver<S>(
        segments: &[HlsSegment],
        consumer: &mut S,
        report: &mut MonitorReport,
    ) -> bool
    where
        S: SegmentConsumer + ?Sized,
    {
        for segment in segments {
            match consumer.on_segment(segment.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(HlsStreamError::ConsumerClosed) => return false,
                Err(e) => log::warn!("Consumer failed on segment {}: {}", segment.sequence, e),
            }
        }
        true
    }
}

//! Background execution of discovery jobs.
//!
//! A job is accepted by the HTTP boundary, detached onto the runtime, and from
//! then on only talks to the collector: keep-alives while the pipeline runs,
//! one result push at the end.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use scanbox_common::network::host::DiscoveryItem;
use scanbox_common::progress::Progress;
use scanbox_common::sink::{AssetId, DiscoveryRequest, ResultSink};
use scanbox_core::{DiscoveryPipeline, PipelineError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

#[derive(Clone)]
pub struct JobRunner {
    pipeline: Arc<DiscoveryPipeline>,
    sink: Arc<dyn ResultSink>,
    shutdown: CancellationToken,
    scan_timeout: Duration,
    deliver_partial: bool,
    active: Arc<AtomicUsize>,
}

/// Keeps the active job count accurate even if the job task panics.
struct JobGuard(Arc<AtomicUsize>);

impl JobGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobRunner {
    pub fn new(
        pipeline: Arc<DiscoveryPipeline>,
        sink: Arc<dyn ResultSink>,
        shutdown: CancellationToken,
        scan_timeout: Duration,
        deliver_partial: bool,
    ) -> Self {
        Self {
            pipeline,
            sink,
            shutdown,
            scan_timeout,
            deliver_partial,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Detaches the job and returns at once.
    pub fn spawn(&self, request: DiscoveryRequest) -> JoinHandle<()> {
        let guard = JobGuard::new(self.active.clone());
        let span = info_span!("job", asset_id = %request.asset_id);
        let runner = self.clone();

        tokio::spawn(
            async move {
                let _guard = guard;
                runner.execute(request).await;
            }
            .instrument(span),
        )
    }

    /// Waits until every running job has finished or `grace` has elapsed.
    pub async fn drain(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        while self.active_jobs() > 0 {
            if Instant::now() >= deadline {
                warn!("{} job(s) still running after {:?}, giving up", self.active_jobs(), grace);
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn execute(&self, request: DiscoveryRequest) {
        let DiscoveryRequest { asset_id, targets } = request;
        debug!("Targets: {:?}", targets);

        let cancel = self.shutdown.child_token();
        let timer = spawn_deadline(cancel.clone(), self.scan_timeout);
        let keep_alives = TaskTracker::new();
        let progress =
            keep_alive_progress(self.sink.clone(), asset_id.clone(), keep_alives.clone());

        let start_time = Instant::now();
        let outcome = self.pipeline.run(&targets, progress, cancel).await;
        timer.abort();

        // No keep-alive may reach the collector after the final push.
        keep_alives.close();
        keep_alives.wait().await;

        let Some(items) = self.settle(outcome) else {
            return;
        };

        match self.sink.push_results(&asset_id, &items).await {
            Ok(()) => info!(
                "Delivered {} item(s) in {:.1}s",
                items.len(),
                start_time.elapsed().as_secs_f64()
            ),
            Err(e) => error!("Failed to deliver results: {e}"),
        }
    }

    /// Decides what, if anything, gets delivered for a finished run.
    fn settle(
        &self,
        outcome: Result<Vec<DiscoveryItem>, PipelineError>,
    ) -> Option<Vec<DiscoveryItem>> {
        match outcome {
            Ok(items) => Some(items),
            Err(PipelineError::InvalidTarget(e)) => {
                warn!("Job rejected: {e}");
                None
            }
            Err(e) if self.deliver_partial => {
                warn!("Delivering partial results: {e}");
                Some(e.into_partial())
            }
            Err(e) => {
                error!("Discovery failed: {e}");
                None
            }
        }
    }
}

/// Cancels `cancel` once `after` has elapsed, unless it is cancelled first.
fn spawn_deadline(cancel: CancellationToken, after: Duration) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    warn!("Scan timeout of {:?} reached, cancelling", after);
                    cancel.cancel();
                }
            }
        }
        .in_current_span(),
    )
}

/// Each notification becomes one keep-alive request on its own task, so the
/// engine's ticker never waits for the collector. The tasks are tracked by
/// `tracker` so the job can wait for them before pushing results.
fn keep_alive_progress(
    sink: Arc<dyn ResultSink>,
    asset_id: AssetId,
    tracker: TaskTracker,
) -> Progress {
    let handle = Handle::current();
    let span = Span::current();

    Progress::new(move || {
        let sink = sink.clone();
        let asset_id = asset_id.clone();
        tracker.spawn_on(
            async move {
                match sink.keep_alive(&asset_id).await {
                    Ok(()) => debug!("Keep-alive sent"),
                    Err(e) => warn!("Keep-alive failed: {e}"),
                }
            }
            .instrument(span.clone()),
            &handle,
        );
    })
}

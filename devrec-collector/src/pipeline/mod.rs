//! Pipeline supervisor
//!
//! Runs the Enqueuer and Uploader side by side under one `FlowControl` and
//! reports why they stopped. `PipelineManager` owns at most one running
//! pipeline for the HTTP surface.

pub mod enqueuer;
pub mod uploader;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::control::{FlowControl, StopReceiver};
use crate::db::CatalogDb;
use crate::error::CollectorResult;
use crate::sources::Collaborators;

pub use enqueuer::{EnqueuePass, Enqueuer};
pub use uploader::{UploadStep, Uploader};

/// Why a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Both loops returned without being asked to stop
    Completed,
    StoppedByRequest,
    /// An error category went past its ceiling
    TooManyErrors,
}

fn log_loop_exit(name: &str, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(task = name, error = %e, "Pipeline task ended abnormally");
    }
}

/// Run both loops until a stop request, a tripped ceiling, or both loops
/// ending on their own
///
/// An interrupted validation left by an earlier run is replayed before
/// either loop starts.
pub async fn run_pipeline(
    db: CatalogDb,
    collaborators: Collaborators,
    config: PipelineConfig,
    ctrl: FlowControl,
    mut stop: StopReceiver,
) -> PipelineOutcome {
    info!("Pipeline starting");

    match db.recover_validation(&ctrl).await {
        Ok(true) => info!("Recovered interrupted validation"),
        Ok(false) => {}
        Err(e) => db.monitor().report(&e, "recover validation", &ctrl).await,
    }

    let enqueuer = Enqueuer::new(db.clone(), collaborators.discovery.clone(), config.clone());
    let uploader = Uploader::new(db, collaborators, config);

    let enqueuer_task = tokio::spawn(enqueuer.run(ctrl.clone()));
    let uploader_task = tokio::spawn(uploader.run(ctrl.clone()));
    let loops = async { tokio::join!(enqueuer_task, uploader_task) };
    tokio::pin!(loops);

    let mut loops_done = false;
    let outcome = tokio::select! {
        signalled = stop.recv() => {
            if signalled || ctrl.is_tripped() {
                PipelineOutcome::TooManyErrors
            } else {
                PipelineOutcome::StoppedByRequest
            }
        }
        _ = ctrl.cancelled() => {
            if ctrl.is_tripped() {
                PipelineOutcome::TooManyErrors
            } else {
                PipelineOutcome::StoppedByRequest
            }
        }
        (enqueued, uploaded) = &mut loops => {
            loops_done = true;
            log_loop_exit("enqueuer", enqueued);
            log_loop_exit("uploader", uploaded);
            if ctrl.is_tripped() {
                PipelineOutcome::TooManyErrors
            } else if ctrl.is_cancelled() {
                PipelineOutcome::StoppedByRequest
            } else {
                PipelineOutcome::Completed
            }
        }
    };

    ctrl.cancel();
    if !loops_done {
        let (enqueued, uploaded) = loops.await;
        log_loop_exit("enqueuer", enqueued);
        log_loop_exit("uploader", uploaded);
    }

    match outcome {
        PipelineOutcome::TooManyErrors => error!("Pipeline stopped: too many errors"),
        PipelineOutcome::StoppedByRequest => info!("Pipeline stopped by request"),
        PipelineOutcome::Completed => info!("Pipeline completed"),
    }
    outcome
}

/// Snapshot of the managed pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// True from start until the run has fully wound down
    pub running: bool,
    /// A stop was requested and the loops are still finishing
    pub stopping: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<PipelineOutcome>,
}

struct RunningPipeline {
    ctrl: FlowControl,
    /// Taken by `stop` while it waits for the run; the entry itself stays
    /// in place until the join completes
    handle: Option<JoinHandle<PipelineOutcome>>,
    started_at: DateTime<Utc>,
}

impl RunningPipeline {
    fn is_stopping(&self) -> bool {
        self.handle.is_none()
    }
}

#[derive(Default)]
struct ManagerState {
    running: Option<RunningPipeline>,
    last_outcome: Option<PipelineOutcome>,
}

impl ManagerState {
    /// Collect the outcome of a run that already ended on its own
    async fn reap(&mut self) {
        let finished = self
            .running
            .as_ref()
            .and_then(|run| run.handle.as_ref())
            .is_some_and(|handle| handle.is_finished());
        if !finished {
            return;
        }
        if let Some(handle) = self.running.take().and_then(|run| run.handle) {
            self.last_outcome = join_outcome(handle).await;
        }
    }
}

async fn join_outcome(handle: JoinHandle<PipelineOutcome>) -> Option<PipelineOutcome> {
    match handle.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %e, "Pipeline supervisor task failed");
            None
        }
    }
}

/// Starts, stops and reports on the single pipeline of this process
///
/// A run counts as running until its loops have returned, including while
/// a stop is winding it down, so no second run and no catalog reset can
/// overlap it.
pub struct PipelineManager {
    db: CatalogDb,
    collaborators: Collaborators,
    config: PipelineConfig,
    state: Mutex<ManagerState>,
}

impl PipelineManager {
    pub fn new(db: CatalogDb, collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            db,
            collaborators,
            config,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Reset the error counters and launch a run
    ///
    /// Returns `false` without side effects when a run is active or still
    /// stopping.
    pub async fn start(&self) -> CollectorResult<bool> {
        let mut state = self.state.lock().await;
        state.reap().await;
        if let Some(run) = &state.running {
            warn!(stopping = run.is_stopping(), "Pipeline start requested while running");
            return Ok(false);
        }

        self.db.monitor().reset().await?;

        let (ctrl, stop) = FlowControl::new();
        let handle = tokio::spawn(run_pipeline(
            self.db.clone(),
            self.collaborators.clone(),
            self.config.clone(),
            ctrl.clone(),
            stop,
        ));

        state.running = Some(RunningPipeline {
            ctrl,
            handle: Some(handle),
            started_at: Utc::now(),
        });
        state.last_outcome = None;
        Ok(true)
    }

    /// Cancel the active run and wait for it
    ///
    /// `None` if nothing was running or another stop is already waiting on
    /// the run.
    pub async fn stop(&self) -> Option<PipelineOutcome> {
        let handle = {
            let mut state = self.state.lock().await;
            state.reap().await;
            let run = state.running.as_mut()?;
            run.ctrl.cancel();
            run.handle.take()?
        };

        let outcome = join_outcome(handle).await;

        let mut state = self.state.lock().await;
        state.running = None;
        state.last_outcome = outcome;
        outcome
    }

    pub async fn status(&self) -> PipelineStatus {
        let mut state = self.state.lock().await;
        state.reap().await;
        PipelineStatus {
            running: state.running.is_some(),
            stopping: state.running.as_ref().is_some_and(RunningPipeline::is_stopping),
            started_at: state.running.as_ref().map(|run| run.started_at),
            last_outcome: state.last_outcome,
        }
    }

    /// Wipe the catalog and error counters unless a run is active
    ///
    /// Holds the manager lock throughout so no run can start mid-reset.
    /// Returns `false` without side effects when a run is active or still
    /// stopping.
    pub async fn reset_catalog(&self, ctrl: &FlowControl) -> CollectorResult<bool> {
        let mut state = self.state.lock().await;
        state.reap().await;
        if state.running.is_some() {
            return Ok(false);
        }

        self.db.reset_all(ctrl).await?;
        self.db.monitor().reset().await?;
        Ok(true)
    }

    pub fn db(&self) -> &CatalogDb {
        &self.db
    }
}

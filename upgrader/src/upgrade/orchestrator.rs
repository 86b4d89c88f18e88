//! Drives one device through the upgrade state machine

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::device::{ConnectionHandle, DeviceClient, ReadinessResult};
use crate::errors::{ErrorKind, UpgradeError};
use crate::models::artifact::ArtifactRef;
use crate::models::device::{validate_hostname, Device};
use crate::models::snapshot::Phase;
use crate::snapshot::diff::{diff, DiffSummary};
use crate::snapshot::report::{render_report, ReportRenderer};
use crate::snapshot::store::{SnapshotStore, StoredSnapshot};
use crate::storage::settings::Settings;
use crate::upgrade::fsm::{UpgradeEvent, UpgradeState, UpgradeStep};
use crate::upgrade::job::{UpgradeJob, UpgradePlan};
use crate::upgrade::registry::JobRegistry;
use crate::upgrade::report::{JobOutcome, JobReport, SkipReason, StepRecord};

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Attempts per step before the job fails
    pub retry_count: u32,

    /// Delay between attempts
    pub retry_delay: Duration,

    /// Take pre/post snapshots and diff them
    pub pre_post_snapshots: bool,

    /// Render the diff report document
    pub generate_report: bool,

    /// How long to wait for the device after reboot
    pub ready_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for OrchestratorSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            retry_count: settings.retry_count,
            retry_delay: settings.retry_delay(),
            pre_post_snapshots: settings.pre_post_snapshots,
            generate_report: settings.generate_pdf_diff,
            ready_timeout: settings.ready_timeout(),
        }
    }
}

/// Result of one successful step attempt
enum StepOutput {
    Connected {
        handle: ConnectionHandle,
        version: String,
    },
    BackedUp(ArtifactRef),
    Snapshotted(StoredSnapshot),
    Readiness(ReadinessResult),
    Done,
    Ready {
        version: String,
    },
    Diffed {
        post: StoredSnapshot,
        summary: DiffSummary,
        report: Option<ArtifactRef>,
    },
}

struct Failure {
    step: UpgradeStep,
    error: UpgradeError,
}

/// Everything a job accumulates on its way to a terminal state
struct JobContext {
    handle: Option<ConnectionHandle>,
    pre: Option<StoredSnapshot>,
    steps: Vec<StepRecord>,
    planned_actions: Vec<String>,
    version_before: Option<String>,
    version_after: Option<String>,
    readiness: Option<ReadinessResult>,
    backup: Option<ArtifactRef>,
    post_snapshot: Option<ArtifactRef>,
    diff: Option<DiffSummary>,
    report: Option<ArtifactRef>,
    failure: Option<Failure>,
}

impl JobContext {
    fn new() -> Self {
        Self {
            handle: None,
            pre: None,
            steps: Vec::new(),
            planned_actions: Vec::new(),
            version_before: None,
            version_after: None,
            readiness: None,
            backup: None,
            post_snapshot: None,
            diff: None,
            report: None,
            failure: None,
        }
    }

    fn handle(&self) -> Result<&ConnectionHandle, UpgradeError> {
        self.handle
            .as_ref()
            .ok_or_else(|| UpgradeError::Internal("no device session".to_string()))
    }

    fn absorb(&mut self, output: StepOutput, job: &mut UpgradeJob) {
        match output {
            StepOutput::Connected { handle, version } => {
                self.handle = Some(handle);
                self.version_before = Some(version);
            }
            StepOutput::BackedUp(artifact) => self.backup = Some(artifact),
            StepOutput::Snapshotted(stored) => self.pre = Some(stored),
            StepOutput::Readiness(result) => self.readiness = Some(result),
            StepOutput::Done => {}
            StepOutput::Ready { version } => {
                job.device.current_version = Some(version.clone());
                self.version_after = Some(version);
            }
            StepOutput::Diffed {
                post,
                summary,
                report,
            } => {
                self.post_snapshot = Some(post.artifact);
                self.diff = Some(summary);
                self.report = report;
            }
        }
    }

    fn into_report(self, job: &UpgradeJob, started_at: chrono::DateTime<Utc>) -> JobReport {
        let outcome = match (&self.failure, job.state()) {
            (None, UpgradeState::Completed) => JobOutcome::Completed,
            (Some(failure), _) => JobOutcome::Failed {
                kind: failure.error.kind(),
                step: failure.step,
                message: failure.error.to_string(),
            },
            (None, state) => JobOutcome::Failed {
                kind: ErrorKind::Internal,
                step: state.next_step().unwrap_or(UpgradeStep::Diff),
                message: format!("job stopped in state {:?}", state),
            },
        };

        JobReport {
            job_id: job.id,
            hostname: job.device.hostname.clone(),
            target_version: job.plan.target_version.clone(),
            dry_run: job.plan.dry_run,
            outcome,
            final_state: job.state(),
            steps: self.steps,
            planned_actions: self.planned_actions,
            version_before: self.version_before,
            version_after: self.version_after,
            readiness: self.readiness,
            backup: self.backup,
            pre_snapshot: self.pre.map(|p| p.artifact),
            post_snapshot: self.post_snapshot,
            diff: self.diff,
            report: self.report,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Runs upgrade jobs
pub struct Orchestrator {
    settings: OrchestratorSettings,
    store: SnapshotStore,
    renderer: Box<dyn ReportRenderer>,
    registry: JobRegistry,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        store: SnapshotStore,
        renderer: Box<dyn ReportRenderer>,
        registry: JobRegistry,
    ) -> Self {
        Self {
            settings,
            store,
            renderer,
            registry,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Upgrade one device and report how it ended
    ///
    /// Never returns an error: every failure ends up in the report.
    pub async fn run(
        &self,
        client: &dyn DeviceClient,
        device: Device,
        plan: UpgradePlan,
        cancel: &CancellationToken,
    ) -> JobReport {
        if let Err(e) = validate_hostname(&device.hostname) {
            error!("{}", e);
            return JobReport::not_started(&device, &plan, UpgradeStep::Connect, &e);
        }

        let _guard = match self.registry.try_acquire(&device.hostname) {
            Ok(guard) => guard,
            Err(e) => {
                error!("{}: {}", device.hostname, e);
                return JobReport::not_started(&device, &plan, UpgradeStep::Connect, &e);
            }
        };

        let started_at = Utc::now();
        let mut job = UpgradeJob::new(device, plan);
        let mut ctx = JobContext::new();
        info!(
            "{}: Starting job {} (target {}, dry_run={})",
            job.device.hostname, job.id, job.plan.target_version, job.plan.dry_run
        );

        if let Err(e) = self.drive(client, &mut job, &mut ctx, cancel).await {
            error!("{}: Job aborted: {}", job.device.hostname, e);
            let step = job.state().next_step().unwrap_or(UpgradeStep::Diff);
            ctx.failure = Some(Failure { step, error: e });
        }

        let report = ctx.into_report(&job, started_at);
        match &report.outcome {
            JobOutcome::Completed => info!("{}: Job completed", report.hostname),
            JobOutcome::Failed { kind, step, .. } => {
                error!("{}: Job failed at {} ({})", report.hostname, step, kind)
            }
        }
        report
    }

    /// Walk the state machine until a terminal state
    ///
    /// An error here means the state machine itself was misused.
    async fn drive(
        &self,
        client: &dyn DeviceClient,
        job: &mut UpgradeJob,
        ctx: &mut JobContext,
        cancel: &CancellationToken,
    ) -> Result<(), UpgradeError> {
        let max_attempts = self.settings.retry_count.max(1);
        let hostname = job.device.hostname.clone();

        while let Some(step) = job.state().next_step() {
            if step.is_safe_abort_point() && cancel.is_cancelled() {
                let err = UpgradeError::CancelledError(format!("cancelled before {}", step));
                return self.fail(job, ctx, step, err);
            }

            if let Some(reason) = self.skip_reason(step, job.plan.dry_run) {
                info!("{}: Skipping {} ({})", hostname, step, reason);
                if reason == SkipReason::DryRun {
                    ctx.planned_actions.push(self.describe(step, &job.plan));
                }
                ctx.steps.push(StepRecord::skipped(step, reason));
                job.apply(UpgradeEvent::StepSkipped(step))
                    .map_err(UpgradeError::Internal)?;
                continue;
            }

            let started = Instant::now();
            loop {
                let attempt = job.attempts() + 1;
                info!("{}: {} (attempt {}/{})", hostname, step, attempt, max_attempts);

                match self.execute(step, client, job, ctx).await {
                    Ok(StepOutput::Readiness(result)) if !result.is_ready() => {
                        let err = UpgradeError::ReadinessError {
                            failed: result.failed,
                            details: result.details.clone(),
                        };
                        ctx.readiness = Some(result);
                        ctx.steps
                            .push(StepRecord::executed(step, attempt, started.elapsed()));
                        return self.fail(job, ctx, step, err);
                    }
                    Ok(output) => {
                        ctx.absorb(output, job);
                        ctx.steps
                            .push(StepRecord::executed(step, attempt, started.elapsed()));
                        job.apply(UpgradeEvent::StepSucceeded(step))
                            .map_err(UpgradeError::Internal)?;
                        break;
                    }
                    Err(err) => {
                        job.apply(UpgradeEvent::AttemptFailed(step, err.to_string()))
                            .map_err(UpgradeError::Internal)?;

                        if !Self::may_retry(step, &err) || !job.fsm().can_retry(max_attempts) {
                            ctx.steps
                                .push(StepRecord::executed(step, job.attempts(), started.elapsed()));
                            return self.fail(job, ctx, step, err);
                        }

                        warn!(
                            "{}: {} failed (attempt {}/{}): {}; retrying in {:?}",
                            hostname, step, attempt, max_attempts, err, self.settings.retry_delay
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(self.settings.retry_delay) => {}
                            _ = cancel.cancelled(), if step.is_safe_abort_point() => {}
                        }

                        if step.is_safe_abort_point() && cancel.is_cancelled() {
                            ctx.steps
                                .push(StepRecord::executed(step, job.attempts(), started.elapsed()));
                            let err = UpgradeError::CancelledError(format!(
                                "cancelled while retrying {}",
                                step
                            ));
                            return self.fail(job, ctx, step, err);
                        }
                    }
                }
            }
        }

        job.apply(UpgradeEvent::Finish).map_err(UpgradeError::Internal)
    }

    fn fail(
        &self,
        job: &mut UpgradeJob,
        ctx: &mut JobContext,
        step: UpgradeStep,
        err: UpgradeError,
    ) -> Result<(), UpgradeError> {
        error!("{}: {} failed: {}", job.device.hostname, step, err);
        job.apply(UpgradeEvent::Fail(step, err.to_string()))
            .map_err(UpgradeError::Internal)?;
        ctx.failure = Some(Failure { step, error: err });
        Ok(())
    }

    /// Nothing after the reboot is retried; the install has already happened
    fn may_retry(step: UpgradeStep, err: &UpgradeError) -> bool {
        step != UpgradeStep::WaitReady && err.is_retryable()
    }

    fn skip_reason(&self, step: UpgradeStep, dry_run: bool) -> Option<SkipReason> {
        if dry_run && step.is_mutating() {
            return Some(SkipReason::DryRun);
        }
        if !self.settings.pre_post_snapshots
            && matches!(step, UpgradeStep::PreSnapshot | UpgradeStep::Diff)
        {
            return Some(SkipReason::Disabled);
        }
        None
    }

    fn describe(&self, step: UpgradeStep, plan: &UpgradePlan) -> String {
        match step {
            UpgradeStep::Backup => "export running configuration".to_string(),
            UpgradeStep::Download => format!("download PAN-OS {}", plan.target_version),
            UpgradeStep::Install => format!("install PAN-OS {}", plan.target_version),
            UpgradeStep::Reboot => "reboot device".to_string(),
            UpgradeStep::WaitReady => format!(
                "wait up to {}s for the device to come back on {}",
                self.settings.ready_timeout.as_secs(),
                plan.target_version
            ),
            other => other.name().to_string(),
        }
    }

    async fn execute(
        &self,
        step: UpgradeStep,
        client: &dyn DeviceClient,
        job: &UpgradeJob,
        ctx: &JobContext,
    ) -> Result<StepOutput, UpgradeError> {
        let hostname = job.device.hostname.as_str();
        let target = job.plan.target_version.as_str();

        match step {
            UpgradeStep::Connect => {
                let handle = client.connect().await?;
                let version = client.get_version(&handle).await?;
                info!("{}: Connected, running {}", hostname, version);
                Ok(StepOutput::Connected { handle, version })
            }
            UpgradeStep::Backup => {
                let artifact = client.backup_config(ctx.handle()?).await?;
                info!("{}: Configuration backed up to {}", hostname, artifact);
                Ok(StepOutput::BackedUp(artifact))
            }
            UpgradeStep::PreSnapshot => {
                let stored = self
                    .store
                    .take_snapshot(client, ctx.handle()?, hostname, Phase::Pre)
                    .await?;
                Ok(StepOutput::Snapshotted(stored))
            }
            UpgradeStep::ReadinessCheck => {
                let result = client.readiness_check(ctx.handle()?).await?;
                info!(
                    "{}: Readiness passed={} failed={} skipped={}",
                    hostname, result.passed, result.failed, result.skipped
                );
                Ok(StepOutput::Readiness(result))
            }
            UpgradeStep::Download => {
                client.download_image(ctx.handle()?, target).await?;
                info!("{}: Downloaded {}", hostname, target);
                Ok(StepOutput::Done)
            }
            UpgradeStep::Install => {
                client.install_image(ctx.handle()?, target).await?;
                info!("{}: Installed {}", hostname, target);
                Ok(StepOutput::Done)
            }
            UpgradeStep::Reboot => {
                client.reboot(ctx.handle()?).await?;
                info!("{}: Reboot issued", hostname);
                Ok(StepOutput::Done)
            }
            UpgradeStep::WaitReady => {
                let handle = ctx.handle()?;
                let timeout = self.settings.ready_timeout;
                tokio::time::timeout(timeout, client.wait_for_ready(handle, timeout))
                    .await
                    .map_err(|_| UpgradeError::PostRebootTimeoutError(timeout))??;

                let version = client.get_version(handle).await?;
                if version != target {
                    return Err(UpgradeError::InstallError(format!(
                        "device reports {} after upgrading to {}",
                        version, target
                    )));
                }
                info!("{}: Back online on {}", hostname, version);
                Ok(StepOutput::Ready { version })
            }
            UpgradeStep::Diff => {
                let handle = ctx.handle()?;
                let pre = ctx
                    .pre
                    .as_ref()
                    .ok_or_else(|| UpgradeError::Internal("no pre-upgrade snapshot".to_string()))?;
                let post = self
                    .store
                    .take_snapshot(client, handle, hostname, Phase::Post)
                    .await?;

                let diff_report = diff(&pre.snapshot, &post.snapshot);
                let summary = diff_report.summary();
                info!("{}: {}", hostname, summary);

                let report = if self.settings.generate_report {
                    let layout = self.store.layout();
                    Some(render_report(layout, &diff_report, self.renderer.as_ref()).await?)
                } else {
                    None
                };
                Ok(StepOutput::Diffed {
                    post,
                    summary,
                    report,
                })
            }
        }
    }
}

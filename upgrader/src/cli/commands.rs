//! Command execution

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::cli::prompt::resolve_credentials;
use crate::cli::{BatchArgs, Cli, Commands, FirewallArgs, PanoramaArgs};
use crate::device::remote::RemoteFactory;
use crate::device::simulated::{SimulatedFactory, SimulationProfile};
use crate::device::DeviceClientFactory;
use crate::errors::UpgradeError;
use crate::filesys::file::File;
use crate::fleet::scheduler::FleetScheduler;
use crate::fleet::summary::{print_summary, FleetReport, EXIT_JOB_FAILED, EXIT_OK};
use crate::http::client::HttpClient;
use crate::logs::{init_logging, LogLevel, LogOptions};
use crate::models::device::{validate_hostname, Device};
use crate::snapshot::report::renderer_for;
use crate::snapshot::store::SnapshotStore;
use crate::storage::inventory::Inventory;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::storage::skeleton::{write_skeleton, SkeletonOutcome, INVENTORY_TEMPLATE, SETTINGS_TEMPLATE};
use crate::upgrade::health::{health_check, HealthReport};
use crate::upgrade::job::UpgradePlan;
use crate::upgrade::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::upgrade::registry::JobRegistry;
use crate::utils::version_info;

/// Run the parsed command line and return the process exit status
///
/// An `Err` is a startup failure: bad settings, bad inventory, unusable
/// controller URL or missing credentials. Device failures are reported in
/// the exit status instead.
pub async fn execute<S>(cli: Cli, shutdown: S) -> Result<u8, UpgradeError>
where
    S: Future<Output = ()> + Send + 'static,
{
    match &cli.command {
        Commands::Version => {
            println!("{}", serde_json::to_string_pretty(&version_info())?);
            return Ok(EXIT_OK);
        }
        Commands::Inventory(args) => return skeleton(&args.path, INVENTORY_TEMPLATE).await,
        Commands::Settings(args) => return skeleton(&args.path, SETTINGS_TEMPLATE).await,
        _ => {}
    }

    let settings = Settings::load_from_file(&File::new(&cli.settings)).await?;
    let layout = StorageLayout::new(&settings.storage_dir);
    let _log_guard = start_logging(&cli, &settings, &layout);
    info!("Loaded settings: {:?}", settings);

    let runtime = Runtime::new(&cli, &settings, layout)?;

    let cancel = CancellationToken::new();
    let on_shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown.await;
        warn!("Shutdown requested; jobs stop at their next safe point");
        on_shutdown.cancel();
    });

    match &cli.command {
        Commands::Firewall(args) => runtime.firewall(args, &cancel, cli.json).await,
        Commands::Panorama(args) => runtime.panorama(args, &cancel, cli.json).await,
        Commands::Batch(args) => runtime.batch(args, &cancel, cli.json).await,
        Commands::Version | Commands::Inventory(_) | Commands::Settings(_) => Ok(EXIT_OK),
    }
}

async fn skeleton(path: &Path, template: &str) -> Result<u8, UpgradeError> {
    match write_skeleton(&File::new(path), template).await? {
        SkeletonOutcome::Created => {
            println!("{}", format!("Created {}", path.display()).as_str().green());
        }
        SkeletonOutcome::AlreadyExists => {
            println!(
                "{}",
                format!("{} already exists; not overwriting.", path.display())
                    .as_str()
                    .yellow()
            );
        }
    }
    Ok(EXIT_OK)
}

fn start_logging(cli: &Cli, settings: &Settings, layout: &StorageLayout) -> Option<WorkerGuard> {
    let options = LogOptions {
        log_level: if cli.verbose {
            LogLevel::Debug
        } else {
            settings.log_level.clone()
        },
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        json_format: settings.log_json,
        ..Default::default()
    };
    match init_logging(options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    }
}

fn build_factory(
    controller_url: Option<&str>,
    settings: &Settings,
    layout: &StorageLayout,
) -> Result<Arc<dyn DeviceClientFactory>, UpgradeError> {
    match controller_url {
        Some(url) => {
            info!("Using device-control service at {}", url);
            Ok(Arc::new(RemoteFactory {
                http: Arc::new(HttpClient::new(url)?),
                layout: layout.clone(),
                poll_interval: settings.ready_poll_interval(),
            }))
        }
        None => {
            warn!("No --controller-url given; using the built-in firewall simulator");
            Ok(Arc::new(SimulatedFactory {
                profile: SimulationProfile {
                    poll_interval: settings.ready_poll_interval(),
                    ..Default::default()
                },
                layout: layout.clone(),
            }))
        }
    }
}

/// Everything a device command needs, built once from the settings
struct Runtime {
    orchestrator: Arc<Orchestrator>,
    factory: Arc<dyn DeviceClientFactory>,
    concurrency: usize,
}

impl Runtime {
    fn new(cli: &Cli, settings: &Settings, layout: StorageLayout) -> Result<Self, UpgradeError> {
        let factory = build_factory(cli.controller_url.as_deref(), settings, &layout)?;
        let orchestrator = Orchestrator::new(
            OrchestratorSettings::from(settings),
            SnapshotStore::new(layout),
            renderer_for(settings.report_format),
            JobRegistry::new(),
        );
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            factory,
            concurrency: settings.concurrency,
        })
    }

    async fn upgrade_one(
        &self,
        device: Device,
        plan: UpgradePlan,
        cancel: &CancellationToken,
    ) -> Result<FleetReport, UpgradeError> {
        let client = self.factory.client_for(&device)?;
        let report = self
            .orchestrator
            .run(client.as_ref(), device, plan, cancel)
            .await;
        Ok(FleetReport::single(report))
    }

    async fn firewall(
        &self,
        args: &FirewallArgs,
        cancel: &CancellationToken,
        json: bool,
    ) -> Result<u8, UpgradeError> {
        validate_hostname(&args.host)?;
        let credentials = resolve_credentials(&args.credentials)?;
        let device = Device::new(&args.host, &args.host, credentials);
        let plan = UpgradePlan::new(&args.target_version, args.mode.is_dry_run());

        let report = self.upgrade_one(device, plan, cancel).await?;
        print_fleet(&report, json)?;
        Ok(report.exit_code())
    }

    async fn panorama(
        &self,
        args: &PanoramaArgs,
        cancel: &CancellationToken,
        json: bool,
    ) -> Result<u8, UpgradeError> {
        validate_hostname(&args.host)?;
        let credentials = resolve_credentials(&args.credentials)?;
        let device = Device::new(&args.host, &args.host, credentials);

        if let Some(target_version) = &args.target_version {
            let plan = UpgradePlan::new(target_version, args.mode.is_dry_run());
            let report = self.upgrade_one(device, plan, cancel).await?;
            print_fleet(&report, json)?;
            return Ok(report.exit_code());
        }

        let client = self.factory.client_for(&device)?;
        match health_check(client.as_ref(), &device.hostname).await {
            Ok(health) => {
                print_health(&health, json)?;
                Ok(if health.is_healthy() { EXIT_OK } else { EXIT_JOB_FAILED })
            }
            Err(e) => {
                error!("{}: Health check failed: {}", device.hostname, e);
                println!("{} {}", "✗".red().bold(), e.to_string().as_str().red());
                Ok(EXIT_JOB_FAILED)
            }
        }
    }

    async fn batch(
        &self,
        args: &BatchArgs,
        cancel: &CancellationToken,
        json: bool,
    ) -> Result<u8, UpgradeError> {
        validate_hostname(&args.panorama_host)?;
        let inventory = Inventory::load_from_file(&File::new(&args.inventory)).await?;
        if inventory.firewalls.is_empty() {
            return Err(UpgradeError::ConfigError(format!(
                "{} lists no firewalls",
                args.inventory.display()
            )));
        }

        let credentials = resolve_credentials(&args.credentials)?;
        let mut devices = inventory.into_devices(Some(credentials.password.expose_secret()))?;
        for device in &mut devices {
            device.via = Some(args.panorama_host.clone());
        }

        let panorama = Device::new(&args.panorama_host, &args.panorama_host, credentials);
        let client = self.factory.client_for(&panorama)?;
        if let Err(e) = client.connect().await {
            error!("{}: Panorama unreachable: {}", panorama.hostname, e);
            println!("{} {}", "✗".red().bold(), e.to_string().as_str().red());
            return Ok(EXIT_JOB_FAILED);
        }
        info!("{}: Panorama session established", panorama.hostname);

        let plan = UpgradePlan::new(&args.target_version, args.mode.is_dry_run());
        let scheduler = FleetScheduler::new(
            self.orchestrator.clone(),
            self.factory.clone(),
            self.concurrency,
        );
        let report = scheduler.run(devices, plan, cancel).await;
        print_fleet(&report, json)?;
        Ok(report.exit_code())
    }
}

fn print_fleet(report: &FleetReport, json: bool) -> Result<(), UpgradeError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_summary(report);
    }
    Ok(())
}

fn print_health(health: &HealthReport, json: bool) -> Result<(), UpgradeError> {
    if json {
        println!("{}", serde_json::to_string_pretty(health)?);
        return Ok(());
    }

    let r = &health.readiness;
    let status = if health.is_healthy() {
        "healthy".green().bold()
    } else {
        "not ready".red().bold()
    };
    println!("{} running {}: {}", health.hostname.as_str().bold(), health.version, status);
    println!(
        "  readiness passed={} failed={} skipped={}",
        r.passed, r.failed, r.skipped
    );
    if !r.details.is_empty() {
        println!("  {}", r.details.as_str().bright_black());
    }
    Ok(())
}

//! FleetDeploy - MDM deployment orchestration
//!
//! Usage:
//!   fleetdeploy init --server-url https://mdm.example.com --organization-id acme
//!   fleetdeploy deploy --app com.example.app --target device-1 --target device-2
//!   fleetdeploy enroll device-1 --token <enrollment token>
//!   fleetdeploy report --period weekly --audit-logs
//!   fleetdeploy --simulate deploy ...   # In-process fleet, no servers

mod output;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use fleetdeploy_core::config::{
    ComplianceConfiguration, ConfigStore, DistributionConfiguration, FleetConfig,
    FleetConfigFile, MdmConfiguration,
};
use fleetdeploy_core::context::FleetContext;
use fleetdeploy_core::orchestration::{DeployRequest, fleet_analytics};
use fleetdeploy_core::transport::SimulatedFleet;
use fleetdeploy_core::types::{
    AppBundle, AppMetadata, DeploymentStatus, Device, MdmPolicy, ReportPeriod,
};

#[derive(Parser)]
#[command(name = "fleetdeploy")]
#[command(about = "Deploy signed apps to MDM-managed devices", long_about = None)]
struct Cli {
    /// Path to fleetdeploy.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run against an in-process simulated fleet instead of real servers
    #[arg(long, global = true)]
    simulate: bool,

    /// JSON-lines audit log to load before and append to after the command
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update fleetdeploy.toml
    Init(InitArgs),

    /// Sign, upload and install an app on target devices
    Deploy(DeployArgs),

    /// Enroll a device with a single-use enrollment token
    Enroll(EnrollArgs),

    /// Stream device data-access events while polling device health
    Monitor {
        /// Devices to poll (all enrolled devices when omitted)
        #[arg(long = "device")]
        devices: Vec<String>,

        /// Seconds between polls
        #[arg(long, default_value_t = 30)]
        interval: u64,

        /// Number of polling rounds
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },

    /// Compliance report over a rolling period
    Report {
        #[arg(long, default_value = "daily")]
        period: PeriodArg,

        /// Include the matching audit log entries
        #[arg(long)]
        audit_logs: bool,
    },

    /// Fleet-wide deployment analytics from the audit log
    Analytics,

    /// Check an app bundle against compliance requirements
    Compliance(BundleArgs),
}

#[derive(Args)]
struct InitArgs {
    #[arg(long)]
    server_url: Option<String>,

    #[arg(long)]
    organization_id: Option<String>,

    /// Bearer token for the MDM and distribution servers
    #[arg(long)]
    auth_token: Option<String>,

    #[arg(long)]
    app_store_url: Option<String>,

    #[arg(long)]
    signing_certificate: Option<PathBuf>,

    #[arg(long)]
    provisioning_profile: Option<PathBuf>,

    /// Allow uploading unsigned bundles
    #[arg(long)]
    no_signing: bool,
}

#[derive(Args)]
struct DeployArgs {
    #[command(flatten)]
    bundle: BundleArgs,

    /// Target device identifier (repeatable)
    #[arg(long = "target", required = true)]
    targets: Vec<String>,

    /// JSON file holding an array of policies to apply before install
    #[arg(long)]
    policies: Option<PathBuf>,

    /// Keep deploying to remaining devices after a failure
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct EnrollArgs {
    /// Device identifier
    device: String,

    /// Enrollment token (at least 32 characters)
    #[arg(long)]
    token: String,

    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value = "unknown")]
    model: String,

    #[arg(long, default_value = "0.0.0")]
    os_version: String,
}

#[derive(Args)]
struct BundleArgs {
    /// JSON file describing the app bundle
    #[arg(long, conflicts_with = "app")]
    bundle: Option<PathBuf>,

    /// App identifier, for bundles described on the command line
    #[arg(long, required_unless_present = "bundle")]
    app: Option<String>,

    #[arg(long, requires = "app")]
    version: Option<String>,

    #[arg(long, requires = "app")]
    source_url: Option<String>,

    /// Display name
    #[arg(long, requires = "app")]
    name: Option<String>,

    /// Payload size in bytes
    #[arg(long, requires = "app")]
    size: Option<u64>,

    #[arg(long, requires = "app")]
    privacy_policy_url: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<PeriodArg> for ReportPeriod {
    fn from(period: PeriodArg) -> Self {
        match period {
            PeriodArg::Daily => ReportPeriod::Daily,
            PeriodArg::Weekly => ReportPeriod::Weekly,
            PeriodArg::Monthly => ReportPeriod::Monthly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetdeploy=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Commands::Init(args) = &cli.command {
        let code = run_init(&config_store(&cli)?, args)?;
        if code != 0 {
            std::process::exit(code);
        }
        return Ok(());
    }

    let context = build_context(&cli)?;

    if let Some(path) = &cli.audit_log {
        load_audit_log(&context, path)?;
    }

    let outcome = run(&cli, &context).await;

    if let Some(path) = &cli.audit_log {
        save_audit_log(&context, path)?;
    }

    let exit_code = outcome?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run(cli: &Cli, context: &FleetContext) -> Result<i32> {
    match &cli.command {
        Commands::Init(args) => run_init(&config_store(cli)?, args),
        Commands::Deploy(args) => run_deploy(context, args, cli.format).await,
        Commands::Enroll(args) => {
            run_enroll(context, args, cli.format).await?;
            Ok(0)
        }
        Commands::Monitor {
            devices,
            interval,
            rounds,
        } => {
            run_monitor(context, devices, Duration::from_secs(*interval), *rounds).await?;
            Ok(0)
        }
        Commands::Report { period, audit_logs } => {
            let report = context
                .compliance()
                .report((*period).into(), *audit_logs)
                .context("Failed to generate compliance report")?;
            match cli.format {
                OutputFormat::Table => output::print_report(&report),
                OutputFormat::Json => output::print_json(&report)?,
            }
            Ok(0)
        }
        Commands::Analytics => {
            context
                .registry()
                .sync()
                .await
                .context("Failed to list enrolled devices")?;
            let enrolled = context.registry().list_enrolled().await.len();
            let analytics = fleet_analytics(&context.audit().entries(), enrolled);
            match cli.format {
                OutputFormat::Table => output::print_analytics(&analytics),
                OutputFormat::Json => output::print_json(&analytics)?,
            }
            Ok(0)
        }
        Commands::Compliance(args) => {
            let bundle = read_bundle(args)?;
            let requirements = context.compliance().requirements(&bundle)?;
            let assessment = context.compliance().security_assessment(&bundle)?;
            match cli.format {
                OutputFormat::Table => output::print_compliance(&bundle, &requirements, &assessment),
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "app_identifier": bundle.identifier(),
                    "requirements": requirements,
                    "security_assessment": assessment,
                }))?,
            }
            Ok(if requirements.is_compliant { 0 } else { 1 })
        }
    }
}

async fn run_deploy(context: &FleetContext, args: &DeployArgs, format: OutputFormat) -> Result<i32> {
    let bundle = read_bundle(&args.bundle)?;
    let policies = match &args.policies {
        Some(path) => read_policies(path)?,
        None => Vec::new(),
    };

    context
        .registry()
        .sync()
        .await
        .context("Failed to load enrolled devices from the MDM server")?;

    let request = DeployRequest::new(bundle)
        .with_targets(args.targets.iter().cloned())
        .with_policies(policies)
        .with_force(args.force);
    let result = context
        .orchestrator()
        .deploy(request)
        .await
        .context("Deployment aborted")?;

    match format {
        OutputFormat::Table => output::print_deployment(&result),
        OutputFormat::Json => output::print_json(&result)?,
    }
    Ok(deploy_exit_code(result.status))
}

fn deploy_exit_code(status: DeploymentStatus) -> i32 {
    match status {
        DeploymentStatus::Success => 0,
        DeploymentStatus::PartialFailure | DeploymentStatus::Failure => 1,
    }
}

/// Write the given settings into the config file, keeping everything else.
/// Returns 1 when the saved file does not validate yet.
fn run_init(store: &ConfigStore, args: &InitArgs) -> Result<i32> {
    let mut file = store
        .load_file()
        .with_context(|| format!("Failed to read {}", store.config_path().display()))?;
    apply_init(&mut file, args);
    store.save(&file)?;
    println!("Wrote {}", store.config_path().display());

    match store.load() {
        Ok(_) => Ok(0),
        Err(e) => {
            eprintln!("Configuration is not complete yet: {}", e);
            Ok(1)
        }
    }
}

fn apply_init(file: &mut FleetConfigFile, args: &InitArgs) {
    if let Some(url) = &args.server_url {
        file.mdm.server_url = Some(url.clone());
    }
    if let Some(org) = &args.organization_id {
        file.mdm.organization_id = Some(org.clone());
    }
    if let Some(token) = &args.auth_token {
        file.mdm.auth_token = token.clone();
    }
    if let Some(url) = &args.app_store_url {
        file.distribution.app_store_url = Some(url.clone());
    }
    if let Some(path) = &args.signing_certificate {
        file.distribution.signing_certificate_path = path.clone();
    }
    if let Some(path) = &args.provisioning_profile {
        file.distribution.provisioning_profile_path = path.clone();
    }
    if args.no_signing {
        file.distribution.requires_signing = false;
    }
}

async fn run_enroll(context: &FleetContext, args: &EnrollArgs, format: OutputFormat) -> Result<()> {
    let device = Device::new(
        args.device.clone(),
        args.name.clone().unwrap_or_else(|| args.device.clone()),
        args.model.clone(),
        args.os_version.clone(),
    );
    let response = context
        .registry()
        .enroll(&device, &args.token)
        .await
        .with_context(|| format!("Failed to enroll {}", args.device))?;

    match format {
        OutputFormat::Table => println!("{}: {:?}", args.device, response.status),
        OutputFormat::Json => output::print_json(&response)?,
    }
    Ok(())
}

async fn run_monitor(
    context: &FleetContext,
    devices: &[String],
    interval: Duration,
    rounds: u32,
) -> Result<()> {
    context
        .registry()
        .sync()
        .await
        .context("Failed to load enrolled devices from the MDM server")?;

    let subscription = context
        .compliance()
        .monitor_data_access(output::print_data_access)
        .context("Failed to start data access monitor")?;

    for round in 0..rounds {
        if round > 0 {
            tokio::time::sleep(interval).await;
        }
        let targets: Vec<String> = if devices.is_empty() {
            context
                .registry()
                .list_enrolled()
                .await
                .into_iter()
                .map(|d| d.identifier)
                .collect()
        } else {
            devices.to_vec()
        };
        for id in &targets {
            match context.registry().health(id).await {
                Ok(health) => output::print_health(id, &health),
                Err(e) => eprintln!("{}: {}", id, e),
            }
        }
    }

    // Let the monitor task drain what was just published.
    tokio::task::yield_now().await;
    subscription.cancel();
    Ok(())
}

fn build_context(cli: &Cli) -> Result<FleetContext> {
    let config = load_config(cli)?;
    if !cli.simulate {
        return FleetContext::with_http(config).context("Failed to create server clients");
    }

    // Seed the simulated server with the devices the command names.
    let mut fleet = SimulatedFleet::new();
    let seeded: Vec<&String> = match &cli.command {
        Commands::Deploy(args) => args.targets.iter().collect(),
        Commands::Monitor { devices, .. } => devices.iter().collect(),
        _ => Vec::new(),
    };
    for id in seeded {
        fleet = fleet.with_enrolled(Device::new(id.clone(), id.clone(), "simulated", "17.0"));
    }
    let (context, _fleet) = FleetContext::simulated_with(config, fleet);
    Ok(context)
}

fn config_store(cli: &Cli) -> Result<ConfigStore> {
    Ok(match &cli.config {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default()?,
    })
}

fn load_config(cli: &Cli) -> Result<FleetConfig> {
    let store = config_store(cli)?;
    if !store.exists() && cli.simulate {
        return simulated_config();
    }
    store
        .load()
        .with_context(|| format!("Failed to load {}", store.config_path().display()))
}

/// Configuration for `--simulate` runs without a config file.
fn simulated_config() -> Result<FleetConfig> {
    Ok(FleetConfig {
        mdm: MdmConfiguration::new("https://mdm.simulated.invalid", "simulated-org", "")?,
        distribution: DistributionConfiguration::new(
            "https://apps.simulated.invalid",
            false,
            "",
            "",
        )?,
        compliance: ComplianceConfiguration::new(true, true, true, true)?,
    })
}

fn read_bundle(args: &BundleArgs) -> Result<AppBundle> {
    if let Some(path) = &args.bundle {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("Invalid app bundle in {}", path.display()));
    }

    let Some(app) = &args.app else {
        anyhow::bail!("Either --bundle or --app is required");
    };
    let mut bundle = AppBundle::new(app.clone());
    if let Some(version) = &args.version {
        bundle = bundle.with_version(version.clone());
    }
    if let Some(source) = &args.source_url {
        bundle = bundle.with_source_url(parse_url("--source-url", source)?);
    }
    if args.name.is_some() || args.size.is_some() || args.privacy_policy_url.is_some() {
        let privacy_policy_url = args
            .privacy_policy_url
            .as_deref()
            .map(|u| parse_url("--privacy-policy-url", u))
            .transpose()?;
        bundle = bundle.with_metadata(AppMetadata {
            name: args.name.clone().unwrap_or_default(),
            size: args.size,
            privacy_policy_url,
            ..AppMetadata::default()
        });
    }
    Ok(bundle)
}

fn parse_url(flag: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("{} is not a valid URL: {}", flag, raw))
}

fn read_policies(path: &Path) -> Result<Vec<MdmPolicy>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid policies in {}", path.display()))
}

fn load_audit_log(context: &FleetContext, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let count = context
        .audit()
        .import_jsonl(BufReader::new(file))
        .with_context(|| format!("Failed to read audit log {}", path.display()))?;
    tracing::debug!(count, path = %path.display(), "audit log loaded");
    Ok(())
}

fn save_audit_log(context: &FleetContext, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to write {}", path.display()))?;
    context
        .audit()
        .export_jsonl(std::io::BufWriter::new(file))
        .with_context(|| format!("Failed to write audit log {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn bundle_args(args: &[&str]) -> BundleArgs {
        let mut full = vec!["fleetdeploy", "compliance"];
        full.extend_from_slice(args);
        match parse(&full).command {
            Commands::Compliance(bundle) => bundle,
            _ => panic!("expected compliance command"),
        }
    }

    #[test]
    fn deploy_parses_targets_and_force() {
        let cli = parse(&[
            "fleetdeploy",
            "deploy",
            "--app",
            "com.test.app",
            "--target",
            "d1",
            "--target",
            "d2",
            "--force",
        ]);
        let Commands::Deploy(args) = cli.command else {
            panic!("expected deploy command");
        };
        assert_eq!(args.targets, vec!["d1", "d2"]);
        assert!(args.force);
        assert_eq!(args.bundle.app.as_deref(), Some("com.test.app"));
    }

    #[test]
    fn deploy_requires_a_target() {
        let result = Cli::try_parse_from(["fleetdeploy", "deploy", "--app", "com.test.app"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = parse(&[
            "fleetdeploy",
            "analytics",
            "--simulate",
            "--format",
            "json",
            "--audit-log",
            "audit.jsonl",
        ]);
        assert!(cli.simulate);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.audit_log, Some(PathBuf::from("audit.jsonl")));
    }

    #[test]
    fn bundle_file_and_app_conflict() {
        let result = Cli::try_parse_from([
            "fleetdeploy",
            "compliance",
            "--bundle",
            "bundle.json",
            "--app",
            "com.test.app",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn bundle_or_app_is_required() {
        assert!(Cli::try_parse_from(["fleetdeploy", "compliance"]).is_err());
    }

    #[test]
    fn bundle_flags_require_app() {
        let result = Cli::try_parse_from([
            "fleetdeploy",
            "compliance",
            "--bundle",
            "bundle.json",
            "--version",
            "1.0.0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn enroll_parses_with_defaults() {
        let cli = parse(&["fleetdeploy", "enroll", "d1", "--token", "t"]);
        let Commands::Enroll(args) = cli.command else {
            panic!("expected enroll command");
        };
        assert_eq!(args.device, "d1");
        assert_eq!(args.model, "unknown");
        assert!(args.name.is_none());
    }

    #[test]
    fn monitor_parses_with_defaults() {
        let cli = parse(&["fleetdeploy", "monitor", "--device", "d1"]);
        let Commands::Monitor {
            devices,
            interval,
            rounds,
        } = cli.command
        else {
            panic!("expected monitor command");
        };
        assert_eq!(devices, vec!["d1"]);
        assert_eq!(interval, 30);
        assert_eq!(rounds, 1);
    }

    #[test]
    fn report_period_is_validated() {
        let cli = parse(&["fleetdeploy", "report", "--period", "weekly", "--audit-logs"]);
        let Commands::Report { period, audit_logs } = cli.command else {
            panic!("expected report command");
        };
        assert_eq!(ReportPeriod::from(period), ReportPeriod::Weekly);
        assert!(audit_logs);

        assert!(Cli::try_parse_from(["fleetdeploy", "report", "--period", "yearly"]).is_err());
    }

    #[test]
    fn bundle_metadata_is_built_from_flags() {
        let args = bundle_args(&[
            "--app",
            "com.test.app",
            "--version",
            "1.2.0",
            "--source-url",
            "https://apps.test.com/app.ipa",
            "--name",
            "Test App",
            "--size",
            "2048",
            "--privacy-policy-url",
            "https://test.com/privacy",
        ]);
        let bundle = read_bundle(&args).unwrap();

        assert_eq!(bundle.identifier(), "com.test.app");
        assert_eq!(bundle.version(), Some("1.2.0"));
        assert_eq!(
            bundle.source_url().map(Url::as_str),
            Some("https://apps.test.com/app.ipa")
        );
        let metadata = bundle.metadata().unwrap();
        assert_eq!(metadata.name, "Test App");
        assert_eq!(metadata.size, Some(2048));
        assert!(metadata.privacy_policy_url.is_some());
        assert!(!bundle.is_signed());
    }

    #[test]
    fn bare_app_flag_has_no_metadata() {
        let bundle = read_bundle(&bundle_args(&["--app", "com.test.app"])).unwrap();
        assert!(bundle.metadata().is_none());
        assert!(bundle.version().is_none());
    }

    #[test]
    fn malformed_source_url_is_rejected() {
        let args = bundle_args(&["--app", "com.test.app", "--source-url", "not a url"]);
        let err = read_bundle(&args).unwrap_err();
        assert!(err.to_string().contains("--source-url"));
    }

    #[test]
    fn bundle_is_read_from_json_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bundle.json");
        std::fs::write(&path, r#"{"identifier": "com.test.app", "version": "2.0.0"}"#).unwrap();

        let args = bundle_args(&["--bundle", path.to_str().unwrap()]);
        let bundle = read_bundle(&args).unwrap();
        assert_eq!(bundle.identifier(), "com.test.app");
        assert_eq!(bundle.version(), Some("2.0.0"));
    }

    #[test]
    fn only_success_exits_zero() {
        assert_eq!(deploy_exit_code(DeploymentStatus::Success), 0);
        assert_eq!(deploy_exit_code(DeploymentStatus::PartialFailure), 1);
        assert_eq!(deploy_exit_code(DeploymentStatus::Failure), 1);
    }

    #[test]
    fn simulated_config_is_valid_without_signing() {
        let config = simulated_config().unwrap();
        assert!(!config.distribution.requires_signing());
        assert_eq!(config.mdm.organization_id(), "simulated-org");
    }

    #[test]
    fn init_writes_and_validates_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fleetdeploy.toml");
        let store = ConfigStore::from_path(&path);

        let partial = parse(&[
            "fleetdeploy",
            "init",
            "--server-url",
            "https://mdm.test.com",
            "--organization-id",
            "test-org-id",
        ]);
        let Commands::Init(args) = &partial.command else {
            panic!("expected init command");
        };
        assert_eq!(run_init(&store, args).unwrap(), 1);
        assert!(store.exists());

        let rest = parse(&[
            "fleetdeploy",
            "init",
            "--app-store-url",
            "https://apps.test.com",
            "--no-signing",
        ]);
        let Commands::Init(args) = &rest.command else {
            panic!("expected init command");
        };
        assert_eq!(run_init(&store, args).unwrap(), 0);

        let config = store.load().unwrap();
        assert_eq!(config.mdm.organization_id(), "test-org-id");
        assert!(!config.distribution.requires_signing());
    }

    #[test]
    fn init_keeps_unrelated_settings() {
        let mut file = FleetConfigFile::default();
        file.mdm.auth_token = "secret".to_string();
        file.mdm.server_url = Some("https://old.test.com".to_string());

        let cli = parse(&["fleetdeploy", "init", "--server-url", "https://mdm.test.com"]);
        let Commands::Init(args) = &cli.command else {
            panic!("expected init command");
        };
        apply_init(&mut file, args);

        assert_eq!(file.mdm.server_url.as_deref(), Some("https://mdm.test.com"));
        assert_eq!(file.mdm.auth_token, "secret");
        assert!(file.distribution.requires_signing);
    }
}

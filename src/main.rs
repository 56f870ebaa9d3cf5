use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use dialer::campaign::CampaignSpec;
use dialer::config::EngineConfig;
use dialer::contact::disposition_options;
use dialer::crm::InMemoryCrm;
use dialer::dialer::{CampaignRegistry, CampaignStats, DialerEvent};
use dialer::telephony::{outcome_channel, ScriptStep, SimulatedTelephony};
use dialer::{dlog, Campaign, CampaignStatus, Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Dialer - outbound call campaign engine
#[derive(Parser, Debug)]
#[command(name = "dialer")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    DIALER_DEBUG=1  Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.dialer/dialer.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Engine config file (defaults to ~/.dialer/dialer.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a campaign against simulated telephony until it completes
    Run {
        /// Campaign definition (TOML)
        #[arg(long)]
        campaign: PathBuf,

        /// Contacts to dial (JSON array of CRM contacts)
        #[arg(long)]
        contacts: PathBuf,

        /// Simulated call script, e.g. "answer:45,no_answer,busy"
        #[arg(long, default_value = "answer:60,no_answer,busy")]
        script: String,

        /// Delay before each simulated outcome, in milliseconds
        #[arg(long, default_value_t = 200)]
        delay_ms: u64,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,

        /// Print final statistics as JSON only
        #[arg(long)]
        headless: bool,
    },

    /// Check a campaign definition without running it
    Validate {
        /// Campaign definition (TOML)
        campaign: PathBuf,
    },

    /// Print the disposition taxonomy
    Dispositions,

    /// Show the effective engine config
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    dialer::log::init_with_debug(cli.debug);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => EngineConfig::config_path()?,
    };

    match cli.command {
        Command::Run {
            campaign,
            contacts,
            script,
            delay_ms,
            timeout_secs,
            headless,
        } => {
            let config = EngineConfig::load_from(&config_path)?;
            let options = RunOptions {
                script: parse_script(&script)?,
                delay: Duration::from_millis(delay_ms),
                timeout: Duration::from_secs(timeout_secs),
                headless,
            };
            run_campaign(config, &campaign, &contacts, options)
        }
        Command::Validate { campaign } => run_validate(&campaign),
        Command::Dispositions => {
            println!("{}", serde_json::to_string_pretty(&disposition_options())?);
            Ok(())
        }
        Command::Config { init } => run_config(&config_path, init),
    }
}

struct RunOptions {
    script: Vec<ScriptStep>,
    delay: Duration,
    timeout: Duration,
    headless: bool,
}

fn load_spec(path: &Path) -> Result<CampaignSpec> {
    let spec: CampaignSpec = toml::from_str(&fs::read_to_string(path)?)?;
    Ok(spec)
}

fn load_contacts(path: &Path) -> Result<InMemoryCrm> {
    InMemoryCrm::from_json(&fs::read_to_string(path)?)
}

/// Parse "answer:45,no_answer,busy,fail,reject,silent".
fn parse_script(raw: &str) -> Result<Vec<ScriptStep>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|step| match step.split_once(':') {
            Some(("answer", secs)) => secs
                .parse()
                .map(|duration_seconds| ScriptStep::Answer { duration_seconds })
                .map_err(|_| Error::Validation(format!("bad answer duration: {}", secs))),
            None if step == "answer" => Ok(ScriptStep::Answer { duration_seconds: 60 }),
            None if step == "no_answer" => Ok(ScriptStep::NoAnswer),
            None if step == "busy" => Ok(ScriptStep::Busy),
            None if step == "fail" => Ok(ScriptStep::Fail),
            None if step == "reject" => Ok(ScriptStep::Reject),
            None if step == "silent" => Ok(ScriptStep::Silent),
            _ => Err(Error::Validation(format!("unknown script step: {}", step))),
        })
        .collect()
}

fn run_campaign(config: EngineConfig, campaign_path: &Path, contacts_path: &Path, options: RunOptions) -> Result<()> {
    let spec = load_spec(campaign_path)?;
    let crm = load_contacts(contacts_path)?;
    dlog!(
        "Run command: campaign={} contacts={} script={:?}",
        campaign_path.display(),
        crm.len(),
        options.script
    );

    let rt = tokio::runtime::Runtime::new()?;
    let (campaign, stats) = rt.block_on(async {
        let (outcome_tx, outcome_rx) = outcome_channel(config.outcome_channel_capacity);
        let telephony = Arc::new(SimulatedTelephony::new(outcome_tx, options.script).with_delay(options.delay));
        let refs = crm.ids();
        let crm = Arc::new(crm);
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();

        let registry = CampaignRegistry::builder(config, telephony, crm)
            .events(event_tx)
            .build();
        registry.spawn_outcome_pump(outcome_rx).await;

        let headless = options.headless;
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if !headless {
                    print_event(&event);
                }
            }
        });

        let campaign = registry.create_campaign(spec).await?;
        let added = registry.add_contacts(campaign.id, &refs).await?;
        if !headless {
            println!("Campaign {} ({}) with {} contacts", campaign.name, campaign.id.short(), added);
        }
        registry.start(campaign.id).await?;

        let deadline = Instant::now() + options.timeout;
        loop {
            let current = registry.campaign(campaign.id).await?;
            let in_flight = registry.in_flight(campaign.id).await?;
            if current.status != CampaignStatus::Running && in_flight == 0 {
                break;
            }
            if Instant::now() >= deadline {
                dlog!("Run command: timed out, stopping campaign");
                if current.status == CampaignStatus::Running {
                    registry.stop(campaign.id).await?;
                }
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let campaign = registry.campaign(campaign.id).await?;
        let stats = registry.stats(campaign.id).await?;
        registry.shutdown().await;
        Ok::<(Campaign, CampaignStats), Error>((campaign, stats))
    })?;

    if options.headless {
        let json_output = serde_json::json!({
            "campaign_id": campaign.id.to_string(),
            "status": campaign.status.to_string(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&json_output)?);
    } else {
        print_summary(&campaign, &stats);
    }
    Ok(())
}

fn print_event(event: &DialerEvent) {
    match event {
        DialerEvent::CallPlaced { contact_id, attempt, .. } => {
            println!("  dialing   {} (attempt {})", contact_id.short(), attempt);
        }
        DialerEvent::OutcomeApplied { contact_id, status, .. } => {
            println!("  outcome   {} -> {}", contact_id.short(), status);
        }
        DialerEvent::PlacementFailed { contact_id, reason, .. } => {
            println!("  rejected  {}: {}", contact_id.short(), reason);
        }
        DialerEvent::CallTimedOut { contact_id, .. } => {
            println!("  timeout   {}", contact_id.short());
        }
        DialerEvent::OutcomeRejected { reason, .. } => {
            println!("  dropped   {}", reason);
        }
        DialerEvent::StatusChanged { status, reason, .. } => match reason {
            Some(reason) => println!("campaign {} ({})", status, reason),
            None => println!("campaign {}", status),
        },
    }
}

fn print_summary(campaign: &Campaign, stats: &CampaignStats) {
    println!();
    println!("  Campaign:    {} ({})", campaign.name, campaign.id.short());
    println!("  Status:      {}", campaign.status);
    if let Some(started) = campaign.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(completed) = campaign.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Contacts:    {}", stats.total_contacts);
    println!(
        "  Completed:   {}  Failed: {}  No answer: {}  Busy: {}  Skipped: {}",
        stats.contacts_completed,
        stats.contacts_failed,
        stats.contacts_no_answer,
        stats.contacts_busy,
        stats.contacts_skipped
    );
    println!("  Calls made:  {}", stats.total_calls_made);
    println!("  Avg length:  {:.1}s", stats.average_call_duration_seconds);
    println!("  Completion:  {:.0}%", stats.completion_rate * 100.0);
    if let Some(err) = &campaign.last_error {
        println!("  Last error:  {} ({} total)", err, campaign.error_count);
    }
}

fn run_validate(path: &Path) -> Result<()> {
    let spec = load_spec(path)?;
    match spec.validate() {
        Ok(()) => {
            println!("{}: ok", path.display());
            Ok(())
        }
        Err(e) => {
            println!("{}: {}", path.display(), e);
            Err(e)
        }
    }
}

fn run_config(path: &Path, init: bool) -> Result<()> {
    if init && !path.exists() {
        EngineConfig::default().save_to(path)?;
        println!("Wrote defaults to {}", path.display());
    }
    let config = EngineConfig::load_from(path)?;
    println!("# {}", path.display());
    if let Some(log) = dialer::log::log_path() {
        println!("# log: {}", log.display());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

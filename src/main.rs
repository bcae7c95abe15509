use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use autoreact::banner::{BannerInfo, describe_outcome, print_banner};
use autoreact::config::settings::KEYS;
use autoreact::config::{Config, Settings, SettingsSource, StoredSettings};
use autoreact::consts::default_db_path;
use autoreact::engine::Engine;
use autoreact::engine::scheduler::{Scheduler, SchedulerConfig};
use autoreact::engine::timer::Timer;
use autoreact::events::{Event, EventBus};
use autoreact::license::remote::HttpLicenseValidator;
use autoreact::license::storage::LicenseStore;
use autoreact::license::{LicenseManager, Plan};
use autoreact::platform::http::HttpPlatform;
use autoreact::reaction::{ReactionCounts, choose_reaction};

#[derive(Parser)]
#[command(name = "autoreact", version, about = "Follow the crowd's reaction, one post at a time.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database for settings and license state (use :memory: for ephemeral)
    #[arg(short, long)]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler on its timer until Ctrl+C
    Start {
        /// Run a single pass and exit
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Start even when the `startup` setting is off
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Base URL of the platform bridge
        #[arg(long, env = "AUTOREACT_API_URL", default_value = "http://127.0.0.1:8787")]
        api_url: String,

        /// Bearer token for the platform bridge
        #[arg(long, env = "AUTOREACT_API_TOKEN")]
        api_token: Option<String>,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Trial and license management
    License {
        #[command(subcommand)]
        action: LicenseAction,
    },
    /// Print the reaction that would be chosen for seven counts
    Choose {
        #[arg(num_args = 7, required = true)]
        counts: Vec<u32>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
    /// Go back to the default value
    Unset { key: String },
}

#[derive(Subcommand)]
enum LicenseAction {
    Status,
    Activate {
        key: String,

        #[arg(long, value_parser = parse_plan)]
        plan: Plan,

        /// Expiry as an RFC 3339 timestamp
        #[arg(long, value_parser = parse_expiry)]
        expires: DateTime<Utc>,
    },
    /// Forget the stored status; the next start begins a new trial
    Reset,
    /// Check the stored key against the license server
    Validate {
        #[arg(long)]
        user: String,

        /// Base URL of the license server
        #[arg(long, env = "AUTOREACT_LICENSE_URL")]
        license_url: String,
    },
}

fn parse_plan(s: &str) -> Result<Plan> {
    s.parse()
}

fn parse_expiry(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("expected an RFC 3339 timestamp")?
        .with_timezone(&Utc))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let db = match cli.db {
        Some(db) => db,
        None => {
            let path = default_db_path();
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
            path.to_string_lossy().into_owned()
        }
    };

    match cli.command {
        Command::Start {
            once,
            force,
            api_url,
            api_token,
        } => handle_start(&db, once, force, &api_url, api_token).await,
        Command::Settings { action } => handle_settings(&db, action),
        Command::License { action } => handle_license(&db, action).await,
        Command::Choose { counts } => {
            let counts = ReactionCounts::try_from(counts)?;
            match choose_reaction(&counts) {
                Some(reaction) => println!("{reaction}"),
                None => println!("skip"),
            }
            Ok(())
        }
    }
}

async fn handle_start(
    db: &str,
    once: bool,
    force: bool,
    api_url: &str,
    api_token: Option<String>,
) -> Result<()> {
    let events = Arc::new(EventBus::default());
    let licenses = LicenseManager::new(LicenseStore::open(db)?).with_events(Arc::clone(&events));
    let status = licenses.initialize(Utc::now())?;

    let source = StoredSettings::new(Config::open(db)?).with_license(
        LicenseManager::new(LicenseStore::open(db)?).with_events(Arc::clone(&events)),
    );
    let settings = source.settings().await?;

    if !once && !settings.startup && !force {
        println!("startup is disabled; enable it with `settings set startup true` or pass --force");
        return Ok(());
    }

    print_banner(&BannerInfo {
        api: api_url,
        db,
        plan: status.plan.as_str(),
        interval_minutes: settings.run_interval.as_secs() / 60,
        max_per_hour: settings.max_reactions_hour,
        max_per_day: settings.max_reactions_day,
    });

    let platform = Arc::new(HttpPlatform::new(api_url, api_token));
    let scheduler = Arc::new(
        Scheduler::new(platform, Arc::new(source), SchedulerConfig::default())?
            .with_events(Arc::clone(&events)),
    );

    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let Event::Reacted { post_key, reaction } = event {
                println!("  ✓ {post_key}: {reaction}");
            }
        }
    });

    if once {
        let outcome = scheduler.run_once().await;
        println!("\n=> {}", describe_outcome(&outcome));
        return Ok(());
    }

    let timer = Timer::new(scheduler, settings.run_interval);
    timer
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for Ctrl+C: {e}");
            }
        })
        .await;
    println!("\nstopped.");
    Ok(())
}

fn handle_settings(db: &str, action: SettingsAction) -> Result<()> {
    let config = Config::open(db)?;
    match action {
        SettingsAction::Show => {
            let settings = Settings::load(&config)?;
            let stored = Settings::stored_keys(&config)?;
            for key in KEYS {
                let marker = if stored.iter().any(|k| k == key) { "" } else { " (default)" };
                println!("  {:<20} {}{}", key, settings.value(key), marker);
            }
        }
        SettingsAction::Set { key, value } => {
            let status = LicenseManager::new(LicenseStore::open(db)?).initialize(Utc::now())?;
            Settings::set_licensed(&config, &status, &key, &value)?;
            println!("✓ {key} updated");
        }
        SettingsAction::Unset { key } => {
            Settings::unset(&config, &key)?;
            println!("✓ {key} reset to default");
        }
    }
    Ok(())
}

async fn handle_license(db: &str, action: LicenseAction) -> Result<()> {
    let licenses = LicenseManager::new(LicenseStore::open(db)?);
    match action {
        LicenseAction::Status => {
            let status = licenses.initialize(Utc::now())?;
            let limits = status.reaction_limits();
            println!("  plan      {}", status.plan);
            if let Some(end) = status.trial_end().filter(|_| status.is_trial) {
                println!("  trial     until {}", end.to_rfc3339());
            }
            if let Some(expires) = status.expires.filter(|_| status.is_pro) {
                println!("  expires   {}", expires.to_rfc3339());
            }
            println!("  limits    {}/hour, {}/day", limits.per_hour, limits.per_day);
            println!("  device    {}", licenses.store().device_id()?);
        }
        LicenseAction::Activate { key, plan, expires } => {
            if expires <= Utc::now() {
                bail!("license already expired at {}", expires.to_rfc3339());
            }
            licenses.activate(&key, plan, expires)?;
            println!("✓ {plan} license activated");
        }
        LicenseAction::Reset => {
            licenses.store().clear()?;
            println!("✓ license status cleared");
        }
        LicenseAction::Validate { user, license_url } => {
            let validator = HttpLicenseValidator::new(&license_url);
            if licenses.validate(&validator, &user, Utc::now()).await? {
                println!("✓ license is valid");
            } else {
                println!("✗ license is not valid");
            }
        }
    }
    Ok(())
}

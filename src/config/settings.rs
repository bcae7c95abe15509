use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;

use super::Config;
use crate::license::{Feature, LicenseManager, ReactionLimits, UserStatus};

pub const KEY_STARTUP: &str = "startup";
pub const KEY_IGNORE_FANPAGES: &str = "ignore_fp";
pub const KEY_IGNORE_GROUPS: &str = "ignore_gr";
pub const KEY_BLACKLIST: &str = "blacklist";
pub const KEY_RUN_INTERVAL: &str = "time_period";
pub const KEY_WORKING_HOURS_ONLY: &str = "working_hours_only";
pub const KEY_WEEKDAYS_ONLY: &str = "weekdays_only";
pub const KEY_MAX_REACTIONS_HOUR: &str = "max_reactions_hour";
pub const KEY_MAX_REACTIONS_DAY: &str = "max_reactions_day";
pub const KEY_REACTION_DELAY: &str = "delay_reactions";

/// Every key [`Settings`] understands.
pub const KEYS: &[&str] = &[
    KEY_STARTUP,
    KEY_IGNORE_FANPAGES,
    KEY_IGNORE_GROUPS,
    KEY_BLACKLIST,
    KEY_RUN_INTERVAL,
    KEY_WORKING_HOURS_ONLY,
    KEY_WEEKDAYS_ONLY,
    KEY_MAX_REACTIONS_HOUR,
    KEY_MAX_REACTIONS_DAY,
    KEY_REACTION_DELAY,
];

/// Longest allowed run interval, in minutes.
const MAX_RUN_INTERVAL_MINUTES: u64 = 24 * 60;
/// Longest allowed wait after a reaction, in seconds.
const MAX_REACTION_DELAY_SECS: u64 = 300;

/// The license feature needed to change `key`. Throttling knobs are advanced.
pub fn required_feature(key: &str) -> Feature {
    match key {
        KEY_WORKING_HOURS_ONLY
        | KEY_WEEKDAYS_ONLY
        | KEY_MAX_REACTIONS_HOUR
        | KEY_MAX_REACTIONS_DAY
        | KEY_REACTION_DELAY => Feature::AdvancedSettings,
        _ => Feature::BasicSettings,
    }
}

/// User-tunable gating for the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Start the periodic timer when the program starts.
    pub startup: bool,
    pub ignore_fanpages: bool,
    pub ignore_groups: bool,
    /// Owner IDs whose posts are never reacted to.
    pub blacklist: Vec<String>,
    pub run_interval: Duration,
    pub working_hours_only: bool,
    pub weekdays_only: bool,
    pub max_reactions_hour: u32,
    pub max_reactions_day: u32,
    /// Base wait after each successful reaction (jittered).
    pub reaction_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            startup: false,
            ignore_fanpages: false,
            ignore_groups: false,
            blacklist: Vec::new(),
            run_interval: Duration::from_secs(5 * 60),
            working_hours_only: false,
            weekdays_only: false,
            max_reactions_hour: 20,
            max_reactions_day: 100,
            reaction_delay: Duration::from_secs(3),
        }
    }
}

impl Settings {
    /// Read settings from the config table. Missing keys keep their defaults.
    pub fn load(config: &Config) -> Result<Self> {
        let mut settings = Self::default();
        for key in KEYS {
            if let Some(value) = config.get(key)? {
                settings
                    .apply(key, &value)
                    .with_context(|| format!("invalid value for {key}"))?;
            }
        }
        Ok(settings)
    }

    /// Write every setting back to the config table.
    pub fn save(&self, config: &Config) -> Result<()> {
        let entries: Vec<(&str, String)> = KEYS.iter().map(|key| (*key, self.value(key))).collect();
        config.set_many(&entries)
    }

    /// Validate and store a single `key = value` pair.
    pub fn set(config: &Config, key: &str, value: &str) -> Result<()> {
        let mut probe = Self::default();
        probe.apply(key, value)?;
        config.set(key, &probe.value(key))
    }

    /// Like [`Settings::set`], but refuses keys the plan in `status` does not cover.
    pub fn set_licensed(
        config: &Config,
        status: &UserStatus,
        key: &str,
        value: &str,
    ) -> Result<()> {
        if !status.can_use(required_feature(key)) {
            bail!(
                "changing {key} needs a trial or pro license (current plan: {})",
                status.plan
            );
        }
        Self::set(config, key, value)
    }

    /// Drop a stored value so the key falls back to its default.
    pub fn unset(config: &Config, key: &str) -> Result<()> {
        if !KEYS.contains(&key) {
            bail!("unknown setting: {key}");
        }
        config.remove(key)
    }

    /// Keys that have a stored value, as opposed to running on defaults.
    pub fn stored_keys(config: &Config) -> Result<Vec<String>> {
        Ok(config.entries()?.into_iter().map(|(key, _)| key).collect())
    }

    /// Whether posts from `owner_id` must be left alone.
    pub fn is_blacklisted(&self, owner_id: &str) -> bool {
        self.blacklist.iter().any(|id| id == owner_id)
    }

    /// Lower the reaction caps to what a license plan allows.
    pub fn clamp_to(&mut self, limits: ReactionLimits) {
        self.max_reactions_hour = self.max_reactions_hour.min(limits.per_hour);
        self.max_reactions_day = self.max_reactions_day.min(limits.per_day);
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            KEY_STARTUP => self.startup = parse_bool(value)?,
            KEY_IGNORE_FANPAGES => self.ignore_fanpages = parse_bool(value)?,
            KEY_IGNORE_GROUPS => self.ignore_groups = parse_bool(value)?,
            KEY_BLACKLIST => self.blacklist = parse_blacklist(value),
            KEY_RUN_INTERVAL => {
                let minutes: u64 = value.parse()?;
                if !(1..=MAX_RUN_INTERVAL_MINUTES).contains(&minutes) {
                    bail!("run interval must be 1..={MAX_RUN_INTERVAL_MINUTES} minutes");
                }
                self.run_interval = Duration::from_secs(minutes * 60);
            }
            KEY_WORKING_HOURS_ONLY => self.working_hours_only = parse_bool(value)?,
            KEY_WEEKDAYS_ONLY => self.weekdays_only = parse_bool(value)?,
            KEY_MAX_REACTIONS_HOUR => self.max_reactions_hour = value.parse()?,
            KEY_MAX_REACTIONS_DAY => self.max_reactions_day = value.parse()?,
            KEY_REACTION_DELAY => {
                let secs: u64 = value.parse()?;
                if secs > MAX_REACTION_DELAY_SECS {
                    bail!("reaction delay must be at most {MAX_REACTION_DELAY_SECS} seconds");
                }
                self.reaction_delay = Duration::from_secs(secs);
            }
            _ => bail!("unknown setting: {key}"),
        }
        Ok(())
    }

    /// The stored text form of one setting.
    pub fn value(&self, key: &str) -> String {
        match key {
            KEY_STARTUP => self.startup.to_string(),
            KEY_IGNORE_FANPAGES => self.ignore_fanpages.to_string(),
            KEY_IGNORE_GROUPS => self.ignore_groups.to_string(),
            KEY_BLACKLIST => self.blacklist.join(","),
            KEY_RUN_INTERVAL => (self.run_interval.as_secs() / 60).to_string(),
            KEY_WORKING_HOURS_ONLY => self.working_hours_only.to_string(),
            KEY_WEEKDAYS_ONLY => self.weekdays_only.to_string(),
            KEY_MAX_REACTIONS_HOUR => self.max_reactions_hour.to_string(),
            KEY_MAX_REACTIONS_DAY => self.max_reactions_day.to_string(),
            KEY_REACTION_DELAY => self.reaction_delay.as_secs().to_string(),
            _ => String::new(),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => bail!("not a boolean: {other}"),
    }
}

fn parse_blacklist(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

/// Where the scheduler gets its settings from at the start of each run.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn settings(&self) -> Result<Settings>;
}

/// Fixed settings, mostly for tests.
#[async_trait]
impl SettingsSource for Settings {
    async fn settings(&self) -> Result<Settings> {
        Ok(self.clone())
    }
}

/// Settings read from the config table, capped by the license plan.
pub struct StoredSettings {
    config: Config,
    license: Option<LicenseManager>,
}

impl StoredSettings {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            license: None,
        }
    }

    /// Cap reactions to what the license status allows. The status is
    /// refreshed on every read, so a trial or license running out mid-process
    /// lowers the caps at the next run.
    pub fn with_license(mut self, license: LicenseManager) -> Self {
        self.license = Some(license);
        self
    }
}

#[async_trait]
impl SettingsSource for StoredSettings {
    async fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(&self.config).unwrap_or_else(|e| {
            log::warn!("error loading settings, using defaults: {e:#}");
            Settings::default()
        });

        if let Some(license) = &self.license {
            let status = license.initialize(Utc::now())?;
            settings.clamp_to(status.reaction_limits());
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::storage::LicenseStore;

    fn mem_config() -> Config {
        Config::open(":memory:").unwrap()
    }

    #[test]
    fn empty_config_yields_defaults() {
        let settings = Settings::load(&mem_config()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_reactions_hour, 20);
        assert_eq!(settings.max_reactions_day, 100);
        assert_eq!(settings.run_interval, Duration::from_secs(300));
        assert_eq!(settings.reaction_delay, Duration::from_secs(3));
    }

    #[test]
    fn stored_values_are_parsed() {
        let config = mem_config();
        config.set(KEY_IGNORE_FANPAGES, "yes").unwrap();
        config.set(KEY_BLACKLIST, " 100, ,200 ").unwrap();
        config.set(KEY_RUN_INTERVAL, "15").unwrap();
        config.set(KEY_MAX_REACTIONS_HOUR, "7").unwrap();

        let settings = Settings::load(&config).unwrap();
        assert!(settings.ignore_fanpages);
        assert_eq!(settings.blacklist, vec!["100", "200"]);
        assert_eq!(settings.run_interval, Duration::from_secs(15 * 60));
        assert_eq!(settings.max_reactions_hour, 7);
    }

    #[test]
    fn garbage_value_is_an_error() {
        let config = mem_config();
        config.set(KEY_MAX_REACTIONS_DAY, "lots").unwrap();
        let err = Settings::load(&config).unwrap_err();
        assert!(format!("{err:#}").contains("max_reactions_day"));
    }

    #[test]
    fn set_validates_key_and_value() {
        let config = mem_config();
        assert!(Settings::set(&config, "nope", "1").is_err());
        assert!(Settings::set(&config, KEY_WEEKDAYS_ONLY, "maybe").is_err());
        assert!(Settings::set(&config, KEY_RUN_INTERVAL, "0").is_err());
        assert!(Settings::set(&config, KEY_RUN_INTERVAL, "400000000000000000").is_err());
        assert!(Settings::set(&config, KEY_RUN_INTERVAL, "1441").is_err());
        assert!(Settings::set(&config, KEY_REACTION_DELAY, "18446744073709551615").is_err());
        assert!(Settings::set(&config, KEY_REACTION_DELAY, "301").is_err());
        assert!(config.get(KEY_RUN_INTERVAL).unwrap().is_none());
        assert!(config.get(KEY_REACTION_DELAY).unwrap().is_none());

        Settings::set(&config, KEY_RUN_INTERVAL, "1440").unwrap();
        Settings::set(&config, KEY_REACTION_DELAY, "0").unwrap();

        Settings::set(&config, KEY_WEEKDAYS_ONLY, "ON").unwrap();
        assert_eq!(config.get(KEY_WEEKDAYS_ONLY).unwrap().unwrap(), "true");
    }

    #[test]
    fn save_then_load_keeps_values() {
        let config = mem_config();
        let settings = Settings {
            ignore_groups: true,
            blacklist: vec!["42".to_string()],
            max_reactions_day: 12,
            ..Settings::default()
        };
        settings.save(&config).unwrap();
        assert_eq!(Settings::load(&config).unwrap(), settings);
    }

    #[test]
    fn blacklist_matches_whole_ids_only() {
        let settings = Settings {
            blacklist: vec!["12345".to_string()],
            ..Settings::default()
        };
        assert!(settings.is_blacklisted("12345"));
        assert!(!settings.is_blacklisted("123"));
        assert!(!settings.is_blacklisted("123456"));
    }

    #[test]
    fn clamp_only_lowers() {
        let mut settings = Settings::default();
        settings.clamp_to(ReactionLimits {
            per_hour: 5,
            per_day: 500,
        });
        assert_eq!(settings.max_reactions_hour, 5);
        assert_eq!(settings.max_reactions_day, 100);
    }

    #[test]
    fn free_plan_cannot_change_advanced_settings() {
        let config = mem_config();
        let now = Utc::now();
        let mut free = UserStatus::new_trial(now - chrono::TimeDelta::days(10));
        free.refresh(now);

        assert!(Settings::set_licensed(&config, &free, KEY_MAX_REACTIONS_DAY, "50").is_err());
        assert!(Settings::set_licensed(&config, &free, KEY_WEEKDAYS_ONLY, "true").is_err());
        assert!(config.get(KEY_MAX_REACTIONS_DAY).unwrap().is_none());
        Settings::set_licensed(&config, &free, KEY_BLACKLIST, "1,2").unwrap();

        let trial = UserStatus::new_trial(now);
        Settings::set_licensed(&config, &trial, KEY_MAX_REACTIONS_DAY, "50").unwrap();
        assert_eq!(config.get(KEY_MAX_REACTIONS_DAY).unwrap().unwrap(), "50");
    }

    #[test]
    fn unset_restores_default() {
        let config = mem_config();
        Settings::set(&config, KEY_MAX_REACTIONS_HOUR, "7").unwrap();
        Settings::set(&config, KEY_STARTUP, "true").unwrap();
        assert_eq!(
            Settings::stored_keys(&config).unwrap(),
            vec![KEY_MAX_REACTIONS_HOUR, KEY_STARTUP]
        );

        Settings::unset(&config, KEY_MAX_REACTIONS_HOUR).unwrap();
        assert_eq!(Settings::stored_keys(&config).unwrap(), vec![KEY_STARTUP]);
        assert_eq!(Settings::load(&config).unwrap().max_reactions_hour, 20);
        assert!(Settings::unset(&config, "nope").is_err());
    }

    #[tokio::test]
    async fn expired_trial_lowers_stored_caps() {
        let manager = LicenseManager::new(LicenseStore::open(":memory:").unwrap());
        let started = Utc::now() - chrono::TimeDelta::days(10);
        manager.store().save(&UserStatus::new_trial(started)).unwrap();

        let source = StoredSettings::new(mem_config()).with_license(manager);
        let settings = source.settings().await.unwrap();
        assert_eq!(settings.max_reactions_hour, 5);
        assert_eq!(settings.max_reactions_day, 10);
    }

    #[tokio::test]
    async fn stored_settings_fall_back_to_defaults() {
        let config = mem_config();
        config.set(KEY_MAX_REACTIONS_HOUR, "many").unwrap();
        let source = StoredSettings::new(config);
        assert_eq!(source.settings().await.unwrap(), Settings::default());
    }
}

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

use autoreact::config::settings::{KEY_MAX_REACTIONS_DAY, KEY_MAX_REACTIONS_HOUR};
use autoreact::config::{Config, SettingsSource, StoredSettings};
use autoreact::events::{Event, EventBus};
use autoreact::license::remote::{LicenseValidator, ValidationRequest, ValidationResponse};
use autoreact::license::storage::LicenseStore;
use autoreact::license::{
    Feature, LicenseManager, Plan, ReactionLimits, UserStatus, generate_license_key,
    is_well_formed_key,
};

fn db_path(dir: &TempDir) -> String {
    dir.path().join("autoreact.db").to_string_lossy().into_owned()
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 13, 9, 0, 0).unwrap()
}

struct FixedValidator {
    response: Option<ValidationResponse>,
}

#[async_trait]
impl LicenseValidator for FixedValidator {
    async fn validate(&self, _request: &ValidationRequest) -> Result<ValidationResponse> {
        match &self.response {
            Some(response) => Ok(response.clone()),
            None => bail!("connection refused"),
        }
    }
}

fn answering(valid: bool, expires: DateTime<Utc>) -> FixedValidator {
    FixedValidator {
        response: Some(ValidationResponse {
            valid,
            expires: Some(expires.timestamp_millis()),
            plan: Some(Plan::ProMonthly),
            message: None,
        }),
    }
}

#[test]
fn trial_survives_restarts_and_expires_after_three_days() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();

    {
        let manager = LicenseManager::new(LicenseStore::open(&path).unwrap());
        let status = manager.initialize(start()).unwrap();
        assert_eq!(status.plan, Plan::Trial);
        assert!(status.can_use(Feature::AdvancedSettings));
    }

    let manager =
        LicenseManager::new(LicenseStore::open(&path).unwrap()).with_events(Arc::clone(&events));
    let status = manager.initialize(start() + TimeDelta::days(2)).unwrap();
    assert_eq!(status.plan, Plan::Trial);
    assert_eq!(status.trial_start, Some(start()));
    assert!(rx.try_recv().is_err());

    let status = manager
        .initialize(start() + TimeDelta::days(3) + TimeDelta::minutes(1))
        .unwrap();
    assert_eq!(status.plan, Plan::Free);
    assert!(!status.can_use(Feature::AdvancedSettings));
    assert!(status.can_use(Feature::BasicReactions));
    assert_eq!(status.reaction_limits(), ReactionLimits::from((5, 10)));
    assert_eq!(rx.try_recv().unwrap(), Event::TrialExpired);

    // persisted, so no second announcement
    let status = manager.initialize(start() + TimeDelta::days(4)).unwrap();
    assert_eq!(status.plan, Plan::Free);
    assert!(rx.try_recv().is_err());
}

#[test]
fn activation_is_persisted_and_announced() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let manager =
        LicenseManager::new(LicenseStore::open(&path).unwrap()).with_events(Arc::clone(&events));
    manager.initialize(start()).unwrap();

    let key = generate_license_key(start());
    assert!(is_well_formed_key(&key));
    let expires = Utc::now() + TimeDelta::days(30);
    manager.activate(&key, Plan::ProYearly, expires).unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        Event::ProActivated {
            plan: Plan::ProYearly
        }
    );

    let reopened = LicenseStore::open(&path).unwrap().load().unwrap().unwrap();
    assert!(reopened.is_pro);
    assert!(!reopened.is_trial);
    assert_eq!(reopened.license_key.as_deref(), Some(key.as_str()));
    assert_eq!(reopened.reaction_limits(), ReactionLimits::from((50, 500)));
}

#[test]
fn malformed_keys_cannot_be_activated() {
    let manager = LicenseManager::new(LicenseStore::open(":memory:").unwrap());
    let expires = Utc::now() + TimeDelta::days(30);
    assert!(manager.activate("hello", Plan::ProMonthly, expires).is_err());
    assert!(manager.activate("LIC-abc-123", Plan::ProMonthly, expires).is_err());
    assert!(manager.store().load().unwrap().is_none());

    manager.activate("LIC-ABC-123", Plan::ProMonthly, expires).unwrap();
}

#[tokio::test]
async fn stored_caps_follow_a_trial_that_ran_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);
    LicenseStore::open(&path)
        .unwrap()
        .save(&UserStatus::new_trial(Utc::now() - TimeDelta::days(10)))
        .unwrap();

    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let source = StoredSettings::new(Config::open(&path).unwrap()).with_license(
        LicenseManager::new(LicenseStore::open(&path).unwrap()).with_events(Arc::clone(&events)),
    );

    let settings = source.settings().await.unwrap();
    assert_eq!(settings.max_reactions_hour, 5);
    assert_eq!(settings.max_reactions_day, 10);
    assert_eq!(rx.try_recv().unwrap(), Event::TrialExpired);

    let stored = LicenseStore::open(&path).unwrap().load().unwrap().unwrap();
    assert_eq!(stored.plan, Plan::Free);
}

#[test]
fn non_pro_plans_cannot_be_activated() {
    let manager = LicenseManager::new(LicenseStore::open(":memory:").unwrap());
    let expires = Utc::now() + TimeDelta::days(30);
    assert!(manager.activate("LIC-X-0", Plan::Trial, expires).is_err());
    assert!(manager.activate("LIC-X-0", Plan::Free, expires).is_err());
    assert!(manager.store().load().unwrap().is_none());
}

#[test]
fn expired_license_falls_back_to_free() {
    let manager = LicenseManager::new(LicenseStore::open(":memory:").unwrap());
    manager.initialize(start()).unwrap();
    manager
        .activate("LIC-K-0", Plan::ProMonthly, start() + TimeDelta::days(30))
        .unwrap();

    let status = manager.initialize(start() + TimeDelta::days(31)).unwrap();
    assert_eq!(status.plan, Plan::Free);
    assert!(!status.is_pro);
}

#[tokio::test]
async fn validation_needs_a_stored_key() {
    let manager = LicenseManager::new(LicenseStore::open(":memory:").unwrap());
    let validator = answering(true, start() + TimeDelta::days(30));

    assert!(!manager.validate(&validator, "user-1", start()).await.unwrap());
    manager.initialize(start()).unwrap();
    assert!(!manager.validate(&validator, "user-1", start()).await.unwrap());
}

#[tokio::test]
async fn validation_checks_the_server_answer() {
    let manager = LicenseManager::new(LicenseStore::open(":memory:").unwrap());
    manager
        .activate("LIC-K-0", Plan::ProMonthly, Utc::now() + TimeDelta::days(30))
        .unwrap();
    let now = start();

    let good = answering(true, now + TimeDelta::days(1));
    assert!(manager.validate(&good, "user-1", now).await.unwrap());

    let revoked = answering(false, now + TimeDelta::days(1));
    assert!(!manager.validate(&revoked, "user-1", now).await.unwrap());

    let stale = answering(true, now - TimeDelta::days(1));
    assert!(!manager.validate(&stale, "user-1", now).await.unwrap());

    let offline = FixedValidator { response: None };
    assert!(!manager.validate(&offline, "user-1", now).await.unwrap());
}

#[test]
fn device_id_is_stable_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);

    let first = LicenseStore::open(&path).unwrap().device_id().unwrap();
    let second = LicenseStore::open(&path).unwrap().device_id().unwrap();
    assert_eq!(first, second);
    assert!(first.starts_with("device_"));
}

#[tokio::test]
async fn stored_settings_are_capped_by_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(&dir);

    let config = Config::open(&path).unwrap();
    config.set(KEY_MAX_REACTIONS_HOUR, "40").unwrap();
    config.set(KEY_MAX_REACTIONS_DAY, "80").unwrap();

    let manager = LicenseManager::new(LicenseStore::open(&path).unwrap());
    manager.initialize(Utc::now()).unwrap();

    let source = StoredSettings::new(Config::open(&path).unwrap())
        .with_license(LicenseManager::new(LicenseStore::open(&path).unwrap()));
    let settings = source.settings().await.unwrap();
    assert_eq!(settings.max_reactions_hour, 20);
    assert_eq!(settings.max_reactions_day, 80);

    manager
        .activate("LIC-K-0", Plan::ProMonthly, Utc::now() + TimeDelta::days(30))
        .unwrap();
    let settings = source.settings().await.unwrap();
    assert_eq!(settings.max_reactions_hour, 40);
    assert_eq!(settings.max_reactions_day, 80);
}

#[tokio::test]
async fn unreadable_settings_fall_back_to_defaults() {
    let config = Config::open(":memory:").unwrap();
    config.set(KEY_MAX_REACTIONS_HOUR, "lots").unwrap();

    let settings = StoredSettings::new(config).settings().await.unwrap();
    assert_eq!(settings.max_reactions_hour, 20);
}

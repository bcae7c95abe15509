//! Trial and license state that decides how far the scheduler may go.
//!
//! A fresh install starts a trial. When the trial window closes the account
//! drops to the free plan; activating a license key moves it to pro.

pub mod remote;
pub mod storage;

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngExt;
use serde::{Deserialize, Serialize};

use crate::consts::{FREE_LIMITS, PRO_LIMITS, TRIAL_DAYS, TRIAL_LIMITS};
use crate::events::{Event, EventBus};
use remote::{LicenseValidator, ValidationRequest};
use storage::LicenseStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Trial,
    ProMonthly,
    ProYearly,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Trial => "trial",
            Plan::ProMonthly => "pro_monthly",
            Plan::ProYearly => "pro_yearly",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "free" => Ok(Plan::Free),
            "trial" => Ok(Plan::Trial),
            "pro_monthly" => Ok(Plan::ProMonthly),
            "pro_yearly" => Ok(Plan::ProYearly),
            other => bail!("unknown plan: {other}"),
        }
    }
}

/// Features that free accounts may or may not use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    BasicReactions,
    BasicSettings,
    AdvancedSettings,
}

/// Reaction caps granted by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionLimits {
    pub per_hour: u32,
    pub per_day: u32,
}

impl From<(u32, u32)> for ReactionLimits {
    fn from((per_hour, per_day): (u32, u32)) -> Self {
        Self { per_hour, per_day }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatus {
    pub is_trial: bool,
    pub trial_start: Option<DateTime<Utc>>,
    pub is_pro: bool,
    pub license_key: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub plan: Plan,
}

/// What [`UserStatus::refresh`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    TrialExpired,
    LicenseExpired,
}

impl UserStatus {
    pub fn new_trial(now: DateTime<Utc>) -> Self {
        Self {
            is_trial: true,
            trial_start: Some(now),
            is_pro: false,
            license_key: None,
            expires: None,
            plan: Plan::Trial,
        }
    }

    pub fn trial_end(&self) -> Option<DateTime<Utc>> {
        self.trial_start.map(|start| start + TimeDelta::days(TRIAL_DAYS))
    }

    /// Drop to the free plan once the trial or the license has run out.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> StatusChange {
        if self.is_trial
            && let Some(end) = self.trial_end()
            && now > end
        {
            self.downgrade();
            return StatusChange::TrialExpired;
        }

        if self.is_pro
            && let Some(expires) = self.expires
            && now > expires
        {
            self.downgrade();
            return StatusChange::LicenseExpired;
        }

        StatusChange::Unchanged
    }

    fn downgrade(&mut self) {
        self.is_trial = false;
        self.is_pro = false;
        self.plan = Plan::Free;
    }

    pub fn activate_pro(&mut self, license_key: &str, plan: Plan, expires: DateTime<Utc>) {
        self.is_pro = true;
        self.is_trial = false;
        self.license_key = Some(license_key.to_string());
        self.expires = Some(expires);
        self.plan = plan;
    }

    pub fn can_use(&self, feature: Feature) -> bool {
        if self.is_pro && self.license_key.is_some() {
            return true;
        }
        if self.is_trial {
            return true;
        }
        matches!(feature, Feature::BasicReactions | Feature::BasicSettings)
    }

    pub fn reaction_limits(&self) -> ReactionLimits {
        if self.is_pro {
            PRO_LIMITS.into()
        } else if self.is_trial {
            TRIAL_LIMITS.into()
        } else {
            FREE_LIMITS.into()
        }
    }
}

/// `LIC-<base36 millis>-<16 hex>`, upper case.
pub fn generate_license_key(now: DateTime<Utc>) -> String {
    let bytes: [u8; 8] = rand::rng().random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    format!("LIC-{}-{}", to_base36(millis), hex).to_uppercase()
}

/// Whether `key` has the `LIC-<A-Z0-9>-<A-Z0-9>` shape the license server issues.
pub fn is_well_formed_key(key: &str) -> bool {
    let mut parts = key.split('-');
    let (Some("LIC"), Some(stamp), Some(random), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let upper_alnum = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    };
    upper_alnum(stamp) && upper_alnum(random)
}

pub(crate) fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Loads, updates and persists the [`UserStatus`], announcing changes.
pub struct LicenseManager {
    store: LicenseStore,
    events: Option<std::sync::Arc<EventBus>>,
}

impl LicenseManager {
    pub fn new(store: LicenseStore) -> Self {
        Self {
            store,
            events: None,
        }
    }

    pub fn with_events(mut self, events: std::sync::Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// Current status, starting a trial on first use and applying expiry.
    pub fn initialize(&self, now: DateTime<Utc>) -> Result<UserStatus> {
        let Some(mut status) = self.store.load()? else {
            let status = UserStatus::new_trial(now);
            self.store.save(&status)?;
            log::info!("trial started");
            return Ok(status);
        };

        match status.refresh(now) {
            StatusChange::Unchanged => {}
            StatusChange::TrialExpired => {
                self.store.save(&status)?;
                log::info!("trial expired, switched to the free plan");
                self.emit(Event::TrialExpired);
            }
            StatusChange::LicenseExpired => {
                self.store.save(&status)?;
                log::info!("license expired, switched to the free plan");
            }
        }
        Ok(status)
    }

    pub fn activate(
        &self,
        license_key: &str,
        plan: Plan,
        expires: DateTime<Utc>,
    ) -> Result<UserStatus> {
        if !matches!(plan, Plan::ProMonthly | Plan::ProYearly) {
            bail!("{plan} is not a pro plan");
        }
        if !is_well_formed_key(license_key) {
            bail!("malformed license key: {license_key}");
        }
        let mut status = match self.store.load()? {
            Some(status) => status,
            None => UserStatus::new_trial(Utc::now()),
        };
        status.activate_pro(license_key, plan, expires);
        self.store.save(&status).context("failed to save license")?;
        log::info!("pro license activated ({plan})");
        self.emit(Event::ProActivated { plan });
        Ok(status)
    }

    /// Ask the license server whether the stored key is still good.
    /// Network trouble counts as "not valid".
    pub async fn validate(
        &self,
        validator: &dyn LicenseValidator,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(status) = self.store.load()? else {
            return Ok(false);
        };
        let Some(license_key) = status.license_key else {
            return Ok(false);
        };

        let request = ValidationRequest {
            license_key,
            user_id: user_id.to_string(),
            device_id: self.store.device_id()?,
        };

        match validator.validate(&request).await {
            Ok(response) => Ok(response.valid && response.expires_at().is_some_and(|e| e > now)),
            Err(e) => {
                log::error!("license validation failed: {e:#}");
                Ok(false)
            }
        }
    }

    pub fn store(&self) -> &LicenseStore {
        &self.store
    }
}

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Billing plan of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        }
    }

    /// Interpret a plan value from profile metadata. Anything other than
    /// `"pro"` (including an unset plan) collapses to free.
    pub fn from_metadata(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("pro") => PlanTier::Pro,
            _ => PlanTier::Free,
        }
    }
}

/// The resolved requester. Fixed for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous { address: String },
    Authenticated { user_id: String, plan: PlanTier },
}

impl Identity {
    pub fn anonymous(address: impl Into<String>) -> Self {
        Identity::Anonymous {
            address: address.into(),
        }
    }

    pub fn authenticated(user_id: impl Into<String>, plan: PlanTier) -> Self {
        Identity::Authenticated {
            user_id: user_id.into(),
            plan,
        }
    }

    /// Quota subject: `user:<id>` or `ip:<address>`.
    pub fn subject(&self) -> String {
        match self {
            Identity::Anonymous { address } => format!("ip:{address}"),
            Identity::Authenticated { user_id, .. } => format!("user:{user_id}"),
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            Identity::Anonymous { .. } => Tier::Anonymous,
            Identity::Authenticated {
                plan: PlanTier::Free,
                ..
            } => Tier::Free,
            Identity::Authenticated {
                plan: PlanTier::Pro,
                ..
            } => Tier::Pro,
        }
    }

    pub fn quota_key(&self, window: QuotaWindow) -> QuotaKey {
        QuotaKey {
            window,
            subject: self.subject(),
        }
    }
}

/// Rate-limit class derived from an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Anonymous,
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }
}

/// Fixed window kinds enforced per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QuotaWindow {
    Minute,
    Day,
}

impl QuotaWindow {
    pub const ALL: [QuotaWindow; 2] = [QuotaWindow::Minute, QuotaWindow::Day];

    pub fn duration(self) -> Duration {
        match self {
            QuotaWindow::Minute => Duration::from_secs(60),
            QuotaWindow::Day => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuotaWindow::Minute => "minute",
            QuotaWindow::Day => "day",
        }
    }

    /// Short label used in `X-RateLimit-<label>-*` headers.
    pub fn header_label(self) -> &'static str {
        match self {
            QuotaWindow::Minute => "1m",
            QuotaWindow::Day => "1d",
        }
    }
}

/// Ledger key: one per identity per window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub window: QuotaWindow,
    pub subject: String,
}

impl fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.window.as_str(), self.subject)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct WindowLimits {
    pub per_minute: u32,
    pub per_day: u32,
}

impl WindowLimits {
    pub const fn new(per_minute: u32, per_day: u32) -> Self {
        Self {
            per_minute,
            per_day,
        }
    }

    pub fn for_window(self, window: QuotaWindow) -> u32 {
        match window {
            QuotaWindow::Minute => self.per_minute,
            QuotaWindow::Day => self.per_day,
        }
    }
}

/// Static per-tier limits, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub anonymous: WindowLimits,
    pub free: WindowLimits,
    pub pro: WindowLimits,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            anonymous: WindowLimits::new(3, 20),
            free: WindowLimits::new(10, 50),
            pro: WindowLimits::new(100, 1000),
        }
    }
}

impl TierLimits {
    pub fn for_tier(&self, tier: Tier) -> WindowLimits {
        match tier {
            Tier::Anonymous => self.anonymous,
            Tier::Free => self.free,
            Tier::Pro => self.pro,
        }
    }

    pub fn for_identity(&self, identity: &Identity) -> WindowLimits {
        self.for_tier(identity.tier())
    }

    pub fn for_tier_mut(&mut self, tier: Tier) -> &mut WindowLimits {
        match tier {
            Tier::Anonymous => &mut self.anonymous,
            Tier::Free => &mut self.free,
            Tier::Pro => &mut self.pro,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_keys_are_namespaced_by_window_and_subject() {
        let anon = Identity::anonymous("203.0.113.9");
        let user = Identity::authenticated("user_42", PlanTier::Pro);

        assert_eq!(
            anon.quota_key(QuotaWindow::Minute).to_string(),
            "minute:ip:203.0.113.9"
        );
        assert_eq!(anon.quota_key(QuotaWindow::Day).to_string(), "day:ip:203.0.113.9");
        assert_eq!(user.quota_key(QuotaWindow::Day).to_string(), "day:user:user_42");
        assert_ne!(
            anon.quota_key(QuotaWindow::Minute),
            anon.quota_key(QuotaWindow::Day)
        );
    }

    #[test]
    fn unset_or_unknown_plan_collapses_to_free() {
        assert_eq!(PlanTier::from_metadata(None), PlanTier::Free);
        assert_eq!(PlanTier::from_metadata(Some("enterprise")), PlanTier::Free);
        assert_eq!(PlanTier::from_metadata(Some(" Pro ")), PlanTier::Pro);
    }

    #[test]
    fn default_limits_match_published_tiers() {
        let limits = TierLimits::default();
        let anon = Identity::anonymous("198.51.100.1");
        let free = Identity::authenticated("a", PlanTier::Free);
        let pro = Identity::authenticated("b", PlanTier::Pro);

        assert_eq!(limits.for_identity(&anon).per_minute, 3);
        assert_eq!(limits.for_identity(&free), WindowLimits::new(10, 50));
        assert_eq!(limits.for_identity(&pro), WindowLimits::new(100, 1000));
    }
}

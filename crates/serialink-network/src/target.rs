//! Reconnect targets and the policy that bounds them.

use serialink_core::constants::{
    CONNECTIVITY_POLL_INTERVAL_MS, FALLBACK_ATTEMPT_TIMEOUT_MS, MAX_PRIMARY_ATTEMPTS,
    PRIMARY_ATTEMPT_TIMEOUT_MS, PRIORITY_CHECK_TIMEOUT_MS, SCAN_TIMEOUT_MS, UNKNOWN_SSID,
};
use serialink_storage::models::NetworkSettings;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A network to join, with its retry bounds.
#[derive(Clone, PartialEq, Eq)]
pub struct ReconnectTarget {
    /// Network identifier.
    pub ssid: String,

    /// Credential, `None` for open networks.
    pub password: Option<String>,

    /// Number of sequential attempts.
    pub max_attempts: u32,

    /// Bound on each attempt.
    pub timeout: Duration,
}

impl ReconnectTarget {
    /// Create a target tried once with the given per-attempt bound.
    pub fn new(ssid: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ssid: ssid.into(),
            password: None,
            max_attempts: 1,
            timeout,
        }
    }

    /// Set the credential. Empty passwords mean an open network.
    pub fn with_password(mut self, password: Option<impl Into<String>>) -> Self {
        let password: Option<String> = password.map(Into::into);
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    /// Set the number of attempts, at least one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Check if the SSID could not be resolved.
    pub fn is_unknown(&self) -> bool {
        self.ssid == UNKNOWN_SSID
    }
}

// Credentials stay out of logs.
impl fmt::Debug for ReconnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectTarget")
            .field("ssid", &self.ssid)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("max_attempts", &self.max_attempts)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Display for ReconnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ssid)
    }
}

/// Retry and timeout bounds for one reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Sequential attempts on the primary network.
    pub primary_attempts: u32,

    /// Bound on each primary attempt.
    pub primary_timeout: Duration,

    /// Bound on the single fallback attempt.
    pub fallback_timeout: Duration,

    /// Delay between connectivity checks within an attempt.
    pub poll_interval: Duration,

    /// Bound on one wired/cellular link check.
    pub check_timeout: Duration,

    /// Bound on a scan or a link-details query.
    pub scan_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            primary_attempts: MAX_PRIMARY_ATTEMPTS,
            primary_timeout: Duration::from_millis(PRIMARY_ATTEMPT_TIMEOUT_MS),
            fallback_timeout: Duration::from_millis(FALLBACK_ATTEMPT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(CONNECTIVITY_POLL_INTERVAL_MS),
            check_timeout: Duration::from_millis(PRIORITY_CHECK_TIMEOUT_MS),
            scan_timeout: Duration::from_millis(SCAN_TIMEOUT_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Set the number of primary attempts, at least one.
    pub fn with_primary_attempts(mut self, attempts: u32) -> Self {
        self.primary_attempts = attempts.max(1);
        self
    }

    /// Set the per-attempt bound for the primary network.
    pub fn with_primary_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout = timeout;
        self
    }

    /// Set the bound for the fallback attempt.
    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// Set the connectivity poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the bound on a wired/cellular link check.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Set the bound on scans and link-details queries.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }
}

/// Primary and fallback targets for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPlan {
    pub primary: ReconnectTarget,
    pub fallback: ReconnectTarget,
}

impl ReconnectPlan {
    /// Resolve both targets.
    ///
    /// Persisted SSIDs win; otherwise the first and second scanned SSIDs are
    /// used, and `"Unknown"` when nothing is available. Passwords only ever
    /// come from the persisted record.
    ///
    /// ```
    /// use serialink_network::{ReconnectPlan, ReconnectPolicy};
    /// use serialink_storage::models::NetworkSettings;
    ///
    /// let settings = NetworkSettings::new().with_primary("office", "pw");
    /// let scanned = vec!["cafe".to_string(), "library".to_string()];
    ///
    /// let plan = ReconnectPlan::resolve(Some(&settings), &scanned, &ReconnectPolicy::default());
    /// assert_eq!(plan.primary.ssid, "office");
    /// assert_eq!(plan.fallback.ssid, "library");
    /// assert_eq!(plan.fallback.password, None);
    /// ```
    pub fn resolve(
        settings: Option<&NetworkSettings>,
        scanned: &[String],
        policy: &ReconnectPolicy,
    ) -> Self {
        let primary_ssid = settings
            .and_then(NetworkSettings::primary_ssid)
            .or_else(|| scanned.first().map(String::as_str))
            .unwrap_or(UNKNOWN_SSID);
        let fallback_ssid = settings
            .and_then(NetworkSettings::secondary_ssid)
            .or_else(|| scanned.get(1).map(String::as_str))
            .unwrap_or(UNKNOWN_SSID);

        Self {
            primary: ReconnectTarget::new(primary_ssid, policy.primary_timeout)
                .with_password(settings.and_then(NetworkSettings::primary_password))
                .with_max_attempts(policy.primary_attempts),
            fallback: ReconnectTarget::new(fallback_ssid, policy.fallback_timeout)
                .with_password(settings.and_then(NetworkSettings::secondary_password)),
        }
    }
}

/// Subnet mask for an IPv4 prefix length, `None` above 32.
///
/// ```
/// use serialink_network::subnet_mask;
/// use std::net::Ipv4Addr;
///
/// assert_eq!(subnet_mask(24), Some(Ipv4Addr::new(255, 255, 255, 0)));
/// assert_eq!(subnet_mask(33), None);
/// ```
pub fn subnet_mask(prefix: u8) -> Option<Ipv4Addr> {
    if prefix > 32 {
        return None;
    }
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    Some(Ipv4Addr::from(mask))
}

//! Tier configuration for command categories.
//!
//! A tier describes how much traffic one actor may push through one category
//! of commands: a sliding-window capacity, a short-term burst allowance with a
//! cooldown, and a ceiling for exponential backoff after repeated denials.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Default sliding window length, in seconds.
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

/// Closed classification of requested actions.
///
/// The transport layer maps concrete commands onto one of these categories;
/// the category then selects the tier that applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Category {
    /// Read-only queries (prices, balances, status)
    ReadQuery,
    /// State-mutating or financial operations (trades, transfers)
    StateMutation,
    /// Privileged administrative commands
    PrivilegedAdmin,
    /// Free-form conversational requests
    Conversational,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 4] = [
        Category::ReadQuery,
        Category::StateMutation,
        Category::PrivilegedAdmin,
        Category::Conversational,
    ];

    /// Stable kebab-case name, also used in shared-store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ReadQuery => "read-query",
            Category::StateMutation => "state-mutation",
            Category::PrivilegedAdmin => "privileged-admin",
            Category::Conversational => "conversational",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a category name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Error returned when a tier configuration is invalid.
#[derive(Debug, Clone, PartialEq)]
pub enum TierError {
    /// `requests_per_window` must be greater than zero
    ZeroCapacity,
    /// `window_seconds` must be greater than zero
    ZeroWindow,
    /// `burst_size` must be greater than zero
    ZeroBurst,
    /// `burst_size` may not exceed `requests_per_window`
    BurstExceedsCapacity {
        /// Configured burst size
        burst_size: u32,
        /// Configured window capacity
        requests_per_window: u32,
    },
    /// `cooldown_seconds` must be finite and positive
    InvalidCooldown(f64),
    /// `max_backoff_seconds` must be finite and at least the cooldown
    InvalidBackoffCeiling {
        /// Configured ceiling
        max_backoff_seconds: f64,
        /// Configured cooldown
        cooldown_seconds: f64,
    },
}

impl fmt::Display for TierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierError::ZeroCapacity => write!(f, "requests_per_window must be greater than 0"),
            TierError::ZeroWindow => write!(f, "window_seconds must be greater than 0"),
            TierError::ZeroBurst => write!(f, "burst_size must be greater than 0"),
            TierError::BurstExceedsCapacity {
                burst_size,
                requests_per_window,
            } => write!(
                f,
                "burst_size ({}) exceeds requests_per_window ({})",
                burst_size, requests_per_window
            ),
            TierError::InvalidCooldown(c) => {
                write!(f, "cooldown_seconds must be finite and > 0, got {}", c)
            }
            TierError::InvalidBackoffCeiling {
                max_backoff_seconds,
                cooldown_seconds,
            } => write!(
                f,
                "max_backoff_seconds ({}) must be finite and >= cooldown_seconds ({})",
                max_backoff_seconds, cooldown_seconds
            ),
        }
    }
}

impl std::error::Error for TierError {}

/// Limit configuration for one category.
///
/// Immutable once constructed; every constructor validates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "TierConfigSpec", into = "TierConfigSpec")
)]
pub struct TierConfig {
    category: Category,
    requests_per_window: u32,
    window_seconds: u64,
    burst_size: u32,
    cooldown_seconds: f64,
    max_backoff_seconds: f64,
}

impl TierConfig {
    /// Create a validated tier.
    ///
    /// # Errors
    /// Returns a `TierError` describing the first violated constraint.
    pub fn new(
        category: Category,
        requests_per_window: u32,
        window_seconds: u64,
        burst_size: u32,
        cooldown_seconds: f64,
        max_backoff_seconds: f64,
    ) -> Result<Self, TierError> {
        let tier = Self {
            category,
            requests_per_window,
            window_seconds,
            burst_size,
            cooldown_seconds,
            max_backoff_seconds,
        };
        tier.validate()?;
        Ok(tier)
    }

    /// Check every tier invariant.
    pub fn validate(&self) -> Result<(), TierError> {
        if self.requests_per_window == 0 {
            return Err(TierError::ZeroCapacity);
        }
        if self.window_seconds == 0 {
            return Err(TierError::ZeroWindow);
        }
        if self.burst_size == 0 {
            return Err(TierError::ZeroBurst);
        }
        if self.burst_size > self.requests_per_window {
            return Err(TierError::BurstExceedsCapacity {
                burst_size: self.burst_size,
                requests_per_window: self.requests_per_window,
            });
        }
        if !self.cooldown_seconds.is_finite() || self.cooldown_seconds <= 0.0 {
            return Err(TierError::InvalidCooldown(self.cooldown_seconds));
        }
        if !self.max_backoff_seconds.is_finite() || self.max_backoff_seconds < self.cooldown_seconds
        {
            return Err(TierError::InvalidBackoffCeiling {
                max_backoff_seconds: self.max_backoff_seconds,
                cooldown_seconds: self.cooldown_seconds,
            });
        }
        Ok(())
    }

    /// Built-in tier for a category.
    ///
    /// Read queries are cheap and get generous limits; state mutations are the
    /// strictest. Privileged and conversational commands sit in between.
    pub fn standard(category: Category) -> Self {
        let (requests_per_window, burst_size, cooldown_seconds, max_backoff_seconds) =
            match category {
                Category::ReadQuery => (30, 10, 2.0, 60.0),
                Category::StateMutation => (6, 3, 10.0, 300.0),
                Category::PrivilegedAdmin => (10, 5, 5.0, 120.0),
                Category::Conversational => (20, 5, 3.0, 90.0),
            };
        Self {
            category,
            requests_per_window,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            burst_size,
            cooldown_seconds,
            max_backoff_seconds,
        }
    }

    /// Category this tier applies to.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Maximum admitted requests per sliding window.
    pub fn requests_per_window(&self) -> u32 {
        self.requests_per_window
    }

    /// Sliding window length in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Maximum admitted requests within one cooldown period.
    pub fn burst_size(&self) -> u32 {
        self.burst_size
    }

    /// Cooldown period in seconds; also the backoff base.
    pub fn cooldown_seconds(&self) -> f64 {
        self.cooldown_seconds
    }

    /// Upper bound for backoff delays, in seconds.
    pub fn max_backoff_seconds(&self) -> f64 {
        self.max_backoff_seconds
    }

    /// Sustained admission rate in requests per second.
    pub fn refill_rate(&self) -> f64 {
        self.requests_per_window as f64 / self.window_seconds as f64
    }

    /// Seconds an empty local bucket needs to refill completely.
    pub fn full_refill_seconds(&self) -> f64 {
        self.burst_size as f64 / self.refill_rate()
    }

    /// Whether this tier admits strictly less traffic than `other` and punishes harder.
    ///
    /// Lower sustained rate, longer cooldown and a higher backoff ceiling.
    pub fn is_stricter_than(&self, other: &TierConfig) -> bool {
        self.refill_rate() < other.refill_rate()
            && self.cooldown_seconds > other.cooldown_seconds
            && self.max_backoff_seconds > other.max_backoff_seconds
    }

    /// Compare how much traffic two tiers let through.
    ///
    /// Sustained rate first, then burst size, then the shorter cooldown.
    pub fn cmp_permissiveness(&self, other: &TierConfig) -> Ordering {
        self.refill_rate()
            .total_cmp(&other.refill_rate())
            .then(self.burst_size.cmp(&other.burst_size))
            .then(other.cooldown_seconds.total_cmp(&self.cooldown_seconds))
    }
}

/// Wire shape of a tier in configuration files.
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct TierConfigSpec {
    category: Category,
    requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    window_seconds: u64,
    burst_size: u32,
    cooldown_seconds: f64,
    max_backoff_seconds: f64,
}

#[cfg(feature = "serde")]
fn default_window_seconds() -> u64 {
    DEFAULT_WINDOW_SECONDS
}

#[cfg(feature = "serde")]
impl TryFrom<TierConfigSpec> for TierConfig {
    type Error = TierError;

    fn try_from(spec: TierConfigSpec) -> Result<Self, Self::Error> {
        TierConfig::new(
            spec.category,
            spec.requests_per_window,
            spec.window_seconds,
            spec.burst_size,
            spec.cooldown_seconds,
            spec.max_backoff_seconds,
        )
    }
}

#[cfg(feature = "serde")]
impl From<TierConfig> for TierConfigSpec {
    fn from(tier: TierConfig) -> Self {
        Self {
            category: tier.category,
            requests_per_window: tier.requests_per_window,
            window_seconds: tier.window_seconds,
            burst_size: tier.burst_size,
            cooldown_seconds: tier.cooldown_seconds,
            max_backoff_seconds: tier.max_backoff_seconds,
        }
    }
}

//! Shared domain enums.
//!
//! These types cross every crate boundary in the workspace, so they live in
//! core rather than in the store or platform layers.

use serde::{Deserialize, Serialize};

/// External social platform a publisher account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Primary creator platform with a writable business API.
    Instagram,

    /// Page-holding platform; accounts here are counterparts of writable
    /// identities rather than sync targets of their own.
    Facebook,

    /// Short-form video platform with a writable API.
    Tiktok,
}

impl PlatformKind {
    /// Every supported platform.
    pub const ALL: [PlatformKind; 3] = [
        PlatformKind::Instagram,
        PlatformKind::Facebook,
        PlatformKind::Tiktok,
    ];

    /// Whether accounts on this platform can be synced through a writable
    /// API connection, as opposed to being referenced as counterparts only.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        match self {
            PlatformKind::Instagram | PlatformKind::Tiktok => true,
            PlatformKind::Facebook => false,
        }
    }

    /// The platform whose account ids appear as alternate identifiers for
    /// accounts on this platform, if any.
    #[must_use]
    pub fn counterpart(&self) -> Option<PlatformKind> {
        match self {
            PlatformKind::Instagram => Some(PlatformKind::Facebook),
            PlatformKind::Facebook => Some(PlatformKind::Instagram),
            PlatformKind::Tiktok => None,
        }
    }

    /// Stable string form used in storage keys and log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Instagram => "instagram",
            PlatformKind::Facebook => "facebook",
            PlatformKind::Tiktok => "tiktok",
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instagram" => Ok(PlatformKind::Instagram),
            "facebook" => Ok(PlatformKind::Facebook),
            "tiktok" => Ok(PlatformKind::Tiktok),
            _ => Err(format!("Unknown platform: {s}")),
        }
    }
}

/// Linkage state of a publisher identity.
///
/// Capability is ordered: `SoftLinked < Basic < Full`. Transitions upward
/// happen when a real connection arrives for a placeholder or a limited
/// account; the only downward transition is an explicit down-conversion
/// after token invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Placeholder created without platform credentials, standing in for an
    /// account referenced before it was actually connected.
    SoftLinked,

    /// Connection with limited, consumer-grade API scope.
    Basic,

    /// Connection with complete business API access.
    Full,
}

impl LinkState {
    /// Numeric capability rank for comparisons.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            LinkState::SoftLinked => 0,
            LinkState::Basic => 1,
            LinkState::Full => 2,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::SoftLinked => "soft_linked",
            LinkState::Basic => "basic",
            LinkState::Full => "full",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LinkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "soft_linked" => Ok(LinkState::SoftLinked),
            "basic" => Ok(LinkState::Basic),
            "full" => Ok(LinkState::Full),
            _ => Err(format!("Unknown link state: {s}")),
        }
    }
}

/// Kind of account behind a publisher identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// A personal creator account.
    User,

    /// A business page.
    Page,

    /// An internal system account referenced by other identities.
    System,
}

impl AccountKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::User => "user",
            AccountKind::Page => "page",
            AccountKind::System => "system",
        }
    }
}

impl std::str::FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(AccountKind::User),
            "page" => Ok(AccountKind::Page),
            "system" => Ok(AccountKind::System),
            _ => Err(format!("Unknown account kind: {s}")),
        }
    }
}

/// Kind of published content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A regular feed post.
    Post,

    /// An ephemeral story, available on the platform for roughly 24 hours.
    Story,

    /// Content whose kind the platform did not report.
    Unknown,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Post => "post",
            MediaKind::Story => "story",
            MediaKind::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" => Ok(MediaKind::Post),
            "story" => Ok(MediaKind::Story),
            "unknown" => Ok(MediaKind::Unknown),
            _ => Err(format!("Unknown media kind: {s}")),
        }
    }
}

/// Reporting period of a stat snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatPeriod {
    /// One-day window.
    Day,

    /// Seven-day window.
    Week,

    /// Twenty-eight-day window.
    Days28,

    /// Whole lifetime of the media; the only period stories report.
    Lifetime,
}

impl StatPeriod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StatPeriod::Day => "day",
            StatPeriod::Week => "week",
            StatPeriod::Days28 => "days_28",
            StatPeriod::Lifetime => "lifetime",
        }
    }
}

impl std::fmt::Display for StatPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(StatPeriod::Day),
            "week" => Ok(StatPeriod::Week),
            "days_28" => Ok(StatPeriod::Days28),
            "lifetime" => Ok(StatPeriod::Lifetime),
            _ => Err(format!("Unknown stat period: {s}")),
        }
    }
}

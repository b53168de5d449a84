//! Link generation policies.
//!
//! Enum-based options instead of boolean flags, so the behaviour chosen at
//! each call site is explicit.
//!
//! ```
//! use billpay_kit::strategy::{ActiveLinkPolicy, ExpiryWindow};
//!
//! let _policy = ActiveLinkPolicy::Reject;
//! let window = ExpiryWindow::Week;
//! assert_eq!(window.days(), 7);
//! ```
//!
//! | Policy | Invoice already has an active link |
//! |--------|------------------------------------|
//! | **Reject** | Generation fails with `ActiveLinkExists` |
//! | **Supersede** | Old links are cancelled, new one is created |
//! | **AllowMultiple** | New link is created alongside the old ones |

use crate::error::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What to do when an invoice already has an active (non-terminal, unexpired)
/// payment link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveLinkPolicy {
    /// Refuse to create a second link.
    #[default]
    Reject,

    /// Cancel the existing links with reason "superseded", then create.
    Supersede,

    /// Create the new link and leave existing ones untouched.
    AllowMultiple,
}

impl std::fmt::Display for ActiveLinkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveLinkPolicy::Reject => write!(f, "Reject"),
            ActiveLinkPolicy::Supersede => write!(f, "Supersede"),
            ActiveLinkPolicy::AllowMultiple => write!(f, "AllowMultiple"),
        }
    }
}

/// How long a generated link stays payable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ExpiryWindow {
    ThreeDays,
    #[default]
    Week,
    TwoWeeks,
    Month,
}

impl ExpiryWindow {
    pub fn days(&self) -> u32 {
        match self {
            ExpiryWindow::ThreeDays => 3,
            ExpiryWindow::Week => 7,
            ExpiryWindow::TwoWeeks => 14,
            ExpiryWindow::Month => 30,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.days()))
    }
}

impl TryFrom<u32> for ExpiryWindow {
    type Error = Error;

    fn try_from(days: u32) -> Result<Self> {
        match days {
            3 => Ok(ExpiryWindow::ThreeDays),
            7 => Ok(ExpiryWindow::Week),
            14 => Ok(ExpiryWindow::TwoWeeks),
            30 => Ok(ExpiryWindow::Month),
            other => Err(Error::ValidationError(format!(
                "expiry window must be 3, 7, 14 or 30 days, got {}",
                other
            ))),
        }
    }
}

impl From<ExpiryWindow> for u32 {
    fn from(window: ExpiryWindow) -> Self {
        window.days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_display() {
        assert_eq!(ActiveLinkPolicy::Reject.to_string(), "Reject");
        assert_eq!(ActiveLinkPolicy::Supersede.to_string(), "Supersede");
        assert_eq!(ActiveLinkPolicy::AllowMultiple.to_string(), "AllowMultiple");
    }

    #[test]
    fn test_policy_default() {
        assert_eq!(ActiveLinkPolicy::default(), ActiveLinkPolicy::Reject);
    }

    #[test]
    fn test_expiry_window_days() {
        assert_eq!(ExpiryWindow::ThreeDays.duration(), Duration::days(3));
        assert_eq!(ExpiryWindow::default().days(), 7);
        assert_eq!(ExpiryWindow::Month.days(), 30);
    }

    #[test]
    fn test_expiry_window_from_days() {
        assert_eq!(ExpiryWindow::try_from(14).unwrap(), ExpiryWindow::TwoWeeks);
        assert!(matches!(
            ExpiryWindow::try_from(5),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_expiry_window_serde_as_days() {
        assert_eq!(serde_json::to_string(&ExpiryWindow::TwoWeeks).unwrap(), "14");
        let parsed: ExpiryWindow = serde_json::from_str("30").unwrap();
        assert_eq!(parsed, ExpiryWindow::Month);
        assert!(serde_json::from_str::<ExpiryWindow>("10").is_err());
    }
}

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

// --- Privilege ---

/// Privilege tiers of a requesting identity. Ordered: a higher tier may do
/// everything a lower one may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Anon,
    Contributor,
    Reviewer,
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Anon => write!(f, "anon"),
            UserRole::Contributor => write!(f, "contributor"),
            UserRole::Reviewer => write!(f, "reviewer"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

// --- Review Status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Draft,
    Pending,
    Accepted,
    Rejected,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 4] = [
        ReviewStatus::Draft,
        ReviewStatus::Pending,
        ReviewStatus::Accepted,
        ReviewStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Draft => "draft",
            ReviewStatus::Pending => "pending",
            ReviewStatus::Accepted => "accepted",
            ReviewStatus::Rejected => "rejected",
        }
    }

    /// Accepted and rejected entries are closed for normal users.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Accepted | ReviewStatus::Rejected)
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(ReviewStatus::Draft),
            "pending" => Ok(ReviewStatus::Pending),
            "accepted" => Ok(ReviewStatus::Accepted),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(InventoryError::invalid(
                "entry_review_status",
                other,
                "has to be one of draft, pending, accepted, rejected",
            )),
        }
    }
}

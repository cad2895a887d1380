//! Subscription models and the plan catalog.
//!
//! A subscription is a recurring charge. Each cycle is materialized as an
//! ordinary `SCHEDULED` payment linked back to the subscription; when that
//! payment is settled the sweep schedules the next one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::paise_to_rupees;

/// Days between subscription charges.
pub const DEFAULT_INTERVAL_DAYS: i32 = 30;

/// Kind of recurring charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// Fixed-price service plan (Netflix, Swiggy, ...)
    Plan,
    /// Prepaid mobile recharge
    Recharge,
    /// Streaming platform plan
    Ott,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Plan => "plan",
            SubscriptionKind::Recharge => "recharge",
            SubscriptionKind::Ott => "ott",
        }
    }
}

/// Subscription status strings stored in the database.
pub mod status {
    pub const ACTIVE: &str = "active";
    pub const FAILED: &str = "failed";
    pub const CANCELLED: &str = "cancelled";
}

/// Represents a subscription record from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    /// Payee shown on generated payments
    pub label: String,
    pub amount_paise: i64,
    pub interval_days: i32,
    pub next_due: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/subscriptions`.
///
/// Fields used per kind:
/// - `plan`: `plan` names a catalog plan
/// - `recharge`: `operator`, `mobile` (10 digits), `plan` is the price label
/// - `ott`: `platform`, `plan` names one of the platform's plans
///
/// ```json
/// { "kind": "ott", "platform": "Prime", "plan": "Monthly Plan", "due_date": "2026-11-01" }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub kind: SubscriptionKind,
    pub plan: String,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    /// First charge date; defaults to 30 days from today
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Subscription as returned to clients.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub kind: String,
    pub label: String,
    pub amount: f64,
    pub amount_paise: i64,
    pub interval_days: i32,
    pub next_due: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            kind: sub.kind,
            label: sub.label,
            amount: paise_to_rupees(sub.amount_paise),
            amount_paise: sub.amount_paise,
            interval_days: sub.interval_days,
            next_due: sub.next_due.format("%Y-%m-%d").to_string(),
            status: sub.status,
            created_at: sub.created_at,
        }
    }
}

/// A named price in the catalog.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CatalogPlan {
    pub name: &'static str,
    /// Whole rupees
    pub amount: i64,
}

/// Plans offered by one OTT platform.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OttPlatform {
    pub platform: &'static str,
    pub plans: &'static [CatalogPlan],
}

/// Everything a client needs to render the subscription picker.
#[derive(Debug, Serialize)]
pub struct Catalog {
    pub plans: &'static [CatalogPlan],
    pub recharge_operators: &'static [&'static str],
    pub recharge_plans: &'static [CatalogPlan],
    pub ott: &'static [OttPlatform],
}

pub const FIXED_PLANS: &[CatalogPlan] = &[
    CatalogPlan { name: "Netflix", amount: 499 },
    CatalogPlan { name: "Swiggy", amount: 199 },
    CatalogPlan { name: "Spotify", amount: 129 },
    CatalogPlan { name: "Zepto", amount: 150 },
];

pub const RECHARGE_OPERATORS: &[&str] = &["Jio", "Airtel", "Vi", "BSNL", "MTNL"];

pub const RECHARGE_PLANS: &[CatalogPlan] = &[
    CatalogPlan { name: "Basic Plan", amount: 199 },
    CatalogPlan { name: "5G Unlimited", amount: 299 },
    CatalogPlan { name: "All-in-One Pack", amount: 399 },
    CatalogPlan { name: "Data Pack", amount: 149 },
    CatalogPlan { name: "Premium Plus", amount: 649 },
];

pub const OTT_PLATFORMS: &[OttPlatform] = &[
    OttPlatform {
        platform: "Netflix",
        plans: &[
            CatalogPlan { name: "Basic Plan", amount: 199 },
            CatalogPlan { name: "Standard Plan", amount: 499 },
            CatalogPlan { name: "Premium Plan", amount: 799 },
        ],
    },
    OttPlatform {
        platform: "Prime",
        plans: &[
            CatalogPlan { name: "Monthly Plan", amount: 179 },
            CatalogPlan { name: "Annual Plan", amount: 1499 },
        ],
    },
    OttPlatform {
        platform: "Hotstar",
        plans: &[
            CatalogPlan { name: "Super", amount: 299 },
            CatalogPlan { name: "Premium", amount: 899 },
        ],
    },
];

pub fn catalog() -> Catalog {
    Catalog {
        plans: FIXED_PLANS,
        recharge_operators: RECHARGE_OPERATORS,
        recharge_plans: RECHARGE_PLANS,
        ott: OTT_PLATFORMS,
    }
}

fn find_plan(plans: &'static [CatalogPlan], name: &str) -> Option<&'static CatalogPlan> {
    plans.iter().find(|p| p.name == name)
}

/// A catalog selection resolved into what gets charged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
    pub label: String,
    pub amount_paise: i64,
}

/// Resolve a subscription request against the catalog.
///
/// Returns a user-facing message on failure.
pub fn resolve_plan(request: &CreateSubscriptionRequest) -> Result<ResolvedPlan, String> {
    match request.kind {
        SubscriptionKind::Plan => {
            let plan = find_plan(FIXED_PLANS, &request.plan)
                .ok_or_else(|| format!("Unknown plan: {}", request.plan))?;
            Ok(ResolvedPlan {
                label: plan.name.to_string(),
                amount_paise: plan.amount * 100,
            })
        }
        SubscriptionKind::Recharge => {
            let mobile = request.mobile.as_deref().unwrap_or("").trim();
            if mobile.len() != 10 || !mobile.chars().all(|c| c.is_ascii_digit()) {
                return Err("Enter a valid 10-digit mobile number".to_string());
            }
            let operator = request.operator.as_deref().unwrap_or("");
            if !RECHARGE_OPERATORS.contains(&operator) {
                return Err("Please select an operator".to_string());
            }
            let plan = find_plan(RECHARGE_PLANS, &request.plan)
                .ok_or_else(|| "Select a valid plan".to_string())?;
            Ok(ResolvedPlan {
                label: format!("{} - {}", operator, mobile),
                amount_paise: plan.amount * 100,
            })
        }
        SubscriptionKind::Ott => {
            let platform_name = request.platform.as_deref().unwrap_or("");
            let platform = OTT_PLATFORMS
                .iter()
                .find(|p| p.platform == platform_name)
                .ok_or_else(|| "Please select a platform".to_string())?;
            let plan = find_plan(platform.plans, &request.plan)
                .ok_or_else(|| format!("{} has no plan named {}", platform.platform, request.plan))?;
            Ok(ResolvedPlan {
                label: format!("{} - {}", platform.platform, plan.name),
                amount_paise: plan.amount * 100,
            })
        }
    }
}

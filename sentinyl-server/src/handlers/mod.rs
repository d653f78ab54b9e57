pub mod accounts;
pub mod guard;
pub mod scan;
pub mod system;

use serde_json::json;

use crate::errors::ApiError;
use axum::http::StatusCode;
use sentinyl_core::auth::{recommended_tier, upgrade_url, Feature, TierLimits};
use sentinyl_model::Subscription;

/// Tier gate shared by the scan and guard surfaces. The 403 body names
/// the caller's tier and where an upgrade would land them.
pub fn require_feature(subscription: &Subscription, feature: Feature) -> Result<(), ApiError> {
    let limits = TierLimits::for_tier(subscription.tier);
    if limits.has_feature(feature) {
        return Ok(());
    }

    let recommended = recommended_tier(feature);
    Err(ApiError::new(
        StatusCode::FORBIDDEN,
        json!({
            "error": "Feature not available in your plan",
            "current_tier": subscription.tier,
            "upgrade_url": upgrade_url(recommended),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinyl_model::{SubscriptionId, Tier, UserId};

    fn subscription(tier: Tier) -> Subscription {
        Subscription {
            id: SubscriptionId::new(),
            user_id: UserId::new(),
            tier,
            status: "active".to_string(),
            scan_quota: 5,
            agent_quota: 0,
            scan_used: 0,
            agent_used: 0,
            cycle_start: Utc::now(),
            cycle_end: Utc::now(),
        }
    }

    #[test]
    fn free_tier_reaches_scout_but_not_guard() {
        let sub = subscription(Tier::Free);
        assert!(require_feature(&sub, Feature::Scout).is_ok());

        let err = require_feature(&sub, Feature::Guard).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(
            err.detail["upgrade_url"],
            "/billing/subscribe?tier=guard_lite"
        );
    }

    #[test]
    fn full_stack_reaches_everything() {
        let sub = subscription(Tier::FullStack);
        assert!(require_feature(&sub, Feature::Scout).is_ok());
        assert!(require_feature(&sub, Feature::Guard).is_ok());
    }
}

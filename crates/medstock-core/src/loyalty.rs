//! # Loyalty Tiers
//!
//! Maps a customer's delivered-order history onto a VIP level.
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for tier in [3, 2, 1]:                                                 │
//! │      if count >= orders_from  OR  spent >= spent_from:                  │
//! │          return (tier.level, tier.discount)        ◄── first match wins │
//! │  return (0, 0)                                                          │
//! │                                                                         │
//! │  Unset thresholds never match.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The profile's loyalty fields are a cache. The delivered transition is
//! the only automatic recompute trigger; operators may also set a level by
//! hand or request a recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CustomerProfile, SettingsConfig};

/// Highest configurable VIP level.
pub const MAX_LOYALTY_LEVEL: u8 = 3;

/// A resolved VIP level with its discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoyaltyTier {
    pub level: u8,
    pub discount_percent: u8,
}

/// Resolves the tier a customer qualifies for.
///
/// ## Example
/// ```rust
/// use medstock_core::loyalty::resolve_tier;
/// use medstock_core::money::Money;
/// use medstock_core::types::SettingsConfig;
///
/// let settings = SettingsConfig::default();
/// let tier = resolve_tier(3, Money::zero(), &settings);
/// assert_eq!(tier.level, 1);
/// ```
pub fn resolve_tier(purchases_count: i64, total_spent: Money, settings: &SettingsConfig) -> LoyaltyTier {
    for level in (1..=MAX_LOYALTY_LEVEL).rev() {
        let Some(tier) = settings.tier(level) else {
            continue;
        };
        let by_count = tier.orders_from.is_some_and(|n| purchases_count >= n);
        let by_spend = tier.spent_from.is_some_and(|m| total_spent >= m);
        if by_count || by_spend {
            return LoyaltyTier {
                level: tier.level,
                discount_percent: tier.discount_percent,
            };
        }
    }
    LoyaltyTier::default()
}

/// Discount granted by a level under the current settings.
pub fn discount_for_level(level: u8, settings: &SettingsConfig) -> u8 {
    settings.tier(level).map(|t| t.discount_percent).unwrap_or(0)
}

/// Re-derives level and discount from the cached counters.
///
/// A pinned discount is replaced unless `keep_manual_discount` is set.
/// Returns true when any loyalty field changed.
pub fn refresh_tier(profile: &mut CustomerProfile, settings: &SettingsConfig) -> bool {
    let resolved = resolve_tier(profile.purchases_count, profile.total_spent, settings);
    let before = (profile.loyalty_level, profile.loyalty_discount, profile.discount_overridden);

    profile.loyalty_level = resolved.level;
    if !(profile.discount_overridden && settings.keep_manual_discount) {
        profile.loyalty_discount = resolved.discount_percent;
        profile.discount_overridden = false;
    }

    before != (profile.loyalty_level, profile.loyalty_discount, profile.discount_overridden)
}

/// Counts one delivered order against the profile and refreshes the tier.
pub fn apply_delivery(
    profile: &mut CustomerProfile,
    order_total: Money,
    settings: &SettingsConfig,
    now: DateTime<Utc>,
) {
    profile.purchases_count += 1;
    profile.total_spent += order_total;
    refresh_tier(profile, settings);
    profile.updated_at = now;
}

/// Operator override of the level, optionally pinning the discount.
///
/// Without a pin the discount follows the level's configured tier.
pub fn apply_manual(
    profile: &mut CustomerProfile,
    level: u8,
    discount_override: Option<u8>,
    settings: &SettingsConfig,
    now: DateTime<Utc>,
) {
    profile.loyalty_level = level;
    match discount_override {
        Some(pinned) => {
            profile.loyalty_discount = pinned;
            profile.discount_overridden = true;
        }
        None => {
            profile.loyalty_discount = discount_for_level(level, settings);
            profile.discount_overridden = false;
        }
    }
    profile.updated_at = now;
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn customer() -> CustomerProfile {
        let now = Utc::now();
        CustomerProfile {
            id: "c-1".to_string(),
            name: "Anna".to_string(),
            phone: None,
            loyalty_level: 0,
            loyalty_discount: 0,
            discount_overridden: false,
            purchases_count: 0,
            total_spent: Money::zero(),
            is_banned: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_no_history_is_level_zero() {
        let tier = resolve_tier(0, Money::zero(), &SettingsConfig::default());
        assert_eq!(tier, LoyaltyTier::default());
    }

    #[test]
    fn test_order_count_alone_qualifies() {
        let tier = resolve_tier(3, Money::zero(), &SettingsConfig::default());
        assert_eq!(tier, LoyaltyTier { level: 1, discount_percent: 5 });
    }

    #[test]
    fn test_spend_alone_qualifies_for_highest_tier() {
        let tier = resolve_tier(1, Money::from_major_minor(150_000, 0), &SettingsConfig::default());
        assert_eq!(tier.level, 3);
        assert_eq!(tier.discount_percent, 15);
    }

    #[test]
    fn test_unset_threshold_never_matches() {
        let mut settings = SettingsConfig::default();
        for tier in settings.vip_tiers.iter_mut() {
            tier.spent_from = None;
        }
        let tier = resolve_tier(0, Money::from_major_minor(1_000_000, 0), &settings);
        assert_eq!(tier.level, 0);
    }

    #[test]
    fn test_apply_delivery_updates_counters_and_level() {
        let settings = SettingsConfig::default();
        let mut profile = customer();
        profile.purchases_count = 2;
        apply_delivery(&mut profile, Money::from_major_minor(4_599, 0), &settings, Utc::now());
        assert_eq!(profile.purchases_count, 3);
        assert_eq!(profile.total_spent, Money::from_major_minor(4_599, 0));
        assert_eq!(profile.loyalty_level, 1);
        assert_eq!(profile.loyalty_discount, 5);
    }

    #[test]
    fn test_pinned_discount_is_replaced_by_default() {
        let settings = SettingsConfig::default();
        let mut profile = customer();
        apply_manual(&mut profile, 1, Some(20), &settings, Utc::now());
        assert_eq!(profile.loyalty_discount, 20);
        assert!(profile.discount_overridden);

        apply_delivery(&mut profile, Money::from_minor(100), &settings, Utc::now());
        assert_eq!(profile.loyalty_level, 0);
        assert_eq!(profile.loyalty_discount, 0);
        assert!(!profile.discount_overridden);
    }

    #[test]
    fn test_pinned_discount_survives_when_kept() {
        let settings = SettingsConfig {
            keep_manual_discount: true,
            ..SettingsConfig::default()
        };
        let mut profile = customer();
        profile.purchases_count = 5;
        apply_manual(&mut profile, 2, Some(25), &settings, Utc::now());

        apply_delivery(&mut profile, Money::from_minor(100), &settings, Utc::now());
        assert_eq!(profile.loyalty_level, 2);
        assert_eq!(profile.loyalty_discount, 25);
        assert!(profile.discount_overridden);
    }

    #[test]
    fn test_manual_level_without_pin_uses_tier_discount() {
        let settings = SettingsConfig::default();
        let mut profile = customer();
        apply_manual(&mut profile, 3, None, &settings, Utc::now());
        assert_eq!(profile.loyalty_discount, 15);
        assert!(!profile.discount_overridden);
        assert!(refresh_tier(&mut profile, &settings));
        assert_eq!(profile.loyalty_level, 0);
    }

    proptest! {
        #[test]
        fn prop_tier_is_monotone(
            count in 0i64..40,
            extra_count in 0i64..40,
            spent in 0i64..30_000_000,
            extra_spent in 0i64..30_000_000,
        ) {
            let settings = SettingsConfig::default();
            let low = resolve_tier(count, Money::from_minor(spent), &settings);
            let high = resolve_tier(
                count + extra_count,
                Money::from_minor(spent + extra_spent),
                &settings,
            );
            prop_assert!(high.level >= low.level);
            prop_assert!(high.discount_percent >= low.discount_percent);
        }
    }
}

//! Respawn eligibility policy.
//!
//! [`evaluate`] decides whether a classified death is followed by an
//! automatic respawn. Approval stamps the entity's cooldown in the same
//! call, so two deaths in quick succession can never both be approved.

use std::time::Duration;

use chrono::{DateTime, Utc};
use respawn_types::{DeathReason, EntityId};

use crate::config::AutoRespawnConfig;
use crate::cooldown::CooldownState;

/// Outcome of an eligibility evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// A respawn is approved and the cooldown has been stamped.
    Eligible,
    /// Auto-respawn is switched off globally.
    Disabled,
    /// The entity was respawned too recently.
    CoolingDown {
        /// Time left until the cooldown expires.
        remaining: Duration,
    },
    /// Respawns for this reason are switched off in configuration.
    ReasonNotEnabled(DeathReason),
    /// Deaths for this reason are never respawned.
    NeverForReason(DeathReason),
}

impl Eligibility {
    /// Whether a respawn should follow.
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

impl core::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Eligible => f.write_str("eligible"),
            Self::Disabled => f.write_str("auto-respawn disabled"),
            Self::CoolingDown { remaining } => {
                write!(f, "on cooldown for another {}s", remaining.as_secs())
            }
            Self::ReasonNotEnabled(reason) => write!(f, "respawn on {reason} not enabled"),
            Self::NeverForReason(reason) => write!(f, "{reason} deaths are never respawned"),
        }
    }
}

/// Evaluate whether `entity_id`, having died for `reason` at `now`, should
/// be respawned.
pub fn evaluate(
    entity_id: EntityId,
    reason: DeathReason,
    now: DateTime<Utc>,
    cooldowns: &mut impl CooldownState,
    config: &AutoRespawnConfig,
) -> Eligibility {
    if !config.enabled {
        return Eligibility::Disabled;
    }

    if let Some(last) = cooldowns.last_respawn_at(entity_id) {
        let window = config.cooldown_window();
        // A stamp in the future (clock stepped back) counts as just stamped.
        let elapsed = now
            .signed_duration_since(last)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed < window {
            return Eligibility::CoolingDown {
                remaining: window.saturating_sub(elapsed),
            };
        }
    }

    let decision = for_reason(reason, config);
    if decision.is_eligible() {
        cooldowns.stamp(entity_id, now);
    }
    decision
}

/// Re-decide a death whose reason changed after `prior` was computed.
///
/// An approved `prior` already stamped the cooldown for this same death, so
/// only the new reason is checked. Otherwise this is a fresh [`evaluate`].
pub fn reevaluate(
    entity_id: EntityId,
    prior: Eligibility,
    reason: DeathReason,
    now: DateTime<Utc>,
    cooldowns: &mut impl CooldownState,
    config: &AutoRespawnConfig,
) -> Eligibility {
    if !prior.is_eligible() {
        return evaluate(entity_id, reason, now, cooldowns, config);
    }
    if !config.enabled {
        return Eligibility::Disabled;
    }
    for_reason(reason, config)
}

const fn for_reason(reason: DeathReason, config: &AutoRespawnConfig) -> Eligibility {
    match reason {
        DeathReason::HostileMob => enabled_for(config.respawn_on_hostile_death, reason),
        DeathReason::Environment => enabled_for(config.respawn_on_environment_death, reason),
        DeathReason::Command => enabled_for(config.respawn_on_command_kill, reason),
        DeathReason::Player | DeathReason::Unknown => Eligibility::NeverForReason(reason),
    }
}

const fn enabled_for(flag: bool, reason: DeathReason) -> Eligibility {
    if flag {
        Eligibility::Eligible
    } else {
        Eligibility::ReasonNotEnabled(reason)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::cooldown::CooldownLedger;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
            .checked_add_signed(TimeDelta::seconds(secs))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn enabled() -> AutoRespawnConfig {
        AutoRespawnConfig {
            enabled: true,
            ..AutoRespawnConfig::default()
        }
    }

    #[test]
    fn disabled_is_never_eligible() {
        let mut ledger = CooldownLedger::new();
        let config = AutoRespawnConfig::default();
        for reason in DeathReason::ALL {
            let result = evaluate(EntityId::new(), reason, at(0), &mut ledger, &config);
            assert_eq!(result, Eligibility::Disabled);
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn player_and_unknown_are_never_eligible() {
        let mut ledger = CooldownLedger::new();
        let config = AutoRespawnConfig {
            respawn_on_command_kill: true,
            ..enabled()
        };
        for reason in [DeathReason::Player, DeathReason::Unknown] {
            let result = evaluate(EntityId::new(), reason, at(0), &mut ledger, &config);
            assert_eq!(result, Eligibility::NeverForReason(reason));
        }
    }

    #[test]
    fn reason_toggles_are_respected() {
        let mut ledger = CooldownLedger::new();
        let config = enabled();
        let id = EntityId::new();

        let command = evaluate(id, DeathReason::Command, at(0), &mut ledger, &config);
        assert_eq!(command, Eligibility::ReasonNotEnabled(DeathReason::Command));
        assert_eq!(ledger.last_respawn_at(id), None);

        let hostile = evaluate(id, DeathReason::HostileMob, at(0), &mut ledger, &config);
        assert!(hostile.is_eligible());
    }

    #[test]
    fn approval_stamps_cooldown() {
        let mut ledger = CooldownLedger::new();
        let config = enabled();
        let id = EntityId::new();

        let first = evaluate(id, DeathReason::HostileMob, at(0), &mut ledger, &config);
        assert!(first.is_eligible());
        assert_eq!(ledger.last_respawn_at(id), Some(at(0)));

        let second = evaluate(id, DeathReason::Environment, at(30), &mut ledger, &config);
        assert_eq!(
            second,
            Eligibility::CoolingDown {
                remaining: Duration::from_secs(30)
            }
        );
        // A blocked evaluation does not move the stamp.
        assert_eq!(ledger.last_respawn_at(id), Some(at(0)));

        let third = evaluate(id, DeathReason::Environment, at(60), &mut ledger, &config);
        assert!(third.is_eligible());
        assert_eq!(ledger.last_respawn_at(id), Some(at(60)));
    }

    #[test]
    fn cooldown_applies_before_reason() {
        let mut ledger = CooldownLedger::new();
        let config = enabled();
        let id = EntityId::new();
        ledger.stamp(id, at(0));

        let result = evaluate(id, DeathReason::Player, at(10), &mut ledger, &config);
        assert!(matches!(result, Eligibility::CoolingDown { .. }));
    }

    #[test]
    fn reevaluation_ignores_the_stamp_of_the_same_death() {
        let mut ledger = CooldownLedger::new();
        let config = AutoRespawnConfig {
            respawn_on_command_kill: true,
            ..enabled()
        };
        let id = EntityId::new();

        let first = evaluate(id, DeathReason::HostileMob, at(0), &mut ledger, &config);
        let again = reevaluate(id, first, DeathReason::Command, at(0), &mut ledger, &config);
        assert!(again.is_eligible());
        assert_eq!(ledger.last_respawn_at(id), Some(at(0)));

        let strict = enabled();
        let refused = reevaluate(id, first, DeathReason::Command, at(0), &mut ledger, &strict);
        assert_eq!(refused, Eligibility::ReasonNotEnabled(DeathReason::Command));
    }

    #[test]
    fn reevaluating_a_refusal_is_a_fresh_evaluation() {
        let mut ledger = CooldownLedger::new();
        let config = AutoRespawnConfig {
            respawn_on_command_kill: true,
            ..enabled()
        };
        let id = EntityId::new();

        let first = evaluate(id, DeathReason::Player, at(5), &mut ledger, &config);
        assert!(!first.is_eligible());
        let again = reevaluate(id, first, DeathReason::Command, at(5), &mut ledger, &config);
        assert!(again.is_eligible());
        assert_eq!(ledger.last_respawn_at(id), Some(at(5)));
    }

    #[test]
    fn display_is_readable() {
        let text = Eligibility::ReasonNotEnabled(DeathReason::Command).to_string();
        assert_eq!(text, "respawn on COMMAND not enabled");
    }
}

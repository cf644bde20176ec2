//! Death classification.
//!
//! [`classify`] turns the raw signals the host reports for a death into a
//! single [`DeathReason`]. It is a pure function of its inputs: the signal,
//! the most recent command-kill mark for the entity, and the classifier
//! word lists from configuration.
//!
//! Rules are applied in order and the first match wins:
//!
//! 1. A command-kill mark within the de-bounce window of the death.
//! 2. A structured cause in the environmental cause set.
//! 3. An entity-inflicted cause, refined by the death message into a
//!    hostile-mob or player kill.
//! 4. Text analysis of the death message alone.
//! 5. [`DeathReason::Unknown`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use respawn_types::{DamageCause, DeathReason, DeathSignal};

use crate::config::ClassifierConfig;

/// Verb phrases that precede the killer's name in a death message.
const KILLER_PHRASES: [&str; 4] = [
    "was slain by ",
    "was shot by ",
    "was fireballed by ",
    "was killed by ",
];

/// Marker of a melee kill, used to recognise player kills.
const SLAIN_MARKER: &str = "was slain by";

/// Classify a death.
///
/// `command_mark` is the time the entity was last marked as killed by an
/// operator command, if ever. Never fails: ambiguous or missing signals
/// yield [`DeathReason::Unknown`].
pub fn classify(
    signal: &DeathSignal,
    command_mark: Option<DateTime<Utc>>,
    config: &ClassifierConfig,
) -> DeathReason {
    if command_mark.is_some_and(|mark| within_debounce(mark, signal.observed_at, config.command_debounce())) {
        return DeathReason::Command;
    }

    let message = signal.message.as_deref().unwrap_or_default();

    // `Other` carries no information and is handled like an absent cause.
    if let Some(cause) = signal.cause.filter(|c| *c != DamageCause::Other) {
        if config.environment_causes.contains(&cause) {
            return DeathReason::Environment;
        }
        if cause.is_entity_inflicted() {
            if names_hostile_killer(message, &config.hostile_mobs) {
                return DeathReason::HostileMob;
            }
            if message.contains(SLAIN_MARKER) {
                return DeathReason::Player;
            }
        }
    }

    if names_hostile_killer(message, &config.hostile_mobs) {
        return DeathReason::HostileMob;
    }
    if config
        .environment_phrases
        .iter()
        .any(|phrase| !phrase.is_empty() && message.contains(phrase.as_str()))
    {
        return DeathReason::Environment;
    }

    DeathReason::Unknown
}

/// Whether a command mark and a death are close enough for the mark to win.
/// The window applies in both directions.
pub fn within_debounce(mark: DateTime<Utc>, observed_at: DateTime<Utc>, window: Duration) -> bool {
    let gap_ms = observed_at
        .signed_duration_since(mark)
        .num_milliseconds()
        .unsigned_abs();
    u128::from(gap_ms) < window.as_millis()
}

/// Whether the message names a hostile mob right after a killer phrase.
///
/// Matching is by prefix, so `"Zombie"` also matches `"Zombie Villager"`.
fn names_hostile_killer(message: &str, hostile_mobs: &[String]) -> bool {
    KILLER_PHRASES.iter().any(|phrase| {
        message.match_indices(phrase).any(|(start, _)| {
            start
                .checked_add(phrase.len())
                .and_then(|end| message.get(end..))
                .is_some_and(|killer| {
                    hostile_mobs
                        .iter()
                        .any(|name| !name.is_empty() && killer.starts_with(name.as_str()))
                })
        })
    })
}

//! Enumeration types for death signals and respawn decisions.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Death reasons
// ---------------------------------------------------------------------------

/// Why a managed entity died, as derived from the host's death signals.
///
/// Only the most recent reason per entity is ever persisted; it is never a
/// source of truth beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeathReason {
    /// Killed by a hostile mob.
    HostileMob,
    /// Environmental death (fall, lava, drowning, ...).
    Environment,
    /// Removed through an explicit operator command.
    Command,
    /// Killed by another operator-controlled actor.
    Player,
    /// The signals were missing or ambiguous.
    Unknown,
}

impl DeathReason {
    /// Every reason, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::HostileMob,
        Self::Environment,
        Self::Command,
        Self::Player,
        Self::Unknown,
    ];

    /// Stable upper-case name used in storage and on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostileMob => "HOSTILE_MOB",
            Self::Environment => "ENVIRONMENT",
            Self::Command => "COMMAND",
            Self::Player => "PLAYER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl core::fmt::Display for DeathReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized [`DeathReason`] name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDeathReason(pub String);

impl core::fmt::Display for UnknownDeathReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown death reason `{}`", self.0)
    }
}

impl std::error::Error for UnknownDeathReason {}

impl core::str::FromStr for DeathReason {
    type Err = UnknownDeathReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| UnknownDeathReason(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Structured damage causes
// ---------------------------------------------------------------------------

/// Structured damage/death cause reported by the host, when available.
///
/// Codes this service does not know deserialize to [`DamageCause::Other`],
/// which the classifier treats the same as an absent cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DamageCause {
    // --- Entity-inflicted ---
    /// Direct melee attack by another entity.
    EntityAttack,
    /// Sweeping attack by another entity.
    EntitySweepAttack,
    /// Explosion caused by an entity (creeper, fireball).
    EntityExplosion,
    /// Hit by a projectile.
    Projectile,

    // --- Environmental ---
    /// Fell from a height.
    Fall,
    /// Standing in fire.
    Fire,
    /// Burning after leaving fire.
    FireTick,
    /// Contact with lava.
    Lava,
    /// Ran out of air underwater.
    Drowning,
    /// Stuck inside a block.
    Suffocation,
    /// Hunger reached zero.
    Starvation,
    /// Fell out of the world.
    Void,
    /// Struck by lightning.
    Lightning,
    /// Frozen in powder snow.
    Freeze,
    /// Crushed by a falling block.
    FallingBlock,
    /// Flew into a wall while gliding.
    FlyIntoWall,
    /// Standing on a magma block.
    HotFloor,
    /// Too many entities in one space.
    Cramming,
    /// Water creature left out of water.
    Dryout,

    // --- Other known causes ---
    /// Explosion not attributed to an entity.
    BlockExplosion,
    /// Touched a damaging block (cactus, berry bush).
    Contact,
    /// Magic damage (potions).
    Magic,
    /// Poison effect.
    Poison,
    /// Wither effect.
    Wither,
    /// Reflected thorns damage.
    Thorns,
    /// Killed by a `/kill`-style host command.
    Kill,

    /// Any cause this service does not recognize.
    #[serde(other)]
    Other,
}

impl DamageCause {
    /// Whether the cause is damage dealt by another entity (melee,
    /// explosion, sweep).
    pub const fn is_entity_inflicted(self) -> bool {
        matches!(
            self,
            Self::EntityAttack | Self::EntityExplosion | Self::EntitySweepAttack
        )
    }

    /// The default set of causes that count as environmental deaths.
    pub const ENVIRONMENTAL: [Self; 15] = [
        Self::Fall,
        Self::Fire,
        Self::FireTick,
        Self::Lava,
        Self::Drowning,
        Self::Suffocation,
        Self::Starvation,
        Self::Void,
        Self::Lightning,
        Self::Freeze,
        Self::FallingBlock,
        Self::FlyIntoWall,
        Self::HotFloor,
        Self::Cramming,
        Self::Dryout,
    ];
}

// ---------------------------------------------------------------------------
// Lifespan
// ---------------------------------------------------------------------------

/// How long a newly created entity should live before the host removes it.
///
/// Respawned entities always live until they die or are removed; the field
/// is carried on the wire so hosts need no special case for respawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifespan {
    /// The entity lives until it dies or is removed.
    Unlimited,
}

//! Priority levels and the priority → timeout policy.

use serde::{Deserialize, Serialize};

use super::Time;

/// Max 31 bit integer, used as the Idle timeout so idle work never competes
/// on expiration.
pub const MAX_SIGNED_31_BIT_INT: Time = 1_073_741_823.0;

/// Times out immediately.
pub const IMMEDIATE_PRIORITY_TIMEOUT: Time = -1.0;
/// Eventually times out.
pub const USER_BLOCKING_PRIORITY_TIMEOUT: Time = 250.0;
pub const NORMAL_PRIORITY_TIMEOUT: Time = 5000.0;
pub const LOW_PRIORITY_TIMEOUT: Time = 10000.0;
/// Never times out.
pub const IDLE_PRIORITY_TIMEOUT: Time = MAX_SIGNED_31_BIT_INT;

/// Scheduling priority of a task.
///
/// Variants are declared from most to least urgent, so the derived `Ord`
/// sorts `Immediate` first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum PriorityLevel {
    /// Must run as soon as possible; its deadline has already passed.
    Immediate,
    /// Result of user interaction (clicks, key presses).
    UserBlocking,
    /// Default priority.
    #[default]
    Normal,
    /// Can be deferred, but should eventually run.
    Low,
    /// Only runs when nothing else is pending.
    Idle,
}

impl PriorityLevel {
    /// All levels, most urgent first.
    pub const ALL: [PriorityLevel; 5] = [
        PriorityLevel::Immediate,
        PriorityLevel::UserBlocking,
        PriorityLevel::Normal,
        PriorityLevel::Low,
        PriorityLevel::Idle,
    ];

    /// Convert from the numeric level (1 = Immediate ... 5 = Idle).
    ///
    /// Unknown values fall back to `Normal`.
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => PriorityLevel::Immediate,
            2 => PriorityLevel::UserBlocking,
            3 => PriorityLevel::Normal,
            4 => PriorityLevel::Low,
            5 => PriorityLevel::Idle,
            _ => PriorityLevel::Normal,
        }
    }

    /// Convert to the numeric level.
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            PriorityLevel::Immediate => 1,
            PriorityLevel::UserBlocking => 2,
            PriorityLevel::Normal => 3,
            PriorityLevel::Low => 4,
            PriorityLevel::Idle => 5,
        }
    }

    /// Timeout added to a task's start time to obtain its expiration time.
    #[inline]
    pub fn timeout(&self) -> Time {
        match self {
            PriorityLevel::Immediate => IMMEDIATE_PRIORITY_TIMEOUT,
            PriorityLevel::UserBlocking => USER_BLOCKING_PRIORITY_TIMEOUT,
            PriorityLevel::Normal => NORMAL_PRIORITY_TIMEOUT,
            PriorityLevel::Low => LOW_PRIORITY_TIMEOUT,
            PriorityLevel::Idle => IDLE_PRIORITY_TIMEOUT,
        }
    }

    /// Level used by `Scheduler::run_next`: anything at or above `Normal`
    /// shifts down to `Normal`, lower levels stay where they are.
    #[inline]
    pub fn next_level(&self) -> Self {
        match self {
            PriorityLevel::Immediate | PriorityLevel::UserBlocking | PriorityLevel::Normal => {
                PriorityLevel::Normal
            }
            other => *other,
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            PriorityLevel::Immediate => "immediate",
            PriorityLevel::UserBlocking => "user-blocking",
            PriorityLevel::Normal => "normal",
            PriorityLevel::Low => "low",
            PriorityLevel::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Timeout for the given priority.
#[inline]
pub fn timeout_for_priority(level: PriorityLevel) -> Time {
    level.timeout()
}

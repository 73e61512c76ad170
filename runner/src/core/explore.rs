//! What to do with the next slot: run a queued mission, explore, or rest.

use crate::core::types::ScheduleMode;

#[derive(Debug, Clone, PartialEq)]
pub struct ExplorePolicy {
    pub explore_prompt: Option<String>,
    /// Chance of exploring in Normal mode even when work is queued.
    pub explore_chance: f64,
    /// Same, in Work mode.
    pub work_explore_chance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotDecision {
    /// Take the next Pending entry.
    Pick,
    /// Run the explore prompt instead of a queued mission.
    Explore(String),
    /// Nothing to do.
    Rest,
}

/// Decide the slot. `roll` is a uniform sample in `[0, 1)`.
pub fn decide(
    mode: ScheduleMode,
    has_runnable: bool,
    roll: f64,
    policy: &ExplorePolicy,
) -> SlotDecision {
    let prompt = policy
        .explore_prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let Some(prompt) = prompt.filter(|_| mode != ScheduleMode::Deep) else {
        return if has_runnable {
            SlotDecision::Pick
        } else {
            SlotDecision::Rest
        };
    };
    if !has_runnable {
        return SlotDecision::Explore(prompt.to_string());
    }

    let chance = match mode {
        ScheduleMode::Work => policy.work_explore_chance,
        _ => policy.explore_chance,
    };
    if roll < chance {
        SlotDecision::Explore(prompt.to_string())
    } else {
        SlotDecision::Pick
    }
}

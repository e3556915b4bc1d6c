//! Constrained random assignment engine ("the draw").
//!
//! Produces a giver → receiver mapping over a roster such that nobody gives
//! to themself and nobody gives to anyone in their exclusion set. The engine
//! is a greedy randomized construction with full restarts:
//!
//! 1. Shuffle the givers (Fisher–Yates) so caller ordering has no effect.
//! 2. For each giver, pick uniformly among the receivers still in the pool
//!    that the giver may give to. An empty candidate set aborts the attempt.
//! 3. Re-verify the finished mapping.
//! 4. Retry with a fresh shuffle up to `max_attempts` times.
//!
//! The engine never returns an invalid [`Assignment`], but it may report
//! [`DrawError::Infeasible`] for tight constraint sets that do have a
//! solution. Exhaustion is very likely structural, so callers should surface
//! it rather than retry.

use std::collections::{HashMap, HashSet};

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::participant::Participant;
use crate::types::ParticipantId;

/// Default number of full attempts before reporting infeasibility.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a roster was rejected before any attempt was made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("roster is empty")]
    Empty,

    #[error("participant {0} appears more than once")]
    DuplicateParticipant(ParticipantId),
}

/// Errors returned by [`AssignmentEngine::draw`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    /// The roster is malformed. Never retried.
    #[error("Invalid roster: {0}")]
    InvalidInput(#[from] RosterError),

    /// Every attempt ran out of candidates.
    #[error(
        "Could not find a valid assignment after {attempts} attempts; check the exclusion lists"
    )]
    Infeasible { attempts: u32 },
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// A single giver → receiver pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pairing {
    pub giver: ParticipantId,
    pub receiver: ParticipantId,
}

/// The finalized giver → receiver mapping for one draw.
///
/// Pairs are listed in roster order of the giver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pairs: Vec<Pairing>,
}

impl Assignment {
    pub fn pairs(&self) -> &[Pairing] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The receiver assigned to `giver`, if `giver` is part of this draw.
    pub fn receiver_for(&self, giver: ParticipantId) -> Option<ParticipantId> {
        self.pairs
            .iter()
            .find(|p| p.giver == giver)
            .map(|p| p.receiver)
    }

    /// Check that this mapping is a valid draw for `roster`.
    ///
    /// Valid means: every roster member gives exactly once and receives
    /// exactly once, nobody gives to themself, and no giver is paired with
    /// someone in their exclusion set.
    pub fn is_valid_for(&self, roster: &[Participant]) -> bool {
        if self.pairs.len() != roster.len() {
            return false;
        }

        let by_id: HashMap<ParticipantId, &Participant> =
            roster.iter().map(|p| (p.id, p)).collect();
        let mut givers = HashSet::with_capacity(roster.len());
        let mut receivers = HashSet::with_capacity(roster.len());

        for pair in &self.pairs {
            let Some(giver) = by_id.get(&pair.giver) else {
                return false;
            };
            if !by_id.contains_key(&pair.receiver) || !giver.can_give_to(pair.receiver) {
                return false;
            }
            if !givers.insert(pair.giver) || !receivers.insert(pair.receiver) {
                return false;
            }
        }

        true
    }
}

// ---------------------------------------------------------------------------
// AssignmentEngine
// ---------------------------------------------------------------------------

/// Stateless draw engine with a fixed attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentEngine {
    max_attempts: u32,
}

impl AssignmentEngine {
    /// Create an engine with the given attempt budget (at least one attempt).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the draw using the thread-local random source.
    pub fn draw(&self, roster: &[Participant]) -> Result<Assignment, DrawError> {
        self.draw_with_rng(roster, &mut rand::rng())
    }

    /// Run the draw with a caller-supplied random source.
    pub fn draw_with_rng<R: Rng + ?Sized>(
        &self,
        roster: &[Participant],
        rng: &mut R,
    ) -> Result<Assignment, DrawError> {
        validate_roster(roster)?;

        for attempt in 1..=self.max_attempts {
            match try_assign(roster, rng) {
                Ok(assignment) if assignment.is_valid_for(roster) => {
                    tracing::debug!(
                        attempt,
                        participants = roster.len(),
                        "Draw succeeded"
                    );
                    return Ok(assignment);
                }
                Ok(_) => {
                    tracing::error!(attempt, "Draw attempt produced an invalid mapping");
                }
                Err(stuck_giver) => {
                    tracing::debug!(
                        attempt,
                        giver = %stuck_giver,
                        "Draw attempt failed, no receiver left for giver"
                    );
                }
            }
        }

        tracing::warn!(
            attempts = self.max_attempts,
            participants = roster.len(),
            "Draw attempt budget exhausted"
        );
        Err(DrawError::Infeasible {
            attempts: self.max_attempts,
        })
    }
}

impl Default for AssignmentEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Reject empty rosters and duplicate ids.
fn validate_roster(roster: &[Participant]) -> Result<(), RosterError> {
    if roster.is_empty() {
        return Err(RosterError::Empty);
    }

    let mut seen = HashSet::with_capacity(roster.len());
    for participant in roster {
        if !seen.insert(participant.id) {
            return Err(RosterError::DuplicateParticipant(participant.id));
        }
    }

    Ok(())
}

/// One greedy attempt. On failure returns the giver whose candidate set was
/// empty.
fn try_assign<R: Rng + ?Sized>(
    roster: &[Participant],
    rng: &mut R,
) -> Result<Assignment, ParticipantId> {
    let mut givers: Vec<&Participant> = roster.iter().collect();
    givers.shuffle(rng);

    let mut pool: Vec<ParticipantId> = roster.iter().map(|p| p.id).collect();
    let mut chosen: HashMap<ParticipantId, ParticipantId> = HashMap::with_capacity(roster.len());

    for giver in givers {
        let candidates: Vec<usize> = (0..pool.len())
            .filter(|&i| giver.can_give_to(pool[i]))
            .collect();

        let Some(&slot) = candidates.choose(rng) else {
            return Err(giver.id);
        };

        chosen.insert(giver.id, pool.swap_remove(slot));
    }

    let pairs = roster
        .iter()
        .filter_map(|p| {
            chosen.get(&p.id).map(|&receiver| Pairing {
                giver: p.id,
                receiver,
            })
        })
        .collect();

    Ok(Assignment { pairs })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

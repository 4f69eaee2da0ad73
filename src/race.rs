//! Race coordination: first reachable candidate wins
//!
//! One race generation tracks every candidate contributed by every source,
//! probes each exactly once, and resolves to a single terminal outcome.
//! All bookkeeping lives behind one mutex (single-writer discipline);
//! probes and source fetches run on the tokio worker pool and report back
//! through the coordinator's handlers. The first successful probe claims
//! the generation by compare-and-clear on the generation token; every
//! later result for that generation is a no-op.

use crate::probe::{SpeedProbe, SpeedTestResponse};
use crate::sources::{DomainSource, SourceYield};
use crate::status::{ShieldStatus, StatusCell};
use crate::store::DomainStore;
use crate::types::{Candidate, ProbeOutcome, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Endpoint values the race publishes for the application to read
///
/// Candidate URLs are immutable once constructed; only these slots and the
/// coordinator's own state need mutual exclusion.
pub struct EndpointSlots {
    active: Mutex<Option<Candidate>>,
    last_success: Mutex<Option<Candidate>>,
    primary_line: AtomicBool,
}

impl EndpointSlots {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            last_success: Mutex::new(None),
            primary_line: AtomicBool::new(false),
        }
    }

    /// The winning candidate of the most recent completed race, if any
    pub fn active(&self) -> Option<Candidate> {
        self.active.lock().expect("slot lock poisoned").clone()
    }

    pub(crate) fn set_active(&self, candidate: Candidate) {
        *self.active.lock().expect("slot lock poisoned") = Some(candidate);
    }

    /// Last endpoint known to answer a speed test, winner or not
    pub fn last_success(&self) -> Option<Candidate> {
        self.last_success.lock().expect("slot lock poisoned").clone()
    }

    pub(crate) fn set_last_success(&self, candidate: Candidate) {
        *self.last_success.lock().expect("slot lock poisoned") = Some(candidate);
    }

    /// Whether the latest winner was served by the primary line
    pub fn is_primary_line(&self) -> bool {
        self.primary_line.load(Ordering::Relaxed)
    }

    pub(crate) fn set_primary(&self, primary: bool) {
        self.primary_line.store(primary, Ordering::Relaxed);
    }
}

impl Default for EndpointSlots {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-generation bookkeeping
struct RaceState {
    /// Token of the generation currently racing
    generation: Uuid,

    /// `Some(generation)` until a winner (or terminal failure) consumes it
    claim: Option<Uuid>,

    /// One outcome per tracked candidate; presence means "probed at most
    /// once this generation"
    outcomes: HashMap<Candidate, ProbeOutcome>,

    /// Asynchronous sources that have not answered yet
    sources_pending: usize,
}

impl RaceState {
    fn idle() -> Self {
        Self {
            generation: Uuid::nil(),
            claim: None,
            outcomes: HashMap::new(),
            sources_pending: 0,
        }
    }
}

/// Aggregate decision computed under the state lock, applied outside it
enum Aggregate {
    /// Nothing to report yet
    Stand,
    /// All sources answered, probes still in flight
    Narrowing,
    /// All sources answered and every probe failed
    Exhausted,
}

/// Coordinates one race generation at a time
pub struct RaceCoordinator {
    probe: Arc<SpeedProbe>,
    store: Arc<dyn DomainStore>,
    status: Arc<StatusCell>,
    slots: Arc<EndpointSlots>,
    state: Mutex<RaceState>,
}

impl RaceCoordinator {
    pub fn new(
        probe: Arc<SpeedProbe>,
        store: Arc<dyn DomainStore>,
        status: Arc<StatusCell>,
        slots: Arc<EndpointSlots>,
    ) -> Arc<Self> {
        Arc::new(Self {
            probe,
            store,
            status,
            slots,
            state: Mutex::new(RaceState::idle()),
        })
    }

    /// Begin a new race generation, superseding any previous one
    ///
    /// `seed` is the synchronously-read cache list; it is probed
    /// immediately and does not count toward the source counter. Each
    /// entry of `sources` resolves exactly once, successfully or not.
    pub fn start_race(
        self: &Arc<Self>,
        seed: Vec<Candidate>,
        sources: Vec<Arc<dyn DomainSource>>,
    ) -> Uuid {
        let generation = Uuid::new_v4();
        {
            let mut state = self.state.lock().expect("race lock poisoned");
            *state = RaceState {
                generation,
                claim: Some(generation),
                outcomes: HashMap::new(),
                sources_pending: sources.len(),
            };
        }
        tracing::info!(
            %generation,
            sources = sources.len(),
            seed = seed.len(),
            "race generation started"
        );

        self.submit_candidates(generation, seed);

        for source in sources {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                let result = source.fetch().await;
                coordinator.on_source_resolved(generation, source.name(), result);
            });
        }

        generation
    }

    /// Track and probe every candidate not yet seen this generation
    fn submit_candidates(self: &Arc<Self>, generation: Uuid, candidates: Vec<Candidate>) {
        let fresh: Vec<Candidate> = {
            let mut state = self.state.lock().expect("race lock poisoned");
            if state.generation != generation || state.claim.is_none() {
                // Superseded or already decided; no point spending probes
                return;
            }
            candidates
                .into_iter()
                .filter(|candidate| {
                    state
                        .outcomes
                        .insert(candidate.clone(), ProbeOutcome::Pending)
                        .is_none()
                })
                .collect()
        };

        for candidate in fresh {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                let result = coordinator.probe.probe(&candidate).await;
                coordinator.on_probe_finished(generation, candidate, result);
            });
        }
    }

    /// One source has answered, with or without domains
    fn on_source_resolved(
        self: &Arc<Self>,
        generation: Uuid,
        name: &'static str,
        result: Result<SourceYield>,
    ) {
        let yielded = match result {
            Ok(yielded) => {
                tracing::debug!(source = name, domains = yielded.domains.len(), "source answered");
                yielded
            }
            Err(e) => {
                // Partial source failure is by-design survivable
                tracing::warn!(source = name, error = %e, "source failed");
                SourceYield::default()
            }
        };

        if !self.is_current(generation) {
            tracing::debug!(source = name, "stale source resolution discarded");
            return;
        }

        if let Some(self_probe) = yielded.self_probe {
            // Standing last-known-good, independent of who wins the race
            self.slots.set_last_success(self_probe.endpoint.clone());
            // The self endpoint is itself a candidate; its fetch already
            // was the probe, so the result enters the race directly.
            self.on_probe_finished(generation, self_probe.endpoint, Ok(self_probe.payload));
        }

        self.submit_candidates(generation, yielded.domains);

        let decision = {
            let mut state = self.state.lock().expect("race lock poisoned");
            if state.generation != generation {
                return;
            }
            debug_assert!(state.sources_pending > 0, "source resolved more than once");
            state.sources_pending = state.sources_pending.saturating_sub(1);
            Self::evaluate_locked(&mut state)
        };
        self.apply(decision);
    }

    /// One probe has completed
    fn on_probe_finished(
        &self,
        generation: Uuid,
        candidate: Candidate,
        result: Result<SpeedTestResponse>,
    ) {
        match result {
            Ok(payload) => {
                let won = {
                    let mut state = self.state.lock().expect("race lock poisoned");
                    if state.generation != generation {
                        return;
                    }
                    state
                        .outcomes
                        .insert(candidate.clone(), ProbeOutcome::Success);
                    // Compare-and-clear: the first success to observe the
                    // token still present takes the generation.
                    if state.claim == Some(generation) {
                        state.claim = None;
                        true
                    } else {
                        false
                    }
                };
                if won {
                    self.crown_winner(candidate, payload);
                } else {
                    tracing::debug!(%candidate, "probe succeeded after the race was decided");
                }
            }
            Err(e) => {
                tracing::debug!(%candidate, error = %e, "probe failed");
                let decision = {
                    let mut state = self.state.lock().expect("race lock poisoned");
                    if state.generation != generation {
                        return;
                    }
                    state.outcomes.insert(candidate, ProbeOutcome::Failure);
                    Self::evaluate_locked(&mut state)
                };
                self.apply(decision);
            }
        }
    }

    /// Aggregate rule, run after every source resolution and probe
    /// completion. Caller holds the state lock.
    fn evaluate_locked(state: &mut RaceState) -> Aggregate {
        if state.claim.is_none() {
            // A winner was already chosen (or failure already declared)
            return Aggregate::Stand;
        }
        if state.sources_pending == 0 {
            if state.outcomes.values().all(|o| o.is_failure()) {
                state.claim = None;
                return Aggregate::Exhausted;
            }
            return Aggregate::Narrowing;
        }
        Aggregate::Stand
    }

    fn apply(&self, decision: Aggregate) {
        match decision {
            Aggregate::Stand => {}
            Aggregate::Narrowing => {
                self.status.transition(ShieldStatus::DomainSpeedTesting);
            }
            Aggregate::Exhausted => {
                tracing::info!("every source answered and every probe failed");
                self.status.transition(ShieldStatus::DomainSpeedTestFailure);
            }
        }
    }

    /// Publish the winner and persist its advertised mirror list
    fn crown_winner(&self, candidate: Candidate, payload: SpeedTestResponse) {
        tracing::info!(
            winner = %candidate,
            primary = payload.is_primary_line(),
            "race generation won"
        );

        self.slots.set_active(candidate.clone());
        self.slots.set_last_success(candidate);
        self.slots.set_primary(payload.is_primary_line());

        let domains = payload.candidate_domains();
        if !domains.is_empty() {
            if let Err(e) = self.store.save(&domains) {
                tracing::warn!(error = %e, "failed to persist winning domain list");
            }
        }

        self.status.transition(ShieldStatus::DomainSpeedTestSuccess);
    }

    fn is_current(&self, generation: Uuid) -> bool {
        self.state.lock().expect("race lock poisoned").generation == generation
    }

    /// True iff every asynchronous source of the current generation has
    /// answered
    pub fn is_received_all_sources(&self) -> bool {
        self.state
            .lock()
            .expect("race lock poisoned")
            .sources_pending
            == 0
    }

    /// True iff every tracked candidate failed and none are still pending
    pub fn is_all_probes_failed(&self) -> bool {
        self.state
            .lock()
            .expect("race lock poisoned")
            .outcomes
            .values()
            .all(|o| o.is_failure())
    }

    /// Candidates tracked by the current generation
    pub fn tracked_candidates(&self) -> Vec<Candidate> {
        self.state
            .lock()
            .expect("race lock poisoned")
            .outcomes
            .keys()
            .cloned()
            .collect()
    }

    /// Track candidates as pending without spawning probes, so tests can
    /// inject completions deterministically
    #[cfg(test)]
    fn track_pending(&self, generation: Uuid, candidates: &[Candidate]) {
        let mut state = self.state.lock().expect("race lock poisoned");
        if state.generation != generation {
            return;
        }
        for candidate in candidates {
            state
                .outcomes
                .entry(candidate.clone())
                .or_insert(ProbeOutcome::Pending);
        }
    }
}

//! Aggregate root for the Initiative Tracker context.
//!
//! An [`Encounter`] owns the participant registry, the derived turn order and
//! the turn state machine. Every transition is recorded as one or more
//! [`EncounterEvent`]s; state is updated as each event is recorded so a
//! transition can read its own writes (roll, then select).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use initiative_core::aggregate::AggregateRoot;
use initiative_core::clock::Clock;
use initiative_core::error::DomainError;
use initiative_core::event::EventMetadata;
use initiative_core::identity::ParticipantRecord;
use initiative_core::rng::DeterministicRng;
use initiative_core::roll::RollEvaluator;
use serde::Serialize;
use uuid::Uuid;

use super::events::{
    ActionDeclared, ActionFlagsSet, ConfirmationRequested, Decision, EncounterCreated,
    EncounterEnded, EncounterEvent, EncounterEventKind, EncounterStarted, ParticipantAdded,
    ParticipantRemoved, ParticipantStatusChanged, RanksRolled, RoundStarted, SentinelsRegistered,
    TurnPassed,
};
use super::lifecycle;
use super::ordering;
use super::participant::Participant;
use super::ranking::recompute_ranks;
use super::sentinel::{SentinelKind, SentinelRefs};

/// Formula used when an encounter is created without one.
pub const DEFAULT_FORMULA: &str = "1d10";

/// Where the turn currently rests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "participant_id", rename_all = "snake_case")]
pub enum TurnState {
    /// No participant holds the turn.
    Idle,
    /// The participant holds the turn.
    Active(Uuid),
    /// The participant holds the turn and an end/delay decision is pending.
    AwaitingConfirmation(Uuid),
}

impl TurnState {
    /// The participant holding the turn, if any.
    #[must_use]
    pub fn participant(self) -> Option<Uuid> {
        match self {
            Self::Idle => None,
            Self::Active(id) | Self::AwaitingConfirmation(id) => Some(id),
        }
    }
}

/// Coarse encounter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    /// No `EncounterCreated` event yet.
    Pending,
    /// Created, participants may join, not started.
    Created,
    /// Rounds are being played.
    Running,
    /// Terminal.
    Ended,
}

/// Correlation and timestamp shared by all events of one transition.
struct Stamp {
    correlation_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl Stamp {
    fn new(correlation_id: Uuid, clock: &dyn Clock) -> Self {
        Self {
            correlation_id,
            occurred_at: clock.now(),
        }
    }
}

/// The aggregate root for an encounter.
#[derive(Debug, Clone)]
pub struct Encounter {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Sequence number of the last persisted event.
    pub(crate) version: i64,
    pub(crate) status: EncounterStatus,
    attached_to_view: bool,
    default_formula: String,
    pub(crate) round: u32,
    pub(crate) participants: HashMap<Uuid, Participant>,
    /// Ids sorted by the ordering rule; re-derived whenever ranks or the
    /// registry change.
    turn_order: Vec<Uuid>,
    pub(crate) state: TurnState,
    sentinels: Option<SentinelRefs>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<EncounterEvent>,
}

impl Encounter {
    /// Creates an empty, not yet created encounter.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            status: EncounterStatus::Pending,
            attached_to_view: false,
            default_formula: DEFAULT_FORMULA.to_owned(),
            round: 0,
            participants: HashMap::new(),
            turn_order: Vec::new(),
            state: TurnState::Idle,
            sentinels: None,
            uncommitted_events: Vec::new(),
        }
    }

    // --- queries ---

    /// Lifecycle status.
    #[must_use]
    pub fn status(&self) -> EncounterStatus {
        self.status
    }

    /// Current round; `0` before the encounter starts.
    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Turn state.
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether a view displayed the encounter at creation.
    #[must_use]
    pub fn attached_to_view(&self) -> bool {
        self.attached_to_view
    }

    /// Formula used for participants without their own.
    #[must_use]
    pub fn default_formula(&self) -> &str {
        &self.default_formula
    }

    /// Registered sentinel identities.
    #[must_use]
    pub fn sentinels(&self) -> Option<SentinelRefs> {
        self.sentinels
    }

    /// Participant ids in turn order.
    #[must_use]
    pub fn turn_order(&self) -> &[Uuid] {
        &self.turn_order
    }

    /// Participants in turn order.
    #[must_use]
    pub fn participants_in_order(&self) -> Vec<&Participant> {
        self.turn_order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .collect()
    }

    /// Looks up a participant.
    #[must_use]
    pub fn participant(&self, id: Uuid) -> Option<&Participant> {
        self.participants.get(&id)
    }

    /// Position of the turn holder in the turn order.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.state.participant().and_then(|id| self.position_of(id))
    }

    /// The participant holding the turn.
    #[must_use]
    pub fn active_participant(&self) -> Option<&Participant> {
        self.state.participant().and_then(|id| self.participants.get(&id))
    }

    /// Normal participants, in turn order.
    #[must_use]
    pub fn normal_participant_ids(&self) -> Vec<Uuid> {
        self.participants_in_order()
            .into_iter()
            .filter(|p| !p.is_sentinel())
            .map(|p| p.id)
            .collect()
    }

    fn position_of(&self, id: Uuid) -> Option<usize> {
        self.turn_order.iter().position(|candidate| *candidate == id)
    }

    // --- registry commands ---

    /// Creates the encounter.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the encounter already exists or
    /// the formula is blank.
    pub fn create(
        &mut self,
        attached_to_view: bool,
        default_formula: Option<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.status != EncounterStatus::Pending {
            return Err(DomainError::Validation(format!(
                "encounter {} already exists",
                self.id
            )));
        }
        let default_formula = default_formula.unwrap_or_else(|| DEFAULT_FORMULA.to_owned());
        if default_formula.trim().is_empty() {
            return Err(DomainError::Validation(
                "default initiative formula must not be blank".to_owned(),
            ));
        }

        let stamp = Stamp::new(correlation_id, clock);
        self.record(
            &stamp,
            EncounterEventKind::EncounterCreated(EncounterCreated {
                encounter_id: self.id,
                attached_to_view,
                default_formula,
            }),
        );
        Ok(())
    }

    /// Registers the two sentinel identities.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if sentinels are already registered
    /// or the ids collide, and `DomainError::InvalidTransition` if the
    /// encounter is not open.
    pub fn register_sentinels(
        &mut self,
        setup_id: Uuid,
        cleanup_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_open()?;
        if self.sentinels.is_some() {
            return Err(DomainError::Validation(format!(
                "encounter {} already has sentinels",
                self.id
            )));
        }
        if setup_id == cleanup_id
            || self.participants.contains_key(&setup_id)
            || self.participants.contains_key(&cleanup_id)
        {
            return Err(DomainError::Validation(
                "sentinel ids must be distinct and unused".to_owned(),
            ));
        }

        let stamp = Stamp::new(correlation_id, clock);
        self.record(
            &stamp,
            EncounterEventKind::SentinelsRegistered(SentinelsRegistered {
                setup_id,
                cleanup_id,
            }),
        );
        Ok(())
    }

    /// Adds a normal participant. It stays unranked until the next roll.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a duplicate id and
    /// `DomainError::InvalidTransition` if the encounter is not open.
    pub fn add_participant(
        &mut self,
        record: &ParticipantRecord,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_open()?;
        if self.participants.contains_key(&record.id) {
            return Err(DomainError::Validation(format!(
                "participant {} is already in encounter {}",
                record.id, self.id
            )));
        }

        let stamp = Stamp::new(correlation_id, clock);
        self.record(
            &stamp,
            EncounterEventKind::ParticipantAdded(ParticipantAdded {
                participant_id: record.id,
                name: record.name.clone(),
                is_npc: record.is_npc,
                defeated: record.defeated,
                alive: record.alive,
                initiative_formula: record.initiative_formula.clone(),
            }),
        );
        Ok(())
    }

    /// Removes a normal participant. If it held the turn, the turn moves to
    /// whoever now occupies the same position.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` for an unknown id,
    /// `DomainError::Validation` for a sentinel and
    /// `DomainError::InvalidTransition` if the encounter is not open.
    pub fn remove_participant(
        &mut self,
        participant_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_open()?;
        let participant = self
            .participants
            .get(&participant_id)
            .ok_or(DomainError::ParticipantNotFound(participant_id))?;
        if participant.is_sentinel() {
            return Err(DomainError::Validation(format!(
                "sentinel {participant_id} cannot be removed"
            )));
        }

        let displaced = if self.state.participant() == Some(participant_id) {
            self.position_of(participant_id)
        } else {
            None
        };

        let stamp = Stamp::new(correlation_id, clock);
        self.record(
            &stamp,
            EncounterEventKind::ParticipantRemoved(ParticipantRemoved { participant_id }),
        );

        if let Some(index) = displaced
            && self.status == EncounterStatus::Running
            && !self.turn_order.is_empty()
        {
            let target = self.turn_order[index.min(self.turn_order.len() - 1)];
            self.land(target, &stamp);
        }
        Ok(())
    }

    /// Mirrors health and classification changes reported by the identity
    /// store. Unknown ids and sentinels are ignored. Returns the number of
    /// participants that changed.
    pub fn sync_status(
        &mut self,
        records: &[ParticipantRecord],
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> usize {
        if matches!(self.status, EncounterStatus::Pending | EncounterStatus::Ended) {
            return 0;
        }

        let changes: Vec<ParticipantStatusChanged> = records
            .iter()
            .filter(|record| {
                self.participants.get(&record.id).is_some_and(|p| {
                    !p.is_sentinel()
                        && (p.name != record.name
                            || p.is_npc != record.is_npc
                            || p.alive != record.alive
                            || p.flags.defeated != record.defeated)
                })
            })
            .map(|record| ParticipantStatusChanged {
                participant_id: record.id,
                name: record.name.clone(),
                defeated: record.defeated,
                alive: record.alive,
                is_npc: record.is_npc,
            })
            .collect();

        let count = changes.len();
        if count > 0 {
            let stamp = Stamp::new(correlation_id, clock);
            for change in changes {
                self.record(&stamp, EncounterEventKind::ParticipantStatusChanged(change));
            }
        }
        count
    }

    /// Overrides a participant's action flags without moving the turn.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` for an unknown id,
    /// `DomainError::Validation` for a sentinel and
    /// `DomainError::InvalidTransition` if the encounter is not open.
    pub fn set_action_flags(
        &mut self,
        participant_id: Uuid,
        action_ended: bool,
        action_delayed: bool,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_open()?;
        let participant = self
            .participants
            .get(&participant_id)
            .ok_or(DomainError::ParticipantNotFound(participant_id))?;
        if participant.is_sentinel() {
            return Err(DomainError::Validation(format!(
                "sentinel {participant_id} carries no action flags"
            )));
        }

        let stamp = Stamp::new(correlation_id, clock);
        self.record(
            &stamp,
            EncounterEventKind::ActionFlagsSet(ActionFlagsSet {
                participant_id,
                action_ended,
                action_delayed,
            }),
        );
        Ok(())
    }

    /// Re-rolls the given participants. The turn stays with whoever held it,
    /// wherever that participant lands in the new order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` for an unknown id,
    /// `DomainError::Validation` for a bad formula and
    /// `DomainError::InvalidTransition` if the encounter is not open.
    pub fn roll_initiative(
        &mut self,
        participant_ids: &[Uuid],
        correlation_id: Uuid,
        clock: &dyn Clock,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        self.require_open()?;
        let stamp = Stamp::new(correlation_id, clock);
        self.roll(participant_ids, &stamp, roller, rng)
    }

    // --- turn commands ---

    /// Starts round 1: rolls everyone and lands on the setup sentinel.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the encounter is not in
    /// the created state or lacks sentinels, and `DomainError::Validation`
    /// for a bad formula.
    pub fn start(
        &mut self,
        correlation_id: Uuid,
        clock: &dyn Clock,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        match self.status {
            EncounterStatus::Created => {}
            EncounterStatus::Pending => return Err(self.not_created()),
            EncounterStatus::Running | EncounterStatus::Ended => {
                return Err(DomainError::InvalidTransition(format!(
                    "encounter {} has already started",
                    self.id
                )));
            }
        }
        let sentinels = self.sentinels.ok_or_else(|| {
            DomainError::InvalidTransition(format!(
                "encounter {} has no sentinels registered",
                self.id
            ))
        })?;

        let stamp = Stamp::new(correlation_id, clock);
        let everyone = self.turn_order.clone();
        self.roll(&everyone, &stamp, roller, rng)?;
        self.record(
            &stamp,
            EncounterEventKind::EncounterStarted(EncounterStarted {
                encounter_id: self.id,
            }),
        );
        self.record(
            &stamp,
            EncounterEventKind::RoundStarted(RoundStarted { round: 1 }),
        );
        self.land(sentinels.id_of(SentinelKind::Setup), &stamp);
        Ok(())
    }

    /// Moves the turn forward.
    ///
    /// Sentinels hand over without a gate; leaving cleanup starts the next
    /// round. A participant that already ended, delayed or dropped out hands
    /// over through a fresh roll. Anyone else is asked to end or delay first.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the encounter is not
    /// running, nobody holds the turn or a decision is pending.
    pub fn advance(
        &mut self,
        correlation_id: Uuid,
        clock: &dyn Clock,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        self.require_running()?;
        let current = self.require_active()?;
        let (is_sentinel, skips) = {
            let participant = self
                .participants
                .get(&current)
                .ok_or(DomainError::ParticipantNotFound(current))?;
            (participant.is_sentinel(), participant.skips_confirmation())
        };

        let stamp = Stamp::new(correlation_id, clock);
        if is_sentinel {
            let index = self
                .position_of(current)
                .ok_or(DomainError::ParticipantNotFound(current))?;
            self.step_forward(index, &stamp);
        } else if skips {
            self.hand_over(current, &stamp, roller, rng)?;
        } else {
            self.record(
                &stamp,
                EncounterEventKind::ConfirmationRequested(ConfirmationRequested {
                    participant_id: current,
                }),
            );
        }
        Ok(())
    }

    /// Answers the pending confirmation and hands the turn over.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if no decision is pending.
    pub fn decide(
        &mut self,
        decision: Decision,
        correlation_id: Uuid,
        clock: &dyn Clock,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        self.require_running()?;
        let TurnState::AwaitingConfirmation(current) = self.state else {
            return Err(DomainError::InvalidTransition(format!(
                "encounter {} has no pending decision",
                self.id
            )));
        };

        let stamp = Stamp::new(correlation_id, clock);
        self.record(
            &stamp,
            EncounterEventKind::ActionDeclared(ActionDeclared {
                participant_id: current,
                decision,
            }),
        );
        self.hand_over(current, &stamp, roller, rng)
    }

    /// Steps back one entry and re-resolves from there.
    ///
    /// Ranks are always rolled again. A sentinel behind the turn holder is
    /// then landed on directly; otherwise the top of the eligible pool takes
    /// the turn, preferring someone other than the entry stepped back to.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the encounter is not
    /// running, a decision is pending or the turn is at setup.
    pub fn rewind(
        &mut self,
        correlation_id: Uuid,
        clock: &dyn Clock,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        self.require_running()?;
        let current = self.require_active()?;
        let index = self
            .position_of(current)
            .ok_or(DomainError::ParticipantNotFound(current))?;
        if index == 0 {
            return Err(DomainError::InvalidTransition(format!(
                "cannot rewind past the setup of round {}",
                self.round
            )));
        }

        let previous = self.turn_order[index - 1];
        let stamp = Stamp::new(correlation_id, clock);
        self.roll_normals(&stamp, roller, rng)?;
        let target = if self.sentinel_kind(previous).is_some() {
            previous
        } else {
            self.select_eligible(previous).unwrap_or(previous)
        };
        self.land(target, &stamp);
        Ok(())
    }

    /// Rolls again and moves the turn to whoever now leads the eligible
    /// pool. Stays put when the pool is empty or already led by the turn
    /// holder.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the encounter is not
    /// running, nobody holds the turn or the turn is at setup.
    pub fn recheck(
        &mut self,
        correlation_id: Uuid,
        clock: &dyn Clock,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        self.require_running()?;
        let current = self.state.participant().ok_or_else(|| {
            DomainError::InvalidTransition(format!("nobody holds the turn in {}", self.id))
        })?;
        if self.sentinel_kind(current) == Some(SentinelKind::Setup) {
            return Err(DomainError::InvalidTransition(
                "initiative cannot be rechecked during setup".to_owned(),
            ));
        }

        let stamp = Stamp::new(correlation_id, clock);
        self.roll_normals(&stamp, roller, rng)?;
        if let Some(target) = self.select_eligible(current)
            && target != current
        {
            self.land(target, &stamp);
        }
        Ok(())
    }

    /// Ends the encounter and clears every action flag.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the encounter was never
    /// created or has already ended.
    pub fn end(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        match self.status {
            EncounterStatus::Created | EncounterStatus::Running => {}
            EncounterStatus::Pending => return Err(self.not_created()),
            EncounterStatus::Ended => {
                return Err(DomainError::InvalidTransition(format!(
                    "encounter {} has already ended",
                    self.id
                )));
            }
        }

        let stamp = Stamp::new(correlation_id, clock);
        self.record(
            &stamp,
            EncounterEventKind::EncounterEnded(EncounterEnded {
                encounter_id: self.id,
                final_round: self.round,
            }),
        );
        Ok(())
    }

    // --- internals ---

    fn sentinel_kind(&self, id: Uuid) -> Option<SentinelKind> {
        self.sentinels.and_then(|refs| refs.kind_of(id))
    }

    fn not_created(&self) -> DomainError {
        DomainError::InvalidTransition(format!("encounter {} has not been created", self.id))
    }

    fn require_open(&self) -> Result<(), DomainError> {
        match self.status {
            EncounterStatus::Created | EncounterStatus::Running => Ok(()),
            EncounterStatus::Pending => Err(self.not_created()),
            EncounterStatus::Ended => Err(DomainError::InvalidTransition(format!(
                "encounter {} has ended",
                self.id
            ))),
        }
    }

    fn require_running(&self) -> Result<(), DomainError> {
        match self.status {
            EncounterStatus::Running => Ok(()),
            EncounterStatus::Created => Err(DomainError::InvalidTransition(format!(
                "encounter {} has not started",
                self.id
            ))),
            _ => self.require_open(),
        }
    }

    fn require_active(&self) -> Result<Uuid, DomainError> {
        match self.state {
            TurnState::Active(id) => Ok(id),
            TurnState::AwaitingConfirmation(id) => Err(DomainError::InvalidTransition(format!(
                "participant {id} must end or delay their action first"
            ))),
            TurnState::Idle => Err(DomainError::InvalidTransition(format!(
                "nobody holds the turn in {}",
                self.id
            ))),
        }
    }

    fn roll(
        &mut self,
        ids: &[Uuid],
        stamp: &Stamp,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        let ranks = recompute_ranks(&self.participants, ids, &self.default_formula, roller, rng)?;
        if !ranks.is_empty() {
            self.record(stamp, EncounterEventKind::RanksRolled(RanksRolled { ranks }));
        }
        Ok(())
    }

    fn roll_normals(
        &mut self,
        stamp: &Stamp,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        let ids = self.normal_participant_ids();
        self.roll(&ids, stamp, roller, rng)
    }

    /// Top of the eligible pool, preferring anyone tied with it other than
    /// `current`. `None` when the pool is empty.
    fn select_eligible(&self, current: Uuid) -> Option<Uuid> {
        let pool: Vec<&Participant> = self
            .participants_in_order()
            .into_iter()
            .filter(|p| p.is_eligible())
            .collect();
        let top = pool.first()?.effective_rank();
        let tied: Vec<Uuid> = pool
            .iter()
            .take_while(|p| p.effective_rank() == top)
            .map(|p| p.id)
            .collect();

        tied.iter()
            .copied()
            .find(|id| *id != current)
            .or_else(|| tied.first().copied())
    }

    /// Re-rolls and hands the turn from `current` to the selected
    /// participant, falling back to the next entry in order.
    fn hand_over(
        &mut self,
        current: Uuid,
        stamp: &Stamp,
        roller: &dyn RollEvaluator,
        rng: &mut dyn DeterministicRng,
    ) -> Result<(), DomainError> {
        // The fallback walks on from where `current` stood before the roll.
        let index = self.position_of(current).unwrap_or(0);
        self.roll_normals(stamp, roller, rng)?;
        match self.select_eligible(current) {
            Some(target) => self.land(target, stamp),
            None => self.step_forward(index, stamp),
        }
        Ok(())
    }

    /// Lands on the entry after position `index`. Wrapping past cleanup
    /// starts the next round.
    fn step_forward(&mut self, index: usize, stamp: &Stamp) {
        if self.turn_order.is_empty() {
            return;
        }
        let next = (index + 1) % self.turn_order.len();
        if next == 0 {
            self.record(
                stamp,
                EncounterEventKind::RoundStarted(RoundStarted {
                    round: self.round + 1,
                }),
            );
        }
        let target = self.turn_order[next];
        self.land(target, stamp);
    }

    /// Gives the turn to `target`, opening the confirmation gate for eligible
    /// participants.
    fn land(&mut self, target: Uuid, stamp: &Stamp) {
        self.record(
            stamp,
            EncounterEventKind::TurnPassed(TurnPassed {
                participant_id: target,
            }),
        );
        if self
            .participants
            .get(&target)
            .is_some_and(Participant::is_eligible)
        {
            self.record(
                stamp,
                EncounterEventKind::ConfirmationRequested(ConfirmationRequested {
                    participant_id: target,
                }),
            );
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn record(&mut self, stamp: &Stamp, kind: EncounterEventKind) {
        let event = EncounterEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id: stamp.correlation_id,
                causation_id: stamp.correlation_id,
                occurred_at: stamp.occurred_at,
            },
            kind,
        };
        self.mutate(&event.kind);
        self.uncommitted_events.push(event);
    }

    fn resort(&mut self) {
        self.turn_order = ordering::sort(self.participants.values())
            .into_iter()
            .map(|p| p.id)
            .collect();
    }

    fn mutate(&mut self, kind: &EncounterEventKind) {
        match kind {
            EncounterEventKind::EncounterCreated(payload) => {
                self.status = EncounterStatus::Created;
                self.attached_to_view = payload.attached_to_view;
                self.default_formula.clone_from(&payload.default_formula);
            }
            EncounterEventKind::SentinelsRegistered(payload) => {
                for (id, sentinel) in [
                    (payload.setup_id, SentinelKind::Setup),
                    (payload.cleanup_id, SentinelKind::Cleanup),
                ] {
                    self.participants
                        .insert(id, Participant::sentinel(id, sentinel));
                }
                self.sentinels = Some(SentinelRefs {
                    setup: payload.setup_id,
                    cleanup: payload.cleanup_id,
                });
                self.resort();
            }
            EncounterEventKind::ParticipantAdded(payload) => {
                let participant = Participant::from_record(&ParticipantRecord {
                    id: payload.participant_id,
                    name: payload.name.clone(),
                    defeated: payload.defeated,
                    alive: payload.alive,
                    is_npc: payload.is_npc,
                    initiative_formula: payload.initiative_formula.clone(),
                });
                self.participants.insert(payload.participant_id, participant);
                self.resort();
            }
            EncounterEventKind::ParticipantRemoved(payload) => {
                self.participants.remove(&payload.participant_id);
                if self.state.participant() == Some(payload.participant_id) {
                    self.state = TurnState::Idle;
                }
                self.resort();
            }
            EncounterEventKind::ParticipantStatusChanged(payload) => {
                if let Some(p) = self.participants.get_mut(&payload.participant_id) {
                    p.name.clone_from(&payload.name);
                    p.is_npc = payload.is_npc;
                    p.alive = payload.alive;
                    p.flags.defeated = payload.defeated;
                }
                self.resort();
            }
            EncounterEventKind::ActionFlagsSet(payload) => {
                if let Some(p) = self.participants.get_mut(&payload.participant_id) {
                    p.flags.action_ended = payload.action_ended;
                    p.flags.action_delayed = payload.action_delayed;
                }
            }
            EncounterEventKind::RanksRolled(payload) => {
                for assignment in &payload.ranks {
                    if let Some(p) = self.participants.get_mut(&assignment.participant_id) {
                        p.rank = Some(assignment.rank);
                    }
                }
                self.resort();
            }
            EncounterEventKind::EncounterStarted(_) => {
                self.status = EncounterStatus::Running;
            }
            EncounterEventKind::RoundStarted(payload) => {
                self.round = payload.round;
                lifecycle::reset_action_flags(self.participants.values_mut());
            }
            EncounterEventKind::TurnPassed(payload) => {
                self.state = TurnState::Active(payload.participant_id);
            }
            EncounterEventKind::ConfirmationRequested(payload) => {
                self.state = TurnState::AwaitingConfirmation(payload.participant_id);
            }
            EncounterEventKind::ActionDeclared(payload) => {
                if let Some(p) = self.participants.get_mut(&payload.participant_id) {
                    match payload.decision {
                        Decision::EndAction => p.flags.action_ended = true,
                        Decision::DelayAction => p.flags.action_delayed = true,
                    }
                }
                self.state = TurnState::Active(payload.participant_id);
            }
            EncounterEventKind::EncounterEnded(_) => {
                lifecycle::reset_action_flags(self.participants.values_mut());
                self.status = EncounterStatus::Ended;
                self.state = TurnState::Idle;
            }
        }
    }
}

impl AggregateRoot for Encounter {
    type Event = EncounterEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        self.mutate(&event.kind);
        self.version = event.metadata.sequence_number;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    #[allow(clippy::cast_possible_wrap)]
    fn mark_committed(&mut self) {
        self.version += self.uncommitted_events.len() as i64;
        self.uncommitted_events.clear();
    }
}

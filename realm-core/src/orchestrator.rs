//! Turn Orchestrator: the round loop.
//!
//! ```text
//!  Idle ─► AwaitingDecisions ─► ResolvingEvents ─► Broadcasting ─► EvaluatingObjectives ─┐
//!   ▲                                                                                     │
//!   └─────────────────────────────────────────────────────────────────────────────────────┘
//!                                      (Complete when the story ends, Stopped on request)
//! ```
//!
//! Every eligible character decides concurrently against the timeline as it
//! stood when the round began. Speak and act decisions are then ordered by
//! priority (highest first, ties in evaluation order), appended to the
//! timeline and broadcast to every character. After that the narrator may
//! fill a silence and the objective tracker may judge progress.
//!
//! One character failing never stops a round: transport and contract errors
//! are reported in [`RoundReport::failures`], timeouts count as silence.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ordered_float::OrderedFloat;
use tracing::{debug, info, info_span, warn, Instrument};

use realm_llm::{Generator, PromptEngine};

use crate::agent::CharacterAgent;
use crate::character::{Character, CharacterPersona, StateUpdate};
use crate::config::{RealmConfig, RoundConfig};
use crate::decision::Decision;
use crate::error::{RealmError, Result};
use crate::narrator::Narrator;
use crate::objectives::{ObjectiveEvaluation, ObjectiveTracker};
use crate::story::Story;
use crate::summary::{ConversationSummarizer, SummaryContext};
use crate::timeline::{EventKind, Timeline, TimelineEvent};
use crate::types::SessionId;

/// Where the orchestrator is within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Between rounds.
    Idle,
    /// Waiting on character decisions.
    AwaitingDecisions,
    /// Ordering decisions into events.
    ResolvingEvents,
    /// Appending events and updating memories.
    Broadcasting,
    /// Narration and objective evaluation.
    EvaluatingObjectives,
    /// The story is over.
    Complete,
    /// Halted through a [`StopHandle`].
    Stopped,
}

/// Which characters get to decide in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityPolicy {
    /// Skip characters who spoke in the previous round.
    pub exclude_recent_speakers: bool,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            exclude_recent_speakers: true,
        }
    }
}

/// A decision attributed to the character who made it.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterDecision {
    /// Who decided.
    pub character: String,
    /// What they decided.
    pub decision: Decision,
}

/// A character whose decision could not be used this round.
#[derive(Debug)]
pub struct DecisionFailure {
    /// Who.
    pub character: String,
    /// What went wrong.
    pub error: RealmError,
}

impl DecisionFailure {
    /// Whether the model answered but broke the decision contract.
    #[must_use]
    pub fn is_contract(&self) -> bool {
        self.error.is_contract_error()
    }
}

/// What happened in one round.
#[derive(Debug)]
pub struct RoundReport {
    /// 1-based round number.
    pub round: u64,
    /// Characters that decided this round, in evaluation order.
    pub eligible: Vec<String>,
    /// Valid decisions, in evaluation order.
    pub decisions: Vec<CharacterDecision>,
    /// Character events appended this round, in timeline order.
    pub events: Vec<Arc<TimelineEvent>>,
    /// Characters whose decision missed the deadline (treated as silent).
    pub timed_out: Vec<String>,
    /// Characters whose decision failed.
    pub failures: Vec<DecisionFailure>,
    /// Scene description the narrator added, if the round stagnated.
    pub narration: Option<Arc<TimelineEvent>>,
    /// Objective evaluation, when one ran.
    pub objectives: Option<ObjectiveEvaluation>,
    /// Whether the story cursor moved this round.
    pub story_advanced: bool,
    /// Whether the story is complete after this round.
    pub story_complete: bool,
}

impl RoundReport {
    fn new(round: u64) -> Self {
        Self {
            round,
            eligible: Vec::new(),
            decisions: Vec::new(),
            events: Vec::new(),
            timed_out: Vec::new(),
            failures: Vec::new(),
            narration: None,
            objectives: None,
            story_advanced: false,
            story_complete: false,
        }
    }

    /// Whether no character spoke or acted.
    #[must_use]
    pub fn was_silent(&self) -> bool {
        self.events.is_empty()
    }
}

/// Outcome of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// Session this summary belongs to.
    pub session: SessionId,
    /// Rounds played in this run.
    pub rounds: u64,
    /// Timeline length at the end.
    pub events: usize,
    /// Whether every story objective was achieved.
    pub story_complete: bool,
    /// Whether the run was halted through a [`StopHandle`].
    pub stopped: bool,
    /// Story progress at the end, 0 to 100.
    pub progress: f32,
}

/// Cloneable flag that halts [`Orchestrator::run`] before its next round.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request a stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Order speak and act decisions into timeline events: highest priority
/// first, ties in the order given. Silent decisions produce nothing.
#[must_use]
pub fn resolve_decisions(decisions: &[CharacterDecision]) -> Vec<EventKind> {
    let mut acting: Vec<&CharacterDecision> = decisions
        .iter()
        .filter(|d| !d.decision.is_silent())
        .collect();
    acting.sort_by_key(|d| Reverse(OrderedFloat(d.decision.priority)));
    acting
        .into_iter()
        .filter_map(|d| d.decision.to_event(&d.character))
        .collect()
}

/// One character's decision, cut off at `deadline` with `RealmError::Timeout`.
async fn decide_within(
    agent: &CharacterAgent,
    character: &Character,
    story_context: &str,
    deadline: Duration,
) -> Result<Decision> {
    tokio::time::timeout(deadline, agent.decide(character, Some(story_context)))
        .await
        .map_err(|_| RealmError::Timeout {
            character: character.name().to_string(),
            timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        })?
}

/// Drives characters, narrator and objective tracker through rounds.
#[derive(Debug)]
pub struct Orchestrator {
    session: SessionId,
    agent: CharacterAgent,
    narrator: Narrator,
    objectives: ObjectiveTracker,
    summarizer: ConversationSummarizer,
    timeline: Timeline,
    characters: Vec<Character>,
    focal_character: Option<String>,
    policy: EligibilityPolicy,
    settings: RoundConfig,
    round: u64,
    silence_rounds: u32,
    last_speakers: HashSet<String>,
    phase: RoundPhase,
    stop: StopHandle,
}

impl Orchestrator {
    /// Build an orchestrator for `story` with the given prompts.
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generator>,
        prompts: Arc<PromptEngine>,
        story: Story,
        config: &RealmConfig,
    ) -> Self {
        let agent = CharacterAgent::new(Arc::clone(&generator), Arc::clone(&prompts))
            .with_memory_window(config.round.memory_window);
        let narrator = Narrator::new(Arc::clone(&generator), Arc::clone(&prompts), &config.narrator)
            .with_stagnation_threshold(config.round.stagnation_threshold);
        let objectives = ObjectiveTracker::new(
            story,
            Arc::clone(&generator),
            Arc::clone(&prompts),
            config.objectives.sampling,
        );
        let summarizer = ConversationSummarizer::new(generator, prompts, config.summary.sampling);

        let phase = if objectives.is_complete() {
            RoundPhase::Complete
        } else {
            RoundPhase::Idle
        };
        let session = SessionId::new();
        info!(session = %session, title = %objectives.story().title, "Session created");

        Self {
            session,
            agent,
            narrator,
            objectives,
            summarizer,
            timeline: Timeline::new(),
            characters: Vec::new(),
            focal_character: None,
            policy: EligibilityPolicy {
                exclude_recent_speakers: config.round.exclude_recent_speakers,
            },
            settings: config.round.clone(),
            round: 0,
            silence_rounds: 0,
            last_speakers: HashSet::new(),
            phase,
            stop: StopHandle::default(),
        }
    }

    /// Build an orchestrator, loading prompts as `config` describes.
    ///
    /// # Errors
    /// `RealmError::Config` if the prompt directory cannot be loaded.
    pub fn from_config(generator: Arc<dyn Generator>, story: Story, config: &RealmConfig) -> Result<Self> {
        let prompts = Arc::new(config.prompt_engine()?);
        Ok(Self::new(generator, prompts, story, config))
    }

    /// Start with this cast already in the scene (no entry events).
    ///
    /// # Errors
    /// `RealmError::DuplicateCharacter` if two personas share a name.
    pub fn with_characters(mut self, personas: impl IntoIterator<Item = CharacterPersona>) -> Result<Self> {
        for persona in personas {
            if self.character(&persona.name).is_some() {
                return Err(RealmError::DuplicateCharacter(persona.name));
            }
            self.characters.push(Character::new(persona));
        }
        Ok(self)
    }

    /// Name the human-controlled character whose departures the narrator tracks.
    #[must_use]
    pub fn with_focal_character(mut self, name: impl Into<String>) -> Self {
        self.focal_character = Some(name.into());
        self
    }

    /// Seed the narrator's fallback picker.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.narrator = self.narrator.with_seed(seed);
        self
    }

    /// Override the eligibility policy.
    #[must_use]
    pub fn with_policy(mut self, policy: EligibilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Session identifier.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The shared timeline.
    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Characters currently in the scene.
    #[must_use]
    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// The character named `name`.
    #[must_use]
    pub fn character(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name() == name)
    }

    /// The objective tracker.
    #[must_use]
    pub fn objectives(&self) -> &ObjectiveTracker {
        &self.objectives
    }

    /// The narrator.
    #[must_use]
    pub fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    /// Rounds played so far.
    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Consecutive rounds without speech or action.
    #[must_use]
    pub fn silence_rounds(&self) -> u32 {
        self.silence_rounds
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// A handle that stops [`Self::run`].
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The focal character, if one was named.
    #[must_use]
    pub fn focal_character(&self) -> Option<&str> {
        self.focal_character.as_deref()
    }

    // -----------------------------------------------------------------------
    // Scene changes outside the round loop
    // -----------------------------------------------------------------------

    /// Append `kind` and deliver it to every character in the scene.
    fn broadcast(&mut self, kind: EventKind) -> Arc<TimelineEvent> {
        let event = self.timeline.append(kind);
        for character in &mut self.characters {
            character.memory.perceive(Arc::clone(&event));
        }
        event
    }

    fn set_phase(&mut self, phase: RoundPhase) {
        debug!(session = %self.session, phase = ?phase, "Phase");
        self.phase = phase;
    }

    /// The player speaks.
    pub fn submit_player_message(&mut self, speaker: &str, content: &str, action: Option<&str>) -> Arc<TimelineEvent> {
        self.silence_rounds = 0;
        self.broadcast(EventKind::Message {
            speaker: speaker.to_string(),
            content: content.to_string(),
            action_description: action.map(str::to_string).filter(|a| !a.trim().is_empty()),
        })
    }

    /// The player acts without speaking.
    pub fn submit_player_action(&mut self, character: &str, description: &str) -> Arc<TimelineEvent> {
        self.silence_rounds = 0;
        self.broadcast(EventKind::Action {
            character: character.to_string(),
            description: description.to_string(),
        })
    }

    /// Bring a new character into the scene. They perceive their own entry
    /// and everything after it.
    ///
    /// # Errors
    /// `RealmError::DuplicateCharacter` if the name is taken.
    pub fn add_character(&mut self, persona: CharacterPersona, entrance: &str) -> Result<Arc<TimelineEvent>> {
        if self.character(&persona.name).is_some() {
            return Err(RealmError::DuplicateCharacter(persona.name));
        }
        let name = persona.name.clone();
        self.characters.push(Character::new(persona));
        info!(session = %self.session, character = %name, "Character entered");
        Ok(self.broadcast(EventKind::CharacterEntry {
            character: name,
            description: entrance.to_string(),
        }))
    }

    /// Take a character out of the scene.
    ///
    /// # Errors
    /// `RealmError::UnknownCharacter` if nobody has that name.
    pub fn remove_character(&mut self, name: &str, exit: &str) -> Result<(Character, Arc<TimelineEvent>)> {
        let index = self
            .characters
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| RealmError::UnknownCharacter(name.to_string()))?;
        let event = self.broadcast(EventKind::CharacterExit {
            character: name.to_string(),
            description: exit.to_string(),
        });
        self.last_speakers.remove(name);
        info!(session = %self.session, character = %name, "Character left");
        Ok((self.characters.remove(index), event))
    }

    /// Move the scene to `new_location` with a narrated transition.
    pub async fn change_location(&mut self, new_location: &str, context: &str) -> Arc<TimelineEvent> {
        let present: Vec<String> = self.characters.iter().map(|c| c.name().to_string()).collect();
        let description = self
            .narrator
            .generate_location_transition(new_location, context, &present)
            .await;
        info!(session = %self.session, location = %new_location, "Location changed");
        self.broadcast(EventKind::Scene {
            location: new_location.to_string(),
            description,
        })
    }

    /// Summarize the whole timeline.
    ///
    /// # Errors
    /// Generation or parse failures from the summarizer.
    pub async fn summarize_conversation(&self) -> Result<String> {
        let scene = self.narrator.scene();
        let context = SummaryContext {
            title: Some(self.objectives.story().title.clone()),
            scene_description: Some(scene.atmosphere.clone()),
            location: Some(scene.location.clone()),
        };
        self.summarizer.summarize(self.timeline.events(), &context).await
    }

    // -----------------------------------------------------------------------
    // Round loop
    // -----------------------------------------------------------------------

    /// Play rounds until the story completes, `max_rounds` have been played,
    /// or the stop handle fires.
    pub async fn run(&mut self, max_rounds: u64) -> SessionSummary {
        let mut played = 0;
        let mut stopped = false;
        while played < max_rounds && !self.objectives.is_complete() {
            if self.stop.is_stopped() {
                stopped = true;
                self.set_phase(RoundPhase::Stopped);
                break;
            }
            self.run_round().await;
            played += 1;
        }

        let summary = SessionSummary {
            session: self.session,
            rounds: played,
            events: self.timeline.len(),
            story_complete: self.objectives.is_complete(),
            stopped,
            progress: self.objectives.progress_percentage(),
        };
        info!(
            session = %self.session,
            rounds = summary.rounds,
            events = summary.events,
            complete = summary.story_complete,
            stopped,
            "Session finished"
        );
        summary
    }

    /// Play one round.
    pub async fn run_round(&mut self) -> RoundReport {
        let span = info_span!("round", session = %self.session, round = self.round + 1);
        self.play_round().instrument(span).await
    }

    async fn play_round(&mut self) -> RoundReport {
        if self.objectives.is_complete() {
            self.set_phase(RoundPhase::Complete);
            let mut report = RoundReport::new(self.round);
            report.story_complete = true;
            return report;
        }

        self.round += 1;
        let mut report = RoundReport::new(self.round);

        // Decisions
        self.set_phase(RoundPhase::AwaitingDecisions);
        let story_context = self.objectives.story_context();
        let deadline = Duration::from_millis(self.settings.decision_timeout_ms);
        let outcomes = {
            let agent = &self.agent;
            let context = story_context.as_str();
            let excluded = &self.last_speakers;
            let exclude = self.policy.exclude_recent_speakers;
            let pending = self
                .characters
                .iter()
                .filter(|c| !(exclude && excluded.contains(c.name())))
                .map(|c| async move { (c.name().to_string(), decide_within(agent, c, context, deadline).await) });
            join_all(pending).await
        };

        let mut updates: Vec<(String, StateUpdate)> = Vec::new();
        for (name, outcome) in outcomes {
            report.eligible.push(name.clone());
            match outcome {
                Ok(decision) => {
                    let update = if decision.is_silent() {
                        StateUpdate {
                            is_silent: Some(true),
                            ..StateUpdate::default()
                        }
                    } else {
                        StateUpdate {
                            current_action: decision.action_description().map(str::to_string),
                            is_silent: Some(false),
                            ..StateUpdate::default()
                        }
                    };
                    updates.push((name.clone(), update));
                    report.decisions.push(CharacterDecision {
                        character: name,
                        decision,
                    });
                }
                Err(error @ RealmError::Timeout { .. }) => {
                    warn!(character = %name, error = %error, "Decision timed out, treating as silent");
                    updates.push((
                        name.clone(),
                        StateUpdate {
                            is_silent: Some(true),
                            ..StateUpdate::default()
                        },
                    ));
                    report.timed_out.push(name);
                }
                Err(error) => {
                    warn!(character = %name, error = %error, "Decision failed, character skipped this round");
                    report.failures.push(DecisionFailure { character: name, error });
                }
            }
        }

        // Resolution
        self.set_phase(RoundPhase::ResolvingEvents);
        let resolved = resolve_decisions(&report.decisions);

        // Broadcast
        self.set_phase(RoundPhase::Broadcasting);
        for kind in resolved {
            let event = self.broadcast(kind);
            report.events.push(event);
        }
        for (name, update) in updates {
            if let Some(character) = self.characters.iter_mut().find(|c| c.name() == name) {
                update.apply(&mut character.state);
            }
        }
        self.last_speakers = report
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Message { speaker, .. } => Some(speaker.clone()),
                _ => None,
            })
            .collect();

        // Narration and objectives
        self.set_phase(RoundPhase::EvaluatingObjectives);
        if report.was_silent() {
            self.silence_rounds += 1;
        } else {
            self.silence_rounds = 0;
        }

        if self.narrator.detect_stagnation(self.silence_rounds) {
            let focal = self.focal_character.as_deref().unwrap_or_default();
            let transition = self
                .narrator
                .generate_transition(self.timeline.recent(10), self.silence_rounds, focal)
                .await;
            let location = self.narrator.scene().location.clone();
            let event = self.broadcast(EventKind::Scene {
                location,
                description: transition.description,
            });
            report.narration = Some(event);
            self.silence_rounds = 0;
        }

        let interval = u64::from(self.settings.objective_interval.max(1));
        if self.round % interval == 0 {
            self.evaluate_objectives(&mut report).await;
        }

        report.story_complete = self.objectives.is_complete();
        self.set_phase(if report.story_complete {
            RoundPhase::Complete
        } else {
            RoundPhase::Idle
        });
        info!(
            events = report.events.len(),
            failures = report.failures.len(),
            timed_out = report.timed_out.len(),
            silence_rounds = self.silence_rounds,
            "Round complete"
        );
        report
    }

    async fn evaluate_objectives(&mut self, report: &mut RoundReport) {
        let evaluation = {
            let present: Vec<&Character> = self.characters.iter().collect();
            let recent = self.timeline.recent(self.settings.objective_event_window);
            self.objectives.assign_or_evaluate(&present, recent).await
        };

        for (name, update) in evaluation.state_updates() {
            if let Some(character) = self.characters.iter_mut().find(|c| c.name() == name) {
                update.apply(&mut character.state);
            }
        }

        if evaluation.story_objective_complete && !self.objectives.is_complete() {
            report.story_advanced = true;
            self.objectives.advance();
            for character in &mut self.characters {
                StateUpdate::clear_objective().apply(&mut character.state);
            }
        }
        report.objectives = Some(evaluation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_llm::ScriptedGenerator;

    fn speak(name: &str, priority: f32) -> CharacterDecision {
        CharacterDecision {
            character: name.to_string(),
            decision: Decision::parse(
                name,
                &format!(r#"{{"response_type": "speak", "priority": {priority}, "message": "from {name}"}}"#),
            )
            .expect("valid"),
        }
    }

    fn silent(name: &str) -> CharacterDecision {
        CharacterDecision {
            character: name.to_string(),
            decision: Decision::silent("nothing to add"),
        }
    }

    fn orchestrator(generator: Arc<ScriptedGenerator>, names: &[&str]) -> Orchestrator {
        Orchestrator::new(
            generator,
            Arc::new(PromptEngine::builtin()),
            Story::new("T", "D", vec!["find the key".into(), "open the door".into()]),
            &RealmConfig::default(),
        )
        .with_characters(names.iter().map(|n| CharacterPersona::named(*n)))
        .expect("unique cast")
        .with_seed(1)
    }

    #[test]
    fn resolution_orders_by_priority_then_evaluation_order() {
        let decisions = vec![speak("A", 0.5), silent("B"), speak("C", 0.9), speak("D", 0.5)];
        let speakers: Vec<String> = resolve_decisions(&decisions)
            .iter()
            .map(|k| k.origin().to_string())
            .collect();
        assert_eq!(speakers, vec!["C", "A", "D"]);
    }

    #[test]
    fn stop_handle_is_shared() {
        let handle = StopHandle::default();
        let clone = handle.clone();
        clone.stop();
        assert!(handle.is_stopped());
    }

    #[test]
    fn duplicate_cast_is_rejected() {
        let result = Orchestrator::new(
            Arc::new(ScriptedGenerator::new()),
            Arc::new(PromptEngine::builtin()),
            Story::new("T", "D", vec!["x".into()]),
            &RealmConfig::default(),
        )
        .with_characters([CharacterPersona::named("Ron"), CharacterPersona::named("Ron")]);
        assert!(matches!(result, Err(RealmError::DuplicateCharacter(_))));
    }

    #[test]
    fn player_events_reach_every_memory() {
        let mut o = orchestrator(Arc::new(ScriptedGenerator::new()), &["Ron", "Hermione"]);
        o.submit_player_message("Harry", "Anyone seen my wand?", Some("pats his pockets"));
        o.submit_player_action("Harry", "checks under the cushions");
        assert_eq!(o.timeline().len(), 2);
        for c in o.characters() {
            assert_eq!(c.memory.len(), 2);
        }
        assert_eq!(o.timeline().participants(), &["Harry"]);
    }

    #[test]
    fn entries_and_exits() {
        let mut o = orchestrator(Arc::new(ScriptedGenerator::new()), &["Ron"]);
        o.submit_player_message("Harry", "Hi", None);
        o.add_character(CharacterPersona::named("Neville"), "bursts in, out of breath")
            .expect("new name");
        assert_eq!(o.character("Neville").map(|c| c.memory.len()), Some(1));
        assert_eq!(o.character("Ron").map(|c| c.memory.len()), Some(2));
        assert!(o.add_character(CharacterPersona::named("Ron"), "again").is_err());

        let (ron, event) = o.remove_character("Ron", "heads to dinner").expect("present");
        assert_eq!(ron.name(), "Ron");
        assert_eq!(event.kind.label(), "character_exit");
        assert!(o.character("Ron").is_none());
        assert!(matches!(
            o.remove_character("Ron", "again"),
            Err(RealmError::UnknownCharacter(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_decision_becomes_a_timeout_error() {
        let generator = Arc::new(ScriptedGenerator::new().on_stall("You are Ron.", Duration::from_secs(60)));
        let agent = CharacterAgent::new(generator, Arc::new(PromptEngine::builtin()));
        let ron = Character::new(CharacterPersona::named("Ron"));

        let err = decide_within(&agent, &ron, "STORY: T", Duration::from_millis(250))
            .await
            .expect_err("stalled");
        assert!(matches!(
            err,
            RealmError::Timeout { ref character, timeout_ms: 250 } if character == "Ron"
        ));
        assert!(!err.is_contract_error());
    }

    #[tokio::test]
    async fn complete_story_stops_the_loop() {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut o = Orchestrator::new(
            Arc::clone(&generator) as Arc<dyn Generator>,
            Arc::new(PromptEngine::builtin()),
            Story::new("T", "D", Vec::new()),
            &RealmConfig::default(),
        );
        assert_eq!(o.phase(), RoundPhase::Complete);
        let summary = o.run(5).await;
        assert_eq!(summary.rounds, 0);
        assert!(summary.story_complete);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_handle_halts_run() {
        let mut o = orchestrator(Arc::new(ScriptedGenerator::new()), &["Ron"]);
        o.stop_handle().stop();
        let summary = o.run(10).await;
        assert!(summary.stopped);
        assert_eq!(summary.rounds, 0);
        assert_eq!(o.phase(), RoundPhase::Stopped);
    }
}

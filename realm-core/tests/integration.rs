//! Integration Tests: End-to-End Round Flows
//!
//! Whole rounds driven against a `ScriptedGenerator`: decision ordering,
//! broadcasting, failure isolation, narration during silences and the story
//! cursor moving through its objectives.

use std::sync::Arc;
use std::time::Duration;

use realm_core::config::RealmConfig;
use realm_core::narrator::FALLBACK_DESCRIPTIONS;
use realm_core::{
    CharacterPersona, EventKind, ObjectiveStatus, Orchestrator, RoundPhase, Story, TimelineEvent,
};
use realm_llm::{PromptEngine, ScriptedGenerator};

fn speak(message: &str, priority: f32) -> String {
    format!(r#"{{"response_type": "speak", "priority": {priority}, "reasoning": "r", "message": "{message}"}}"#)
}

fn act(action: &str, priority: f32) -> String {
    format!(r#"{{"response_type": "act", "priority": {priority}, "action_description": "{action}"}}"#)
}

const SILENT: &str = r#"{"response_type": "silent", "priority": 0.0, "reasoning": "nothing to add"}"#;

const ASSIGN: &str = r#"{"character_updates": {
    "Ron": {"objective": "check the desk drawers", "status": "assigned"},
    "Hermione": {"objective": "read the door's runes", "status": "assigned"}
}, "story_objective_complete": false, "reasoning": "just started"}"#;

const EVALUATE_DONE: &str = r#"{"character_updates": {}, "story_objective_complete": true, "reasoning": "done"}"#;

fn locked_room() -> Story {
    Story::new(
        "The Locked Room",
        "Two friends are trapped in an abandoned classroom.",
        vec!["find the key".into(), "open the door".into()],
    )
}

fn build(generator: &Arc<ScriptedGenerator>, config: &RealmConfig, cast: &[&str]) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(generator) as Arc<dyn realm_llm::Generator>,
        Arc::new(PromptEngine::builtin()),
        locked_room(),
        config,
    )
    .with_characters(cast.iter().map(|n| CharacterPersona::named(*n)))
    .expect("unique cast")
    .with_focal_character("Harry")
    .with_seed(42)
}

fn positions(events: &[Arc<TimelineEvent>]) -> Vec<u64> {
    events.iter().map(|e| e.position).collect()
}

// ---------------------------------------------------------------------------
// Resolution and broadcasting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simultaneous_speakers_are_ordered_by_priority() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", speak("Let's try the drawers.", 0.6))
            .on("You are Hermione.", speak("Look at these runes!", 0.9))
            .on("You are Neville.", SILENT)
            .on("assigning objectives", ASSIGN),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron", "Hermione", "Neville"]);
    o.submit_player_message("Harry", "We're locked in.", None);

    let report = o.run_round().await;

    let speakers: Vec<&str> = report.events.iter().map(|e| e.kind.origin()).collect();
    assert_eq!(speakers, vec!["Hermione", "Ron"]);
    assert_eq!(positions(&report.events), vec![1, 2]);
    assert!(report.failures.is_empty());
    assert!(report.narration.is_none());
    assert_eq!(o.silence_rounds(), 0);
    assert_eq!(o.phase(), RoundPhase::Idle);

    // Everyone present since the start perceived exactly the timeline.
    let timeline = positions(o.timeline().events());
    for c in o.characters() {
        assert_eq!(positions(c.memory.events()), timeline, "{}", c.name());
    }

    let neville = o.character("Neville").expect("neville");
    assert!(neville.state.is_silent);
    let ron = o.character("Ron").expect("ron");
    assert!(!ron.state.is_silent);
    assert_eq!(ron.state.current_objective.as_deref(), Some("check the desk drawers"));
}

#[tokio::test]
async fn decisions_see_the_timeline_as_of_round_start() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", speak("Oi!", 0.9))
            .on("You are Hermione.", speak("Honestly.", 0.1))
            .otherwise(EVALUATE_DONE),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron", "Hermione"]);
    o.run_round().await;

    let hermione_prompt = generator
        .calls()
        .into_iter()
        .find(|c| c.prompt.contains("You are Hermione."))
        .expect("hermione was asked");
    assert!(!hermione_prompt.prompt.contains("Oi!"));
}

#[tokio::test]
async fn recent_speakers_sit_out_one_round() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", speak("Blimey.", 0.5))
            .on("You are Hermione.", act("taps the lock with her wand", 0.5))
            .on("assigning objectives", ASSIGN),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron", "Hermione"]);

    let first = o.run_round().await;
    assert_eq!(first.eligible, vec!["Ron", "Hermione"]);
    let second = o.run_round().await;
    assert_eq!(second.eligible, vec!["Hermione"]);
    let third = o.run_round().await;
    assert_eq!(third.eligible, vec!["Ron", "Hermione"]);
    assert_eq!(generator.calls_matching("You are Ron."), 2);
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_response_does_not_block_the_round() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", "Ron thinks about it and says hi")
            .on("You are Hermione.", speak("Alohomora!", 0.8))
            .on_error("You are Neville.", "connection reset")
            .on("assigning objectives", ASSIGN),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron", "Hermione", "Neville"]);
    let report = o.run_round().await;

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.failures.len(), 2);
    let ron = report.failures.iter().find(|f| f.character == "Ron").expect("ron failed");
    assert!(ron.is_contract());
    let neville = report.failures.iter().find(|f| f.character == "Neville").expect("neville failed");
    assert!(!neville.is_contract());

    for c in o.characters() {
        assert_eq!(c.memory.len(), 1, "{} missed the broadcast", c.name());
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_decision_counts_as_silence() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on_stall("You are Ron.", Duration::from_secs(60))
            .on("You are Hermione.", speak("Where's Ron?", 0.4))
            .on("assigning objectives", ASSIGN),
    );
    let mut config = RealmConfig::default();
    config.round.decision_timeout_ms = 1_000;
    let mut o = build(&generator, &config, &["Ron", "Hermione"]);

    let report = o.run_round().await;
    assert_eq!(report.timed_out, vec!["Ron"]);
    assert!(report.failures.is_empty());
    assert_eq!(report.events.len(), 1);
    assert!(o.character("Ron").expect("ron").state.is_silent);
}

// ---------------------------------------------------------------------------
// Narration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_round_brings_in_the_narrator() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", SILENT)
            .on("environmental description", r#"{"description": "Dust drifts through a shaft of moonlight."}"#)
            .on("assigning objectives", ASSIGN),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron"]);
    let report = o.run_round().await;

    assert!(report.was_silent());
    let scene = report.narration.expect("narrator stepped in");
    assert!(matches!(scene.kind, EventKind::Scene { .. }));
    assert_eq!(scene.kind.content(), "Dust drifts through a shaft of moonlight.");
    assert_eq!(o.silence_rounds(), 0);
    assert_eq!(o.character("Ron").expect("ron").memory.len(), 1);
}

#[tokio::test]
async fn departing_focal_character_changes_tone_and_history_is_respected() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", SILENT)
            .on("environmental description", r#"{"description": "The fire burns low."}"#)
            .on("assigning objectives", ASSIGN),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron"]);

    let first = o.run_round().await.narration.expect("first narration");
    assert_eq!(first.kind.content(), "The fire burns low.");

    o.submit_player_message("Harry", "Night, Ron.", Some("yawns and heads upstairs to bed"));
    let second = o.run_round().await.narration.expect("second narration");

    let last_prompt = generator
        .calls()
        .into_iter()
        .filter(|c| c.prompt.contains("environmental description"))
        .last()
        .expect("narrator prompt");
    assert!(last_prompt.prompt.contains("Harry is away/resting"));
    assert_ne!(second.kind.content(), first.kind.content());
    assert!(FALLBACK_DESCRIPTIONS.contains(&second.kind.content()));
    assert!(o.narrator().history().any(|h| h == second.kind.content()));
}

#[tokio::test]
async fn narrator_failure_falls_back() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", SILENT)
            .on_error("environmental description", "offline")
            .on("assigning objectives", ASSIGN),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron"]);
    let scene = o.run_round().await.narration.expect("fallback narration");
    assert!(FALLBACK_DESCRIPTIONS.contains(&scene.kind.content()));
}

// ---------------------------------------------------------------------------
// Objectives and the story cursor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn story_runs_to_completion() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", act("rummages through a drawer", 0.5))
            .on("You are Hermione.", speak("Got it!", 0.7))
            .on("assigning objectives", ASSIGN)
            .on("evaluating story progression", EVALUATE_DONE),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron", "Hermione"]);

    let r1 = o.run_round().await;
    let eval = r1.objectives.as_ref().expect("evaluated");
    assert!(eval.updates.iter().all(|u| u.status == ObjectiveStatus::Assigned));
    assert!(!r1.story_advanced);
    assert_eq!(o.objectives().get_current_objective(), Some("find the key"));

    let r2 = o.run_round().await;
    assert!(r2.story_advanced);
    assert_eq!(o.objectives().get_current_objective(), Some("open the door"));
    assert!(o.characters().iter().all(|c| c.state.current_objective.is_none()));

    let summary = o.run(10).await;
    assert!(summary.story_complete);
    assert_eq!(summary.rounds, 2);
    assert!(!summary.stopped);
    assert!((summary.progress - 100.0).abs() < f32::EPSILON);
    assert_eq!(o.round(), 4);
    assert_eq!(o.phase(), RoundPhase::Complete);
    assert!(o.objectives().is_complete());
}

#[tokio::test]
async fn objective_interval_skips_rounds() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", act("paces", 0.5))
            .on("assigning objectives", ASSIGN),
    );
    let mut config = RealmConfig::default();
    config.round.objective_interval = 3;
    let mut o = build(&generator, &config, &["Ron"]);

    for _ in 0..3 {
        o.run_round().await;
    }
    assert_eq!(generator.calls_matching("assigning objectives"), 1);
}

#[tokio::test]
async fn objective_failure_never_advances() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", act("paces", 0.5))
            .on_error("assigning objectives", "offline"),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron"]);
    let report = o.run_round().await;

    assert!(!report.story_advanced);
    assert_eq!(
        o.character("Ron").expect("ron").state.current_objective.as_deref(),
        Some("help achieve: find the key")
    );
}

// ---------------------------------------------------------------------------
// Scene changes and summaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn location_change_and_summary() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("To: the Great Hall", r#"{"transition": "They spill out into the Great Hall."}"#)
            .on("summarizing", r#"{"summary": "They escaped and went to dinner."}"#),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron", "Hermione"]);

    let scene = o.change_location("the Great Hall", "the door finally opens").await;
    assert_eq!(
        scene.kind,
        EventKind::Scene {
            location: "the Great Hall".into(),
            description: "They spill out into the Great Hall.".into(),
        }
    );
    assert_eq!(o.narrator().scene().location, "the Great Hall");

    let summary = o.summarize_conversation().await.expect("summary");
    assert_eq!(summary, "They escaped and went to dinner.");
    let prompt = generator
        .calls()
        .into_iter()
        .find(|c| c.prompt.contains("summarizing"))
        .expect("summary prompt");
    assert!(prompt.prompt.contains("Location: the Great Hall"));
}

#[tokio::test]
async fn late_entrant_perceives_from_entry_onward() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .on("You are Ron.", speak("Who's there?", 0.5))
            .on("You are Luna.", SILENT)
            .on("assigning objectives", ASSIGN),
    );
    let mut o = build(&generator, &RealmConfig::default(), &["Ron"]);
    o.run_round().await;

    o.add_character(CharacterPersona::named("Luna"), "drifts in humming")
        .expect("new name");
    let report = o.run_round().await;

    assert!(report.eligible.contains(&"Luna".to_string()));
    let luna = o.character("Luna").expect("luna");
    let first = luna.memory.events().first().expect("perceived entry");
    assert_eq!(first.kind.label(), "character_entry");
    let timeline_tail = positions(o.timeline().since(first.position));
    assert_eq!(positions(luna.memory.events()), timeline_tail);
    assert_eq!(
        o.character("Luna").and_then(|c| c.state.current_objective.clone()),
        Some("help achieve: find the key".to_string())
    );
}

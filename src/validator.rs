//! Scenario validation, per-step progress tracking, and the hint gate.
//!
//! The validator is pure given its inputs: an executed command, its
//! (post-filter) output, the step's earlier commands, and the scenario's
//! isolated cluster copy. It returns a 0-100 progress score reflecting the
//! fraction of rules satisfied, not merely pass/fail.

use crate::cluster::ClusterState;
use crate::command::{CommandResult, EXIT_NOT_FOUND};
use crate::context::ClusterWorld;
use crate::scenario::{Hint, Scenario, Step, ValidationRule};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Delay between a passing validation and automatic step advancement, so
/// the learner can read the feedback before the step changes under them.
pub const AUTO_ADVANCE_DELAY: Duration = Duration::from_millis(1500);

/// Seconds of wall-clock time on a step that unlock one hint.
const HINT_TIME_UNLOCK_SECS: i64 = 60;

/// Outcome of evaluating a step's rule set against one executed command.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub passed: bool,
    /// 0-100: fraction of the step's rules satisfied.
    pub progress: u8,
    pub feedback: Option<String>,
}

/// Everything a rule may inspect.
pub struct RuleInput<'a> {
    pub command: &'a str,
    pub output: &'a str,
    pub prior_commands: &'a [String],
    pub cluster: &'a ClusterState,
}

fn rule_satisfied(rule: &ValidationRule, input: &RuleInput<'_>) -> bool {
    match rule {
        ValidationRule::CommandMatches { pattern } => match_regex(pattern, input.command),
        ValidationRule::CommandContains { needle } => input.command.contains(needle),
        ValidationRule::OutputContains { needle } => input.output.contains(needle),
        ValidationRule::OutputMatches { pattern } => match_regex(pattern, input.output),
        ValidationRule::PriorCommandContains { needle } => {
            input.prior_commands.iter().any(|c| c.contains(needle))
        }
        ValidationRule::NodeHealthIs { node, health } => input
            .cluster
            .node(node)
            .is_some_and(|n| n.health == *health),
        ValidationRule::SlurmStateIs { node, state } => input
            .cluster
            .node(node)
            .is_some_and(|n| n.slurm_state == *state),
        ValidationRule::MigModeIs { node, gpu, enabled } => input
            .cluster
            .gpu(node, *gpu)
            .is_some_and(|g| g.mig_enabled == *enabled),
        ValidationRule::XidLogged { node, code } => input.cluster.node(node).is_some_and(|n| {
            n.gpus
                .iter()
                .any(|g| g.xid_events.iter().any(|x| x.code == *code))
        }),
    }
}

fn match_regex(pattern: &str, text: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            // A broken authored pattern must not wedge the step.
            warn!(pattern, error = %e, "invalid rule pattern treated as unsatisfied");
            false
        }
    }
}

/// Evaluate a rule set; returns (satisfied, total).
fn evaluate(rules: &[ValidationRule], input: &RuleInput<'_>) -> (u32, u32) {
    let total = rules.len() as u32;
    let satisfied = rules.iter().filter(|r| rule_satisfied(r, input)).count() as u32;
    (satisfied, total)
}

fn result_from(satisfied: u32, total: u32, step: &Step) -> ValidationResult {
    let passed = satisfied == total;
    let progress = if total == 0 {
        100
    } else {
        (satisfied * 100 / total) as u8
    };
    let feedback = if passed {
        Some(format!("step '{}' complete", step.id))
    } else {
        Some(format!(
            "{satisfied}/{total} checks passed; keep going"
        ))
    };
    ValidationResult {
        passed,
        progress,
        feedback,
    }
}

/// Mutable per-step progress record.
#[derive(Debug, Clone)]
pub struct StepProgress {
    pub commands_executed: Vec<String>,
    pub hints_revealed: u32,
    pub revealed_hint_ids: Vec<String>,
    pub validations_passed: u32,
    pub validations_total: u32,
    pub failed_attempts: u32,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Latest validation result for this step, if any command reached it.
    pub last_result: Option<ValidationResult>,
}

impl StepProgress {
    fn new() -> Self {
        Self {
            commands_executed: Vec::new(),
            hints_revealed: 0,
            revealed_hint_ids: Vec::new(),
            validations_passed: 0,
            validations_total: 0,
            failed_attempts: 0,
            completed: false,
            started_at: Utc::now(),
            completed_at: None,
            last_result: None,
        }
    }

    /// Latest progress score, 0 for an untouched step.
    pub fn progress_pct(&self) -> u8 {
        if self.completed {
            return 100;
        }
        self.last_result.as_ref().map_or(0, |r| r.progress)
    }
}

/// Per-scenario progress: step records plus the monotonic step cursor.
#[derive(Debug, Clone)]
pub struct ScenarioProgress {
    current_step_index: usize,
    pub validation_failures: u32,
    pub steps: Vec<StepProgress>,
}

impl ScenarioProgress {
    fn new(step_count: usize) -> Self {
        Self {
            current_step_index: 0,
            validation_failures: 0,
            steps: (0..step_count).map(|_| StepProgress::new()).collect(),
        }
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    /// Mark `index` completed and advance the cursor past it.
    ///
    /// Idempotent: re-completing a completed step is a no-op. The cursor
    /// only ever moves forward and stays within `[0, steps.len() - 1]`.
    fn complete_step(&mut self, index: usize) {
        let Some(step) = self.steps.get_mut(index) else {
            return;
        };
        if step.completed {
            return;
        }
        step.completed = true;
        step.completed_at = Some(Utc::now());
        if index == self.current_step_index && index + 1 < self.steps.len() {
            self.current_step_index = index + 1;
            self.steps[index + 1].started_at = Utc::now();
        }
    }

    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }
}

/// What the hint gate decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum HintOutcome {
    /// A new hint to show the learner.
    Reveal(Hint),
    /// Nothing unlocked yet; the reason is user-facing.
    Locked { reason: String },
    /// Every hint for this step has been revealed.
    Exhausted,
}

/// Decides how many hints a step has unlocked from attempts and time.
#[derive(Debug, Clone)]
pub struct HintManager {
    time_unlock_secs: i64,
}

impl Default for HintManager {
    fn default() -> Self {
        Self {
            time_unlock_secs: HINT_TIME_UNLOCK_SECS,
        }
    }
}

impl HintManager {
    /// Hints unlocked for a step: one per failed attempt or per elapsed
    /// time unit, whichever is more generous, capped at the hint count.
    pub fn unlocked(&self, failed_attempts: u32, elapsed_secs: i64, total_hints: usize) -> usize {
        let by_attempts = failed_attempts as usize;
        let by_time = (elapsed_secs.max(0) / self.time_unlock_secs) as usize;
        by_attempts.max(by_time).min(total_hints)
    }

    /// Next hint for the step, or why none is available yet.
    pub fn available(&self, step: &Step, progress: &StepProgress, now: DateTime<Utc>) -> HintOutcome {
        if step.hints.is_empty() {
            return HintOutcome::Locked {
                reason: "this step has no hints".to_string(),
            };
        }
        let revealed = step
            .hints
            .iter()
            .filter(|h| progress.revealed_hint_ids.contains(&h.id))
            .count();
        if revealed >= step.hints.len() {
            return HintOutcome::Exhausted;
        }
        let elapsed = now.signed_duration_since(progress.started_at).num_seconds();
        let unlocked = self.unlocked(progress.failed_attempts, elapsed, step.hints.len());
        if revealed < unlocked {
            let next = step
                .hints
                .iter()
                .find(|h| !progress.revealed_hint_ids.contains(&h.id))
                .cloned();
            match next {
                Some(hint) => HintOutcome::Reveal(hint),
                None => HintOutcome::Exhausted,
            }
        } else {
            let wait = self.time_unlock_secs - (elapsed % self.time_unlock_secs);
            HintOutcome::Locked {
                reason: format!(
                    "no hint unlocked yet: attempt the step at least once more, or wait {wait}s"
                ),
            }
        }
    }
}

#[derive(Debug)]
struct PendingAdvance {
    scenario_id: String,
    step_index: usize,
    due: Instant,
}

/// Drives scenario lifecycle: consumes executed commands, evaluates rules,
/// tracks progress, gates hints, and applies deferred auto-advancement.
#[derive(Default)]
pub struct ScenarioEngine {
    active: Option<Scenario>,
    progress: HashMap<String, ScenarioProgress>,
    pending: Option<PendingAdvance>,
    hints: HintManager,
}

impl ScenarioEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Meta commands are never tracked as step attempts.
    pub fn is_meta(name: &str) -> bool {
        matches!(name, "hint" | "clear" | "help")
    }

    pub fn active(&self) -> Option<&Scenario> {
        self.active.as_ref()
    }

    pub fn progress_for(&self, scenario_id: &str) -> Option<&ScenarioProgress> {
        self.progress.get(scenario_id)
    }

    /// Start a scenario: create and activate its isolated context and a
    /// fresh progress record.
    pub fn start(&mut self, scenario: Scenario, world: &mut ClusterWorld) -> String {
        let base = world.store.snapshot();
        world.contexts.create_context(&scenario.id, &base);
        world.contexts.set_active(&scenario.id);
        self.progress
            .insert(scenario.id.clone(), ScenarioProgress::new(scenario.steps.len()));
        self.pending = None;
        info!(scenario = %scenario.id, "scenario started");
        let intro = format!(
            "Scenario: {}\n{}\n\nStep 1/{}: {}\n",
            scenario.title,
            scenario.description,
            scenario.steps.len(),
            scenario
                .steps
                .first()
                .map(|s| s.instruction.as_str())
                .unwrap_or("(no steps)")
        );
        self.active = Some(scenario);
        intro
    }

    /// Leave the active scenario, evicting its context. Progress is kept so
    /// a restarted scenario can be compared against, but the isolated state
    /// is gone.
    pub fn exit(&mut self, world: &mut ClusterWorld) -> String {
        match self.active.take() {
            Some(scenario) => {
                world.contexts.delete_context(&scenario.id);
                self.pending = None;
                info!(scenario = %scenario.id, "scenario exited");
                format!("Left scenario '{}'. Cluster view is global state again.\n", scenario.id)
            }
            None => "No active scenario.\n".to_string(),
        }
    }

    /// Merge the active scenario's mutation log into the global store.
    pub fn merge(&self, world: &mut ClusterWorld) -> String {
        let Some(scenario) = &self.active else {
            return "No active scenario.\n".to_string();
        };
        let Some(ctx) = world.contexts.get(&scenario.id).cloned() else {
            return "No context for the active scenario.\n".to_string();
        };
        let n = ctx.mutations().len();
        ctx.apply_to_global(&mut world.store);
        format!("Replayed {n} change(s) into global state.\n")
    }

    /// Feed one executed command into validation.
    ///
    /// Appends the command to the current step's executed list, then
    /// evaluates the rule set when the command was recognized. The caller
    /// decides what counts as meta for the current shell mode ([`is_meta`]
    /// in bash, nothing inside a tool) and passes that in; meta commands
    /// are excluded entirely. Returns the validation result, if one was
    /// produced.
    ///
    /// [`is_meta`]: Self::is_meta
    pub fn observe(
        &mut self,
        raw: &str,
        meta: bool,
        result: &CommandResult,
        world: &ClusterWorld,
    ) -> Option<ValidationResult> {
        let scenario = self.active.as_ref()?;
        let progress = self.progress.get_mut(&scenario.id)?;
        let index = progress.current_step_index;
        let step = scenario.steps.get(index)?;
        if progress.steps[index].completed {
            return None;
        }
        if meta {
            return None;
        }

        progress.steps[index]
            .commands_executed
            .push(raw.to_string());
        if result.exit_code == EXIT_NOT_FOUND {
            return None;
        }

        let cluster = world.cluster();
        let prior = &progress.steps[index].commands_executed
            [..progress.steps[index].commands_executed.len() - 1];
        let input = RuleInput {
            command: raw,
            output: &result.output,
            prior_commands: prior,
            cluster,
        };
        let (satisfied, total) = evaluate(&step.rules, &input);
        let validation = result_from(satisfied, total, step);

        let sp = &mut progress.steps[index];
        sp.validations_passed = satisfied;
        sp.validations_total = total;
        sp.last_result = Some(validation.clone());
        if validation.passed {
            if scenario.auto_advance {
                self.pending = Some(PendingAdvance {
                    scenario_id: scenario.id.clone(),
                    step_index: index,
                    due: Instant::now() + AUTO_ADVANCE_DELAY,
                });
            } else {
                // The delay only exists to let feedback sit on screen
                // before the step changes; without auto-advance there is
                // nothing to defer, so complete right away.
                progress.complete_step(index);
            }
        } else {
            sp.failed_attempts += 1;
            progress.validation_failures += 1;
        }
        Some(validation)
    }

    /// Apply a due auto-advance, if any. Harmless to call at any time;
    /// completion is idempotent and the timer is never cancelled.
    pub fn poll_auto_advance(&mut self, now: Instant) {
        if self.pending.as_ref().is_none_or(|p| now < p.due) {
            return;
        }
        if let Some(pending) = self.pending.take() {
            if let Some(progress) = self.progress.get_mut(&pending.scenario_id) {
                progress.complete_step(pending.step_index);
                info!(
                    scenario = %pending.scenario_id,
                    step = pending.step_index,
                    "auto-advanced to next step"
                );
            }
        }
    }

    /// The `hint` builtin: reveal the next unlocked hint or explain why
    /// none is available. Revealing is idempotent per hint id.
    pub fn request_hint(&mut self) -> String {
        let Some(scenario) = &self.active else {
            return "No active scenario; start one with 'lab start <id>'.\n".to_string();
        };
        let Some(progress) = self.progress.get_mut(&scenario.id) else {
            return "No progress for the active scenario.\n".to_string();
        };
        let index = progress.current_step_index;
        let Some(step) = scenario.steps.get(index) else {
            return "No current step.\n".to_string();
        };
        match self.hints.available(step, &progress.steps[index], Utc::now()) {
            HintOutcome::Reveal(hint) => {
                let sp = &mut progress.steps[index];
                if !sp.revealed_hint_ids.contains(&hint.id) {
                    sp.revealed_hint_ids.push(hint.id.clone());
                    sp.hints_revealed += 1;
                }
                format!("Hint: {}\n", hint.text)
            }
            HintOutcome::Locked { reason } => format!("{reason}\n"),
            HintOutcome::Exhausted => "All hints for this step have been revealed.\n".to_string(),
        }
    }

    /// The `lab status` text: step cursor, progress, and failure counts.
    pub fn status(&self) -> String {
        let Some(scenario) = &self.active else {
            return "No active scenario.\n".to_string();
        };
        let Some(progress) = self.progress.get(&scenario.id) else {
            return "No progress recorded.\n".to_string();
        };
        let mut out = format!("Scenario: {} ({})\n", scenario.title, scenario.id);
        for (i, step) in scenario.steps.iter().enumerate() {
            let sp = &progress.steps[i];
            let marker = if sp.completed {
                "done"
            } else if i == progress.current_step_index {
                "current"
            } else {
                "pending"
            };
            out.push_str(&format!(
                "  step {}/{} [{marker}] {}: {}% ({} attempt(s) failed)\n",
                i + 1,
                scenario.steps.len(),
                step.id,
                sp.progress_pct(),
                sp.failed_attempts,
            ));
        }
        out.push_str(&format!(
            "Validation failures so far: {}\n",
            progress.validation_failures
        ));
        if progress.all_completed() {
            out.push_str("Scenario complete.\n");
        }
        out
    }

    /// Instruction to surface after a passing validation: the upcoming
    /// step while a deferred advance is pending, otherwise whatever step
    /// the cursor sits on now.
    pub fn post_pass_instruction(&self) -> Option<String> {
        if self.pending.is_some() {
            self.upcoming_instruction()
        } else {
            self.current_instruction()
        }
    }

    /// Instruction for the step after the current one. Shown when a step
    /// passes, since the cursor itself only moves once the deferred
    /// advance fires.
    pub fn upcoming_instruction(&self) -> Option<String> {
        let scenario = self.active.as_ref()?;
        let progress = self.progress.get(&scenario.id)?;
        let index = progress.current_step_index + 1;
        let step = scenario.steps.get(index)?;
        Some(format!(
            "Step {}/{}: {}",
            index + 1,
            scenario.steps.len(),
            step.instruction
        ))
    }

    /// Instruction text for the current step, shown after advancing.
    pub fn current_instruction(&self) -> Option<String> {
        let scenario = self.active.as_ref()?;
        let progress = self.progress.get(&scenario.id)?;
        let index = progress.current_step_index;
        let step = scenario.steps.get(index)?;
        if progress.steps[index].completed {
            return None;
        }
        Some(format!(
            "Step {}/{}: {}",
            index + 1,
            scenario.steps.len(),
            step.instruction
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterState, ClusterStore, SlurmState};
    use crate::scenario::{Hint, Scenario, Step, ValidationRule};
    use chrono::Duration as ChronoDuration;

    fn scenario() -> Scenario {
        Scenario {
            id: "lab1".into(),
            title: "Drain a node".into(),
            description: "Inspect and drain.".into(),
            auto_advance: true,
            steps: vec![
                Step {
                    id: "inspect".into(),
                    instruction: "Check GPU temperatures.".into(),
                    rules: vec![
                        ValidationRule::CommandContains {
                            needle: "nvidia-smi".into(),
                        },
                        ValidationRule::OutputContains {
                            needle: "H100".into(),
                        },
                    ],
                    hints: vec![
                        Hint {
                            id: "h1".into(),
                            text: "Try nvidia-smi.".into(),
                        },
                        Hint {
                            id: "h2".into(),
                            text: "Temperatures are in the main table.".into(),
                        },
                    ],
                },
                Step {
                    id: "drain".into(),
                    instruction: "Drain node1.".into(),
                    rules: vec![ValidationRule::SlurmStateIs {
                        node: "node1".into(),
                        state: SlurmState::Drain,
                    }],
                    hints: vec![],
                },
            ],
        }
    }

    fn world() -> ClusterWorld {
        ClusterWorld::new(ClusterStore::new(ClusterState::demo()))
    }

    #[test]
    fn fully_satisfied_rules_give_progress_100() {
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(scenario(), &mut w);

        let result = CommandResult::success("GPU 0: NVIDIA H100 80GB HBM3");
        let v = engine
            .observe("nvidia-smi", false, &result, &w)
            .unwrap();
        assert!(v.passed);
        assert_eq!(v.progress, 100);
    }

    #[test]
    fn partial_satisfaction_scores_fraction() {
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(scenario(), &mut w);

        let result = CommandResult::success("no gpus here");
        let v = engine
            .observe("nvidia-smi", false, &result, &w)
            .unwrap();
        assert!(!v.passed);
        assert_eq!(v.progress, 50);

        let p = engine.progress_for("lab1").unwrap();
        assert_eq!(p.steps[0].failed_attempts, 1);
        assert_eq!(p.validation_failures, 1);
    }

    #[test]
    fn untouched_step_has_progress_zero() {
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(scenario(), &mut w);
        let p = engine.progress_for("lab1").unwrap();
        assert_eq!(p.steps[0].progress_pct(), 0);
        assert_eq!(p.steps[1].progress_pct(), 0);
    }

    #[test]
    fn meta_and_unrecognized_commands_are_not_attempts() {
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(scenario(), &mut w);

        assert!(engine
            .observe("hint", true, &CommandResult::success("..."), &w)
            .is_none());
        let p = engine.progress_for("lab1").unwrap();
        assert!(p.steps[0].commands_executed.is_empty());

        let nf = CommandResult::failure("not found", EXIT_NOT_FOUND);
        assert!(engine.observe("fooobar", false, &nf, &w).is_none());
        let p = engine.progress_for("lab1").unwrap();
        // Tracked in the transcript of the step, but not validated.
        assert_eq!(p.steps[0].commands_executed, vec!["fooobar".to_string()]);
        assert_eq!(p.validation_failures, 0);
    }

    #[test]
    fn auto_advance_fires_after_delay_and_is_idempotent() {
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(scenario(), &mut w);

        let result = CommandResult::success("NVIDIA H100 80GB HBM3");
        engine.observe("nvidia-smi", false, &result, &w);
        assert!(engine.upcoming_instruction().unwrap().contains("Drain"));

        // Not yet due.
        engine.poll_auto_advance(Instant::now());
        assert_eq!(engine.progress_for("lab1").unwrap().current_step_index(), 0);

        // Past the delay.
        engine.poll_auto_advance(Instant::now() + AUTO_ADVANCE_DELAY + Duration::from_millis(1));
        let p = engine.progress_for("lab1").unwrap();
        assert!(p.steps[0].completed);
        assert_eq!(p.current_step_index(), 1);

        // Re-polling and re-completing is harmless.
        engine.poll_auto_advance(Instant::now() + AUTO_ADVANCE_DELAY);
        let p = engine.progress_for("lab1").unwrap();
        assert_eq!(p.current_step_index(), 1);
    }

    #[test]
    fn manual_scenarios_complete_steps_without_the_timer() {
        let mut s = scenario();
        s.auto_advance = false;
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(s, &mut w);

        let v = engine
            .observe("nvidia-smi", false, &CommandResult::success("H100"), &w)
            .unwrap();
        assert!(v.passed);

        // No deferred timer: the step is done and the cursor has moved.
        let p = engine.progress_for("lab1").unwrap();
        assert!(p.steps[0].completed);
        assert_eq!(p.current_step_index(), 1);
        assert_eq!(
            engine.post_pass_instruction().unwrap(),
            "Step 2/2: Drain node1."
        );
    }

    #[test]
    fn step_cursor_is_monotonic_and_bounded() {
        let mut p = ScenarioProgress::new(2);
        p.complete_step(0);
        assert_eq!(p.current_step_index(), 1);
        p.complete_step(0);
        assert_eq!(p.current_step_index(), 1);
        p.complete_step(1);
        // Bounded at the last step even when everything is done.
        assert_eq!(p.current_step_index(), 1);
        assert!(p.all_completed());
    }

    #[test]
    fn state_rule_sees_the_isolated_copy() {
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(scenario(), &mut w);

        // Pass step 1 and advance immediately via the poll.
        engine.observe("nvidia-smi", false, &CommandResult::success("H100"), &w);
        engine.poll_auto_advance(Instant::now() + AUTO_ADVANCE_DELAY);

        // Drain node1 inside the scenario context only.
        w.set_slurm_state(
            "node1",
            SlurmState::Drain,
            Some("maint".into()),
            Some("scontrol update nodename=node1 state=drain"),
        );
        let v = engine
            .observe(
                "scontrol update nodename=node1 state=drain",
                false,
                &CommandResult::success(""),
                &w,
            )
            .unwrap();
        assert!(v.passed);
        // Global state is still idle.
        assert_eq!(
            w.store.state().node("node1").unwrap().slurm_state,
            SlurmState::Idle
        );
    }

    #[test]
    fn hint_gate_unlocks_by_attempts_or_time() {
        let hints = HintManager::default();
        assert_eq!(hints.unlocked(0, 0, 2), 0);
        assert_eq!(hints.unlocked(1, 0, 2), 1);
        assert_eq!(hints.unlocked(0, 61, 2), 1);
        assert_eq!(hints.unlocked(5, 0, 2), 2);
        assert_eq!(hints.unlocked(0, 10_000, 2), 2);
    }

    #[test]
    fn hint_reveal_is_idempotent_per_id() {
        let mut engine = ScenarioEngine::new();
        let mut w = world();
        engine.start(scenario(), &mut w);

        // One failed attempt unlocks the first hint.
        engine.observe("nvidia-smi", false, &CommandResult::success("nothing"), &w);
        let first = engine.request_hint();
        assert!(first.contains("Try nvidia-smi."));
        let p = engine.progress_for("lab1").unwrap();
        assert_eq!(p.steps[0].hints_revealed, 1);

        // Asking again without unlocking more yields a locked reason and
        // does not re-count the already revealed hint.
        let second = engine.request_hint();
        assert!(second.contains("no hint unlocked yet"));
        let p = engine.progress_for("lab1").unwrap();
        assert_eq!(p.steps[0].hints_revealed, 1);
        assert_eq!(p.steps[0].revealed_hint_ids, vec!["h1".to_string()]);
    }

    #[test]
    fn hint_gate_reports_locked_then_exhausted() {
        let step = scenario().steps[0].clone();
        let hints = HintManager::default();
        let mut sp = StepProgress::new();

        match hints.available(&step, &sp, Utc::now()) {
            HintOutcome::Locked { reason } => assert!(reason.contains("attempt")),
            other => panic!("expected locked, got {other:?}"),
        }

        sp.failed_attempts = 5;
        sp.started_at = Utc::now() - ChronoDuration::seconds(600);
        sp.revealed_hint_ids = vec!["h1".into(), "h2".into()];
        assert_eq!(hints.available(&step, &sp, Utc::now()), HintOutcome::Exhausted);
    }
}

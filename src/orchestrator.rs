//! The execution orchestrator: one entry point per submitted line.
//!
//! `execute_line` resolves shell mode, parses, routes, applies pipe
//! filters, feeds the validator, updates history, and returns the result
//! plus the next prompt. Handler errors are converted to textual error
//! results at this boundary; nothing escalates past it and the session is
//! never terminated by an internal error.

use crate::builtin::{Cd, Clear, Echo, Help, History, Hostname, Pwd};
use crate::cluster::ClusterStore;
use crate::command::{CommandResult, ExecutionContext};
use crate::context::ClusterWorld;
use crate::filters::apply_filters;
use crate::parser::{ParsedCommand, expand_substitutions, parse_assignment, parse_line};
use crate::registry::CommandRouter;
use crate::scenario::Scenario;
use crate::shell_mode::ShellMode;
use crate::simulators::{Cmsh, Dcgmi, InjectXid, Ipmitool, NvidiaSmi, Nvsm, Slurm};
use crate::validator::ScenarioEngine;
use std::rc::Rc;
use std::time::Instant;
use tracing::error;

/// Router preloaded with every builtin and tool emulator this crate ships.
pub fn default_router() -> CommandRouter {
    let mut router = CommandRouter::new();
    router.register("help", Rc::new(Help));
    router.register("history", Rc::new(History));
    router.register("clear", Rc::new(Clear));
    router.register("echo", Rc::new(Echo));
    router.register("hostname", Rc::new(Hostname));
    router.register("pwd", Rc::new(Pwd));
    router.register("cd", Rc::new(Cd));
    router.register("nvidia-smi", Rc::new(NvidiaSmi));
    router.register("dcgmi", Rc::new(Dcgmi));
    router.register("ipmitool", Rc::new(Ipmitool));
    router.register("inject-xid", Rc::new(InjectXid));
    router.register_many(&["sinfo", "squeue", "scontrol"], Rc::new(Slurm));
    router.register("nvsm", Rc::new(Nvsm));
    router.register_interactive("nvsm", Rc::new(Nvsm));
    router.register("cmsh", Rc::new(Cmsh));
    router.register_interactive("cmsh", Rc::new(Cmsh));
    router
}

/// One terminal session: router, shell mode, session context, cluster
/// world, and the scenario engine, processed strictly one line at a time.
pub struct Orchestrator {
    router: CommandRouter,
    mode: ShellMode,
    ctx: ExecutionContext,
    world: ClusterWorld,
    engine: ScenarioEngine,
    library: Vec<Scenario>,
}

impl Orchestrator {
    pub fn new(store: ClusterStore, current_node: &str, library: Vec<Scenario>) -> Self {
        Self::with_router(default_router(), store, current_node, library)
    }

    pub fn with_router(
        router: CommandRouter,
        store: ClusterStore,
        current_node: &str,
        library: Vec<Scenario>,
    ) -> Self {
        Self {
            router,
            mode: ShellMode::Bash,
            ctx: ExecutionContext::new(current_node),
            world: ClusterWorld::new(store),
            engine: ScenarioEngine::new(),
            library,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn world(&self) -> &ClusterWorld {
        &self.world
    }

    pub fn engine(&self) -> &ScenarioEngine {
        &self.engine
    }

    pub fn mode(&self) -> &ShellMode {
        &self.mode
    }

    /// The prompt to display before the next line.
    pub fn prompt(&self) -> String {
        match self.mode.tool_prompt() {
            Some(p) => p.to_string(),
            None => {
                let path = self
                    .ctx
                    .current_path
                    .strip_prefix("/home/labuser")
                    .map(|rest| {
                        if rest.is_empty() {
                            "~".to_string()
                        } else {
                            format!("~{rest}")
                        }
                    })
                    .unwrap_or_else(|| self.ctx.current_path.clone());
                format!("labuser@{}:{}$ ", self.ctx.current_node, path)
            }
        }
    }

    /// Process one submitted line to completion.
    pub fn execute_line(&mut self, raw: &str) -> CommandResult {
        let started = Instant::now();
        self.engine.poll_auto_advance(Instant::now());

        let line = raw.trim().to_string();
        if line.is_empty() {
            return CommandResult::success("");
        }
        // Substitutions resolve before anything else looks at the line, so
        // nested handlers never see an unexpanded `$(...)` either.
        let expanded = expand_substitutions(&line, &self.ctx.current_node);

        let mut result = if self.mode.tool_name().is_some() {
            self.execute_nested(&expanded)
        } else {
            self.execute_routed(&expanded)
        };

        self.ctx.history.push(line);
        result.execution_time_ms = Some(started.elapsed().as_millis() as u64);
        result
    }

    /// A line typed while an interactive tool owns the session.
    fn execute_nested(&mut self, line: &str) -> CommandResult {
        let tool = self.mode.tool_name().unwrap_or_default().to_string();
        let prompt = self.mode.tool_prompt().unwrap_or_default().to_string();
        let result = match self.router.resolve_interactive(&tool) {
            Some(handler) => {
                match handler.handle_line(line, &prompt, &mut self.ctx, &mut self.world) {
                    Ok(r) => r,
                    Err(e) => {
                        error!(tool = %tool, error = %e, "interactive handler failed");
                        // Stay in the tool; a tool bug should not dump the
                        // learner back to bash mid-exercise.
                        CommandResult::failure(format!("{tool}: execution error: {e}\n"), 1)
                            .with_prompt(prompt)
                    }
                }
            }
            None => {
                error!(tool = %tool, "no interactive handler registered, leaving tool mode");
                CommandResult::failure(format!("{tool}: interactive mode unavailable\n"), 1)
            }
        };
        self.mode.apply_nested_result(&result);

        // Inside a tool, "help" and friends are that tool's queries; the
        // meta exclusion only applies to the bash builtins.
        let mut result = result;
        self.validate(line, false, &mut result);
        result
    }

    /// A line in bash mode: parse, route, filter, validate.
    fn execute_routed(&mut self, line: &str) -> CommandResult {
        if let Some((key, value)) = parse_assignment(line) {
            self.ctx.set_var(&key, &value);
            return CommandResult::success(format!("{key}={value}\n"));
        }

        let segments = parse_line(line);
        let Some(first) = segments.first().cloned() else {
            return CommandResult::success("");
        };

        let mut result = match first.name.as_str() {
            // Scenario-aware builtins live here: they need the engine.
            "hint" => CommandResult::success(self.engine.request_hint()),
            "lab" => self.handle_lab(&first),
            _ => match self.router.resolve(&first.name) {
                Some(handler) => {
                    match handler.execute(&first, &mut self.ctx, &mut self.world) {
                        Ok(r) => r,
                        Err(e) => {
                            error!(command = %first.name, error = %e, "handler failed");
                            CommandResult::failure(
                                format!("{}: execution error: {e}\n", first.name),
                                1,
                            )
                        }
                    }
                }
                None => self.router.not_found(&first.name),
            },
        };

        if segments.len() > 1 {
            result.output = apply_filters(result.output, &segments[1..]);
        }

        self.mode
            .maybe_enter(&first.name, first.subcommands.is_empty(), &result);
        // Scenario lifecycle commands are about the exercise, not part of
        // it; they never count as step attempts.
        if first.name != "lab" {
            self.validate(line, ScenarioEngine::is_meta(&first.name), &mut result);
        }
        result
    }

    /// Feed the executed command into the scenario engine and surface any
    /// validation feedback under the command's own output.
    fn validate(&mut self, line: &str, meta: bool, result: &mut CommandResult) {
        if let Some(v) = self.engine.observe(line, meta, result, &self.world) {
            if let Some(feedback) = &v.feedback {
                result
                    .output
                    .push_str(&format!("\n[lab {}%] {feedback}\n", v.progress));
            }
            if v.passed {
                match self.engine.post_pass_instruction() {
                    Some(next) => result.output.push_str(&format!("[lab] next: {next}\n")),
                    None => result.output.push_str("[lab] Scenario complete.\n"),
                }
            }
        }
    }

    fn handle_lab(&mut self, cmd: &ParsedCommand) -> CommandResult {
        match cmd.subcommand(0) {
            Some("list") => {
                if self.library.is_empty() {
                    return CommandResult::success("No scenarios installed.\n");
                }
                let mut out = String::from("Available scenarios:\n");
                for s in &self.library {
                    out.push_str(&format!("  {:<20} {}\n", s.id, s.title));
                }
                CommandResult::success(out)
            }
            Some("start") => {
                let Some(id) = cmd.subcommand(1) else {
                    return CommandResult::failure("lab: usage: lab start <id>\n", 1);
                };
                let Some(scenario) = self.library.iter().find(|s| s.id == id).cloned() else {
                    return CommandResult::failure(
                        format!("lab: no such scenario: {id} (try 'lab list')\n"),
                        1,
                    );
                };
                let intro = self.engine.start(scenario, &mut self.world);
                CommandResult::success(intro)
            }
            Some("status") => CommandResult::success(self.engine.status()),
            Some("merge") => CommandResult::success(self.engine.merge(&mut self.world)),
            Some("exit") => CommandResult::success(self.engine.exit(&mut self.world)),
            _ => CommandResult::failure(
                "lab: usage: lab list | start <id> | status | merge | exit\n",
                1,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterState, NodeHealth, SlurmState};
    use crate::command::{EXIT_NOT_FOUND, Simulator};
    use crate::scenario::{Hint, Step, ValidationRule};
    use anyhow::anyhow;

    fn demo_scenarios() -> Vec<Scenario> {
        vec![Scenario {
            id: "drain-node1".into(),
            title: "Drain node1".into(),
            description: "Inspect GPUs, then drain node1 in Slurm.".into(),
            auto_advance: true,
            steps: vec![
                Step {
                    id: "inspect".into(),
                    instruction: "Look at the GPUs on this node.".into(),
                    rules: vec![ValidationRule::CommandContains {
                        needle: "nvidia-smi".into(),
                    }],
                    hints: vec![Hint {
                        id: "h1".into(),
                        text: "The NVIDIA tool name has an 'smi' in it.".into(),
                    }],
                },
                Step {
                    id: "drain".into(),
                    instruction: "Drain node1 with scontrol.".into(),
                    rules: vec![ValidationRule::SlurmStateIs {
                        node: "node1".into(),
                        state: SlurmState::Drain,
                    }],
                    hints: vec![],
                },
            ],
        }]
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            ClusterStore::new(ClusterState::demo()),
            "node1",
            demo_scenarios(),
        )
    }

    #[test]
    fn empty_line_is_a_noop() {
        let mut o = orchestrator();
        let r = o.execute_line("   ");
        assert_eq!(r.exit_code, 0);
        assert_eq!(r.output, "");
        assert!(o.context().history.is_empty());
    }

    #[test]
    fn nvidia_smi_without_scenario_has_no_progress_side_effects() {
        let mut o = orchestrator();
        let r = o.execute_line("nvidia-smi");
        assert_eq!(r.exit_code, 0);
        assert!(o.engine().active().is_none());
        assert!(o.engine().progress_for("drain-node1").is_none());
    }

    #[test]
    fn unknown_command_gets_127_and_suggestion() {
        let mut o = orchestrator();
        let r = o.execute_line("sinfl");
        assert_eq!(r.exit_code, EXIT_NOT_FOUND);
        assert!(r.output.contains("command not found"));
        assert!(r.output.contains("Did you mean 'sinfo'?"));

        let r = o.execute_line("fooobar");
        assert_eq!(r.exit_code, EXIT_NOT_FOUND);
        assert!(r.output.contains("not found"));
    }

    #[test]
    fn assignment_is_a_builtin_noop_that_echoes() {
        let mut o = orchestrator();
        let r = o.execute_line("CUDA_VISIBLE_DEVICES=0,1");
        assert_eq!(r.exit_code, 0);
        assert_eq!(r.output, "CUDA_VISIBLE_DEVICES=0,1\n");
        assert_eq!(o.context().get_var("CUDA_VISIBLE_DEVICES"), Some("0,1"));

        let r = o.execute_line("echo $CUDA_VISIBLE_DEVICES");
        assert_eq!(r.output, "0,1\n");
    }

    #[test]
    fn substitution_expands_before_routing() {
        let mut o = orchestrator();
        let r = o.execute_line("echo $(hostname)");
        assert_eq!(r.output, "node1\n");
    }

    #[test]
    fn pipes_post_process_handler_output() {
        let mut o = orchestrator();
        o.execute_line("scontrol update nodename=node2 state=drain");
        let r = o.execute_line("sinfo | grep drain | wc -l");
        assert_eq!(r.exit_code, 0);
        assert_eq!(r.output, "1\n");
    }

    #[test]
    fn history_records_submitted_lines_in_order() {
        let mut o = orchestrator();
        o.execute_line("sinfo");
        o.execute_line("nvidia-smi -L");
        let r = o.execute_line("history");
        let pos_a = r.output.find("sinfo").unwrap();
        let pos_b = r.output.find("nvidia-smi -L").unwrap();
        assert!(pos_a < pos_b);
        assert_eq!(o.context().history.len(), 3);
    }

    #[test]
    fn interactive_mode_round_trip() {
        let mut o = orchestrator();
        assert!(o.prompt().starts_with("labuser@node1"));

        let r = o.execute_line("nvsm");
        assert!(r.wants_interactive());
        assert_eq!(o.prompt(), "nvsm-> ");

        // Lines now go to the nested handler, not the router: "help" here
        // is an nvsm query, not the bash builtin.
        let r = o.execute_line("help");
        assert_ne!(r.exit_code, 0);
        assert!(r.output.contains("nvsm: unknown query"));
        assert_eq!(o.prompt(), "nvsm-> ");

        let r = o.execute_line("show gpus");
        assert_eq!(r.exit_code, 0);
        assert!(r.output.contains("GPU/0"));

        o.execute_line("exit");
        assert!(o.prompt().starts_with("labuser@node1"));
    }

    #[test]
    fn substitutions_expand_inside_tool_mode() {
        let mut o = orchestrator();
        o.execute_line("nvsm");
        // The nested handler must see the expanded text, never `$(...)`.
        let r = o.execute_line("show $(hostname)");
        assert!(r.output.contains("unknown query 'show node1'"));
        assert_eq!(o.prompt(), "nvsm-> ");
    }

    #[test]
    fn tool_mode_lines_named_like_meta_builtins_are_tracked() {
        let mut o = orchestrator();
        o.execute_line("lab start drain-node1");
        o.execute_line("nvsm");
        // Inside nvsm, "help" is a tool query, not the bash meta builtin,
        // so it counts toward the step transcript.
        o.execute_line("help");
        let p = o.engine().progress_for("drain-node1").unwrap();
        assert_eq!(
            p.steps[0].commands_executed,
            vec!["nvsm".to_string(), "help".to_string()]
        );
    }

    #[test]
    fn one_shot_tool_invocation_stays_in_bash() {
        let mut o = orchestrator();
        let r = o.execute_line("nvsm show health");
        assert_eq!(r.exit_code, 0);
        assert!(o.prompt().starts_with("labuser@node1"));
    }

    #[test]
    fn cmsh_prompt_follows_nested_state() {
        let mut o = orchestrator();
        o.execute_line("cmsh");
        assert_eq!(o.prompt(), "[dclab]% ");
        o.execute_line("device");
        assert_eq!(o.prompt(), "[dclab->device]% ");
        let r = o.execute_line("list");
        assert!(r.output.contains("node1"));
        o.execute_line("exit");
        assert_eq!(o.prompt(), "[dclab]% ");
        o.execute_line("quit");
        assert!(o.prompt().starts_with("labuser@node1"));
    }

    #[test]
    fn scenario_flow_isolates_then_merges() {
        let mut o = orchestrator();
        let r = o.execute_line("lab start drain-node1");
        assert!(r.output.contains("Step 1/2"));

        // Step 1 passes on the command alone; feedback is appended.
        let r = o.execute_line("nvidia-smi");
        assert!(r.output.contains("[lab 100%]"));

        // Auto-advance is deferred; force the timer by polling past it.
        std::thread::sleep(crate::validator::AUTO_ADVANCE_DELAY);
        o.execute_line("");
        let p = o.engine().progress_for("drain-node1").unwrap();
        assert_eq!(p.current_step_index(), 1);

        // Drain inside the scenario: isolated copy changes, global does not.
        o.execute_line("scontrol update nodename=node1 state=drain reason=lab");
        assert_eq!(
            o.world().cluster().node("node1").unwrap().slurm_state,
            SlurmState::Drain
        );
        assert_eq!(
            o.world().store.state().node("node1").unwrap().slurm_state,
            SlurmState::Idle
        );

        // Explicit merge replays the log into the global store.
        let r = o.execute_line("lab merge");
        assert!(r.output.contains("Replayed"));
        assert_eq!(
            o.world().store.state().node("node1").unwrap().slurm_state,
            SlurmState::Drain
        );

        let r = o.execute_line("lab exit");
        assert!(r.output.contains("Left scenario"));
    }

    #[test]
    fn meta_commands_are_not_tracked_as_attempts() {
        let mut o = orchestrator();
        o.execute_line("lab start drain-node1");
        o.execute_line("help");
        o.execute_line("hint");
        let p = o.engine().progress_for("drain-node1").unwrap();
        assert!(p.steps[0].commands_executed.is_empty());
    }

    #[test]
    fn hint_flow_through_the_builtin() {
        let mut o = orchestrator();
        o.execute_line("lab start drain-node1");
        let r = o.execute_line("hint");
        assert!(r.output.contains("no hint unlocked yet"));

        // A failed attempt unlocks the first hint.
        o.execute_line("dcgmi health");
        let r = o.execute_line("hint");
        assert!(r.output.contains("smi"));
    }

    struct Exploding;

    impl Simulator for Exploding {
        fn execute(
            &self,
            _cmd: &ParsedCommand,
            _ctx: &mut ExecutionContext,
            _world: &mut ClusterWorld,
        ) -> anyhow::Result<CommandResult> {
            Err(anyhow!("simulated internal fault"))
        }
    }

    #[test]
    fn handler_errors_are_caught_at_the_boundary() {
        let mut router = default_router();
        router.register("boom", Rc::new(Exploding));
        let mut o = Orchestrator::with_router(
            router,
            ClusterStore::new(ClusterState::demo()),
            "node1",
            Vec::new(),
        );
        let r = o.execute_line("boom");
        assert_eq!(r.exit_code, 1);
        assert!(r.output.contains("execution error"));
        assert!(r.output.contains("simulated internal fault"));

        // The session survives.
        let r = o.execute_line("echo still alive");
        assert_eq!(r.output, "still alive\n");
    }

    #[test]
    fn execution_time_is_reported() {
        let mut o = orchestrator();
        let r = o.execute_line("sinfo");
        assert!(r.execution_time_ms.is_some());
    }

    #[test]
    fn readonly_context_blocks_scenario_mutations() {
        let mut o = orchestrator();
        o.execute_line("lab start drain-node1");
        o.world.contexts.active_mut().unwrap().set_readonly(true);

        o.execute_line("scontrol update nodename=node1 state=drain");
        assert_eq!(
            o.world().cluster().node("node1").unwrap().slurm_state,
            SlurmState::Idle
        );
        assert_eq!(
            o.world().store.state().node("node1").unwrap().slurm_state,
            SlurmState::Idle
        );
        // Health untouched everywhere too; the session carried on.
        assert_eq!(
            o.world().cluster().node("node1").unwrap().health,
            NodeHealth::Healthy
        );
    }
}

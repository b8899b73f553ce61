//! Session builtins: commands about the terminal itself rather than any
//! simulated tool. All of them are ordinary [`Simulator`]s selected through
//! the router; the scenario-aware `hint` and `lab` commands live in the
//! orchestrator because they need the scenario engine.

use crate::command::{CommandResult, ExecutionContext, Simulator};
use crate::context::ClusterWorld;
use crate::parser::ParsedCommand;
use anyhow::Result;

/// Static command overview for the teaching terminal.
pub struct Help;

impl Simulator for Help {
    fn execute(
        &self,
        _cmd: &ParsedCommand,
        _ctx: &mut ExecutionContext,
        _world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        Ok(CommandResult::success(
            "\
Available command families:
  nvidia-smi        GPU status, MIG mode (-mig), device list (-L)
  dcgmi             datacenter GPU manager (discovery, health)
  sinfo/squeue/scontrol
                    Slurm scheduler views and node control
  ipmitool          BMC sensors and chassis power
  nvsm              system management shell (interactive)
  cmsh              cluster manager shell (interactive)
  lab               scenario lifecycle: list, start <id>, status, merge, exit
  hint              reveal the next unlocked hint for the current step
  history, echo, hostname, pwd, cd, clear

Pipe output through grep/head/tail/wc/sort/uniq, e.g.:
  sinfo | grep drain
",
        ))
    }
}

/// Read-only view of the session transcript.
pub struct History;

impl Simulator for History {
    fn execute(
        &self,
        _cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        _world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        let mut out = String::new();
        for (i, line) in ctx.history.iter().enumerate() {
            out.push_str(&format!("{:5}  {}\n", i + 1, line));
        }
        Ok(CommandResult::success(out))
    }
}

/// Emits the ANSI clear-screen sequence; the host terminal interprets it.
pub struct Clear;

impl Simulator for Clear {
    fn execute(
        &self,
        _cmd: &ParsedCommand,
        _ctx: &mut ExecutionContext,
        _world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        Ok(CommandResult::success("\x1b[2J\x1b[H"))
    }
}

/// Write the arguments to output, separated by spaces.
pub struct Echo;

impl Simulator for Echo {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        _world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        let expanded: Vec<String> = cmd
            .subcommands
            .iter()
            .map(|arg| expand_vars(arg, ctx))
            .collect();
        let joined = expanded.join(" ");
        let output = if cmd.has_flag("-n") {
            joined
        } else {
            format!("{joined}\n")
        };
        Ok(CommandResult::success(output))
    }
}

/// `$VAR` references in echo arguments resolve against the session
/// environment; unset variables expand to nothing, like bash.
fn expand_vars(arg: &str, ctx: &ExecutionContext) -> String {
    if let Some(name) = arg.strip_prefix('$') {
        return ctx.get_var(name).unwrap_or_default().to_string();
    }
    arg.to_string()
}

/// Prints the node the session is logged into.
pub struct Hostname;

impl Simulator for Hostname {
    fn execute(
        &self,
        _cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        _world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        Ok(CommandResult::success(format!("{}\n", ctx.current_node)))
    }
}

pub struct Pwd;

impl Simulator for Pwd {
    fn execute(
        &self,
        _cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        _world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        Ok(CommandResult::success(format!("{}\n", ctx.current_path)))
    }
}

/// Change the simulated working directory.
///
/// Purely textual: there is no filesystem behind the path, so any target
/// "exists". `..` components pop, absolute paths replace, no target means
/// the simulated home.
pub struct Cd;

impl Simulator for Cd {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        _world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        let target = cmd.subcommand(0).unwrap_or("/home/labuser");
        ctx.current_path = normalize(&ctx.current_path, target);
        Ok(CommandResult::success(""))
    }
}

fn normalize(current: &str, target: &str) -> String {
    let base: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        current.split('/').filter(|c| !c.is_empty()).collect()
    };
    let mut parts = base;
    for comp in target.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterState, ClusterStore};
    use crate::parser::parse_segment;

    fn run(sim: &dyn Simulator, line: &str, ctx: &mut ExecutionContext) -> CommandResult {
        let mut world = ClusterWorld::new(ClusterStore::new(ClusterState::demo()));
        let cmd = parse_segment(line).unwrap();
        sim.execute(&cmd, ctx, &mut world).unwrap()
    }

    #[test]
    fn echo_joins_args_and_honors_n() {
        let mut ctx = ExecutionContext::new("node1");
        assert_eq!(run(&Echo, "echo hello world", &mut ctx).output, "hello world\n");
        assert_eq!(run(&Echo, "echo -n hi", &mut ctx).output, "hi");
    }

    #[test]
    fn echo_expands_session_vars() {
        let mut ctx = ExecutionContext::new("node1");
        ctx.set_var("CUDA_VISIBLE_DEVICES", "0,1");
        assert_eq!(
            run(&Echo, "echo $CUDA_VISIBLE_DEVICES", &mut ctx).output,
            "0,1\n"
        );
        assert_eq!(run(&Echo, "echo $UNSET", &mut ctx).output, "\n");
    }

    #[test]
    fn cd_is_textual_normalization() {
        let mut ctx = ExecutionContext::new("node1");
        run(&Cd, "cd /var/log", &mut ctx);
        assert_eq!(ctx.current_path, "/var/log");
        run(&Cd, "cd ../lib", &mut ctx);
        assert_eq!(ctx.current_path, "/var/lib");
        run(&Cd, "cd", &mut ctx);
        assert_eq!(ctx.current_path, "/home/labuser");
    }

    #[test]
    fn history_lists_transcript() {
        let mut ctx = ExecutionContext::new("node1");
        ctx.history.push("sinfo".to_string());
        ctx.history.push("nvidia-smi".to_string());
        let out = run(&History, "history", &mut ctx).output;
        assert!(out.contains("1  sinfo"));
        assert!(out.contains("2  nvidia-smi"));
    }

    #[test]
    fn hostname_reports_current_node() {
        let mut ctx = ExecutionContext::new("gpu-node-07");
        assert_eq!(run(&Hostname, "hostname", &mut ctx).output, "gpu-node-07\n");
    }
}

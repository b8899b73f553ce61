//! Tool emulators.
//!
//! Each emulator implements the [`Simulator`] capability contract and is
//! selected through the router's map; the Slurm family demonstrates one
//! emulator registered under several names. Output text is plausible, not
//! a byte-for-byte reproduction of the real tools; the contract is the
//! state the emulators read and mutate through [`ClusterWorld`].

use crate::cluster::{NodeHealth, SlurmState, XidEvent};
use crate::command::{CommandResult, ExecutionContext, InteractiveHandler, Simulator};
use crate::context::ClusterWorld;
use crate::parser::ParsedCommand;
use anyhow::Result;
use chrono::Utc;

fn health_str(h: NodeHealth) -> &'static str {
    match h {
        NodeHealth::Healthy => "healthy",
        NodeHealth::Degraded => "degraded",
        NodeHealth::Critical => "critical",
        NodeHealth::Unknown => "unknown",
    }
}

/// `nvidia-smi`: GPU status for the session's current node.
pub struct NvidiaSmi;

impl NvidiaSmi {
    fn table(ctx: &ExecutionContext, world: &ClusterWorld) -> CommandResult {
        let Some(node) = world.cluster().node(&ctx.current_node) else {
            return CommandResult::failure(
                format!("nvidia-smi: no such node: {}\n", ctx.current_node),
                1,
            );
        };
        let mut out = String::from(
            "+-----------------------------------------------------------------------------+\n\
             | GPU  Name                     Temp   Util   Memory-Usage          MIG  XID  |\n\
             |-----------------------------------------------------------------------------|\n",
        );
        for gpu in &node.gpus {
            out.push_str(&format!(
                "| {:>3}  {:<22} {:>3}C  {:>4}%  {:>6}MiB / {:>6}MiB  {:>4} {:>4} |\n",
                gpu.index,
                gpu.model,
                gpu.temperature_c,
                gpu.utilization_pct,
                gpu.memory_used_mib,
                gpu.memory_total_mib,
                if gpu.mig_enabled { "On" } else { "Off" },
                gpu.xid_events.len(),
            ));
        }
        out.push_str(
            "+-----------------------------------------------------------------------------+\n",
        );
        CommandResult::success(out)
    }

    fn list(ctx: &ExecutionContext, world: &ClusterWorld) -> CommandResult {
        let Some(node) = world.cluster().node(&ctx.current_node) else {
            return CommandResult::failure(
                format!("nvidia-smi: no such node: {}\n", ctx.current_node),
                1,
            );
        };
        let mut out = String::new();
        for gpu in &node.gpus {
            out.push_str(&format!(
                "GPU {}: {} (UUID: {})\n",
                gpu.index, gpu.model, gpu.uuid
            ));
        }
        CommandResult::success(out)
    }

    fn query(ctx: &ExecutionContext, world: &ClusterWorld, index: Option<u32>) -> CommandResult {
        let Some(node) = world.cluster().node(&ctx.current_node) else {
            return CommandResult::failure(
                format!("nvidia-smi: no such node: {}\n", ctx.current_node),
                1,
            );
        };
        let mut out = String::new();
        for gpu in node.gpus.iter().filter(|g| index.is_none_or(|i| g.index == i)) {
            out.push_str(&format!(
                "GPU {index}\n    Product Name          : {model}\n    GPU UUID              : {uuid}\n    Temperature           : {temp} C\n    Utilization           : {util} %\n    FB Memory Usage       : {used} MiB / {total} MiB\n    ECC Errors            : {ecc}\n    MIG Mode              : {mig}\n",
                index = gpu.index,
                model = gpu.model,
                uuid = gpu.uuid,
                temp = gpu.temperature_c,
                util = gpu.utilization_pct,
                used = gpu.memory_used_mib,
                total = gpu.memory_total_mib,
                ecc = gpu.ecc_errors,
                mig = if gpu.mig_enabled { "Enabled" } else { "Disabled" },
            ));
            for xid in &gpu.xid_events {
                out.push_str(&format!(
                    "    XID Error             : {} ({})\n",
                    xid.code, xid.message
                ));
            }
        }
        if out.is_empty() {
            return CommandResult::failure(
                format!(
                    "nvidia-smi: no such GPU {} on {}\n",
                    index.unwrap_or(0),
                    ctx.current_node
                ),
                1,
            );
        }
        CommandResult::success(out)
    }

    fn set_mig(
        cmd: &ParsedCommand,
        ctx: &ExecutionContext,
        world: &mut ClusterWorld,
    ) -> CommandResult {
        let Some(enable) = cmd.flag_value("-mig").and_then(|v| match v {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        }) else {
            return CommandResult::failure("nvidia-smi: -mig expects 0 or 1\n", 1);
        };
        let node = ctx.current_node.clone();
        let Some(cluster_node) = world.cluster().node(&node) else {
            return CommandResult::failure(format!("nvidia-smi: no such node: {node}\n"), 1);
        };
        let indices: Vec<u32> = match cmd.flag_value("-i").and_then(|v| v.parse().ok()) {
            Some(i) => vec![i],
            None => cluster_node.gpus.iter().map(|g| g.index).collect(),
        };
        let mut out = String::new();
        for i in &indices {
            world.set_mig_mode(&node, *i, enable, Some(&cmd.raw));
            out.push_str(&format!(
                "{} MIG Mode for GPU {i} on {node}\n",
                if enable { "Enabled" } else { "Disabled" }
            ));
        }
        out.push_str("All done. A reboot is not required in this simulation.\n");
        CommandResult::success(out)
    }
}

impl Simulator for NvidiaSmi {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        if cmd.has_flag("-mig") {
            return Ok(Self::set_mig(cmd, ctx, world));
        }
        if cmd.has_flag("-L") {
            return Ok(Self::list(ctx, world));
        }
        if cmd.has_flag("-q") {
            let index = cmd.flag_value("-i").and_then(|v| v.parse().ok());
            return Ok(Self::query(ctx, world, index));
        }
        Ok(Self::table(ctx, world))
    }
}

/// `dcgmi`: datacenter GPU manager views over the current node.
pub struct Dcgmi;

impl Simulator for Dcgmi {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        let Some(node) = world.cluster().node(&ctx.current_node) else {
            return Ok(CommandResult::failure(
                format!("dcgmi: no such node: {}\n", ctx.current_node),
                1,
            ));
        };
        match cmd.subcommand(0) {
            Some("discovery") => {
                let mut out = format!("{} GPU(s) found on {}\n", node.gpus.len(), node.id);
                for gpu in &node.gpus {
                    out.push_str(&format!("  GPU {}: {}\n", gpu.index, gpu.model));
                }
                Ok(CommandResult::success(out))
            }
            Some("health") => {
                let worst = node
                    .gpus
                    .iter()
                    .map(|g| g.xid_events.len() + g.ecc_errors as usize)
                    .max()
                    .unwrap_or(0);
                let overall = if worst == 0 { "Healthy" } else { "Warning" };
                let mut out = format!("Overall Health: {overall}\n");
                for gpu in &node.gpus {
                    let status = if gpu.xid_events.is_empty() && gpu.ecc_errors == 0 {
                        "Healthy".to_string()
                    } else {
                        format!(
                            "Warning ({} XID, {} ECC)",
                            gpu.xid_events.len(),
                            gpu.ecc_errors
                        )
                    };
                    out.push_str(&format!("  GPU {}: {status}\n", gpu.index));
                }
                Ok(CommandResult::success(out))
            }
            _ => Ok(CommandResult::failure(
                "dcgmi: expected a subcommand: discovery | health\n",
                1,
            )),
        }
    }
}

/// The Slurm tool family. One emulator answers `sinfo`, `squeue`, and
/// `scontrol`; the router aliases all three names to it.
pub struct Slurm;

impl Slurm {
    fn sinfo(world: &ClusterWorld) -> CommandResult {
        let mut out = String::from("PARTITION AVAIL  TIMELIMIT  NODES  STATE  NODELIST\n");
        for node in &world.cluster().nodes {
            out.push_str(&format!(
                "gpu*      up     infinite   1      {:<6} {}\n",
                node.slurm_state.as_str(),
                node.id
            ));
        }
        CommandResult::success(out)
    }

    fn squeue(world: &ClusterWorld) -> CommandResult {
        let mut out =
            String::from("JOBID  PARTITION  NAME      USER     ST  TIME   NODES  NODELIST\n");
        for (i, node) in world.cluster().nodes.iter().enumerate() {
            if matches!(node.slurm_state, SlurmState::Alloc | SlurmState::Mix) {
                out.push_str(&format!(
                    "{}   gpu        train     labuser  R   1:02   1      {}\n",
                    1000 + i,
                    node.id
                ));
            }
        }
        CommandResult::success(out)
    }

    fn scontrol(cmd: &ParsedCommand, world: &mut ClusterWorld) -> CommandResult {
        match cmd.subcommand(0) {
            Some("show") => Self::scontrol_show(cmd, world),
            Some("update") => Self::scontrol_update(cmd, world),
            _ => CommandResult::failure("scontrol: expected: show node <id> | update k=v ...\n", 1),
        }
    }

    fn scontrol_show(cmd: &ParsedCommand, world: &ClusterWorld) -> CommandResult {
        let Some(id) = cmd.subcommand(2).or_else(|| cmd.subcommand(1).filter(|s| *s != "node"))
        else {
            return CommandResult::failure("scontrol: show what? try: show node <id>\n", 1);
        };
        let Some(node) = world.cluster().node(id) else {
            return CommandResult::failure(format!("scontrol: error: no such node: {id}\n"), 1);
        };
        CommandResult::success(format!(
            "NodeName={} State={} Health={} Gres=gpu:{} Reason={}\n",
            node.id,
            node.slurm_state.as_str().to_uppercase(),
            health_str(node.health),
            node.gpus.len(),
            node.slurm_reason.as_deref().unwrap_or("(null)"),
        ))
    }

    fn scontrol_update(cmd: &ParsedCommand, world: &mut ClusterWorld) -> CommandResult {
        let mut node = None;
        let mut state = None;
        let mut reason = None;
        for pair in cmd.subcommands.iter().skip(1) {
            let Some((key, value)) = pair.split_once('=') else {
                return CommandResult::failure(
                    format!("scontrol: error: expected key=value, got '{pair}'\n"),
                    1,
                );
            };
            match key.to_ascii_lowercase().as_str() {
                "nodename" => node = Some(value.to_string()),
                "state" => state = Some(value.to_string()),
                "reason" => reason = Some(value.to_string()),
                other => {
                    return CommandResult::failure(
                        format!("scontrol: error: unknown field '{other}'\n"),
                        1,
                    );
                }
            }
        }
        let Some(node) = node else {
            return CommandResult::failure("scontrol: error: NodeName required\n", 1);
        };
        let Some(state) = state else {
            return CommandResult::failure("scontrol: error: State required\n", 1);
        };
        let Some(slurm_state) = SlurmState::parse(&state) else {
            return CommandResult::failure(
                format!("scontrol: error: invalid node state '{state}'\n"),
                1,
            );
        };
        if world.cluster().node(&node).is_none() {
            return CommandResult::failure(format!("scontrol: error: no such node: {node}\n"), 1);
        }
        world.set_slurm_state(&node, slurm_state, reason, Some(&cmd.raw));
        CommandResult::success("")
    }
}

impl Simulator for Slurm {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        _ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        Ok(match cmd.name.as_str() {
            "sinfo" => Self::sinfo(world),
            "squeue" => Self::squeue(world),
            "scontrol" => Self::scontrol(cmd, world),
            other => CommandResult::failure(format!("slurm: unhandled tool '{other}'\n"), 1),
        })
    }
}

/// `ipmitool`: BMC sensor readings and chassis power for the current node.
pub struct Ipmitool;

impl Simulator for Ipmitool {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        match (cmd.subcommand(0), cmd.subcommand(1)) {
            (Some("sensor"), _) => {
                let Some(node) = world.cluster().node(&ctx.current_node) else {
                    return Ok(CommandResult::failure(
                        format!("ipmitool: no such node: {}\n", ctx.current_node),
                        1,
                    ));
                };
                let mut out = String::new();
                for gpu in &node.gpus {
                    out.push_str(&format!(
                        "GPU{} Temp       | {:.3}     | degrees C | ok\n",
                        gpu.index, gpu.temperature_c as f64
                    ));
                }
                out.push_str("Fan1             | 8640.000  | RPM       | ok\n");
                out.push_str("PSU1 Pwr In      | 1624.000  | Watts     | ok\n");
                Ok(CommandResult::success(out))
            }
            (Some("power"), Some("status")) => {
                Ok(CommandResult::success("Chassis Power is on\n"))
            }
            (Some("power"), Some("cycle")) => Ok(CommandResult::success(
                "Chassis Power Control: Cycle (simulated, node stays up)\n",
            )),
            _ => Ok(CommandResult::failure(
                "ipmitool: expected: sensor | power status | power cycle\n",
                1,
            )),
        }
    }
}

/// `nvsm`: system management shell. A bare invocation enters interactive
/// mode; `nvsm show health` style one-shots stay in bash.
pub struct Nvsm;

const NVSM_PROMPT: &str = "nvsm-> ";

impl Nvsm {
    fn run(query: &str, ctx: &ExecutionContext, world: &mut ClusterWorld) -> CommandResult {
        let Some(node) = world.cluster().node(&ctx.current_node) else {
            return CommandResult::failure(
                format!("nvsm: no such node: {}\n", ctx.current_node),
                1,
            );
        };
        match query {
            "show health" => {
                let bad: Vec<&str> = node
                    .gpus
                    .iter()
                    .filter(|g| !g.xid_events.is_empty() || g.temperature_c >= 85)
                    .map(|g| g.model.as_str())
                    .collect();
                let verdict = if bad.is_empty() && node.health == NodeHealth::Healthy {
                    "Status: Healthy\nChecks: 24/24 passed\n".to_string()
                } else {
                    format!(
                        "Status: Unhealthy ({})\nChecks: {}/24 passed\n",
                        health_str(node.health),
                        24 - bad.len().max(1)
                    )
                };
                CommandResult::success(verdict)
            }
            "show gpus" => {
                let mut out = String::new();
                for gpu in &node.gpus {
                    out.push_str(&format!(
                        "GPU/{} {} temp={}C util={}%\n",
                        gpu.index, gpu.model, gpu.temperature_c, gpu.utilization_pct
                    ));
                }
                CommandResult::success(out)
            }
            "show storage" => CommandResult::success("Drive/0 nvme0n1 3.84TB Healthy\n"),
            other => CommandResult::failure(format!("nvsm: unknown query '{other}'\n"), 1),
        }
    }
}

impl Simulator for Nvsm {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        if cmd.subcommands.is_empty() {
            return Ok(CommandResult::success(
                "NVIDIA System Management\nType 'show health', 'show gpus', or 'exit'.\n",
            )
            .with_prompt(NVSM_PROMPT));
        }
        Ok(Self::run(&cmd.subcommands.join(" "), ctx, world))
    }
}

impl InteractiveHandler for Nvsm {
    fn handle_line(
        &self,
        line: &str,
        _current_prompt: &str,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        let line = line.trim();
        match line {
            "exit" | "quit" => Ok(CommandResult::success("")),
            "" => Ok(CommandResult::success("").with_prompt(NVSM_PROMPT)),
            other => Ok(Self::run(other, ctx, world).with_prompt(NVSM_PROMPT)),
        }
    }
}

/// `cmsh`: cluster manager shell with a `device` sub-menu, exercising
/// prompt updates across nested-mode lines.
pub struct Cmsh;

impl Cmsh {
    fn top_prompt(world: &ClusterWorld) -> String {
        format!("[{}]% ", world.cluster().name)
    }

    fn device_prompt(world: &ClusterWorld) -> String {
        format!("[{}->device]% ", world.cluster().name)
    }

    fn device_list(world: &ClusterWorld) -> String {
        let mut out = String::new();
        for node in &world.cluster().nodes {
            out.push_str(&format!(
                "{:<12} PhysicalNode {:<9} {}\n",
                node.id,
                node.slurm_state.as_str(),
                health_str(node.health)
            ));
        }
        out
    }
}

impl Simulator for Cmsh {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        _ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        if cmd.subcommands.is_empty() {
            let prompt = Self::top_prompt(world);
            return Ok(CommandResult::success(
                "Cluster Manager shell. Type 'device' then 'list', or 'quit'.\n",
            )
            .with_prompt(prompt));
        }
        // One-shot: `cmsh -c "device list"` style is approximated by
        // joining the arguments into a single query.
        Ok(CommandResult::success(Self::device_list(world)))
    }
}

impl InteractiveHandler for Cmsh {
    fn handle_line(
        &self,
        line: &str,
        current_prompt: &str,
        _ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        let in_device = current_prompt.contains("->device");
        let line = line.trim();
        match line {
            "quit" => Ok(CommandResult::success("")),
            "exit" if !in_device => Ok(CommandResult::success("")),
            "exit" => Ok(CommandResult::success("").with_prompt(Self::top_prompt(world))),
            "device" if !in_device => {
                Ok(CommandResult::success("").with_prompt(Self::device_prompt(world)))
            }
            "list" if in_device => {
                Ok(CommandResult::success(Self::device_list(world))
                    .with_prompt(Self::device_prompt(world)))
            }
            "" => Ok(CommandResult::success("").with_prompt(current_prompt)),
            other => Ok(CommandResult::failure(
                format!("cmsh: invalid command '{other}'\n"),
                1,
            )
            .with_prompt(current_prompt)),
        }
    }
}

/// Deliberate fault injector used by lab authors: `inject-xid 79` records
/// an XID error on a GPU of the current node so health tooling has
/// something to find.
pub struct InjectXid;

impl Simulator for InjectXid {
    fn execute(
        &self,
        cmd: &ParsedCommand,
        ctx: &mut ExecutionContext,
        world: &mut ClusterWorld,
    ) -> Result<CommandResult> {
        let Some(code) = cmd.subcommand(0).and_then(|s| s.parse::<u32>().ok()) else {
            return Ok(CommandResult::failure("inject-xid: usage: inject-xid <code> [gpu]\n", 1));
        };
        let index = cmd
            .subcommand(1)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let node = ctx.current_node.clone();
        world.add_xid_error(
            &node,
            index,
            XidEvent {
                code,
                at: Utc::now(),
                message: format!("injected XID {code}"),
            },
            Some(&cmd.raw),
        );
        world.update_node_health(&node, NodeHealth::Degraded, Some(&cmd.raw));
        Ok(CommandResult::success(format!(
            "Injected XID {code} on {node} GPU {index}\n"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterState, ClusterStore};
    use crate::parser::parse_segment;

    fn setup() -> (ExecutionContext, ClusterWorld) {
        (
            ExecutionContext::new("node1"),
            ClusterWorld::new(ClusterStore::new(ClusterState::demo())),
        )
    }

    fn exec(sim: &dyn Simulator, line: &str) -> (CommandResult, ClusterWorld) {
        let (mut ctx, mut world) = setup();
        let cmd = parse_segment(line).unwrap();
        let r = sim.execute(&cmd, &mut ctx, &mut world).unwrap();
        (r, world)
    }

    #[test]
    fn nvidia_smi_lists_current_node_gpus() {
        let (r, _) = exec(&NvidiaSmi, "nvidia-smi -L");
        assert_eq!(r.exit_code, 0);
        assert!(r.output.contains("GPU 0: NVIDIA H100 80GB HBM3"));
        assert_eq!(r.output.lines().count(), 4);
    }

    #[test]
    fn nvidia_smi_unknown_node_is_actionable() {
        let mut ctx = ExecutionContext::new("node99");
        let mut world = ClusterWorld::new(ClusterStore::new(ClusterState::demo()));
        let cmd = parse_segment("nvidia-smi").unwrap();
        let r = NvidiaSmi.execute(&cmd, &mut ctx, &mut world).unwrap();
        assert_ne!(r.exit_code, 0);
        assert!(r.output.contains("no such node"));
    }

    #[test]
    fn nvidia_smi_mig_mutates_through_world() {
        let (r, world) = exec(&NvidiaSmi, "nvidia-smi -mig 1 -i 0");
        assert_eq!(r.exit_code, 0);
        assert!(world.store.state().gpu("node1", 0).unwrap().mig_enabled);
        assert!(!world.store.state().gpu("node1", 1).unwrap().mig_enabled);
    }

    #[test]
    fn scontrol_update_drains_node() {
        let (r, world) = exec(&Slurm, "scontrol update nodename=node2 state=drain reason=maint");
        assert_eq!(r.exit_code, 0);
        let node = world.store.state().node("node2").unwrap();
        assert_eq!(node.slurm_state, SlurmState::Drain);
        assert_eq!(node.slurm_reason.as_deref(), Some("maint"));
    }

    #[test]
    fn scontrol_rejects_bad_input() {
        let (r, _) = exec(&Slurm, "scontrol update nodename=node2 state=sideways");
        assert_eq!(r.exit_code, 1);
        assert!(r.output.contains("invalid node state"));

        let (r, _) = exec(&Slurm, "scontrol update state=drain");
        assert!(r.output.contains("NodeName required"));
    }

    #[test]
    fn sinfo_reflects_slurm_state() {
        let (_, mut world) = exec(&Slurm, "sinfo");
        world
            .store
            .set_slurm_state("node1", SlurmState::Drain, None)
            .unwrap();
        let mut ctx = ExecutionContext::new("node1");
        let cmd = parse_segment("sinfo").unwrap();
        let r = Slurm.execute(&cmd, &mut ctx, &mut world).unwrap();
        assert!(r.output.contains("drain"));
        assert!(r.output.contains("node1"));
    }

    #[test]
    fn nvsm_bare_enters_interactive_and_one_shot_does_not() {
        let (bare, _) = exec(&Nvsm, "nvsm");
        assert!(bare.wants_interactive());

        let (one_shot, _) = exec(&Nvsm, "nvsm show health");
        assert!(!one_shot.wants_interactive());
        assert!(one_shot.output.contains("Status:"));
    }

    #[test]
    fn nvsm_interactive_exit_drops_prompt() {
        let (mut ctx, mut world) = setup();
        let r = Nvsm
            .handle_line("show gpus", NVSM_PROMPT, &mut ctx, &mut world)
            .unwrap();
        assert!(r.wants_interactive());
        assert!(r.output.contains("GPU/0"));

        let r = Nvsm.handle_line("exit", NVSM_PROMPT, &mut ctx, &mut world).unwrap();
        assert!(!r.wants_interactive());
    }

    #[test]
    fn cmsh_submenu_changes_prompt() {
        let (mut ctx, mut world) = setup();
        let top = Cmsh::top_prompt(&world);
        let r = Cmsh.handle_line("device", &top, &mut ctx, &mut world).unwrap();
        assert_eq!(r.next_prompt.as_deref(), Some("[dclab->device]% "));

        let dev = r.next_prompt.unwrap();
        let r = Cmsh.handle_line("list", &dev, &mut ctx, &mut world).unwrap();
        assert!(r.output.contains("node1"));

        let r = Cmsh.handle_line("exit", &dev, &mut ctx, &mut world).unwrap();
        assert_eq!(r.next_prompt.as_deref(), Some("[dclab]% "));

        let r = Cmsh.handle_line("quit", &top, &mut ctx, &mut world).unwrap();
        assert!(!r.wants_interactive());
    }

    #[test]
    fn inject_xid_records_event_and_degrades_health() {
        let (r, world) = exec(&InjectXid, "inject-xid 79 1");
        assert_eq!(r.exit_code, 0);
        let state = world.store.state();
        let gpu = state.gpu("node1", 1).unwrap();
        assert_eq!(gpu.xid_events.len(), 1);
        assert_eq!(gpu.xid_events[0].code, 79);
        assert_eq!(state.node("node1").unwrap().health, NodeHealth::Degraded);
    }
}

use dclab_shell::Orchestrator;
use dclab_shell::cluster::{ClusterState, ClusterStore, SlurmState};
use dclab_shell::scenario::{Hint, Scenario, Step, ValidationRule};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

/// Starter exercise shipped with the binary; real deployments load
/// authored scenario JSON instead.
fn starter_scenarios() -> Vec<Scenario> {
    vec![Scenario {
        id: "drain-node1".to_string(),
        title: "Drain a node for maintenance".to_string(),
        description: "Inspect the GPUs on node1, then drain it in Slurm before maintenance."
            .to_string(),
        auto_advance: true,
        steps: vec![
            Step {
                id: "inspect".to_string(),
                instruction: "Check the GPU inventory on this node.".to_string(),
                rules: vec![
                    ValidationRule::CommandContains {
                        needle: "nvidia-smi".to_string(),
                    },
                    ValidationRule::OutputContains {
                        needle: "H100".to_string(),
                    },
                ],
                hints: vec![Hint {
                    id: "inspect-1".to_string(),
                    text: "nvidia-smi lists every GPU with temperature and utilization."
                        .to_string(),
                }],
            },
            Step {
                id: "drain".to_string(),
                instruction: "Drain node1 with scontrol, giving a reason.".to_string(),
                rules: vec![ValidationRule::SlurmStateIs {
                    node: "node1".to_string(),
                    state: SlurmState::Drain,
                }],
                hints: vec![Hint {
                    id: "drain-1".to_string(),
                    text: "scontrol update nodename=<node> state=drain reason=<why>".to_string(),
                }],
            },
        ],
    }]
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let store = ClusterStore::new(ClusterState::demo());
    let mut orchestrator = Orchestrator::new(store, "node1", starter_scenarios());

    println!("dclab-shell: simulated datacenter-ops terminal. Type 'help' to begin.");

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline(&orchestrator.prompt()) {
            Ok(line) => {
                if line.trim() == "exit" && orchestrator.mode().tool_name().is_none() {
                    break;
                }
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                let result = orchestrator.execute_line(&line);
                if !result.output.is_empty() {
                    print!("{}", result.output);
                    if !result.output.ends_with('\n') {
                        println!();
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

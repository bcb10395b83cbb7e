// mesh.rs — Mesh subcommands: list, agent, record.

use clap::Subcommand;
use tc_trust::{AgentTrust, EnginePaths, Event};

use super::{Engine, ImpactArg, OutcomeArg};

#[derive(Subcommand)]
pub enum MeshCommands {
    /// Every peer a local agent has dealt with.
    List {
        #[arg(long)]
        local: String,
    },
    /// One peer's trust in every domain it has acted in.
    Agent {
        remote: String,
        #[arg(long)]
        local: String,
    },
    /// Record a peer's outcome by hand.
    Record {
        #[arg(long)]
        local: String,
        #[arg(long)]
        remote: String,
        #[arg(long)]
        domain: String,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long, value_enum, default_value = "medium")]
        impact: ImpactArg,
        #[arg(long)]
        confidence: Option<f64>,
    },
}

pub fn execute(cmd: &MeshCommands, paths: &EnginePaths) -> anyhow::Result<()> {
    let engine = Engine::open(paths)?;
    let mesh = engine.mesh()?;

    match cmd {
        MeshCommands::List { local } => {
            let all = mesh.get_all_trust(local)?;
            if all.is_empty() {
                println!("{local} has no peer trust records.");
                return Ok(());
            }
            print_header();
            for domains in all.values() {
                for trust in domains.values() {
                    print_row(trust);
                }
            }
        }

        MeshCommands::Agent { remote, local } => {
            let domains = mesh.get_all_trust_for_agent(local, remote)?;
            print_header();
            for trust in domains.values() {
                print_row(trust);
            }
        }

        MeshCommands::Record {
            local,
            remote,
            domain,
            outcome,
            impact,
            confidence,
        } => {
            let mut event = Event::new(domain.as_str(), (*outcome).into(), (*impact).into())
                .with_actor(remote.as_str());
            if let Some(c) = confidence {
                event = event.with_confidence(*c);
            }
            let trust = mesh.record_event(local, remote, &event)?;
            println!(
                "{local} → {remote} in {domain}: now {:.2} ({}).",
                trust.score.value, trust.score.state
            );
        }
    }

    Ok(())
}

fn print_header() {
    println!(
        "{:<20} {:<24} {:>7} {:<11} {:>8}",
        "REMOTE", "DOMAIN", "VALUE", "STATE", "ACTIONS"
    );
    println!("{}", "-".repeat(74));
}

fn print_row(trust: &AgentTrust) {
    println!(
        "{:<20} {:<24} {:>7.2} {:<11} {:>8}",
        trust.remote_agent_id,
        trust.score.domain,
        trust.score.value,
        trust.score.state.to_string(),
        trust.score.action_count,
    );
}

// trust.rs — Trust subcommands: list, show, overall, autonomy, recovery,
// calibration, record, archive, decay.

use std::sync::Arc;

use clap::Subcommand;
use tc_trust::{DecayScheduler, EnginePaths, Event, TrustScore};

use super::{Engine, ImpactArg, OutcomeArg};

#[derive(Subcommand)]
pub enum TrustCommands {
    /// List every domain with a trust record.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show one domain's score (neutral if never seen).
    Show { domain: String },
    /// Print the action-weighted overall score.
    Overall,
    /// Which mode an action in this domain is allowed at a given confidence.
    Autonomy {
        domain: String,
        #[arg(long)]
        confidence: f64,
    },
    /// Show how a Restricted domain can recover.
    Recovery { domain: String },
    /// How well stated confidence has matched outcomes.
    Calibration { domain: String },
    /// Record an outcome by hand.
    Record {
        domain: String,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long, value_enum, default_value = "medium")]
        impact: ImpactArg,
        /// Confidence the agent stated before acting.
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Stop decaying a domain and drop it from the overall score.
    Archive {
        domain: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
    /// Run one decay tick now, over domains and mesh peers.
    Decay,
}

pub fn execute(cmd: &TrustCommands, paths: &EnginePaths) -> anyhow::Result<()> {
    let engine = Engine::open(paths)?;
    let store = engine.store()?;

    match cmd {
        TrustCommands::List { json } => {
            let records = store.records()?;
            if *json {
                let scores = store.get_all_scores()?;
                println!("{}", serde_json::to_string_pretty(&scores)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("No trust records yet.");
                return Ok(());
            }
            println!(
                "{:<28} {:>7} {:<11} {:>8}  LAST ACTIVITY",
                "DOMAIN", "VALUE", "STATE", "ACTIONS"
            );
            println!("{}", "-".repeat(80));
            for record in records {
                let score = &record.score;
                println!(
                    "{:<28} {:>7.2} {:<11} {:>8}  {}{}",
                    score.domain,
                    score.value,
                    score.state.to_string(),
                    score.action_count,
                    score.last_activity.format("%Y-%m-%d %H:%M:%S"),
                    if record.is_archived() { "  (archived)" } else { "" },
                );
            }
        }

        TrustCommands::Show { domain } => {
            let trust = store.get_score(domain)?;
            if !trust.is_observed() {
                println!("{domain} has no recorded events; showing the neutral start.");
            }
            print_score(trust.score());
        }

        TrustCommands::Overall => {
            println!("Overall trust: {:.2}", store.overall_score()?);
        }

        TrustCommands::Autonomy { domain, confidence } => {
            let decision = store.decide(domain, *confidence)?;
            println!("Mode:   {}", decision.mode);
            println!("State:  {} ({:.2})", decision.state, decision.value);
            println!("Reason: {}", decision.reason);
        }

        TrustCommands::Recovery { domain } => match store.recovery_path(domain)? {
            None => println!("{domain} is not Restricted; no recovery needed."),
            Some(path) => {
                println!(
                    "{} is Restricted at {:.2}; target {:.0}.",
                    path.domain, path.current_score, path.target_score
                );
                for (i, step) in path.steps.iter().enumerate() {
                    let progress = match step.progress {
                        Some(p) => format!("{p}/{}", step.required),
                        None => "-".to_string(),
                    };
                    println!(
                        "  {}. [{}] {} ({progress})",
                        i + 1,
                        if step.completed { "x" } else { " " },
                        step.description,
                    );
                }
                println!(
                    "Estimated days: {} to Learning, {} to Trusted ({:.2} points/day).",
                    path.estimated_days_to_learning,
                    path.estimated_days_to_trusted,
                    path.daily_gain
                );
            }
        },

        TrustCommands::Calibration { domain } => {
            let c = store.calibration(domain)?;
            println!(
                "{}: {:.1} ({}) over {} sample(s), bias {:+.3}",
                c.domain, c.calibration_score, c.interpretation, c.sample_count, c.bias
            );
        }

        TrustCommands::Record {
            domain,
            outcome,
            impact,
            confidence,
            actor,
        } => {
            let mut event = Event::new(domain.as_str(), (*outcome).into(), (*impact).into())
                .with_actor(actor.as_str());
            if let Some(c) = confidence {
                event = event.with_confidence(*c);
            }
            let score = store.record_event(&event)?;
            println!(
                "Recorded {} for {}: now {:.2} ({}).",
                event.outcome, domain, score.value, score.state
            );
        }

        TrustCommands::Archive { domain, actor } => {
            if store.archive(domain, actor)? {
                println!("Archived {domain}.");
            } else {
                println!("{domain} is unknown or already archived.");
            }
        }

        TrustCommands::Decay => {
            let scheduler = DecayScheduler::new()
                .with_target(Arc::new(store))
                .with_target(Arc::new(engine.mesh()?));
            let summary = scheduler.run_once()?;
            println!(
                "Decay: {} examined, {} decayed, {} failed.",
                summary.examined, summary.decayed, summary.failed
            );
        }
    }

    Ok(())
}

fn print_score(score: &TrustScore) {
    println!("Domain:        {}", score.domain);
    println!("Value:         {:.2}", score.value);
    println!("State:         {}", score.state);
    println!("Actions:       {}", score.action_count);
    println!("Last activity: {}", score.last_activity.to_rfc3339());
    println!("State since:   {}", score.state_entered.to_rfc3339());
    for (factor, weight) in &score.factors {
        println!("  {factor:<10} {weight:+.2}");
    }
}

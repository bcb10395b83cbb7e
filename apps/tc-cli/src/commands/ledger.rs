// ledger.rs — Ledger subcommands: verify, tail, entry, entity.

use std::time::Duration;

use clap::Subcommand;
use tc_ledger::{LedgerEntry, LedgerError, LedgerRecorder, VerifyControl};
use tc_trust::EnginePaths;
use uuid::Uuid;

use super::open_ledger;

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Verify the ledger hash chain.
    Verify {
        /// Give up after this many seconds.
        #[arg(long, default_value = "300")]
        timeout_secs: u64,
    },
    /// Show recent entries.
    Tail {
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
    /// Show one entry in full.
    Entry { entry_id: Uuid },
    /// Every entry recorded for one entity.
    Entity {
        /// `trust_domain` or `agent_trust`.
        entity_type: String,
        entity_id: String,
    },
}

pub fn execute(cmd: &LedgerCommands, paths: &EnginePaths) -> anyhow::Result<()> {
    if !paths.ledger.exists() {
        println!("No ledger found at {}", paths.ledger.display());
        return Ok(());
    }
    let ledger = open_ledger(paths)?;

    match cmd {
        LedgerCommands::Verify { timeout_secs } => {
            let control = VerifyControl::new().with_timeout(Duration::from_secs(*timeout_secs));
            match ledger.verify_chain(&control) {
                Ok(report) => {
                    println!(
                        "Ledger verified: {} entr{}, hash chain intact.",
                        report.entries,
                        if report.entries == 1 { "y" } else { "ies" }
                    );
                    println!("Head: {}", report.head_hash);
                }
                Err(LedgerError::Chain(chain)) => {
                    println!("CHAIN BROKEN at entry {}:", chain.entry_num);
                    println!("  Check:    {}", chain.kind);
                    if !chain.entry_id.is_empty() {
                        println!("  Entry id: {}", chain.entry_id);
                    }
                    println!();
                    println!("The ledger may have been tampered with.");
                    anyhow::bail!("Ledger integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        LedgerCommands::Tail { n } => {
            let total = ledger.len()? as usize;
            let recent = ledger.list(total.saturating_sub(*n), *n)?;
            if recent.is_empty() {
                println!("No ledger entries.");
                return Ok(());
            }
            print_table(&recent);
        }

        LedgerCommands::Entry { entry_id } => match ledger.get_entry(*entry_id)? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => anyhow::bail!("No ledger entry {entry_id}"),
        },

        LedgerCommands::Entity {
            entity_type,
            entity_id,
        } => {
            let entries = ledger.entity_history(entity_type, entity_id)?;
            if entries.is_empty() {
                println!("No entries for {entity_type} {entity_id}.");
                return Ok(());
            }
            print_table(&entries);
        }
    }

    Ok(())
}

fn print_table(entries: &[LedgerEntry]) {
    println!(
        "{:>6} {:<20} {:<14} {:<20} ENTITY",
        "SEQ", "TIMESTAMP", "ACTOR", "ACTION"
    );
    println!("{}", "-".repeat(90));
    for entry in entries {
        println!(
            "{:>6} {:<20} {:<14} {:<20} {}",
            entry.seq_num,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.actor,
            entry.action,
            entry.entity_id,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_ledger::{Ledger, NewEntry};
    use tempfile::TempDir;

    fn seeded(n: usize) -> (TempDir, EnginePaths) {
        let project = TempDir::new().unwrap();
        let paths = EnginePaths::for_project(project.path());
        let ledger = Ledger::open(&paths.ledger).unwrap();
        for i in 0..n {
            ledger
                .append(NewEntry::new("trust.updated", "trust_domain", format!("domain-{i}")))
                .unwrap();
        }
        (project, paths)
    }

    #[test]
    fn verify_passes_on_intact_ledger() {
        let (_project, paths) = seeded(3);
        execute(&LedgerCommands::Verify { timeout_secs: 10 }, &paths).unwrap();
    }

    #[test]
    fn verify_fails_on_tampered_ledger() {
        let (_project, paths) = seeded(3);
        let content = std::fs::read_to_string(&paths.ledger).unwrap();
        std::fs::write(&paths.ledger, content.replacen("domain-1", "domain-9", 1)).unwrap();
        assert!(execute(&LedgerCommands::Verify { timeout_secs: 10 }, &paths).is_err());
    }

    #[test]
    fn missing_ledger_is_not_an_error() {
        let project = TempDir::new().unwrap();
        let paths = EnginePaths::for_project(project.path());
        execute(&LedgerCommands::Tail { n: 5 }, &paths).unwrap();
        assert!(!paths.ledger.exists());
    }

    #[test]
    fn held_ledger_is_reported_as_in_use() {
        let (_project, paths) = seeded(1);
        let _owner = Ledger::open(&paths.ledger).unwrap();
        let err = execute(&LedgerCommands::Tail { n: 5 }, &paths).unwrap_err();
        assert!(err.to_string().contains("stop tc-daemon"));
    }

    #[test]
    fn unknown_entry_fails() {
        let (_project, paths) = seeded(1);
        assert!(execute(
            &LedgerCommands::Entry {
                entry_id: Uuid::new_v4()
            },
            &paths
        )
        .is_err());
    }
}

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use citator::config::Settings;
use citator::engine::Engine;
use citator::rename::{ConflictPolicy, RenameOptions};
use citator::store::{vault_ref_path, DocumentStore, FsStore};

#[derive(Parser)]
#[command(name = "citator", version, about = "Citation and auto-numbering engine for math-heavy Markdown vaults")]
struct Cli {
    /// Vault root directory.
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the parsed entities of one file.
    Scan {
        file: PathBuf,
        /// Emit the full records as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Renumber a file's tags and propagate the changes vault-wide.
    Renumber {
        file: PathBuf,
        /// Print the rewritten text without touching any file.
        #[arg(long)]
        dry_run: bool,
    },
    /// Rename a tag defined in FILE across the vault.
    Rename {
        file: PathBuf,
        #[arg(long)]
        old: String,
        /// The replacement tag; an empty value with --delete-unused
        /// deletes citations of the old tag instead.
        #[arg(long)]
        new: String,
        /// Delete pre-existing citations that already use the new tag.
        #[arg(long, conflicts_with = "abort_on_conflict")]
        delete_conflicts: bool,
        /// Refuse the rename when the new tag is already cited.
        #[arg(long)]
        abort_on_conflict: bool,
        #[arg(long)]
        delete_unused: bool,
    },
    /// Resolve citation tags (ranges and cross-file forms included).
    Resolve {
        file: PathBuf,
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::new(&cli.root)?;
    let engine = Engine::new(settings, FsStore::new(&cli.root));

    match cli.command {
        Command::Scan { file, json } => {
            let equations = engine.equations(&file).await;
            let figures = engine.figures(&file).await;
            let callouts = engine.callouts(&file).await;
            let footnotes = engine.footnotes(&file).await;
            let citations = engine.citations(&file).await;
            if json {
                let out = json!({
                    "equations": equations,
                    "figures": figures,
                    "callouts": callouts,
                    "footnotes": footnotes,
                    "citations": citations,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "{}: {} equations, {} figures, {} callouts, {} footnotes, {} citations",
                    file.display(),
                    equations.len(),
                    figures.len(),
                    callouts.len(),
                    footnotes.len(),
                    citations.len()
                );
                for entity in equations.iter().chain(&figures).chain(&callouts) {
                    println!(
                        "  {:>4}..{:<4} {}",
                        entity.line_start + 1,
                        entity.line_end + 1,
                        entity.tag.as_deref().unwrap_or("(untagged)")
                    );
                }
            }
        }
        Command::Renumber { file, dry_run } => {
            if dry_run {
                let text = engine
                    .store()
                    .read_file(&file)
                    .await
                    .ok_or_else(|| anyhow!("can't read {}", file.display()))?;
                let outcome = engine.auto_number_preview(&text)?;
                print!("{}", outcome.text);
            } else {
                engine.scan_vault().await;
                let outcome = engine.renumber_file(&file).await?;
                for change in &outcome.changes {
                    println!(
                        "{:>5}  {} -> {}",
                        change.line + 1,
                        change.old.as_deref().unwrap_or("(none)"),
                        change.new
                    );
                }
            }
        }
        Command::Rename {
            file,
            old,
            new,
            delete_conflicts,
            abort_on_conflict,
            delete_unused,
        } => {
            let options = RenameOptions {
                conflict_policy: if delete_conflicts {
                    ConflictPolicy::Delete
                } else if abort_on_conflict {
                    ConflictPolicy::Abort
                } else {
                    ConflictPolicy::Keep
                },
                delete_unused,
            };
            engine.scan_vault().await;
            let result = engine.rename_tags(&file, &[(old, new)], options).await?;
            println!(
                "{} citation(s) changed in {} file(s)",
                result.total_citations_changed, result.total_files_changed
            );
            for (path, count) in &result.details {
                println!("  {}: {}", path.display(), count);
            }
        }
        Command::Resolve { file, tags } => {
            for resolved in engine.resolve_citations(&tags, &file).await {
                let display = vault_ref_path(&cli.root, &resolved.path)
                    .unwrap_or_else(|| resolved.path.display().to_string());
                println!(
                    "{} -> {}:{} ({:?})",
                    resolved.tag,
                    display,
                    resolved.entity.line_start + 1,
                    resolved.kind
                );
            }
        }
    }

    engine.destroy();
    Ok(())
}

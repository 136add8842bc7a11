use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use stepwise::config::StepwiseConfig;
use stepwise::parse::render;
use stepwise::telemetry;
use stepwise::{
    ChangeRange, OutputCapture, PlayDirection, Projection, Replayer, SaveOutcome, Session,
    SnapshotId,
};

mod format;

use format::OutputFormat;

/// Record and replay a live-coding session
///
/// Every `save` records the working directory as the next snapshot on the
/// active timeline (a git branch). `prev`/`next`/`restore` move through the
/// timeline; `section` labels a snapshot as the start of a section; `branch`
/// forks a new timeline from any snapshot.
///
/// QUICK START:
///
///   stepwise init
///   # edit files
///   stepwise save
///   stepwise section HEAD-ID "Setting up"
///   stepwise prev && stepwise next
///   stepwise play --delay-ms 500
#[derive(Parser)]
#[command(name = "stepwise")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'stepwise <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Session root (default: current directory)
    #[arg(long, short = 'C', global = true)]
    root: Option<PathBuf>,

    /// Config file (default: <root>/.stepwise.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Timeline to work on (overrides the config file)
    #[arg(long, global = true, env = "STEPWISE_BRANCH")]
    branch: Option<String>,

    /// Output format: text or json
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    /// Shorthand for --format json
    #[arg(long, hide = true, global = true, conflicts_with = "format")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or open the session store and check the timeline
    Init,

    /// Record the working directory as the next snapshot
    ///
    /// Does nothing while looking at history (head behind the tip).
    Save {
        /// Terminal output to append to the capture file before saving
        #[arg(long)]
        output: Option<String>,
    },

    /// Move head one snapshot toward the tip
    Next,

    /// Move head one snapshot back
    Prev,

    /// Check out a snapshot (full id or unique prefix)
    Restore { id: String },

    /// Fork a new timeline at a snapshot and switch to it
    Branch { id: String, name: String },

    /// Switch to an existing timeline
    Switch { name: String },

    /// Drop every snapshot after the given one
    Revert { id: String },

    /// Start a labelled section at a snapshot
    Section { id: String, label: String },

    /// Show the active timeline with sections and head
    Log {
        /// Print raw log records instead of the timeline view
        #[arg(long)]
        raw: bool,
    },

    /// Show where a snapshot's last change sits in the old and new text
    Range { id: String },

    /// Step through the timeline
    Play {
        /// Step toward the first snapshot instead of the tip
        #[arg(long)]
        backward: bool,

        /// Pause between steps (default: replay.step_delay_ms)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Stop after this many steps
        #[arg(long)]
        steps: Option<usize>,
    },

    /// Show head, tip, and whether there are unsaved edits
    Status,
}

fn main() -> Result<()> {
    let _telemetry = telemetry::init();
    let cli = Cli::parse();
    let format = OutputFormat::with_json_flag(cli.global.format, cli.global.json);

    let root = match cli.global.root {
        Some(root) => root,
        None => std::env::current_dir().context("reading current directory")?,
    };
    let mut config = match &cli.global.config {
        Some(path) => StepwiseConfig::load(path)?,
        None => StepwiseConfig::load_from_root(&root)?,
    };
    if let Some(branch) = cli.global.branch {
        config.session.branch = branch;
    }

    let session = Session::open(&root, &config);
    session
        .initialize()
        .with_context(|| format!("opening session in {}", root.display()))?;

    match cli.command {
        Commands::Init => print_status(&session, format),
        Commands::Save { output } => {
            let hook = output.map(|text| {
                let capture = OutputCapture::new(config.capture.file.clone());
                capture.push(&text);
                capture.into_hook()
            });
            let outcome = session.save(hook)?;
            print_save(&outcome, format)
        }
        Commands::Next => {
            let moved = session.next()?;
            print_move(&session, moved.as_ref(), format)
        }
        Commands::Prev => {
            let moved = session.previous()?;
            print_move(&session, moved.as_ref(), format)
        }
        Commands::Restore { id } => {
            let id = session.projection().resolve(&id)?;
            session.restore(&id)?;
            print_move(&session, Some(&id), format)
        }
        Commands::Branch { id, name } => {
            let id = session.projection().resolve(&id)?;
            session.branch_from(&id, &name)?;
            print_status(&session, format)
        }
        Commands::Switch { name } => {
            session.switch_branch(&name)?;
            print_status(&session, format)
        }
        Commands::Revert { id } => {
            let id = session.projection().resolve(&id)?;
            session.revert_to(&id)?;
            print_status(&session, format)
        }
        Commands::Section { id, label } => {
            let id = session.projection().resolve(&id)?;
            let annotation = session.create_annotation(&id, &label)?;
            match format {
                OutputFormat::Json => println!("{}", format.serialize(&annotation)?),
                OutputFormat::Text => println!(
                    "Section '{}' ({}) starts at {}",
                    annotation.human_label,
                    annotation.name,
                    id.short()
                ),
            }
            Ok(())
        }
        Commands::Log { raw } => print_log(&session.projection(), raw, format),
        Commands::Range { id } => {
            let id = session.projection().resolve(&id)?;
            let range = session.change_range(&id)?;
            print_range(&id, range.as_ref(), format)
        }
        Commands::Play {
            backward,
            delay_ms,
            steps,
        } => {
            let delay = delay_ms.map_or_else(|| config.replay.step_delay(), Duration::from_millis);
            let direction = if backward {
                PlayDirection::Backward
            } else {
                PlayDirection::Forward
            };
            play(session, direction, delay, steps, format)
        }
        Commands::Status => print_status(&session, format),
    }
}

#[derive(Serialize)]
struct StatusEnvelope<'a> {
    branch: &'a str,
    head: Option<&'a SnapshotId>,
    branch_head: Option<&'a SnapshotId>,
    at_tip: bool,
    snapshots: usize,
    sections: usize,
    unsaved_changes: bool,
}

fn print_status(session: &Session, format: OutputFormat) -> Result<()> {
    let projection = session.projection();
    let envelope = StatusEnvelope {
        branch: &projection.branch,
        head: projection.head.as_ref(),
        branch_head: projection.branch_head.as_ref(),
        at_tip: projection.is_at_tip(),
        snapshots: projection.ordered_ids.len(),
        sections: projection.sections().len(),
        unsaved_changes: session.has_unsaved_changes()?,
    };
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&envelope)?),
        OutputFormat::Text => {
            println!("Timeline: {}", envelope.branch);
            match projection.head_index()? {
                Some(index) => println!(
                    "Head:     {} (step {} of {}){}",
                    projection.head.as_ref().map_or("", |id| id.short()),
                    index + 1,
                    envelope.snapshots,
                    if envelope.at_tip { "" } else { " [viewing history]" }
                ),
                None => println!("Head:     (no snapshots yet)"),
            }
            println!("Sections: {}", envelope.sections);
            if envelope.unsaved_changes {
                println!("Unsaved changes in the working directory.");
            }
        }
    }
    Ok(())
}

fn print_save(outcome: &SaveOutcome, format: OutputFormat) -> Result<()> {
    #[derive(Serialize)]
    struct SaveEnvelope<'a> {
        saved: Option<&'a SnapshotId>,
        reason: Option<&'static str>,
    }
    let (saved, reason) = match outcome {
        SaveOutcome::Saved(id) => (Some(id), None),
        SaveOutcome::NothingToCommit => (None, Some("nothing to commit")),
        SaveOutcome::NotAtTip => (None, Some("head is behind the timeline tip")),
    };
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&SaveEnvelope { saved, reason })?),
        OutputFormat::Text => match (saved, reason) {
            (Some(id), _) => println!("Saved {}", id.short()),
            (None, Some(reason)) => println!("Not saved: {reason}"),
            (None, None) => {}
        },
    }
    Ok(())
}

fn print_move(session: &Session, moved: Option<&SnapshotId>, format: OutputFormat) -> Result<()> {
    #[derive(Serialize)]
    struct MoveEnvelope<'a> {
        moved: bool,
        head: Option<&'a SnapshotId>,
        step: Option<usize>,
    }
    let projection = session.projection();
    let step = projection.head_index()?.map(|i| i + 1);
    let envelope = MoveEnvelope {
        moved: moved.is_some(),
        head: projection.head.as_ref(),
        step,
    };
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&envelope)?),
        OutputFormat::Text => match (envelope.head, step) {
            (Some(head), Some(step)) if envelope.moved => {
                println!("Head at {} (step {step} of {})", head.short(), projection.ordered_ids.len());
            }
            _ => println!("Head unchanged: already at the end of the timeline"),
        },
    }
    Ok(())
}

fn print_log(projection: &Projection, raw: bool, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", format.serialize(projection)?);
        return Ok(());
    }
    if raw {
        let snapshots: Vec<_> = projection.timeline().cloned().collect();
        print!("{}", render(&snapshots));
        return Ok(());
    }

    for (index, snapshot) in projection.timeline().enumerate() {
        if let Some(annotation) = projection.annotations.get(&snapshot.id) {
            let count = projection.section_commit_count(&snapshot.id);
            let position = projection
                .step_number_of_head(&snapshot.id)
                .map(|step| format!(", head at step {step}"))
                .unwrap_or_default();
            println!("== {} ({count} steps{position}) ==", annotation.human_label);
        }
        let marker = if projection.head.as_ref() == Some(&snapshot.id) { "@" } else { " " };
        println!(
            "{marker} {:>3} {} {} {}",
            index + 1,
            snapshot.id.short(),
            snapshot.timestamp,
            snapshot.change_summary
        );
    }
    Ok(())
}

fn print_range(id: &SnapshotId, range: Option<&ChangeRange>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", format.serialize(&range)?),
        OutputFormat::Text => match range {
            Some(range) => println!("{}: before {} after {}", id.short(), range.before, range.after),
            None => println!("{}: no textual change", id.short()),
        },
    }
    Ok(())
}

fn play(
    session: Session,
    direction: PlayDirection,
    delay: Duration,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let replayer = Replayer::new(session)
        .direction(direction)
        .delay(delay)
        .limit(limit);
    let stop = replayer.stop_flag();
    let mut failed = None;
    let summary = replayer.run(|step| {
        let line = match format {
            OutputFormat::Json => match serde_json::to_string(step) {
                Ok(line) => line,
                Err(e) => {
                    failed = Some(e);
                    stop.raise();
                    return;
                }
            },
            OutputFormat::Text => match &step.range {
                Some(range) => format!(
                    "step {:>3} {} changed {}",
                    step.index + 1,
                    step.head.short(),
                    range.after
                ),
                None => format!("step {:>3} {}", step.index + 1, step.head.short()),
            },
        };
        println!("{line}");
    })?;
    if let Some(e) = failed {
        return Err(e).context("serializing replay step");
    }
    if format == OutputFormat::Text {
        let end = if summary.stopped { "stopped" } else { "reached the end" };
        println!("{} steps, {end}", summary.steps);
    }
    Ok(())
}

//! `mission-runner` command-line entry point.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};

use mission_runner::context::MissionContext;
use mission_runner::core::clock::SystemClock;
use mission_runner::core::ledger::{MissionEntry, SectionKind};
use mission_runner::core::recurring::{RecurringMission, next_id};
use mission_runner::core::types::{Frequency, PauseReason};
use mission_runner::exit_codes;
use mission_runner::io::executor::CommandExecutor;
use mission_runner::io::init::{InitOptions, init_missions};
use mission_runner::io::notifier::{Notifier, from_config};
use mission_runner::io::recurring_store::find_mut;
use mission_runner::logging;
use mission_runner::looping::{LoopOptions, LoopStop, run_loop};
use mission_runner::pause::{self, CheckOutcome};
use mission_runner::recover::recover_ledger;
use mission_runner::status;
use mission_runner::step::StepAction;

#[derive(Parser)]
#[command(
    name = "mission-runner",
    version,
    about = "Unattended mission queue runner with quota-aware pausing"
)]
struct Cli {
    /// Workspace root holding `.missions/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.missions/` with a ledger template, config and empty recurring table.
    Init {
        /// Overwrite runner-owned files. The ledger is never overwritten.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the mission loop.
    Run {
        /// Take a single step and exit.
        #[arg(long, conflicts_with = "max_steps")]
        once: bool,
        /// Stop after this many steps.
        #[arg(long)]
        max_steps: Option<u32>,
    },
    /// Move missions left in progress by a crashed run back to Pending.
    Recover,
    /// Queue a mission at the end of Pending.
    Add {
        #[arg(long)]
        project: Option<String>,
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Show the queue.
    List,
    /// Add an entry to the Ideas backlog.
    Idea {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Move the n-th idea (1-based, as shown by `list`) to Pending.
    Promote { index: usize },
    /// Stop after the current task.
    Stop,
    /// Only pick missions for one project, or show the current focus.
    Focus {
        project: Option<String>,
        #[arg(long, conflicts_with = "project")]
        clear: bool,
    },
    /// Inspect or change the pause state.
    Pause {
        #[command(subcommand)]
        action: PauseCommand,
    },
    /// Manage recurring missions.
    Recurring {
        #[command(subcommand)]
        action: RecurringCommand,
    },
    /// Print a JSON status dump.
    Status,
}

#[derive(Subcommand)]
enum PauseCommand {
    /// Exit 0 when the runner may proceed (resuming if the pause expired), 1 when still paused.
    Check,
    /// Print the pause state as JSON.
    Status,
    /// Pause the runner.
    Create {
        #[arg(long, default_value = "manual")]
        reason: PauseReason,
        /// Reset text for quota pauses, or a note for the others.
        #[arg(long)]
        text: Option<String>,
        /// Pause length in hours instead of the configured cooldown.
        #[arg(long)]
        hours: Option<u32>,
    },
    /// Clear any pause.
    Remove,
}

#[derive(Subcommand)]
enum RecurringCommand {
    Add {
        #[arg(short, long)]
        frequency: Frequency,
        #[arg(long)]
        project: Option<String>,
        #[arg(required = true)]
        text: Vec<String>,
    },
    Remove { id: String },
    Enable { id: String },
    Disable { id: String },
    List,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root.as_path();
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Run { once, max_steps } => cmd_run(root, once, max_steps),
        Command::Recover => cmd_recover(root),
        Command::Add { project, text } => cmd_add(root, project.as_deref(), &text.join(" ")),
        Command::List => cmd_list(root),
        Command::Idea { text } => cmd_idea(root, &text.join(" ")),
        Command::Promote { index } => cmd_promote(root, index),
        Command::Stop => cmd_stop(root),
        Command::Focus { project, clear } => cmd_focus(root, project.as_deref(), clear),
        Command::Pause { action } => cmd_pause(root, action),
        Command::Recurring { action } => cmd_recurring(root, action),
        Command::Status => cmd_status(root),
    }
}

/// Load the context, refusing to work on an uninitialised root.
fn open(root: &Path) -> Result<MissionContext> {
    let ctx = MissionContext::load(root)?;
    if !ctx.paths.missions_dir.is_dir() {
        bail!(
            "no .missions directory under {} (run `mission-runner init` first)",
            root.display()
        );
    }
    Ok(ctx)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_missions(root, &InitOptions { force })?;
    println!("initialized {}", paths.missions_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, once: bool, max_steps: Option<u32>) -> Result<i32> {
    let mut ctx = open(root)?;
    let executor = CommandExecutor::new(ctx.config.agent.command.clone());
    let notifier = from_config(&ctx.config.notify.command, ctx.config.notify.timeout_secs);
    let notifier: &dyn Notifier = notifier.as_ref();
    let options = if once {
        LoopOptions::once()
    } else {
        LoopOptions { max_steps }
    };

    let outcome = run_loop(
        &mut ctx,
        &executor,
        &notifier,
        &SystemClock,
        &mut rand::thread_rng(),
        std::thread::sleep,
        &options,
        |step| match &step.action {
            StepAction::Ran(run) => println!("{} {}: {}", run.session_id, run.mission, run.outcome),
            StepAction::Paused(state) => println!("paused ({}) until {}", state.reason, state.display),
            StepAction::Rested => println!("idle"),
            StepAction::Stopped => println!("stop requested"),
        },
    )?;

    let stop = match outcome.stop {
        LoopStop::StopRequested => "stop requested",
        LoopStop::StepLimit => "step limit",
    };
    println!(
        "stopped ({stop}): {} step(s), {} task(s), {} recovered",
        outcome.steps, outcome.tasks_run, outcome.recovered
    );
    Ok(exit_codes::OK)
}

fn cmd_recover(root: &Path) -> Result<i32> {
    let ctx = open(root)?;
    let report = recover_ledger(&ctx)?;
    for entry in &report.recovered {
        println!("recovered: {}", entry.text);
    }
    for entry in &report.dropped_duplicates {
        println!("dropped duplicate: {}", entry.text);
    }
    if report.skipped_compound > 0 {
        println!(
            "left {} compound mission(s) in progress",
            report.skipped_compound
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_add(root: &Path, project: Option<&str>, text: &str) -> Result<i32> {
    let ctx = open(root)?;
    let entry = MissionEntry::simple(text, project);
    if entry.text.is_empty() {
        bail!("mission text is empty");
    }
    let text = entry.text.clone();
    ctx.ledger.modify(|ledger| ledger.insert_pending(entry))?;
    println!("queued: {text}");
    Ok(exit_codes::OK)
}

fn cmd_list(root: &Path) -> Result<i32> {
    let ctx = open(root)?;
    let ledger = ctx.ledger.load()?;
    for (title, kind) in [
        ("Pending", SectionKind::Pending),
        ("In Progress", SectionKind::InProgress),
        ("Ideas", SectionKind::Ideas),
    ] {
        let open: Vec<&MissionEntry> = ledger
            .entries(kind)
            .into_iter()
            .filter(|entry| !entry.done)
            .collect();
        println!("{title} ({}):", open.len());
        for (index, entry) in open.iter().enumerate() {
            match &entry.project {
                Some(project) => println!("  {}. [{project}] {}", index + 1, entry.text),
                None => println!("  {}. {}", index + 1, entry.text),
            }
        }
    }
    println!("Done: {}", ledger.entries(SectionKind::Done).len());
    Ok(exit_codes::OK)
}

fn cmd_idea(root: &Path, text: &str) -> Result<i32> {
    let ctx = open(root)?;
    let entry = MissionEntry::simple(text, None);
    if entry.text.is_empty() {
        bail!("idea text is empty");
    }
    ctx.ledger.modify(|ledger| ledger.add_idea(entry))?;
    Ok(exit_codes::OK)
}

fn cmd_promote(root: &Path, index: usize) -> Result<i32> {
    let ctx = open(root)?;
    let Some(position) = index.checked_sub(1) else {
        bail!("idea numbers start at 1");
    };
    match ctx.ledger.modify(|ledger| ledger.promote_idea(position))? {
        Some(idea) => println!("promoted: {}", idea.text),
        None => bail!("no idea #{index}"),
    }
    Ok(exit_codes::OK)
}

fn cmd_stop(root: &Path) -> Result<i32> {
    let ctx = open(root)?;
    ctx.signals.request_stop()?;
    println!("runner will stop after the current task");
    Ok(exit_codes::OK)
}

fn cmd_focus(root: &Path, project: Option<&str>, clear: bool) -> Result<i32> {
    let ctx = open(root)?;
    if clear {
        ctx.signals.set_focus(None)?;
        println!("focus cleared");
    } else if let Some(project) = project {
        ctx.signals.set_focus(Some(project))?;
        println!("focus: {project}");
    } else {
        match ctx.signals.focus()? {
            Some(project) => println!("focus: {project}"),
            None => println!("no focus"),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_pause(root: &Path, action: PauseCommand) -> Result<i32> {
    let ctx = open(root)?;
    let now = Utc::now();
    match action {
        PauseCommand::Check => match pause::check(&ctx, now)? {
            CheckOutcome::Paused(state) => {
                println!("paused ({}) until {}", state.reason, state.display);
                Ok(exit_codes::BLOCKED)
            }
            CheckOutcome::Resumed { message } => {
                println!("{message}");
                Ok(exit_codes::OK)
            }
            CheckOutcome::Healed { detail } => {
                println!("cleared inconsistent pause state: {detail}");
                Ok(exit_codes::OK)
            }
            CheckOutcome::Running => Ok(exit_codes::OK),
        },
        PauseCommand::Status => {
            let report = pause::status(&ctx, now)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(exit_codes::OK)
        }
        PauseCommand::Create {
            reason,
            text,
            hours,
        } => {
            let state = pause::create(&ctx, reason, text.as_deref(), hours, now)?;
            println!("paused ({}) until {}", state.reason, state.display);
            Ok(exit_codes::OK)
        }
        PauseCommand::Remove => {
            if pause::remove(&ctx)? {
                println!("pause removed");
            } else {
                println!("not paused");
            }
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_recurring(root: &Path, action: RecurringCommand) -> Result<i32> {
    let ctx = open(root)?;
    match action {
        RecurringCommand::Add {
            frequency,
            project,
            text,
        } => {
            let text = text.join(" ").trim().to_string();
            if text.is_empty() {
                bail!("recurring mission text is empty");
            }
            let id = ctx.recurring.modify_strict(|missions| {
                let id = next_id(missions);
                missions.push(RecurringMission {
                    id: id.clone(),
                    frequency,
                    text,
                    project,
                    created_at: Utc::now(),
                    last_run: None,
                    enabled: true,
                });
                Ok(id)
            })?;
            println!("added {id}");
        }
        RecurringCommand::Remove { id } => {
            ctx.recurring.modify_strict(|missions| {
                let before = missions.len();
                missions.retain(|mission| mission.id != id);
                if missions.len() == before {
                    bail!("no recurring mission with id '{id}'");
                }
                Ok(())
            })?;
            println!("removed {id}");
        }
        RecurringCommand::Enable { id } => set_enabled(&ctx, &id, true)?,
        RecurringCommand::Disable { id } => set_enabled(&ctx, &id, false)?,
        RecurringCommand::List => {
            let table = ctx.recurring.load()?;
            let now = Utc::now();
            for mission in table.missions() {
                let state = if !mission.enabled {
                    "disabled"
                } else if mission.is_due(now, ctx.zone) {
                    "due"
                } else {
                    "waiting"
                };
                let project = mission
                    .project
                    .as_deref()
                    .map(|p| format!(" [{p}]"))
                    .unwrap_or_default();
                println!(
                    "{} {} {state}{project} {}",
                    mission.id, mission.frequency, mission.text
                );
            }
            if table.unreadable_count() > 0 {
                println!("{} unreadable record(s)", table.unreadable_count());
            }
        }
    }
    Ok(exit_codes::OK)
}

fn set_enabled(ctx: &MissionContext, id: &str, enabled: bool) -> Result<()> {
    ctx.recurring.modify_strict(|missions| {
        find_mut(missions, id)?.enabled = enabled;
        Ok(())
    })?;
    println!("{id} {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn cmd_status(root: &Path) -> Result<i32> {
    let ctx = open(root)?;
    let report = status::collect(&ctx, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(exit_codes::OK)
}

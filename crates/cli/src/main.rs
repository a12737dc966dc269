mod logging;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre};
use sc_core::config::load_config;
use sc_core::engine::RunOutcome;
use sc_core::plan::{build_steps, render_template};
use sc_core::state::CycleService;
use sc_protocol::{EpicPhase, Event, Op, StepKind, StoryRef};
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "story-cycle")]
#[command(about = "Drive stories through agent, git and status steps")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Project root (default: current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Verbose diagnostics on stderr (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the step plan for the configured profile
    Plan {
        /// Render command templates for this story
        story: Option<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one story through the full cycle
    Run {
        /// Story id, e.g. 2-1-login
        story: String,
    },

    /// Run an epic's stories in order, halting on the first failure
    Epic {
        /// Epic id
        epic: String,

        /// Story ids in execution order
        #[arg(required = true)]
        stories: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let root = match cli.project {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let config = load_config(&root).await?;
    info!(project = %root.display(), profile = %config.settings.profile.as_str(), "Loaded configuration");

    match cli.command {
        Commands::Plan { story, json } => {
            let settings = &config.settings;
            let mut steps = build_steps(settings.profile, settings.review_rounds);
            if let Some(story_id) = story {
                let story = StoryRef::new(
                    story_id.as_str(),
                    config
                        .stories_dir()
                        .join(format!("{story_id}.md"))
                        .to_string_lossy(),
                );
                for step in &mut steps {
                    if let StepKind::Agent { command, .. } = &mut step.kind {
                        *command = render_template(command, &story, &step.id);
                    }
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&steps)?);
            } else {
                for line in output::render_plan(&steps) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Commands::Run { story } => {
            let service = CycleService::from_config(config).map_err(|e| eyre!(e))?;
            run_story(&service, &story).await
        }
        Commands::Epic { epic, stories } => {
            let service = CycleService::from_config(config).map_err(|e| eyre!(e))?;
            run_epic(&service, &epic, &stories).await
        }
    }
}

async fn run_story(service: &CycleService, story_id: &str) -> color_eyre::Result<()> {
    let events = service.subscribe_events();
    let story = service.resolve_story(story_id);
    let handle = service.cycle().start(story)?;

    let outcome = follow(service, events, Op::CancelCycle, handle.wait()).await;

    let state = service.cycle().snapshot();
    let markers: Vec<String> = state
        .step_statuses
        .iter()
        .map(|s| output::status_marker(*s))
        .collect();
    println!("{}", markers.join(" "));

    match outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::Failed { message, .. } => bail!("{message}"),
        RunOutcome::Cancelled => bail!("cancelled"),
        RunOutcome::Superseded => bail!("run was superseded"),
    }
}

async fn run_epic(
    service: &CycleService,
    epic_id: &str,
    story_ids: &[String],
) -> color_eyre::Result<()> {
    let events = service.subscribe_events();
    let stories = story_ids
        .iter()
        .map(|id| service.resolve_story(id))
        .collect();
    service.epic().start_epic_cycle(epic_id, stories)?;

    let mut watcher = service.epic().subscribe();
    let finished = async move {
        watcher
            .wait_for(|s| {
                !s.is_running && matches!(s.phase, EpicPhase::Complete | EpicPhase::Error)
            })
            .await
            .map(|s| (*s).clone())
    };

    let state = follow(service, events, Op::CancelEpic, finished).await?;
    println!(
        "{}/{} stories completed",
        state.completed_count(),
        state.story_queue.len()
    );
    match state.phase {
        EpicPhase::Complete => Ok(()),
        _ => bail!(state.error.unwrap_or_else(|| "epic halted".to_string())),
    }
}

/// Print events until `done` resolves. Ctrl-C sends `cancel` once.
async fn follow<T>(
    service: &CycleService,
    mut events: broadcast::Receiver<Event>,
    cancel: Op,
    done: impl Future<Output = T>,
) -> T {
    tokio::pin!(done);
    let mut cancel = Some(cancel);

    let result = loop {
        tokio::select! {
            result = &mut done => break result,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break (&mut done).await,
            },
            _ = tokio::signal::ctrl_c(), if cancel.is_some() => {
                if let Some(op) = cancel.take() {
                    info!(?op, "Interrupted");
                    service.handle(op).await;
                }
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    result
}

fn print_event(event: &Event) {
    if let Some(line) = output::render_event(event) {
        println!("{line}");
    }
}

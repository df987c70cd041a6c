//! Conveyor CLI - stream files one after another into a single output

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::io::AsyncWrite;

use conveyor::{
    Binding, Conveyor, ConveyorError, ConveyorOptions, EventKind, FixSuggestion, Source,
};

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Stream files one at a time into a single reusable output")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Concatenate files into stdout or an output file
    Cat {
        /// Input files, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit the files in reverse order
        #[arg(short, long)]
        reverse: bool,

        /// Maximum number of queued files (extra files are skipped)
        #[arg(long)]
        max: Option<usize>,

        /// YAML options file; `cat` always releases the queue once every file
        /// is queued, so only `max` changes its behavior
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the event log as JSON to stderr
        #[arg(long)]
        events: bool,
    },

    /// Validate a YAML options file
    Check {
        /// Path to the options file
        file: PathBuf,
    },
}

/// What `cat` should do once the options are resolved
struct CatPlan {
    files: Vec<PathBuf>,
    options: ConveyorOptions,
    reverse: bool,
    show_events: bool,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout may carry the concatenated bytes
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Cat {
            files,
            output,
            reverse,
            max,
            config,
            events,
        } => cat(files, output, reverse, max, config, events).await,
        Commands::Check { file } => check_options(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn cat(
    files: Vec<PathBuf>,
    output: Option<PathBuf>,
    reverse: bool,
    max: Option<usize>,
    config: Option<PathBuf>,
    show_events: bool,
) -> Result<(), ConveyorError> {
    let mut options = match config {
        Some(path) => ConveyorOptions::load(path)?,
        None => ConveyorOptions::default(),
    };
    if max.is_some() {
        options.max = max;
    }
    // Queue everything first, then release: unshifts come out reversed
    if reverse {
        options.start_paused = true;
    }

    let plan = CatPlan {
        files,
        options,
        reverse,
        show_events,
    };
    match output {
        Some(path) => {
            let file = tokio::fs::File::create(&path).await?;
            run_cat(file, plan, &path.display().to_string()).await
        }
        None => run_cat(tokio::io::stdout(), plan, "stdout").await,
    }
}

async fn run_cat<W>(writer: W, plan: CatPlan, target: &str) -> Result<(), ConveyorError>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    // Open everything up front so a missing file fails before any output
    let mut sources = Vec::with_capacity(plan.files.len());
    for path in &plan.files {
        let file = tokio::fs::File::open(path).await.map_err(|e| ConveyorError::Io {
            kind: e.kind(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        sources.push((path.display().to_string(), Source::new(file)));
    }

    let conveyor = Conveyor::new(writer, plan.options);
    let mut skipped = Vec::new();
    for (label, source) in sources {
        let binding = Binding::new(source).label(label.as_str());
        let accepted = if plan.reverse {
            conveyor.unshift(binding)?
        } else {
            conveyor.push(binding)?
        };
        if !accepted {
            skipped.push(label);
        }
    }
    // Every file is queued; a paused start (from --reverse or the options
    // file) only controls how they were admitted
    conveyor.resume();

    let events = conveyor.events().clone();
    conveyor.finish().await?;

    let mut settled = 0usize;
    let mut bytes = 0u64;
    for event in events.events() {
        if let EventKind::SegmentSettled { bytes: n, .. } = event.kind {
            settled += 1;
            bytes += n;
        }
    }

    eprintln!(
        "{} {} file(s), {} bytes → {}",
        "✓".green(),
        settled,
        bytes,
        target.cyan()
    );
    for label in &skipped {
        eprintln!("  {} skipped {} (queue full)", "!".yellow(), label);
    }
    if plan.show_events {
        eprintln!("{}", events.to_json());
    }

    Ok(())
}

fn check_options(file: &Path) -> Result<(), ConveyorError> {
    let options = ConveyorOptions::load(file)?;

    println!("{} Options file '{}' is valid", "✓".green(), file.display());
    match options.max {
        Some(max) => println!("  Max queued: {}", max),
        None => println!("  Max queued: unbounded"),
    }
    println!("  Start paused: {}", options.start_paused);

    Ok(())
}

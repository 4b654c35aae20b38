//! # mount-linker CLI
//!
//! ```bash
//! mount-linker watch --filename "Dune.Part.Two.2024.2160p.mkv" --title "Dune: Part Two" \
//!     --year 2024 --catalog-id 693134
//! mount-linker score "Game of Thrones iNTEGRALE MULTi 2160p" \
//!     --filename "Game of Thrones S01E02.mkv" --title "Juego de Tronos" \
//!     --year 2011 --season 1 --episode 2
//! mount-linker library list
//! mount-linker health
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;
use mount_linker::library::inspect_link;
use mount_linker::{
    Config, Engine, JobEvent, JobHandle, JobSnapshot, JobStatus, LibraryLayout, MatchThresholds,
    Matcher, MediaType, MountLinkerError, Observer, SearchRequest, check_links,
    extract_season_episode, extract_season_range, extract_years,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Watch a remote media mount for an expected file and link it into a
/// media-server library.
#[derive(Parser)]
#[command(name = "mount-linker", version, about)]
struct Cli {
    /// Path to the configuration file (TOML)
    ///
    /// Falls back to $MOUNT_LINKER_CONFIG, then to config.toml in the
    /// platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the mount for one request and link the file once it appears
    Watch {
        #[command(flatten)]
        request: RequestArgs,

        /// Override the configured search timeout (seconds)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Restart the jobs persisted by a previous run and wait for them
    Resume,

    /// Score a candidate name against a request
    Score {
        /// Candidate file or folder name
        candidate: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Show the season, episode, pack range and years found in a name
    Parse {
        name: String,
    },

    /// Inspect and manage the library
    Library {
        #[command(subcommand)]
        command: LibraryCommand,
    },

    /// Report library links whose target is gone
    Health,
}

#[derive(Subcommand)]
enum LibraryCommand {
    /// List titles with their catalog ids
    List,

    /// Show where a library file points and whether the target still exists
    Info {
        path: PathBuf,
    },

    /// Remove a link and the folders it leaves empty
    Unlink {
        path: PathBuf,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Delete one season folder of a show
    DeleteSeason {
        /// Show folder name, e.g. "Dark (2017) {tmdb-70523}"
        folder: String,
        season: u32,

        #[arg(long)]
        yes: bool,
    },

    /// Delete a whole movie or show folder
    DeleteTitle {
        #[arg(value_enum)]
        kind: MediaKind,
        folder: String,

        #[arg(long)]
        yes: bool,
    },

    /// Link a file from the mount by hand
    Link {
        /// Path of the file relative to the mount root
        source: String,

        #[command(flatten)]
        title: TitleArgs,

        #[arg(long)]
        catalog_id: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MediaKind {
    Movie,
    Tv,
}

impl From<MediaKind> for MediaType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Movie => MediaType::Movie,
            MediaKind::Tv => MediaType::Tv,
        }
    }
}

#[derive(Args)]
struct TitleArgs {
    #[arg(long)]
    title: String,

    #[arg(long)]
    original_title: Option<String>,

    #[arg(long)]
    year: Option<String>,

    /// Requested season; without one the request is a movie
    #[arg(long)]
    season: Option<u32>,

    #[arg(long, requires = "season")]
    episode: Option<u32>,
}

impl TitleArgs {
    fn media_type(&self) -> MediaType {
        match self.season {
            Some(_) => MediaType::Tv,
            None => MediaType::Movie,
        }
    }

    fn into_request(self, expected_filename: String, catalog_id: u64) -> SearchRequest {
        SearchRequest {
            media_type: self.media_type(),
            expected_filename,
            title: self.title,
            original_title: self.original_title,
            year: self.year,
            season: self.season,
            episode: self.episode,
            catalog_id,
        }
    }
}

#[derive(Args)]
struct QueryArgs {
    /// Filename announced by the resolver
    #[arg(long)]
    filename: String,

    #[command(flatten)]
    title: TitleArgs,
}

#[derive(Args)]
struct RequestArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Numeric catalog id embedded into the library folder name
    #[arg(long)]
    catalog_id: u64,
}

impl RequestArgs {
    fn into_request(self) -> SearchRequest {
        self.query
            .title
            .into_request(self.query.filename, self.catalog_id)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, MountLinkerError> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch { request, timeout } => {
            if let Some(timeout) = timeout {
                config.watch.timeout_secs = timeout;
            }
            let engine = Engine::from_config(&config)?.with_observer(status_printer());

            // Jobs left over from an earlier run share the state file
            let mut handles = engine.restore();
            let handle = engine.submit(request.into_request())?;
            let id = handle.id().to_string();
            handles.push(handle);

            let finished = wait_all(&engine, handles).await;
            Ok(exit_code(
                finished
                    .iter()
                    .any(|job| job.id == id && job.status == JobStatus::Completed),
            ))
        }

        Commands::Resume => {
            let engine = Engine::from_config(&config)?.with_observer(status_printer());
            let handles = engine.restore();
            if handles.is_empty() {
                println!("No persisted jobs to resume.");
                return Ok(ExitCode::SUCCESS);
            }
            println!("Resuming {} job(s)", handles.len());
            let finished = wait_all(&engine, handles).await;
            Ok(exit_code(
                finished.iter().all(|job| job.status == JobStatus::Completed),
            ))
        }

        Commands::Score { candidate, query } => {
            let request = query.title.into_request(query.filename, 0);
            let thresholds: MatchThresholds = config.matching.thresholds();
            let matcher = Matcher::new(request.query(), thresholds);
            let evaluation = matcher.evaluate(&candidate);

            println!("Candidate: {}", candidate);
            println!("Score:     {} ({})", evaluation.score, evaluation.reason);
            let accepted = evaluation.score >= thresholds.accept;
            println!(
                "Verdict:   {} (threshold {})",
                if accepted { "match" } else { "no match" },
                thresholds.accept
            );
            Ok(exit_code(accepted))
        }

        Commands::Parse { name } => {
            let parsed = extract_season_episode(&name);
            println!("Season/episode: {}", parsed);
            match extract_season_range(&name) {
                Some(range) if range.is_complete_pack() => {
                    println!("Season range:   complete pack")
                }
                Some(range) => println!("Season range:   {}-{}", range.min, range.max),
                None => println!("Season range:   none"),
            }
            let years = extract_years(&name);
            if years.is_empty() {
                println!("Years:          none");
            } else {
                let years: Vec<String> = years.iter().map(u32::to_string).collect();
                println!("Years:          {}", years.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Library { command } => run_library(&config, command),

        Commands::Health => {
            let report = check_links(&config.paths.library_root);
            println!(
                "Checked {} link(s) under {}",
                report.total,
                config.paths.library_root.display()
            );
            for broken in &report.broken {
                println!("  BROKEN {} -> {}", broken.path.display(), broken.target.display());
            }
            if report.is_healthy() {
                println!("All links resolve.");
            }
            Ok(exit_code(report.is_healthy()))
        }
    }
}

fn run_library(config: &Config, command: LibraryCommand) -> Result<ExitCode, MountLinkerError> {
    let layout = LibraryLayout::new(&config.paths.library_root, &config.library.catalog_marker)?;

    match command {
        LibraryCommand::List => {
            let library = layout.list()?;
            for (heading, entries) in [("Movies", &library.movies), ("Shows", &library.shows)] {
                println!("{} ({})", heading, entries.len());
                for entry in entries {
                    match entry.catalog_id {
                        Some(id) => println!("  {:>10}  {}", id, entry.folder_name),
                        None => println!("  {:>10}  {}", "-", entry.folder_name),
                    }
                }
            }
        }

        LibraryCommand::Info { path } => {
            let info = inspect_link(&path)?;
            println!("Path:    {}", info.path.display());
            println!("Link:    {}", if info.is_symlink { "yes" } else { "no" });
            println!("Target:  {}", info.target.display());
            println!("Status:  {}", if info.alive { "ok" } else { "broken" });
        }

        LibraryCommand::Unlink { path, yes } => {
            if !confirm(yes, &format!("Remove {}?", path.display())) {
                return Ok(ExitCode::FAILURE);
            }
            let removed = layout.remove_link(&path)?;
            println!("Removed {}", path.display());
            for dir in removed {
                println!("Removed empty folder {}", dir.display());
            }
        }

        LibraryCommand::DeleteSeason { folder, season, yes } => {
            if !confirm(yes, &format!("Delete season {} of '{}'?", season, folder)) {
                return Ok(ExitCode::FAILURE);
            }
            let dir = layout.delete_season(&folder, season)?;
            println!("Deleted {}", dir.display());
        }

        LibraryCommand::DeleteTitle { kind, folder, yes } => {
            if !confirm(yes, &format!("Delete '{}' and everything in it?", folder)) {
                return Ok(ExitCode::FAILURE);
            }
            let dir = layout.delete_title(kind.into(), &folder)?;
            println!("Deleted {}", dir.display());
        }

        LibraryCommand::Link {
            source,
            title,
            catalog_id,
        } => {
            let engine = Engine::from_config(config)?;
            let request = title.into_request(source.clone(), catalog_id);
            let destination =
                engine.link_manually(&request, &source, &config.paths.mount_root)?;
            println!("Linked {}", destination.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Prints status changes; log lines already go through tracing
fn status_printer() -> Observer {
    Arc::new(|job_id: &str, event: &JobEvent| {
        if let JobEvent::Status { status, message } = event {
            println!("[{}] {}: {}", job_id, status, message);
        }
    })
}

/// Waits for every job, cancelling all of them on Ctrl-C
async fn wait_all(engine: &Engine, handles: Vec<JobHandle>) -> Vec<JobSnapshot> {
    let ids: Vec<String> = handles.iter().map(|h| h.id().to_string()).collect();
    let waiting = async move {
        let mut finished = Vec::new();
        for handle in handles {
            if let Some(job) = handle.finished().await {
                finished.push(job);
            }
        }
        finished
    };
    tokio::pin!(waiting);

    tokio::select! {
        finished = &mut waiting => return finished,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return waiting.await;
            }
        }
    }

    println!("Cancelling, waiting for the current scan to finish...");
    for id in &ids {
        let running = engine
            .snapshot(id)
            .is_some_and(|job| !job.status.is_terminal());
        if !running {
            continue;
        }
        if let Err(e) = engine.cancel(id) {
            warn!(job_id = %id, error = %e, "Cancel failed");
        }
    }
    waiting.await
}

fn confirm(yes: bool, prompt: &str) -> bool {
    if yes {
        return true;
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

use std::path::{Path, PathBuf};

use clap::{builder::ArgAction, Parser, Subcommand};
use console::{style, Emoji};
use errors::HarvestdErrors;
use harvest::{
  project::DownloadOrigin, AcquisitionOutcome, AcquisitionStatus, HarvestConfig, Harvester,
  Summary,
};
use tracing::{debug, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod errors;

static BOOKS: Emoji<'_, '_> = Emoji("📚 ", "");
static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static PAPER: Emoji<'_, '_> = Emoji("📄 ", "");
static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✨ ", "");

#[derive(Parser)]
#[command(author, version, about = "Operator CLI for the harvest PDF acquisition pipeline")]
struct Cli {
  /// Verbose mode (-v, -vv, -vvv)
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Directory holding one subdirectory per project
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  /// JSON configuration file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create a project's directory layout
  Init {
    /// Project identifier
    project: String,
  },
  /// Merge a project's query tables into its manifest
  Consolidate {
    /// Project identifier
    project: String,
  },
  /// Download PDFs for a project, or for one of its queries
  Download {
    /// Project identifier
    project:       String,
    /// Only process this query
    #[arg(long, short)]
    query:         Option<String>,
    /// Process at most this many papers
    #[arg(long, short)]
    max:           Option<usize>,
    /// Only re-run papers whose latest outcome left no PDF
    #[arg(long, conflicts_with_all = ["query", "max"])]
    retry_failed:  bool,
  },
  /// Show download statistics
  Stats {
    /// Project identifier
    project: String,
    /// Only this query
    #[arg(long, short)]
    query:   Option<String>,
    /// Print JSON instead of text
    #[arg(long)]
    json:    bool,
  },
  /// Fetch a PDF from a URL found by hand
  SubmitUrl {
    /// Project identifier
    project:  String,
    /// Manifest paper id
    paper_id: u64,
    /// The URL to fetch
    url:      String,
  },
  /// Flag a manifest paper as a duplicate of another, or clear the flag
  MarkDuplicate {
    /// Project identifier
    project:      String,
    /// The duplicate paper
    paper_id:     u64,
    /// The paper it duplicates
    #[arg(required_unless_present = "clear")]
    duplicate_of: Option<u64>,
    /// Remove the flag instead
    #[arg(long, conflicts_with = "duplicate_of")]
    clear:        bool,
  },
  /// List downloaded PDFs
  List {
    /// Project identifier
    project: String,
  },
  /// Remove every report except the reports README
  CleanReports {
    /// Project identifier
    project: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes:     bool,
  },
}

impl Commands {
  /// The project a command works on.
  fn project(&self) -> &str {
    match self {
      Commands::Init { project }
      | Commands::Consolidate { project }
      | Commands::Download { project, .. }
      | Commands::Stats { project, .. }
      | Commands::SubmitUrl { project, .. }
      | Commands::MarkDuplicate { project, .. }
      | Commands::List { project }
      | Commands::CleanReports { project, .. } => project,
    }
  }

  /// Whether the command fetches over the network and so gets a log file.
  fn fetches(&self) -> bool { matches!(self, Commands::Download { .. } | Commands::SubmitUrl { .. }) }
}

/// Setup logging with the specified verbosity level, plus a daily log file in `log_dir`.
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<(), HarvestdErrors> {
  let filter = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  let file_layer = match log_dir {
    Some(dir) => {
      let file_appender = rolling::RollingFileAppender::builder()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("download_log")
        .filename_suffix("txt")
        .build(dir)?;
      Some(
        tracing_subscriber::fmt::layer()
          .with_writer(file_appender)
          .with_ansi(false)
          .with_target(true),
      )
    },
    None => None,
  };

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true);

  tracing_subscriber::registry().with(filter).with(stderr_layer).with(file_layer).init();
  Ok(())
}

/// Prints the status counts of a run or a statistics query.
fn print_summary(summary: &Summary) {
  println!("   {} {}", style("Total papers:").green().bold(), style(summary.total_papers).white());
  println!(
    "   {} {}",
    style("Downloaded:").green().bold(),
    style(summary.successful_downloads).white()
  );
  println!(
    "   {} {}",
    style("Already present:").green().bold(),
    style(summary.already_existed).white()
  );
  println!(
    "   {} {}",
    style("Manual required:").yellow().bold(),
    style(summary.manual_required).white()
  );
  println!("   {} {}", style("Failed:").red().bold(), style(summary.failed_downloads).white());
  println!("   {} {}", style("Skipped:").blue().bold(), style(summary.skipped).white());
}

/// Prints one outcome line.
fn print_outcome(outcome: &AcquisitionOutcome) {
  let status = match outcome.status() {
    AcquisitionStatus::Success | AcquisitionStatus::AlreadyExisted =>
      style(outcome.status().label()).green(),
    AcquisitionStatus::ManualRequired => style(outcome.status().label()).yellow(),
    AcquisitionStatus::Skipped => style(outcome.status().label()).blue(),
    AcquisitionStatus::Failed | AcquisitionStatus::NotFound => style(outcome.status().label()).red(),
  };
  println!("{} [{}] {}", style(outcome.paper_id()).yellow(), status, outcome.title());
  if let Some(path) = outcome.file_path() {
    println!("   {} {}", style("File:").green(), style(path.display()).white());
  }
  if let Some(message) = outcome.error_message() {
    println!("   {} {}", style("Note:").yellow(), message);
  }
}

#[tokio::main]
async fn main() -> Result<(), HarvestdErrors> {
  let cli = Cli::parse();

  let root = cli.root.clone().unwrap_or_else(HarvestConfig::default_root);
  let config = match &cli.config {
    Some(path) => HarvestConfig::load(path)?,
    None => HarvestConfig::default(),
  };
  let mut harvester = Harvester::new(&root, config)?;
  let project = cli.command.project().to_string();
  let layout = harvester.layout(&project);

  let log_dir = if cli.command.fetches() && layout.exists() {
    std::fs::create_dir_all(layout.reports_dir())?;
    Some(layout.reports_dir())
  } else {
    None
  };
  setup_logging(cli.verbose, log_dir.as_deref())?;
  debug!("Projects root: {}", root.display());

  let cancel = harvester.cancel_flag();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("Interrupted, finishing the current paper");
      cancel.cancel();
    }
  });

  match cli.command {
    Commands::Init { .. } => {
      if layout.exists() {
        println!(
          "{} Project already exists at: {}",
          style(WARNING).yellow(),
          style(layout.root().display()).yellow()
        );
      }
      harvester.init_project(&project).await?;
      println!(
        "{} Project initialized at: {}",
        style(SUCCESS).green(),
        style(layout.root().display()).yellow()
      );
      println!(
        "   Place query tables in {} as {}",
        style(layout.results_dir().display()).yellow(),
        style("<query_id>.json").cyan()
      );
    },

    Commands::Consolidate { .. } => {
      println!("{} Consolidating {}", style(BOOKS).cyan(), style(&project).yellow());
      let papers = harvester.consolidate(&project).await?;
      println!(
        "{} Manifest holds {} papers: {}",
        style(SUCCESS).green(),
        style(papers).yellow(),
        style(layout.manifest_path().display()).white()
      );
    },

    Commands::Download { query, max, retry_failed, .. } => {
      println!("{} Downloading PDFs for {}", style(ROCKET).cyan(), style(&project).yellow());
      let outcomes: Vec<AcquisitionOutcome> = match (query, retry_failed) {
        (Some(query), _) => harvester.download_query(&project, &query, max).await?,
        (None, true) => flatten(harvester.retry_failed(&project).await?),
        (None, false) => flatten(harvester.download_project(&project, max).await?),
      };
      info!("{} outcomes", outcomes.len());
      for outcome in &outcomes {
        print_outcome(outcome);
      }
      println!("\n{} Run complete", style(SUCCESS).green());
      print_summary(&Summary::from_outcomes(&outcomes));
      println!(
        "   {} {}",
        style("Reports:").green().bold(),
        style(layout.reports_dir().display()).white()
      );
    },

    Commands::Stats { query, json, .. } => {
      let stats = harvester.statistics(&project, query.as_deref()).await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
      } else {
        let scope = query.unwrap_or_else(|| project.clone());
        println!("{} Statistics for {}", style(BOOKS).cyan(), style(scope).yellow());
        if stats.sources.is_empty() {
          println!("{} No reports yet", style(WARNING).yellow());
        }
        print_summary(&stats.summary);
      }
    },

    Commands::SubmitUrl { paper_id, url, .. } => {
      println!(
        "{} Fetching {} for paper {}",
        style(PAPER).cyan(),
        style(&url).blue().underlined(),
        style(paper_id).yellow()
      );
      let outcome = harvester.submit_url(&project, paper_id, &url).await?;
      print_outcome(&outcome);
    },

    Commands::MarkDuplicate { paper_id, duplicate_of, clear, .. } => match duplicate_of {
      Some(of) if !clear => {
        harvester.mark_duplicate(&project, paper_id, of).await?;
        println!(
          "{} Paper {} marked as a duplicate of {}",
          style(SAVE).green(),
          style(paper_id).yellow(),
          style(of).yellow()
        );
      },
      _ => {
        harvester.clear_duplicate(&project, paper_id).await?;
        println!(
          "{} Duplicate flag cleared for paper {}",
          style(SAVE).green(),
          style(paper_id).yellow()
        );
      },
    },

    Commands::List { .. } => {
      let files = harvester.list_downloads(&project).await?;
      if files.is_empty() {
        println!("{} No PDFs downloaded yet", style(WARNING).yellow());
      }
      for file in &files {
        let origin = match file.origin {
          DownloadOrigin::Automatic => style("automatic").cyan(),
          DownloadOrigin::Manual => style("manual").magenta(),
        };
        println!(
          "{} [{}] {} ({} bytes)",
          style(PAPER).green(),
          origin,
          style(file.path.display()).white(),
          file.size
        );
      }
    },

    Commands::CleanReports { yes, .. } => {
      println!(
        "{} Reports directory: {}",
        style(WARNING).yellow(),
        style(layout.reports_dir().display()).yellow()
      );
      if !yes
        && !dialoguer::Confirm::new()
          .with_prompt("Remove every report except README.md?")
          .default(false)
          .wait_for_newline(true)
          .interact()?
      {
        println!("{} Operation cancelled", style("✖").red());
        return Ok(());
      }
      let removed = harvester.clean_reports(&project).await?;
      println!("{} Removed {} report files", style(SUCCESS).green(), style(removed).yellow());
    },
  }
  Ok(())
}

/// Flattens per-query outcomes into one list without repeating papers found by several queries.
fn flatten(
  by_query: std::collections::BTreeMap<String, Vec<AcquisitionOutcome>>,
) -> Vec<AcquisitionOutcome> {
  let mut seen = std::collections::HashSet::new();
  let mut outcomes: Vec<AcquisitionOutcome> =
    by_query.into_values().flatten().filter(|o| seen.insert(o.paper_id())).collect();
  outcomes.sort_by_key(AcquisitionOutcome::paper_id);
  outcomes
}

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use tasksync::config::{self, ConfigSources};
use tasksync::task_file::discovery;
use tasksync::{Config, SyncOptions, TaskSync};

#[derive(Parser)]
#[command(name = "tasksync", about = "Sync markdown task files with GitHub issues")]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl tasksync::SyncProgress for StderrProgress {
    fn on_task_start(&self, file: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] {}", index + 1, total, file);
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pull GitHub issue state into local task files
    Sync {
        #[command(flatten)]
        target: SyncTarget,
        #[command(flatten)]
        common: CommonArgs,
        /// Report what would change without writing (same as --dry-run)
        #[arg(long)]
        check_only: bool,
    },
    /// Create or update GitHub issues from local task files
    Publish {
        #[command(flatten)]
        target: PublishTarget,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SyncTarget {
    /// A single task file
    #[arg(long)]
    file: Option<PathBuf>,
    /// Every linked task file in a directory
    #[arg(long)]
    directory: Option<PathBuf>,
    /// The tasks/ directory of a project
    #[arg(long)]
    project: Option<PathBuf>,
    /// The task file linked to this issue number
    #[arg(long)]
    issue: Option<u64>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PublishTarget {
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    directory: Option<PathBuf>,
    #[arg(long)]
    project: Option<PathBuf>,
}

#[derive(Args)]
struct CommonArgs {
    /// Target repository as owner/name
    #[arg(long)]
    repo: Option<String>,
    /// Configuration file applied over the global and project layers
    #[arg(long)]
    config: Option<PathBuf>,
    /// Plan every change without writing anything
    #[arg(long)]
    dry_run: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// Also save the report to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the merged configuration
    Show {
        /// Project directory whose github-config.json is layered in
        #[arg(long)]
        project: Option<PathBuf>,
        /// Configuration file applied last
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print a single value by dot path, e.g. github.api.timeout
        #[arg(long)]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let failed = match cli.command {
        Commands::Sync {
            target,
            common,
            check_only,
        } => handle_sync(target, common, check_only).await?,
        Commands::Publish { target, common } => handle_publish(target, common).await?,
        Commands::Config { action } => {
            handle_config(action)?;
            false
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Project directory used for the project configuration layer.
fn project_for(project: Option<&Path>, other: Option<&Path>) -> Option<PathBuf> {
    if let Some(project) = project {
        return Some(project.to_path_buf());
    }
    let other = other?;
    let dir = if other.is_file() { other.parent()? } else { other };
    config::infer_project_dir(dir)
}

fn load_config(project: Option<PathBuf>, override_file: Option<PathBuf>) -> anyhow::Result<Config> {
    let sources = ConfigSources {
        root: std::env::current_dir()?,
        project,
        override_file,
    };
    Ok(config::load(&sources)?)
}

async fn connect(project: Option<PathBuf>, common: &CommonArgs) -> anyhow::Result<TaskSync> {
    let config = load_config(project, common.config.clone())?;
    let app = TaskSync::connect(config, common.repo.as_deref())?;
    // One upfront check so a bad token fails before any file is read.
    app.verify_token().await?;
    Ok(app)
}

async fn handle_sync(
    target: SyncTarget,
    common: CommonArgs,
    check_only: bool,
) -> anyhow::Result<bool> {
    let project = project_for(
        target.project.as_deref(),
        target.file.as_deref().or(target.directory.as_deref()),
    );
    let app = connect(project, &common).await?;
    let options = SyncOptions {
        dry_run: common.dry_run || check_only,
    };
    if options.dry_run {
        eprintln!("Dry run: no files will be changed");
    }

    let progress = StderrProgress;
    let report = if let Some(file) = &target.file {
        app.sync_file(file, options, &progress).await?
    } else if let Some(dir) = &target.directory {
        app.sync_directory(dir, options, &progress).await?
    } else if let Some(project) = &target.project {
        app.sync_project(project, options, &progress).await?
    } else if let Some(number) = target.issue {
        let dirs = discovery::default_search_dirs(&std::env::current_dir()?);
        app.sync_issue(number, &dirs, options, &progress).await?
    } else {
        anyhow::bail!("specify one of --file, --directory, --project or --issue");
    };

    let rendered = if common.json {
        report.to_json()?
    } else {
        report.render_text()
    };
    emit(&rendered, common.report.as_deref())?;

    let conflicts = report.counts.conflict;
    if conflicts > 0 {
        eprintln!("{conflicts} conflict(s) need manual review");
    }
    Ok(report.has_errors())
}

async fn handle_publish(target: PublishTarget, common: CommonArgs) -> anyhow::Result<bool> {
    let project = project_for(
        target.project.as_deref(),
        target.file.as_deref().or(target.directory.as_deref()),
    );
    let app = connect(project, &common).await?;
    let options = SyncOptions {
        dry_run: common.dry_run,
    };

    let progress = StderrProgress;
    let report = if let Some(file) = &target.file {
        app.publish_file(file, options, &progress).await?
    } else if let Some(dir) = &target.directory {
        app.publish_directory(dir, options, &progress).await?
    } else if let Some(project) = &target.project {
        app.publish_project(project, options, &progress).await?
    } else {
        anyhow::bail!("specify one of --file, --directory or --project");
    };

    let rendered = if common.json {
        report.to_json()?
    } else {
        report.render_text()
    };
    emit(&rendered, common.report.as_deref())?;
    Ok(report.has_errors())
}

fn emit(rendered: &str, report_path: Option<&Path>) -> anyhow::Result<()> {
    println!("{rendered}");
    if let Some(path) = report_path {
        std::fs::write(path, rendered)?;
        eprintln!("Report saved to {}", path.display());
    }
    Ok(())
}

fn handle_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show {
            project,
            config,
            key,
        } => {
            let merged = load_config(project, config)?;
            match key {
                Some(key) => match merged.get(&key) {
                    Some(value) => println!("{key} = {value}"),
                    None => println!("{key} is not set"),
                },
                None => println!("{}", serde_json::to_string_pretty(&merged)?),
            }
        }
    }
    Ok(())
}

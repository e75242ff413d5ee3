use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use gitchain_core::git::{discover_git, GitClient};
use gitchain_core::repository::{
    GitRepositoryManager, Repository, RepositoryEvent, RepositoryManager,
};
use gitchain_core::task::{TaskChain, TaskOutcome};
use gitchain_core::ClientSettings;

#[derive(Parser)]
#[command(name = "gitchain", version, about = "Run git operations as task chains")]
struct Cli {
    /// Repository working directory (default: current directory)
    #[arg(long, short = 'C', value_name = "PATH", default_value = ".", global = true)]
    repo: PathBuf,

    /// Git executable, overriding settings and discovery
    #[arg(long, value_name = "PATH", global = true)]
    git: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the git executable that would be used
    Discover,
    /// Check git and git-lfs versions against the configured minimums
    Validate {
        /// Executable to validate (default: discovered git)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Print the porcelain status as JSON
    Status,
    /// Print recent commits as JSON
    Log {
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Print the configured user name and email
    User,
    /// Print Git LFS locks as JSON
    Locks {
        /// Use the cached lock list instead of asking the server
        #[arg(long)]
        local: bool,
    },
    /// Watch the repository and print state changes until interrupted
    Watch,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn finish<T: Send + 'static>(mut chain: TaskChain<T>) -> Result<T> {
    match chain.run().await? {
        TaskOutcome::Succeeded(value) => Ok(value),
        TaskOutcome::Failed(failure) => Err(failure.into()),
        TaskOutcome::Cancelled => bail!("operation cancelled"),
    }
}

fn describe(event: &RepositoryEvent) -> String {
    match event {
        RepositoryEvent::HeadChanged(head) => format!("head {}", head),
        RepositoryEvent::CurrentBranchChanged(branch) => format!(
            "branch {}",
            branch.as_ref().map(|b| b.name.as_str()).unwrap_or("(detached)")
        ),
        RepositoryEvent::CurrentRemoteChanged(remote) => format!(
            "remote {}",
            remote.as_ref().map(|r| r.name.as_str()).unwrap_or("(none)")
        ),
        RepositoryEvent::StatusChanged(status) => format!(
            "status {} entries, {} staged",
            status.entries.len(),
            status.staged_count()
        ),
        RepositoryEvent::LocksChanged(locks) => format!("locks {}", locks.len()),
        other => other.kind().replace('_', " "),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    gitchain_core::util::init_logging(cli.json_logs);

    let repo_dir = cli
        .repo
        .canonicalize()
        .with_context(|| format!("repository path {}", cli.repo.display()))?;
    let mut settings = ClientSettings::load(&repo_dir)?;
    if let Some(git) = cli.git {
        settings = settings.with_git_install_path(git);
    }

    let git_path = discover_git(&settings);
    let mut client = GitClient::system(&repo_dir, settings);
    if let Some(path) = &git_path {
        client = client.with_git_path(path);
    }

    match cli.command {
        Commands::Discover => match finish(client.find_git_installation()).await? {
            Some(path) => println!("{}", path.display()),
            None => bail!("no git installation found"),
        },
        Commands::Validate { path } => {
            let Some(path) = path.or(git_path) else {
                bail!("no git installation found");
            };
            let result = finish(client.validate_git_install(&path)).await?;
            print_json(&result)?;
            if !result.is_valid {
                std::process::exit(1);
            }
        }
        Commands::Status => print_json(&finish(client.status()).await?)?,
        Commands::Log { limit } => print_json(&finish(client.log(limit)).await?)?,
        Commands::User => print_json(&finish(client.get_config_user_and_email()).await?)?,
        Commands::Locks { local } => print_json(&finish(client.list_locks(local)).await?)?,
        Commands::Watch => {
            let name = repo_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| repo_dir.display().to_string());
            let manager = Arc::new(GitRepositoryManager::new(client));
            let mut repo = Repository::new(name, &repo_dir);
            repo.attach(manager.clone());
            repo.subscribe(|event| println!("{}", describe(event)));

            let _watch = manager.watch()?;
            finish(manager.refresh()).await?;
            info!(path = %repo_dir.display(), "watching, press Ctrl-C to stop");

            loop {
                tokio::select! {
                    more = repo.process_next() => if !more { break },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}

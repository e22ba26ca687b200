use alfred_utils::config::{Environment, Settings, DEFAULT_BUNDLE_ID};
use alfred_utils::items;
use alfred_utils::update::GitHubUpdater;
use alfred_utils::{logging, Workflow};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "alfred-utils")]
#[command(about = "Script Filter that lists cached items, with auth and self-update helpers")]
#[command(version, args_conflicts_with_subcommands = true)]
struct Args {
  #[command(subcommand)]
  command: Option<Command>,

  /// Alfred query (the Script Filter runs `alfred-utils --query "{query}"`)
  #[arg(short, long, allow_hyphen_values = true)]
  query: Option<String>,
}

/// Background jobs started by the Script Filter.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
  /// Check GitHub for a newer release
  Update,
  /// Reload the items cache from `items_file`
  Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let env = Environment::resolve(&Settings::from_env(), DEFAULT_BUNDLE_ID)?;
  let _log_guard = logging::init(&env.cache_dir, env.debug)?;

  let settings = Settings::load(&env.data_dir)?;
  let repo = settings.get("github_repo").map(str::to_string);

  let mut builder = Workflow::builder()
    .bundle_id(DEFAULT_BUNDLE_ID)
    .settings(settings)
    .args(args.query);
  if let Some(repo) = repo.clone() {
    builder = builder.github_repo(repo);
  }
  let mut wf = builder.build()?;

  match args.command {
    Some(Command::Update) => run_update(&wf, repo.as_deref()).await?,
    Some(Command::Refresh) => {
      items::run_refresh(&wf)?;
    }
    None => items::run_query(&mut wf)?,
  }
  Ok(())
}

async fn run_update(wf: &Workflow, repo: Option<&str>) -> Result<()> {
  let Some(repo) = repo else {
    warn!("github_repo is not set, skipping update check");
    return Ok(());
  };

  let updater = GitHubUpdater::new(repo, &wf.env().version, wf.cache().clone())?;
  match updater.check_for_update().await? {
    Some(release) => info!("Newest release is {}", release.version),
    None => info!("No release found for {}", repo),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_query_words_are_never_jobs() {
    let args = Args::try_parse_from(["alfred-utils", "--query", "update"]).unwrap();
    assert_eq!(args.command, None);
    assert_eq!(args.query.as_deref(), Some("update"));

    let args = Args::try_parse_from(["alfred-utils", "-q", "workflow:clearauth"]).unwrap();
    assert_eq!(args.query.as_deref(), Some("workflow:clearauth"));
  }

  #[test]
  fn test_job_arguments() {
    let args = Args::try_parse_from(["alfred-utils", "update"]).unwrap();
    assert_eq!(args.command, Some(Command::Update));
    assert_eq!(args.query, None);

    let args = Args::try_parse_from(["alfred-utils", "refresh"]).unwrap();
    assert_eq!(args.command, Some(Command::Refresh));
  }

  #[test]
  fn test_query_may_start_with_dash() {
    let args = Args::try_parse_from(["alfred-utils", "--query", "-foo"]).unwrap();
    assert_eq!(args.query.as_deref(), Some("-foo"));
  }
}

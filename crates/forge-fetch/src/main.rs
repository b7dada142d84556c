//! Forge fetcher (forgefetch)

use anyhow::Context;
use clap::{Parser, Subcommand};
use forge_fetch::{Attrs, FetchSettings, Fetcher, GitHash, Locator};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forgefetch")]
#[command(about = "Fetch source trees from GitHub, GitLab and SourceHut", long_about = None)]
#[command(version)]
struct Cli {
    /// Override the cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the attributes of a locator as JSON
    Parse {
        /// Locator, e.g. github:owner/repo/main
        locator: String,
    },
    /// Fetch a locator into the tree store
    Fetch {
        locator: String,
        /// Branch or tag to use instead of the locator's
        #[arg(long = "ref", conflicts_with = "rev")]
        reference: Option<String>,
        /// Commit to use instead of the locator's
        #[arg(long)]
        rev: Option<String>,
        /// Previously locked attributes (JSON) the result must agree with
        #[arg(long)]
        lock: Option<String>,
    },
    /// Clone a locator with git
    Clone {
        locator: String,
        dest: PathBuf,
        #[arg(long = "ref", conflicts_with = "rev")]
        reference: Option<String>,
        #[arg(long)]
        rev: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = FetchSettings::load().context("failed to load settings")?;
    if let Some(dir) = cli.cache_dir {
        settings = settings.with_cache_dir(dir);
    }

    match cli.command {
        Commands::Parse { locator } => {
            let locator = Locator::parse(&locator)?;
            println!("{}", serde_json::to_string_pretty(locator.attrs())?);
        }
        Commands::Fetch {
            locator,
            reference,
            rev,
            lock,
        } => {
            let fetcher = Fetcher::from_settings(settings)?;
            let locator = with_overrides(&fetcher, &locator, reference, rev)?;

            let (accessor, final_locator) = fetcher.get_accessor(&locator)?;
            if let Some(lock) = lock {
                let attrs: Attrs =
                    serde_json::from_str(&lock).context("--lock must be a JSON object")?;
                let specified = fetcher.from_attrs(attrs)?;
                fetcher.check_locks(&specified, &final_locator)?;
            }

            let output = serde_json::json!({
                "locator": final_locator.attrs(),
                "url": final_locator.to_url(),
                "path": accessor.root().display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Clone {
            locator,
            dest,
            reference,
            rev,
        } => {
            let fetcher = Fetcher::from_settings(settings)?;
            let locator = with_overrides(&fetcher, &locator, reference, rev)?;
            fetcher.clone(&locator, &dest)?;
            println!("Cloned {} into {}", locator, dest.display());
        }
    }

    Ok(())
}

fn with_overrides(
    fetcher: &Fetcher,
    locator: &str,
    reference: Option<String>,
    rev: Option<String>,
) -> anyhow::Result<Locator> {
    let locator = fetcher.parse_from_url(locator)?;
    if reference.is_none() && rev.is_none() {
        return Ok(locator);
    }
    let rev = rev.as_deref().map(GitHash::parse).transpose()?;
    Ok(fetcher.apply_overrides(&locator, reference.as_deref(), rev)?)
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::settings::Overrides;

#[derive(Clone, Debug, Parser)]
#[command(name = "shardlift", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Args)]
pub struct GlobalArgs {
    /// TOML file with default settings.
    #[arg(long, global = true, env = "SHARDLIFT_CONFIG")]
    pub config: Option<PathBuf>,
    /// Jobs processed at the same time; each holds one extracted archive on disk.
    #[arg(short = 'j', long, global = true)]
    pub concurrency: Option<usize>,
    /// Directory under which per-job workspaces are created.
    #[arg(long, global = true)]
    pub staging_root: Option<PathBuf>,
    /// Append-only event log.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
    /// Process only the first few archives and skip uploads.
    #[arg(long, global = true)]
    pub dry_run: bool,
    #[arg(long, global = true, requires = "dry_run")]
    pub dry_run_limit: Option<usize>,
    #[arg(long, global = true, conflicts_with = "delete_archives")]
    pub keep_archives: bool,
    /// Delete each source archive once its contents are uploaded.
    #[arg(long, global = true)]
    pub delete_archives: bool,
    /// Hide the progress bar and print every event instead.
    #[arg(long, global = true)]
    pub no_progress: bool,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "m", name = "migrate", about = "Extract and upload archives from a local tree")]
    Migrate(MigrateArg),
    #[command(alias = "p", name = "pull", about = "Download a hub dataset, then extract and upload it")]
    Pull(PullArg),
}

#[derive(Clone, Debug, Args)]
pub struct MigrateArg {
    /// Root of the local tree to search.
    #[arg(long)]
    pub source_root: Option<PathBuf>,
    /// Glob relative to the source root.
    #[arg(long)]
    pub pattern: Option<String>,
    /// Remote prefix, for example `gs://bucket/datasets`.
    #[arg(long, short = 'd')]
    pub destination: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct PullArg {
    /// Dataset repository as `owner/name`.
    pub dataset: String,
    /// Base directory; files land in `<output-dir>/<name>/`.
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,
    /// Remote prefix. Without one the dataset is only downloaded.
    #[arg(long, short = 'd')]
    pub destination: Option<String>,
    #[arg(long, default_value = "main")]
    pub revision: String,
}

impl App {
    /// Values given on the command line, layered over the config file.
    pub fn overrides(&self) -> Overrides {
        let g = &self.global;
        let keep_archives = match (g.keep_archives, g.delete_archives) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };

        let mut overrides = Overrides {
            staging_root: g.staging_root.clone(),
            concurrency: g.concurrency,
            keep_archives,
            dry_run: g.dry_run.then_some(true),
            dry_run_limit: g.dry_run_limit,
            log_file: g.log_file.clone(),
            ..Overrides::default()
        };

        match &self.cmd {
            Commands::Migrate(arg) => {
                overrides.source_root = arg.source_root.clone();
                overrides.pattern = arg.pattern.clone();
                overrides.destination = arg.destination.clone();
            }
            Commands::Pull(arg) => {
                overrides.output_dir = arg.output_dir.clone();
                overrides.destination = arg.destination.clone();
            }
        }

        overrides
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        App::command().debug_assert();
    }

    #[test]
    fn migrate_flags_become_overrides() {
        let app = App::try_parse_from([
            "shardlift",
            "migrate",
            "--source-root",
            "/data/emilia",
            "--pattern",
            "Emilia/*/*/*.tar",
            "-d",
            "gs://bucket",
            "-j",
            "8",
            "--delete-archives",
        ])
        .unwrap();

        let overrides = app.overrides();
        assert_eq!(overrides.source_root, Some(PathBuf::from("/data/emilia")));
        assert_eq!(overrides.pattern.as_deref(), Some("Emilia/*/*/*.tar"));
        assert_eq!(overrides.destination.as_deref(), Some("gs://bucket"));
        assert_eq!(overrides.concurrency, Some(8));
        assert_eq!(overrides.keep_archives, Some(false));
        assert_eq!(overrides.dry_run, None);
    }

    #[test]
    fn pull_takes_dataset_and_output_dir() {
        let app = App::try_parse_from(["shardlift", "pull", "ai4bharat/Svarah", "-o", "/dl", "--dry-run"]).unwrap();

        let Commands::Pull(arg) = &app.cmd else {
            panic!("expected pull");
        };
        assert_eq!(arg.dataset, "ai4bharat/Svarah");
        assert_eq!(arg.revision, "main");
        let overrides = app.overrides();
        assert_eq!(overrides.output_dir, Some(PathBuf::from("/dl")));
        assert_eq!(overrides.dry_run, Some(true));
        assert_eq!(overrides.destination, None);
    }

    #[test]
    fn keep_and_delete_conflict() {
        let result = App::try_parse_from(["shardlift", "migrate", "--keep-archives", "--delete-archives"]);
        assert!(result.is_err());
    }
}

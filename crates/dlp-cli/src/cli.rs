use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dlp_core::{Compression, GroupOrdering, ShardNaming};

#[derive(Parser)]
#[command(name = "dlp-stream")]
#[command(about = "Stream new files through de-identification into windowed output shards", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: per-user config directory)
    #[arg(long, global = true, env = "DLP_STREAM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the input pattern and redact every new file
    Run(RunArgs),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Flags override the config file
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Project owning the templates
    #[arg(long, env = "DLP_PROJECT")]
    pub project: Option<String>,

    /// De-identify template name
    #[arg(long, env = "DLP_DEIDENTIFY_TEMPLATE")]
    pub deidentify_template: Option<String>,

    /// Inspect template name
    #[arg(long, env = "DLP_INSPECT_TEMPLATE")]
    pub inspect_template: Option<String>,

    /// Input file pattern (e.g. file:///data/in/*.txt)
    #[arg(long, env = "DLP_BUCKET_URL")]
    pub bucket_url: Option<String>,

    /// Output directory
    #[arg(long, env = "DLP_OUTPUT")]
    pub output: Option<String>,

    /// Chunk size in bytes
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds between listings
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    pub window: Option<u64>,

    /// Order of chunks inside a group (sequence, arrival)
    #[arg(long)]
    pub ordering: Option<GroupOrdering>,

    /// Input compression (auto, none, gzip, zstd)
    #[arg(long)]
    pub compression: Option<Compression>,

    /// Shard naming (key, windowed)
    #[arg(long)]
    pub naming: Option<ShardNaming>,

    /// Skip objects matching this glob (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// List once, drain every stage, then exit
    #[arg(long)]
    pub once: bool,

    /// Redact locally with built-in patterns instead of the remote service
    #[arg(long)]
    pub local_patterns: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the config file location
    Path,

    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "dlp-stream",
            "run",
            "--project",
            "acme",
            "--bucket-url",
            "/in/*.txt",
            "--naming",
            "windowed",
            "--compression",
            "gzip",
            "--exclude",
            "*.tmp",
            "--exclude",
            "_SUCCESS",
            "--once",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.project.as_deref(), Some("acme"));
                assert_eq!(args.bucket_url.as_deref(), Some("/in/*.txt"));
                assert_eq!(args.naming, Some(ShardNaming::Windowed));
                assert_eq!(args.compression, Some(Compression::Gzip));
                assert_eq!(args.exclude, vec!["*.tmp", "_SUCCESS"]);
                assert!(args.once);
                assert!(!args.local_patterns);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_rejects_unknown_naming() {
        assert!(Cli::try_parse_from(["dlp-stream", "run", "--naming", "random"]).is_err());
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["dlp-stream", "--config", "/etc/dlp.toml", "config", "show"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dlp.toml")));
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Show)));
    }
}

//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "recollect",
    version,
    about = "Hybrid keyword + semantic passage retrieval for a personal knowledge base",
    long_about = "Recollect ranks previously indexed document chunks against a natural-language \
                  query. Keyword and vector results are fused by rank, boosted for recency and \
                  named people, deduplicated, and reranked by a cross-encoder that keeps exact \
                  factual matches in place."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/recollect/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "fast")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search indexed chunks
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Disable the recency boost
        #[arg(long)]
        no_recency: bool,

        /// Force cross-encoder reranking on
        #[arg(long, conflicts_with = "no_rerank")]
        rerank: bool,

        /// Force cross-encoder reranking off
        #[arg(long)]
        no_rerank: bool,

        /// Candidates fetched from each index before reranking
        #[arg(long)]
        candidates: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Embed and index chunks from a JSON Lines file (one chunk per line)
    Index {
        /// Path to the chunks file
        input: PathBuf,
    },

    /// Remove chunks from both indices
    Remove {
        /// Chunk ids to remove
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show index sizes, identity table and reranker settings
    Stats,

    /// Show how a query is expanded and classified
    Classify {
        /// Query text
        query: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration and people file
    Init {
        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    /// Explicit reranker choice from `--rerank` / `--no-rerank`
    pub fn rerank_override(rerank: bool, no_rerank: bool) -> Option<bool> {
        match (rerank, no_rerank) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_arguments() {
        let cli = Cli::try_parse_from([
            "recollect",
            "search",
            "Jane's KTN",
            "-k",
            "5",
            "--no-rerank",
            "--profile",
            "fast",
        ])
        .unwrap();

        assert_eq!(cli.profile.as_deref(), Some("fast"));
        match cli.command {
            Commands::Search {
                query,
                top_k,
                rerank,
                no_rerank,
                ..
            } => {
                assert_eq!(query, "Jane's KTN");
                assert_eq!(top_k, Some(5));
                assert_eq!(Commands::rerank_override(rerank, no_rerank), Some(false));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rerank_flags_conflict() {
        assert!(
            Cli::try_parse_from(["recollect", "search", "q", "--rerank", "--no-rerank"]).is_err()
        );
        assert!(Cli::try_parse_from(["recollect", "remove"]).is_err());
    }
}

use crate::core::config::Thresholds;
use clap::{Parser, Subcommand};

/// satscope - Semantic discovery of associated text in constitutional corpora
#[derive(Parser, Debug)]
#[command(name = "satscope")]
#[command(about = "Discover and curate semantically associated text across a corpus of constitutions", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Threshold flags shared by commands that start or tune a session
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ThresholdArgs {
    /// Similarity threshold for the seed search [0.58, 0.90]
    #[arg(long)]
    pub search_threshold: Option<f32>,
    /// Similarity threshold for expansion [0.58, 0.90]
    #[arg(long)]
    pub mapping_threshold: Option<f32>,
    /// Similarity threshold for clustering candidates [0.60, 0.90]
    #[arg(long)]
    pub cluster_threshold: Option<f32>,
    /// Similarity threshold for clustering the accepted set [0.60, 0.90]
    #[arg(long)]
    pub review_threshold: Option<f32>,
}

impl ThresholdArgs {
    /// Overlay the flags that were given on top of `base`
    pub fn apply(&self, base: Thresholds) -> Thresholds {
        Thresholds {
            search: self.search_threshold.unwrap_or(base.search),
            mapping: self.mapping_threshold.unwrap_or(base.mapping),
            cluster: self.cluster_threshold.unwrap_or(base.cluster),
            review: self.review_threshold.unwrap_or(base.review),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize satscope (create data directories)
    Init {
        /// Custom base directory (default: ~/.satscope)
        #[arg(long)]
        base_dir: Option<String>,
    },
    /// Start a topic session: seed search, then cluster the candidates
    Start {
        /// Corpus model directory
        #[arg(long)]
        corpus: String,
        /// Topic key (4 to 10 letters or digits)
        #[arg(short, long)]
        key: String,
        /// Topic formulation to embed and search with
        #[arg(short, long, requires = "encodings", conflicts_with = "seed_segment")]
        formulation: Option<String>,
        /// JSON file mapping the sanitized formulation text to its embedding
        #[arg(long)]
        encodings: Option<String>,
        /// Seed the search with the embedding of an existing segment
        #[arg(long)]
        seed_segment: Option<String>,
        #[command(flatten)]
        thresholds: ThresholdArgs,
        /// Custom base directory (default: ~/.satscope)
        #[arg(long)]
        base_dir: Option<String>,
    },
    /// Record a review of the offered candidates and expand from the accepted ones
    Review {
        /// Topic key
        #[arg(short, long)]
        key: String,
        /// Corpus model directory
        #[arg(long)]
        corpus: String,
        /// Comma-separated segment ids to accept
        #[arg(short, long, value_delimiter = ',')]
        accept: Vec<String>,
        /// Comma-separated cluster numbers whose members are all accepted
        #[arg(long, value_delimiter = ',')]
        accept_cluster: Vec<usize>,
        /// Custom base directory (default: ~/.satscope)
        #[arg(long)]
        base_dir: Option<String>,
    },
    /// Re-cluster the accepted set (or the pending candidates) at a new threshold
    Recluster {
        /// Topic key
        #[arg(short, long)]
        key: String,
        /// Corpus model directory
        #[arg(long)]
        corpus: String,
        /// Threshold to cluster with (default: the session's review or cluster threshold)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Cluster the pending candidates instead of the accepted set
        #[arg(long)]
        pending: bool,
        /// Custom base directory (default: ~/.satscope)
        #[arg(long)]
        base_dir: Option<String>,
    },
    /// Finalize a session and export its accepted segments
    Accept {
        /// Topic key
        #[arg(short, long)]
        key: String,
        /// Corpus model directory
        #[arg(long)]
        corpus: String,
        /// Human-readable topic label
        #[arg(short, long)]
        label: String,
        /// Topic description
        #[arg(short, long)]
        description: String,
        /// Comma-separated accepted segment ids to drop at final review
        #[arg(short, long, value_delimiter = ',')]
        remove: Vec<String>,
        /// Custom base directory (default: ~/.satscope)
        #[arg(long)]
        base_dir: Option<String>,
    },
    /// Show a session, or list all sessions when no key is given
    Show {
        /// Topic key
        #[arg(short, long)]
        key: Option<String>,
        /// Custom base directory (default: ~/.satscope)
        #[arg(long)]
        base_dir: Option<String>,
    },
}

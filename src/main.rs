use anyhow::{bail, Context};
use clap::Parser;
use satscope::core::config::Config;
use satscope::core::error::Error;
use satscope::indexing::corpus::CorpusIndex;
use satscope::indexing::loader::load_corpus;
use satscope::search::cluster::{cluster, ClusterAssignment, ClusterLabel};
use satscope::search::encoder::PrecomputedEncoder;
use satscope::search::engine::{search, search_formulation};
use satscope::session::ledger::accept;
use satscope::session::state::{normalize_topic_key, SessionState};
use satscope::storage::export::export_session;
use satscope::storage::sessions::SessionStore;
use satscope::ui::cli::{Cli, Commands, ThresholdArgs};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Characters of segment text shown next to each clustered id
const PREVIEW_CHARS: usize = 80;

/// How many ingest problems to print before summarizing the rest
const MAX_REPORTED_ISSUES: usize = 10;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { base_dir } => handle_init(base_dir.as_deref()),
        Commands::Start {
            corpus,
            key,
            formulation,
            encodings,
            seed_segment,
            thresholds,
            base_dir,
        } => {
            let seed = match (formulation, encodings, seed_segment) {
                (Some(text), Some(encodings), None) => Seed::Formulation { text, encodings },
                (None, _, Some(id)) => Seed::Segment(id),
                _ => bail!("Provide --formulation with --encodings, or --seed-segment"),
            };
            handle_start(base_dir.as_deref(), &corpus, &key, seed, &thresholds)
        }
        Commands::Review {
            key,
            corpus,
            accept,
            accept_cluster,
            base_dir,
        } => handle_review(base_dir.as_deref(), &key, &corpus, accept, &accept_cluster),
        Commands::Recluster {
            key,
            corpus,
            threshold,
            pending,
            base_dir,
        } => handle_recluster(base_dir.as_deref(), &key, &corpus, threshold, pending),
        Commands::Accept {
            key,
            corpus,
            label,
            description,
            remove,
            base_dir,
        } => handle_accept(base_dir.as_deref(), &key, &corpus, &label, &description, remove),
        Commands::Show { key, base_dir } => handle_show(base_dir.as_deref(), key.as_deref()),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("satscope=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Where the seed search query comes from
enum Seed {
    Formulation { text: String, encodings: String },
    Segment(String),
}

fn handle_init(base_dir: Option<&str>) -> anyhow::Result<()> {
    println!("Initializing satscope...");

    let config = Config::new(base_dir.map(PathBuf::from))?;

    if config.is_initialized() {
        println!("satscope is already initialized at: {:?}", config.base_dir);
        println!("To reinitialize, delete the directory and run 'init' again.");
        return Ok(());
    }

    config.init()?;
    println!("✓ Created configuration directory: {:?}", config.base_dir);
    println!("✓ Created database directory: {:?}", config.database_dir);
    println!("✓ Created outputs directory: {:?}", config.outputs_dir);

    println!("\nInitialization complete!");
    println!("Next steps:");
    println!("  1. Start a topic:");
    println!("     satscope start --corpus /path/to/model --key speech --seed-segment <ID>");
    println!("  2. Review candidates:");
    println!("     satscope review --key speech --corpus /path/to/model --accept <IDS>");

    Ok(())
}

fn handle_start(
    base_dir: Option<&str>,
    corpus_dir: &str,
    key: &str,
    seed: Seed,
    threshold_args: &ThresholdArgs,
) -> anyhow::Result<()> {
    let config = open_config(base_dir)?;
    let store = SessionStore::open(&config)?;
    let corpus = load(corpus_dir)?;
    let thresholds = threshold_args.apply(config.thresholds()?);
    thresholds.validate()?;

    let (formulation, candidates) = match seed {
        Seed::Formulation { text, encodings } => {
            let encoder = PrecomputedEncoder::from_file(Path::new(&encodings))?;
            let result = search_formulation(&encoder, &text, &corpus, thresholds.search)?;
            if result.formulation.changed {
                println!(
                    "⚠ The topic formulation was sanitized. Please check it: {}",
                    result.formulation.value
                );
            }
            (result.formulation.value, result.found)
        }
        Seed::Segment(id) => {
            let query = corpus.embedding(&id)?;
            let found = search(query, &corpus, thresholds.search)?;
            (format!("segment {}", id), found)
        }
    };

    let mut session = SessionState::new(key, &formulation, thresholds, corpus.fingerprint())?;
    session.offer(candidates);
    store.start(&session)?;

    println!(
        "Started session '{}' for \"{}\": {} candidates at search threshold {:.2}",
        session.topic_key,
        session.formulation,
        session.pending.len(),
        thresholds.search
    );

    if session.pending.is_empty() {
        println!("\nNo segments matched. Try a lower --search-threshold or another formulation.");
        return Ok(());
    }

    let clusters = cluster(&session.pending, &corpus, thresholds.cluster)?;
    print_clusters(&clusters, &corpus);
    print_review_hint(&session.topic_key);
    Ok(())
}

fn handle_review(
    base_dir: Option<&str>,
    key: &str,
    corpus_dir: &str,
    accept_ids: Vec<String>,
    accept_clusters: &[usize],
) -> anyhow::Result<()> {
    let config = open_config(base_dir)?;
    let store = SessionStore::open(&config)?;
    let mut session = load_session(&store, key)?;
    let corpus = load(corpus_dir)?;
    session.check_corpus(&corpus)?;

    let mut selected: BTreeSet<String> = accept_ids.into_iter().collect();
    if !accept_clusters.is_empty() {
        let clusters = cluster(&session.pending, &corpus, session.thresholds.cluster)?;
        for &number in accept_clusters {
            let members = clusters
                .get(ClusterLabel::Numbered(number))
                .with_context(|| format!("No cluster {} among the pending candidates", number))?;
            selected.extend(members.iter().map(|m| m.id.clone()));
        }
    }

    session.record_review(&selected)?;
    println!(
        "Review {} recorded: {} accepted so far, {} rejected",
        session.iteration,
        session.accepted.len(),
        session.rejected.len()
    );

    if session.is_exhausted() {
        store.save(&session)?;
        println!("\nNo candidates were accepted; nothing left to expand.");
        print_accept_hint(&session.topic_key);
        return Ok(());
    }

    session.expand_next(&corpus)?;
    store.save(&session)?;

    if session.pending.is_empty() {
        println!(
            "\nExpansion found no new candidates at mapping threshold {:.2}.",
            session.thresholds.mapping
        );
        print_accept_hint(&session.topic_key);
        return Ok(());
    }

    println!(
        "\n{} new candidates at mapping threshold {:.2}",
        session.pending.len(),
        session.thresholds.mapping
    );
    let clusters = cluster(&session.pending, &corpus, session.thresholds.cluster)?;
    print_clusters(&clusters, &corpus);
    print_review_hint(&session.topic_key);
    Ok(())
}

fn handle_recluster(
    base_dir: Option<&str>,
    key: &str,
    corpus_dir: &str,
    threshold: Option<f32>,
    pending: bool,
) -> anyhow::Result<()> {
    let config = open_config(base_dir)?;
    let store = SessionStore::open(&config)?;
    let mut session = load_session(&store, key)?;
    let corpus = load(corpus_dir)?;
    session.check_corpus(&corpus)?;

    let (ids, threshold, what) = if pending {
        let threshold = threshold.unwrap_or(session.thresholds.cluster);
        (&session.pending, threshold, "pending candidates")
    } else {
        let threshold = threshold.unwrap_or(session.thresholds.review);
        (&session.accepted, threshold, "accepted segments")
    };

    let clusters = cluster(ids, &corpus, threshold)?;
    println!("{} {} clustered at threshold {:.2}", ids.len(), what, threshold);
    print_clusters(&clusters, &corpus);

    // Keep the threshold so cluster numbers stay valid for the next review
    if pending {
        session.thresholds.cluster = threshold;
    } else {
        session.thresholds.review = threshold;
    }
    store.save(&session)?;
    Ok(())
}

fn handle_accept(
    base_dir: Option<&str>,
    key: &str,
    corpus_dir: &str,
    label: &str,
    description: &str,
    remove: Vec<String>,
) -> anyhow::Result<()> {
    let config = open_config(base_dir)?;
    let store = SessionStore::open(&config)?;
    let session = load_session(&store, key)?;
    let corpus = load(corpus_dir)?;
    session.check_corpus(&corpus)?;

    let remove: BTreeSet<String> = remove.into_iter().collect();
    if let Some(stray) = remove.iter().find(|id| !session.accepted.contains(*id)) {
        let message = format!("Segment {} is not in the accepted set", stray);
        return Err(Error::Validation(message).into());
    }
    let final_accepted: BTreeSet<String> = session.accepted.difference(&remove).cloned().collect();

    let acceptance = accept(
        &session,
        &corpus,
        label,
        description,
        &final_accepted,
        &session.accepted,
    )?;
    store.finalize(&acceptance.record)?;
    let paths = export_session(&acceptance.record, &corpus, &config.outputs_dir)
        .context("Session was finalized but exporting it failed")?;

    let record = &acceptance.record;
    println!("✓ Finalized session '{}' ({})", record.topic_key, record.topic_label);
    println!("  Accepted: {} segments", record.accepted.len());
    if !record.removed.is_empty() {
        println!("  Removed at final review: {} segments", record.removed.len());
    }
    println!("  Iterations: {}", record.iterations);
    println!("✓ Wrote {}", paths.csv.display());
    println!("✓ Wrote {}", paths.resource.display());

    if acceptance.label_sanitized {
        println!("\n⚠ The topic label was sanitized. Please check it: {}", record.topic_label);
    }
    if acceptance.description_sanitized {
        println!(
            "⚠ The topic description was sanitized. Please check it: {}",
            record.topic_description
        );
    }
    Ok(())
}

fn handle_show(base_dir: Option<&str>, key: Option<&str>) -> anyhow::Result<()> {
    let config = open_config(base_dir)?;
    let store = SessionStore::open(&config)?;

    let Some(key) = key else {
        let (live, finalized) = store.list()?;
        if live.is_empty() && finalized.is_empty() {
            println!("No sessions yet.");
            return Ok(());
        }
        println!("Live sessions ({}):", live.len());
        for key in &live {
            println!("  {}", key);
        }
        println!("Finalized sessions ({}):", finalized.len());
        for key in &finalized {
            println!("  {}", key);
        }
        return Ok(());
    };

    let key = normalize_topic_key(key)?;
    if let Some(session) = store.get_session(&key)? {
        println!("Session '{}' (live)", session.topic_key);
        println!("  Formulation: {}", session.formulation);
        println!(
            "  Thresholds: search {:.2}, mapping {:.2}, cluster {:.2}, review {:.2}",
            session.thresholds.search,
            session.thresholds.mapping,
            session.thresholds.cluster,
            session.thresholds.review
        );
        println!("  Reviews: {}", session.iteration);
        println!("  Accepted: {}", session.accepted.len());
        println!("  Rejected: {}", session.rejected.len());
        println!("  Frontier: {}", session.frontier.len());
        println!("  Pending: {}", session.pending.len());
        if session.is_exhausted() {
            println!("  Exhausted: nothing left to review");
        }
        return Ok(());
    }

    if let Some(record) = store.get_record(&key)? {
        println!("Session '{}' (finalized)", record.topic_key);
        println!("  Label: {}", record.topic_label);
        println!("  Description: {}", record.topic_description);
        println!("  Formulation: {}", record.formulation);
        println!("  Iterations: {}", record.iterations);
        println!("  Accepted ({}):", record.accepted.len());
        for segment in &record.accepted {
            println!("    {:<16} {}", segment.id, preview(&segment.text));
        }
        if !record.removed.is_empty() {
            println!("  Removed ({}):", record.removed.len());
            for segment in &record.removed {
                println!("    {:<16} {}", segment.id, preview(&segment.text));
            }
        }
        return Ok(());
    }

    Err(Error::Configuration(format!("No session with topic key {}", key)).into())
}

fn open_config(base_dir: Option<&str>) -> anyhow::Result<Config> {
    let config = Config::new(base_dir.map(PathBuf::from))?;
    config.require_initialized()?;
    Ok(config)
}

fn load(corpus_dir: &str) -> anyhow::Result<CorpusIndex> {
    let loaded = load_corpus(Path::new(corpus_dir))
        .with_context(|| format!("Failed to load corpus from {}", corpus_dir))?;

    if !loaded.issues.is_empty() {
        eprintln!("⚠ {} corpus items had problems:", loaded.issues.len());
        for issue in loaded.issues.iter().take(MAX_REPORTED_ISSUES) {
            eprintln!("  {}", issue);
        }
        if loaded.issues.len() > MAX_REPORTED_ISSUES {
            eprintln!("  ... and {} more", loaded.issues.len() - MAX_REPORTED_ISSUES);
        }
    }
    Ok(loaded.index)
}

fn load_session(store: &SessionStore, key: &str) -> anyhow::Result<SessionState> {
    let key = normalize_topic_key(key)?;
    if let Some(session) = store.get_session(&key)? {
        return Ok(session);
    }
    if store.get_record(&key)?.is_some() {
        bail!("Session {} is already finalized", key);
    }
    Err(Error::Configuration(format!("No session with topic key {}", key)).into())
}

fn print_clusters(clusters: &ClusterAssignment, corpus: &CorpusIndex) {
    for (label, members) in clusters.iter() {
        match label {
            ClusterLabel::Numbered(_) => {
                println!("\nCluster {} ({} segments)", label, members.len())
            }
            ClusterLabel::Singletons => println!("\nSingletons ({} segments)", members.len()),
        }
        for member in members {
            let text = corpus.text(&member.id).unwrap_or_default();
            println!("  {:<16} {:>3}  {}", member.id, member.degree, preview(text));
        }
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

fn print_review_hint(key: &str) {
    println!(
        "\nNext: satscope review --key {} --corpus <DIR> --accept <IDS> [--accept-cluster <N,...>]",
        key
    );
}

fn print_accept_hint(key: &str) {
    println!(
        "Next: satscope accept --key {} --corpus <DIR> --label <LABEL> --description <TEXT>",
        key
    );
}

use satscope::session::ledger::SegmentText;
use satscope::{
    accept, cluster, export_session, load_corpus, search, search_formulation, ClusterLabel, Config,
    CorpusIndex, Error, PrecomputedEncoder, Result, SessionState, SessionStore, Thresholds,
};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn at(degrees: f32) -> Vec<f32> {
    let r = degrees.to_radians();
    vec![r.cos(), r.sin()]
}

fn thresholds() -> Thresholds {
    Thresholds {
        search: 0.85,
        mapping: 0.78,
        cluster: 0.72,
        review: 0.74,
    }
}

/// Write a five-segment corpus model directory
fn write_corpus(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let write = |name: &str, value: serde_json::Value| fs::write(dir.join(name), value.to_string());

    write("encoded_segments.json", json!(["ca/1", "ca/2", "fr/1", "ca/3", "fr/2"]))?;
    write(
        "segment_encodings.json",
        json!([at(0.0), at(10.0), at(25.0), at(45.0), at(90.0)]),
    )?;
    write(
        "segments_dict.json",
        json!({
            "ca/1": {"text": "Everyone has the following fundamental freedoms: freedom of expression"},
            "ca/2": {"text": "Freedom of the press and other media of communication"},
            "fr/1": {"text": "La libre communication des pensées et des opinions"},
            "ca/3": {"text": "Freedom of peaceful assembly"},
            "fr/2": {"text": "Le Président de la République veille au respect de la Constitution"}
        }),
    )?;
    write(
        "documents_dict.json",
        json!({
            "ca": {"name": "Canada 1867 (rev. 2011)", "year": 2011},
            "fr": {"name": "France 1958 (rev. 2008)"}
        }),
    )?;
    Ok(())
}

struct Workspace {
    _temp_dir: TempDir,
    config: Config,
    corpus: CorpusIndex,
}

fn workspace() -> Result<Workspace> {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::new(Some(temp_dir.path().join("test_satscope")))?;
    config.init()?;

    let model_dir = temp_dir.path().join("model");
    write_corpus(&model_dir)?;
    let loaded = load_corpus(&model_dir)?;
    assert!(loaded.issues.is_empty());

    Ok(Workspace {
        _temp_dir: temp_dir,
        config,
        corpus: loaded.index,
    })
}

fn new_session(corpus: &CorpusIndex) -> Result<SessionState> {
    SessionState::new("Speech", "freedom of expression", thresholds(), corpus.fingerprint())
}

/// Seed from ca/1 and record one review accepting ca/1 and ca/2
fn reviewed_session(corpus: &CorpusIndex) -> Result<SessionState> {
    let mut session = new_session(corpus)?;
    let seed = search(corpus.embedding("ca/1")?, corpus, session.thresholds.search)?;
    session.offer(seed);
    session.record_review(&set(&["ca/1", "ca/2"]))?;
    Ok(session)
}

#[test]
fn test_full_session_workflow() -> Result<()> {
    let ws = workspace()?;
    let corpus = &ws.corpus;
    let store = SessionStore::open(&ws.config)?;

    // Seed search
    let mut session = new_session(corpus)?;
    let seed = search(corpus.embedding("ca/1")?, corpus, session.thresholds.search)?;
    assert_eq!(seed, set(&["ca/1", "ca/2", "fr/1"]));
    session.offer(seed);
    store.start(&session)?;

    // Candidates form one cluster
    let clusters = cluster(&session.pending, corpus, session.thresholds.cluster)?;
    assert_eq!(clusters.cluster_count(), 1);
    assert!(clusters.singletons().is_empty());
    let members = clusters.get(ClusterLabel::Numbered(0)).unwrap();
    assert_eq!(members.len(), 3);

    // First review: keep the Canadian segments, reject the French one
    session.record_review(&set(&["ca/1", "ca/2"]))?;
    session.expand_next(corpus)?;
    assert_eq!(session.pending, set(&["ca/3"]));
    store.save(&session)?;

    // The store survives a reopen
    drop(store);
    let store = SessionStore::open(&ws.config)?;
    let mut session = store.get_session("speech")?.unwrap();
    assert_eq!(session.rejected, set(&["fr/1"]));

    // Second review: accept the expansion candidate; nothing new is reachable
    session.record_review(&set(&["ca/3"]))?;
    assert!(session.expand_next(corpus)?.is_empty());
    assert!(session.is_exhausted());
    assert_eq!(session.accepted, set(&["ca/1", "ca/2", "ca/3"]));
    assert_eq!(session.iteration, 2);
    store.save(&session)?;

    // Final review clustering of the accepted set
    let review = cluster(&session.accepted, corpus, session.thresholds.review)?;
    assert_eq!(review.ids(), session.accepted);

    // Finalize, dropping ca/2
    let final_accepted = set(&["ca/1", "ca/3"]);
    let acceptance = accept(
        &session,
        corpus,
        "Freedom of expression",
        "Speech, press and assembly",
        &final_accepted,
        &session.accepted,
    )?;
    assert!(!acceptance.label_sanitized);
    assert!(!acceptance.description_sanitized);

    let record = acceptance.record;
    assert_eq!(record.accepted_ids(), final_accepted);
    assert_eq!(
        record.removed,
        vec![SegmentText {
            id: "ca/2".to_string(),
            text: "Freedom of the press and other media of communication".to_string(),
        }]
    );

    store.finalize(&record)?;
    assert!(store.get_session("speech")?.is_none());
    assert_eq!(store.get_record("speech")?, Some(record.clone()));

    let paths = export_session(&record, corpus, &ws.config.outputs_dir)?;
    let csv = fs::read_to_string(&paths.csv)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "Section ID,Section text,Constitution");
    assert_eq!(
        lines[1],
        "ca/1,Everyone has the following fundamental freedoms: freedom of expression,Canada 1867 (rev. 2011)"
    );
    assert_eq!(lines[2], "ca/3,Freedom of peaceful assembly,Canada 1867 (rev. 2011)");

    let resource: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.resource)?).unwrap();
    assert_eq!(resource["topic_key"], "speech");
    assert_eq!(resource["removed"][0]["id"], "ca/2");

    Ok(())
}

#[test]
fn test_empty_label_writes_nothing() -> Result<()> {
    let ws = workspace()?;
    let corpus = &ws.corpus;
    let store = SessionStore::open(&ws.config)?;

    let session = reviewed_session(corpus)?;
    store.start(&session)?;

    let all = &session.accepted;
    let result = accept(&session, corpus, "   ", "Speech provisions", all, all);
    assert!(matches!(result, Err(Error::Validation(_))));

    assert!(store.get_record("speech")?.is_none());
    assert!(store.get_session("speech")?.is_some());
    assert_eq!(fs::read_dir(&ws.config.outputs_dir)?.count(), 0);
    Ok(())
}

#[test]
fn test_changed_corpus_is_detected() -> Result<()> {
    let ws = workspace()?;
    let mut session = reviewed_session(&ws.corpus)?;

    let other = CorpusIndex::new(vec!["ca/1".into(), "ca/2".into()], vec![at(0.0), at(10.0)])?;
    assert!(matches!(session.expand_next(&other), Err(Error::Configuration(_))));
    Ok(())
}

#[test]
fn test_finalized_session_cannot_restart() -> Result<()> {
    let ws = workspace()?;
    let corpus = &ws.corpus;
    let store = SessionStore::open(&ws.config)?;

    let session = reviewed_session(corpus)?;
    store.start(&session)?;
    let all = &session.accepted;
    let acceptance = accept(&session, corpus, "Speech", "Speech provisions", all, all)?;
    store.finalize(&acceptance.record)?;

    let again = SessionState::new("speech", "free speech", thresholds(), corpus.fingerprint())?;
    assert!(matches!(store.start(&again), Err(Error::Validation(_))));
    assert!(store.finalize(&acceptance.record).is_err());

    let (live, finalized) = store.list()?;
    assert!(live.is_empty());
    assert_eq!(finalized, vec!["speech".to_string()]);
    Ok(())
}

#[test]
fn test_stored_formulation_is_the_embedded_one() -> Result<()> {
    let ws = workspace()?;
    let corpus = &ws.corpus;
    let store = SessionStore::open(&ws.config)?;

    let sanitized = "Free &lt;i&gt;speech";
    let encoder = PrecomputedEncoder::new(HashMap::from([(sanitized.to_string(), at(0.0))]));

    let result = search_formulation(&encoder, "  Free <i>speech ", corpus, 0.85)?;
    assert!(result.formulation.changed);
    assert_eq!(result.formulation.value, sanitized);
    assert_eq!(result.found, set(&["ca/1", "ca/2", "fr/1"]));

    let mut session = SessionState::new(
        "Speech",
        &result.formulation.value,
        thresholds(),
        corpus.fingerprint(),
    )?;
    assert_eq!(session.formulation, sanitized);
    session.offer(result.found);
    store.start(&session)?;
    session.record_review(&set(&["ca/1"]))?;

    let all = &session.accepted;
    let acceptance = accept(&session, corpus, "Speech", "Speech provisions", all, all)?;
    assert_eq!(acceptance.record.formulation, sanitized);
    store.finalize(&acceptance.record)?;
    assert_eq!(store.get_record("speech")?.unwrap().formulation, sanitized);
    Ok(())
}

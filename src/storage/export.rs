use crate::core::error::{Error, Result};
use crate::indexing::corpus::CorpusIndex;
use crate::session::ledger::SessionRecord;
use std::path::{Path, PathBuf};

const CSV_HEADER: [&str; 3] = ["Section ID", "Section text", "Constitution"];

/// Files written for one finalized session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub resource: PathBuf,
}

/// Write `<key>_final_SAT.csv` and `<key>_resource.json` into `outputs_dir`
pub fn export_session(
    record: &SessionRecord,
    corpus: &CorpusIndex,
    outputs_dir: &Path,
) -> Result<ExportPaths> {
    std::fs::create_dir_all(outputs_dir)?;

    let csv_path = outputs_dir.join(format!("{}_final_SAT.csv", record.topic_key));
    std::fs::write(&csv_path, render_csv(record, corpus))?;

    let resource_path = outputs_dir.join(format!("{}_resource.json", record.topic_key));
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Parsing(format!("Failed to serialize session record: {}", e)))?;
    std::fs::write(&resource_path, json)?;

    tracing::info!(
        topic = %record.topic_key,
        csv = %csv_path.display(),
        resource = %resource_path.display(),
        "session exported"
    );

    Ok(ExportPaths {
        csv: csv_path,
        resource: resource_path,
    })
}

/// One row per accepted segment: id, text, and source document name
pub fn render_csv(record: &SessionRecord, corpus: &CorpusIndex) -> String {
    let mut out = String::new();
    push_row(&mut out, &CSV_HEADER);
    for segment in &record.accepted {
        let document = corpus
            .document_for(&segment.id)
            .map(|d| d.name.as_str())
            .unwrap_or_default();
        push_row(&mut out, &[&segment.id, &segment.text, document]);
    }
    out
}

fn push_row(out: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|f| quote_field(f)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

/// Quote a CSV field when it contains a delimiter, quote, or line break
fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Thresholds;
    use crate::indexing::corpus::Document;
    use crate::session::ledger::SegmentText;
    use tempfile::TempDir;

    fn corpus() -> CorpusIndex {
        CorpusIndex::new(
            vec!["ca/1".into(), "fr/1".into()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap()
        .with_documents(vec![Document {
            id: "ca".into(),
            name: "Canada 1867 (rev. 2011)".into(),
            metadata: Default::default(),
        }])
    }

    fn record() -> SessionRecord {
        SessionRecord {
            topic_key: "speech".to_string(),
            topic_label: "Speech".to_string(),
            topic_description: "Free speech provisions".to_string(),
            formulation: "free speech".to_string(),
            thresholds: Thresholds::default(),
            corpus_fingerprint: "abc".to_string(),
            accepted: vec![
                SegmentText {
                    id: "ca/1".to_string(),
                    text: "Everyone has freedom of thought, belief, and \"expression\"".to_string(),
                },
                SegmentText {
                    id: "fr/1".to_string(),
                    text: "Liberté".to_string(),
                },
            ],
            removed: vec![],
            iterations: 1,
            started_at: 10,
            ended_at: 20,
        }
    }

    #[test]
    fn test_render_csv() {
        let csv = render_csv(&record(), &corpus());
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "Section ID,Section text,Constitution");
        assert_eq!(
            lines[1],
            "ca/1,\"Everyone has freedom of thought, belief, and \"\"expression\"\"\",Canada 1867 (rev. 2011)"
        );
        // No document entry for "fr": empty name column
        assert_eq!(lines[2], "fr/1,Liberté,");
    }

    #[test]
    fn test_export_session() {
        let temp_dir = TempDir::new().unwrap();
        let outputs = temp_dir.path().join("outputs");
        let paths = export_session(&record(), &corpus(), &outputs).unwrap();

        assert!(paths.csv.ends_with("speech_final_SAT.csv"));
        assert!(paths.resource.ends_with("speech_resource.json"));

        let json = std::fs::read_to_string(&paths.resource).unwrap();
        let restored: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, record());
    }
}

use crate::batch::ReportSet;
use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub const ARCHIVE_MIME: &str = "application/zip";
pub const DEFAULT_ARCHIVE_NAME: &str = "feedback_reports.zip";

pub fn entry_name(student_id: &str) -> String {
    format!("feedback_{student_id}.txt")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub entry_count: usize,
    pub byte_len: usize,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct PackagedArchive {
    pub bytes: Vec<u8>,
    pub summary: ArchiveSummary,
}

/// Zips one text file per report, entirely in memory.
///
/// Entry timestamps are pinned to the zip epoch, so the same reports always
/// produce the same bytes.
pub fn package_reports(set: &ReportSet) -> Result<PackagedArchive> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    for (student_id, report) in &set.reports {
        zip.start_file(entry_name(student_id), opts)?;
        zip.write_all(report.text().as_bytes())?;
    }
    let bytes = zip.finish()?.into_inner();

    let sha256 = Sha256::digest(&bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    let summary = ArchiveSummary {
        entry_count: set.len(),
        byte_len: bytes.len(),
        sha256,
    };
    tracing::debug!(
        entries = summary.entry_count,
        bytes = summary.byte_len,
        sha256 = %summary.sha256,
        "packaged feedback archive"
    );
    Ok(PackagedArchive { bytes, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::FeedbackBank;
    use crate::batch::{generate_reports, DuplicatePolicy};
    use crate::report::ReportMeta;
    use crate::roster::StudentRow;
    use serde_json::json;
    use std::io::Read;

    fn reports() -> ReportSet {
        let bank = FeedbackBank::from_value(&json!({
            "Q1_a": { "correct_choice_ID": "a", "Q_justifications": [["a", "yes"], ["b", "no"]] }
        }))
        .expect("bank");
        let rows = ["11", "12", "11"]
            .iter()
            .enumerate()
            .map(|(i, id)| StudentRow {
                row: i + 1,
                first_name: "F".to_string(),
                last_name: format!("L{i}"),
                student_id: id.to_string(),
                responses: "b".to_string(),
            })
            .collect::<Vec<_>>();
        generate_reports(&rows, &bank, &ReportMeta::default(), DuplicatePolicy::LastWins)
            .expect("generate")
    }

    #[test]
    fn one_entry_per_distinct_identifier() {
        let set = reports();
        let packed = package_reports(&set).expect("package");
        assert_eq!(packed.summary.entry_count, 2);

        let mut archive = zip::ZipArchive::new(Cursor::new(packed.bytes)).expect("open zip");
        assert_eq!(archive.len(), 2);
        let mut text = String::new();
        archive
            .by_name("feedback_11.txt")
            .expect("entry")
            .read_to_string(&mut text)
            .expect("read entry");
        assert_eq!(text, set.get("11").expect("report").text());
        assert!(text.contains("F L2"));
    }

    #[test]
    fn packaging_is_byte_stable() {
        let a = package_reports(&reports()).expect("package a");
        let b = package_reports(&reports()).expect("package b");
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.summary.sha256, b.summary.sha256);
        assert_eq!(a.summary.sha256.len(), 64);
    }

    #[test]
    fn empty_set_is_a_valid_archive() {
        let packed = package_reports(&ReportSet::default()).expect("package");
        let archive = zip::ZipArchive::new(Cursor::new(packed.bytes)).expect("open zip");
        assert_eq!(archive.len(), 0);
    }
}

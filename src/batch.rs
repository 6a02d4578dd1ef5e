use crate::bank::FeedbackBank;
use crate::error::{FeedbackError, Result};
use crate::report::{build_report, OutcomeCounts, Report, ReportMeta};
use crate::roster::StudentRow;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;

/// What to do when two roster rows share a student identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    /// Later row replaces the earlier report.
    #[default]
    LastWins,
    /// Abort the batch.
    Reject,
}

impl DuplicatePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicatePolicy::LastWins => "lastWins",
            DuplicatePolicy::Reject => "reject",
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lastwins" | "last_wins" | "last-wins" => Ok(DuplicatePolicy::LastWins),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(format!(
                "duplicate policy must be one of: lastWins, reject (got {other:?})"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Duplicate {
    pub student_id: String,
    pub replaced_row: usize,
    pub kept_row: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub rows: usize,
    pub students: usize,
    pub counts: OutcomeCounts,
    pub duplicates: Vec<Duplicate>,
}

/// Reports keyed by student identifier, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct ReportSet {
    pub reports: IndexMap<String, Report>,
    pub summary: BatchSummary,
}

impl ReportSet {
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn get(&self, student_id: &str) -> Option<&Report> {
        self.reports.get(student_id)
    }
}

/// Builds every student's report.
///
/// Reports are built independently (and in parallel); the bank and metadata
/// are only read.
pub fn generate_reports(
    rows: &[StudentRow],
    bank: &FeedbackBank,
    meta: &ReportMeta,
    policy: DuplicatePolicy,
) -> Result<ReportSet> {
    let built: Vec<Report> = rows
        .par_iter()
        .map(|row| build_report(row, bank, meta))
        .collect();

    let mut reports: IndexMap<String, Report> = IndexMap::with_capacity(rows.len());
    let mut holder_row: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut summary = BatchSummary {
        rows: rows.len(),
        ..BatchSummary::default()
    };

    for (row, report) in rows.iter().zip(built) {
        match holder_row.entry(row.student_id.clone()) {
            Entry::Vacant(v) => {
                v.insert(row.row);
            }
            Entry::Occupied(mut o) => {
                let earlier = *o.get();
                if policy == DuplicatePolicy::Reject {
                    return Err(FeedbackError::DuplicateIdentifier {
                        id: row.student_id.clone(),
                        first_row: earlier,
                        second_row: row.row,
                    });
                }
                tracing::warn!(
                    student_id = %row.student_id,
                    replaced_row = earlier,
                    kept_row = row.row,
                    "duplicate student identifier; keeping the later row"
                );
                summary.duplicates.push(Duplicate {
                    student_id: row.student_id.clone(),
                    replaced_row: earlier,
                    kept_row: row.row,
                });
                o.insert(row.row);
            }
        }
        reports.insert(report.student_id().to_string(), report);
    }

    for report in reports.values() {
        summary.counts.add(&report.counts());
    }
    summary.students = reports.len();

    tracing::debug!(
        rows = summary.rows,
        students = summary.students,
        duplicates = summary.duplicates.len(),
        questions = summary.counts.total(),
        "generated feedback reports"
    );

    Ok(ReportSet { reports, summary })
}

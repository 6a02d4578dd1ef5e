use crate::archive::{self, ARCHIVE_MIME};
use crate::bank::FeedbackBank;
use crate::batch::{self, DuplicatePolicy, ReportSet};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report::{Outcome, QuestionBlock, ReportMeta};
use crate::roster::{self, StudentRow};
use anyhow::Context;
use serde_json::{json, Value};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))
}

fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn source_object<'a>(params: &'a Value, key: &str) -> Result<&'a Value, HandlerErr> {
    params
        .get(key)
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing params.{key}")))
}

fn load_roster(params: &Value) -> Result<Vec<StudentRow>, HandlerErr> {
    let src = source_object(params, "roster")?;
    if let Some(rows) = src.get("rows") {
        return Ok(roster::parse_json_rows(rows)?);
    }
    if let Some(csv) = opt_str(src, "csv") {
        return Ok(roster::parse_csv(csv)?);
    }
    if let Some(path) = opt_str(src, "path") {
        let path = PathBuf::from(path);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if ext == "xlsx" {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.to_string_lossy()))
                .map_err(HandlerErr::io)?;
            return Ok(roster::parse_xlsx(&bytes)?);
        }
        let text = read_text(&path).map_err(HandlerErr::io)?;
        if ext == "json" {
            let v: Value = serde_json::from_str(&text).map_err(|e| HandlerErr {
                code: "format_error",
                message: format!("roster is not JSON: {e}"),
                details: None,
            })?;
            return Ok(roster::parse_json_rows(&v)?);
        }
        return Ok(roster::parse_csv(&text)?);
    }
    Err(HandlerErr::bad_params(
        "params.roster needs one of: rows, csv, path",
    ))
}

/// `{ "path": .. }` and `{ "json": ".." }` name a source; any other object is
/// the definition itself.
fn load_bank(params: &Value) -> Result<FeedbackBank, HandlerErr> {
    let src = source_object(params, "feedback")?;
    let single = src.as_object().filter(|o| o.len() == 1);
    if let Some(path) = single.and_then(|_| opt_str(src, "path")) {
        let text = read_text(Path::new(path)).map_err(HandlerErr::io)?;
        return Ok(FeedbackBank::from_json_str(&text)?);
    }
    if let Some(text) = single.and_then(|_| opt_str(src, "json")) {
        return Ok(FeedbackBank::from_json_str(text)?);
    }
    Ok(FeedbackBank::from_value(src)?)
}

fn duplicate_policy(state: &AppState, params: &Value) -> Result<DuplicatePolicy, HandlerErr> {
    match opt_str(params, "duplicatePolicy") {
        None => Ok(state.config.duplicate_policy),
        Some(s) => s.parse().map_err(|e: String| HandlerErr {
            code: "bad_params",
            message: e,
            details: Some(json!({ "duplicatePolicy": s })),
        }),
    }
}

fn run_batch(state: &AppState, params: &Value) -> Result<ReportSet, HandlerErr> {
    let rows = load_roster(params)?;
    let bank = load_bank(params)?;
    let meta = ReportMeta::new(opt_str(params, "courseTitle"), opt_str(params, "info"));
    let policy = duplicate_policy(state, params)?;
    tracing::info!(
        rows = rows.len(),
        feedback_entries = bank.len(),
        policy = policy.as_str(),
        "generating feedback"
    );
    Ok(batch::generate_reports(&rows, &bank, &meta, policy)?)
}

/// Writes next to the target first so a failed run never leaves a partial
/// archive at `out_path`.
fn write_archive(out_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let mut tmp = out_path.as_os_str().to_owned();
    tmp.push(".writing");
    let tmp = PathBuf::from(tmp);

    let written = write_then_rename(&tmp, out_path, bytes);
    if written.is_err() && tmp.exists() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

fn write_then_rename(tmp: &Path, out_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut f = File::create(tmp)
        .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
    f.write_all(bytes)
        .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
    f.flush().context("failed to flush archive")?;
    drop(f);

    std::fs::rename(tmp, out_path).with_context(|| {
        format!(
            "failed to move archive to {}",
            out_path.to_string_lossy()
        )
    })
}

fn generate(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_path = opt_str(params, "outPath")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| HandlerErr::bad_params("missing params.outPath"))?;

    let set = run_batch(state, params)?;
    let packed = archive::package_reports(&set)?;
    write_archive(&out_path, &packed.bytes).map_err(HandlerErr::io)?;

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "mime": ARCHIVE_MIME,
        "entryCount": packed.summary.entry_count,
        "byteLen": packed.summary.byte_len,
        "sha256": packed.summary.sha256,
        "summary": set.summary,
    }))
}

fn question_json(q: &QuestionBlock) -> Value {
    let (outcome, key) = match &q.outcome {
        Outcome::NotAttempted => ("notAttempted", None),
        Outcome::NoFeedback => ("noFeedback", None),
        Outcome::Unreadable => ("unreadable", None),
        Outcome::Answered { key, evaluation } if evaluation.is_correct() => {
            ("correct", Some(key.as_str()))
        }
        Outcome::Answered { key, .. } => ("incorrect", Some(key.as_str())),
    };
    json!({
        "question": q.ordinal,
        "token": q.token,
        "outcome": outcome,
        "key": key,
    })
}

fn preview(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let set = run_batch(state, params)?;
    let only = opt_str(params, "studentId").map(str::trim);

    let reports = set
        .reports
        .iter()
        .filter(|(id, _)| only.map(|o| o == id.as_str()).unwrap_or(true))
        .map(|(id, report)| {
            json!({
                "studentId": id,
                "fileName": archive::entry_name(id),
                "text": report.text(),
                "questions": report.questions().iter().map(question_json).collect::<Vec<_>>(),
            })
        })
        .collect::<Vec<_>>();

    if let (Some(id), true) = (only, reports.is_empty()) {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("no report for student {id}"),
            details: None,
        });
    }

    Ok(json!({
        "reports": reports,
        "summary": set.summary,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "feedback.generate" => generate(state, &req.params),
        "feedback.preview" => preview(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(method = %req.method, code = e.code, message = %e.message, "request failed");
            e.response(&req.id)
        }
    })
}

use crate::error::{FeedbackError, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx, XlsxError};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Cursor;

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// One student's line in the uploaded roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRow {
    /// 1-based position among data rows (header excluded).
    pub row: usize,
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub responses: String,
}

impl StudentRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    FirstName,
    LastName,
    StudentId,
    Responses,
}

impl Column {
    const ALL: [Column; 4] = [
        Column::FirstName,
        Column::LastName,
        Column::StudentId,
        Column::Responses,
    ];

    fn label(self) -> &'static str {
        match self {
            Column::FirstName => "First Name",
            Column::LastName => "Last Name",
            Column::StudentId => "Student No",
            Column::Responses => "Scored Responses",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::FirstName => &["firstname", "first", "givenname"],
            Column::LastName => &["lastname", "last", "surname", "familyname"],
            Column::StudentId => &["studentno", "studentid", "studentnumber", "id"],
            Column::Responses => &["scoredresponses", "responses", "scored"],
        }
    }
}

/// "First Name", "first_name" and "FIRST-NAME" all fold to "firstname".
fn header_key(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn find_column<'a, I>(headers: I, column: Column) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let keys = headers.into_iter().map(header_key).collect::<Vec<_>>();
    column
        .aliases()
        .iter()
        .find_map(|alias| keys.iter().position(|k| k == alias))
}

fn column_indices<'a, I>(headers: I) -> Result<[usize; 4]>
where
    I: IntoIterator<Item = &'a str>,
{
    let headers = headers.into_iter().collect::<Vec<_>>();
    let mut idx = [0usize; 4];
    for (slot, column) in idx.iter_mut().zip(Column::ALL) {
        *slot = find_column(headers.iter().copied(), column).ok_or_else(|| {
            FeedbackError::format(format!("roster is missing column '{}'", column.label()))
        })?;
    }
    Ok(idx)
}

/// Identifiers become archive entry names, so they must stay a single flat
/// path component.
fn check_identifier(row: usize, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(FeedbackError::format(format!(
            "row {}: empty {}",
            row,
            Column::StudentId.label()
        )));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(FeedbackError::format(format!(
            "row {}: {} {:?} contains path characters",
            row,
            Column::StudentId.label(),
            id
        )));
    }
    Ok(())
}

fn build_row(row: usize, cells: [String; 4]) -> Result<StudentRow> {
    let [first_name, last_name, student_id, responses] = cells;
    check_identifier(row, &student_id)?;
    Ok(StudentRow {
        row,
        first_name,
        last_name,
        student_id,
        responses,
    })
}

/// Parses a CSV roster with a header row.
pub fn parse_csv(text: &str) -> Result<Vec<StudentRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FeedbackError::format(format!("roster header: {e}")))?
        .clone();

    let idx = column_indices(headers.iter())?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| FeedbackError::format(format!("roster row {}: {e}", i + 1)))?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let cell = |n: usize| record.get(idx[n]).unwrap_or("").trim().to_string();
        rows.push(build_row(i + 1, [cell(0), cell(1), cell(2), cell(3)])?);
    }
    Ok(rows)
}

/// Spreadsheets store ids as floats; `1234.0` reads back as `1234`.
/// Outside the exact-integer range the float is left as written.
fn integral_float_text(f: f64) -> Option<String> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_F64_INT {
        Some(format!("{}", f as i64))
    } else {
        None
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64()
                    .and_then(integral_float_text)
                    .unwrap_or_else(|| n.to_string())
            }
        }
        other => other.to_string(),
    }
}

fn xlsx_cell_text(d: &Data) -> String {
    match d {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => integral_float_text(*f).unwrap_or_else(|| f.to_string()),
        other => other.to_string().trim().to_string(),
    }
}

/// Parses the first worksheet of an `.xlsx` workbook; row 1 is the header.
pub fn parse_xlsx(bytes: &[u8]) -> Result<Vec<StudentRow>> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: XlsxError| FeedbackError::format(format!("roster workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| FeedbackError::format("roster workbook has no worksheets"))?
        .map_err(|e| FeedbackError::format(format!("roster worksheet: {e}")))?;

    let mut sheet_rows = range.rows();
    let headers = sheet_rows
        .next()
        .map(|r| r.iter().map(xlsx_cell_text).collect::<Vec<_>>())
        .ok_or_else(|| FeedbackError::format("roster worksheet is empty"))?;
    let idx = column_indices(headers.iter().map(String::as_str))?;

    let mut rows = Vec::new();
    for (i, cells) in sheet_rows.enumerate() {
        let cells = cells.iter().map(xlsx_cell_text).collect::<Vec<_>>();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        let cell = |n: usize| cells.get(idx[n]).cloned().unwrap_or_default();
        rows.push(build_row(i + 1, [cell(0), cell(1), cell(2), cell(3)])?);
    }
    Ok(rows)
}

/// Parses a roster supplied as a JSON array of row objects.
pub fn parse_json_rows(value: &Value) -> Result<Vec<StudentRow>> {
    let Some(items) = value.as_array() else {
        return Err(FeedbackError::format("roster rows must be a JSON array"));
    };

    let mut rows = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let row = i + 1;
        let Some(obj) = item.as_object() else {
            return Err(FeedbackError::format(format!(
                "roster row {row} is not an object"
            )));
        };
        if obj.values().all(|v| cell_text(v).is_empty()) {
            continue;
        }
        let by_key: HashMap<String, &Value> =
            obj.iter().map(|(k, v)| (header_key(k), v)).collect();

        let mut cells: [String; 4] = Default::default();
        for (slot, column) in cells.iter_mut().zip(Column::ALL) {
            let v = column
                .aliases()
                .iter()
                .find_map(|alias| by_key.get(*alias))
                .ok_or_else(|| {
                    FeedbackError::format(format!(
                        "roster row {row} is missing column '{}'",
                        column.label()
                    ))
                })?;
            *slot = cell_text(v);
        }
        rows.push(build_row(row, cells)?);
    }
    Ok(rows)
}

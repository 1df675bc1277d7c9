//! QCEW nonprofit employment statistics.
//!
//! The source spreadsheet export has two title lines above the header. Of
//! its columns we keep the area/industry identifiers (1-3), the five
//! `501(c)(3)` columns and the two ratio columns (15-16). Only county and
//! state rows with a numeric NAICS code survive.

use super::{CleanSummary, parse_number, parse_percent, serialize_number, states};
use crate::error::{Error, Result};
use crate::outputs::tables::{WriteMode, write_records};
use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{instrument, warn};

const DATASET: &str = "nonprofit employment";

/// Lines above the header row.
const PREAMBLE_LINES: usize = 2;
const TITLE_COLUMN: usize = 1;
const NAICS_COLUMN: usize = 2;
const INDUSTRY_COLUMN: usize = 3;
const PERCENT_COLUMN: usize = 15;
const WAGE_RATIO_COLUMN: usize = 16;
const NONPROFIT_MARKER: &str = "501(c)(3)";
const NONPROFIT_COLUMNS: usize = 5;

const EXCLUDED_AREAS: [&str; 2] = ["Puerto Rico", "Virgin Islands"];

const DROP_NAICS: &str = "non-numeric NAICS";
const DROP_UNPARSEABLE: &str = "unparseable number";
const DROP_TOTALS: &str = "U.S. totals";
const DROP_MULTI_STATE: &str = "multi-state area";
const DROP_MSA: &str = "MSA";
const DROP_DUPLICATE: &str = "duplicate area and NAICS";
const DROP_TERRITORY: &str = "territory";
const DROP_ROW_LIMIT: &str = "row limit";

static NAICS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("static regex"));
static MULTI_STATE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*[A-Z]{2}-[A-Z]{2}").expect("static regex"));
static TRAILING_STATE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([A-Z]{2})\s*$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmploymentRow {
    #[serde(rename = "Geographic Title")]
    pub geographic_title: String,
    #[serde(rename = "NAICS")]
    pub naics: String,
    #[serde(rename = "Industry Title")]
    pub industry_title: String,
    #[serde(rename = "Average Establishments", serialize_with = "serialize_number")]
    pub average_establishments: f64,
    #[serde(rename = "Annual Average Employment", serialize_with = "serialize_number")]
    pub annual_average_employment: f64,
    #[serde(rename = "Total Annual Wages (in thousands)", serialize_with = "serialize_number")]
    pub total_annual_wages: f64,
    #[serde(rename = "Annual Wages Per Employee", serialize_with = "serialize_number")]
    pub annual_wages_per_employee: f64,
    #[serde(rename = "Average Weekly Wage", serialize_with = "serialize_number")]
    pub average_weekly_wage: f64,
    #[serde(rename = "Percent Employment 501(c)(3)", serialize_with = "serialize_number")]
    pub percent_employment: f64,
    #[serde(rename = "Wage Ratio", serialize_with = "serialize_number")]
    pub wage_ratio: f64,
}

/// Positions of the columns we keep.
#[derive(Debug)]
struct Layout {
    nonprofit: Vec<usize>,
}

impl Layout {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        for position in [TITLE_COLUMN, NAICS_COLUMN, INDUSTRY_COLUMN, PERCENT_COLUMN, WAGE_RATIO_COLUMN] {
            if headers.get(position).is_none() {
                return Err(Error::MissingColumn {
                    column: format!("column {position}"),
                    dataset: DATASET.to_string(),
                });
            }
        }
        let nonprofit: Vec<usize> = headers
            .iter()
            .positions(|h| h.contains(NONPROFIT_MARKER))
            .filter(|p| ![PERCENT_COLUMN, WAGE_RATIO_COLUMN].contains(p))
            .take(NONPROFIT_COLUMNS)
            .collect();
        if nonprofit.len() < NONPROFIT_COLUMNS {
            return Err(Error::MissingColumn {
                column: format!("{NONPROFIT_MARKER} columns ({} of {NONPROFIT_COLUMNS})", nonprofit.len()),
                dataset: DATASET.to_string(),
            });
        }
        Ok(Self { nonprofit })
    }
}

/// Replace a trailing `, XX` state code with the state's name.
///
/// Every `, XX` occurrence in the title is replaced, not just the last.
/// Unknown codes leave the title unchanged.
pub fn expand_state(title: &str) -> String {
    let Some(caps) = TRAILING_STATE.captures(title) else {
        return title.to_string();
    };
    let abbr = &caps[1];
    match states::state_name(abbr) {
        Some(name) => title.replace(&format!(", {abbr}"), &format!(", {name}")),
        None => title.to_string(),
    }
}

/// Why an area title is filtered out, if it is.
fn excluded_area(title: &str) -> Option<&'static str> {
    if title.to_lowercase().contains("u.s. totals") {
        Some(DROP_TOTALS)
    } else if MULTI_STATE.is_match(title) {
        Some(DROP_MULTI_STATE)
    } else if title.contains("MSA") {
        Some(DROP_MSA)
    } else {
        None
    }
}

fn parse_row(record: &StringRecord, layout: &Layout, summary: &mut CleanSummary) -> Option<EmploymentRow> {
    let field = move |idx: usize| record.get(idx).unwrap_or_default();

    let naics = field(NAICS_COLUMN).trim();
    if !NAICS.is_match(naics) {
        summary.drop_row(DROP_NAICS);
        return None;
    }

    let nonprofit: Option<Vec<f64>> = layout.nonprofit.iter().map(|&idx| parse_number(field(idx))).collect();
    let percent = parse_percent(field(PERCENT_COLUMN));
    let wage_ratio = parse_number(field(WAGE_RATIO_COLUMN));
    let (Some(nonprofit), Some(percent_employment), Some(wage_ratio)) = (nonprofit, percent, wage_ratio) else {
        summary.drop_row(DROP_UNPARSEABLE);
        return None;
    };

    let title = field(TITLE_COLUMN);
    if let Some(reason) = excluded_area(title) {
        summary.drop_row(reason);
        return None;
    }

    Some(EmploymentRow {
        geographic_title: expand_state(title),
        naics: naics.to_string(),
        industry_title: field(INDUSTRY_COLUMN).to_string(),
        average_establishments: nonprofit[0],
        annual_average_employment: nonprofit[1],
        total_annual_wages: nonprofit[2],
        annual_wages_per_employee: nonprofit[3],
        average_weekly_wage: nonprofit[4],
        percent_employment,
        wage_ratio,
    })
}

/// Clean the export read from `data`, keeping at most `row_limit` rows.
pub fn clean<R: Read>(data: R, row_limit: Option<usize>) -> Result<(Vec<EmploymentRow>, CleanSummary)> {
    let mut buffered = BufReader::new(data);
    for _ in 0..PREAMBLE_LINES {
        let mut skipped = String::new();
        buffered.read_line(&mut skipped)?;
    }

    let mut reader = ReaderBuilder::new().flexible(true).from_reader(buffered);
    let headers = reader.headers()?.clone();
    let layout = Layout::from_headers(&headers)?;

    let mut summary = CleanSummary::default();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        summary.rows_read += 1;
        if let Some(row) = parse_row(&record, &layout, &mut summary) {
            rows.push(row);
        }
    }

    let key = |row: &EmploymentRow| (row.geographic_title.clone(), row.naics.clone());
    let counts = rows.iter().map(key).counts();
    for row in rows.iter().filter(|row| counts[&key(row)] > 1) {
        warn!(
            geographic_title = %row.geographic_title,
            naics = %row.naics,
            industry = %row.industry_title,
            "Duplicate area and NAICS"
        );
    }

    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(rows.len());
    for row in rows {
        if !seen.insert(key(&row)) {
            summary.drop_row(DROP_DUPLICATE);
        } else if EXCLUDED_AREAS.contains(&row.geographic_title.as_str()) {
            summary.drop_row(DROP_TERRITORY);
        } else {
            cleaned.push(row);
        }
    }

    if let Some(limit) = row_limit {
        for _ in limit..cleaned.len() {
            summary.drop_row(DROP_ROW_LIMIT);
        }
        cleaned.truncate(limit);
    }
    summary.rows_written = cleaned.len();
    Ok((cleaned, summary))
}

/// Read `input` and write the cleaned table to `output`.
#[instrument(level = "info", skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn run(input: &Path, output: &Path, row_limit: Option<usize>) -> Result<CleanSummary> {
    let (rows, summary) = clean(File::open(input)?, row_limit)?;
    write_records(output, &rows, WriteMode::Overwrite)?;
    summary.log(DATASET);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Area Code,,,,501(c)(3) Nonprofit Establishments,501(c)(3) Nonprofit Establishments,\
                          501(c)(3) Nonprofit Establishments,501(c)(3) Nonprofit Establishments,\
                          501(c)(3) Nonprofit Establishments,Private,Private,Private,Private,Private,Other,,";

    fn export(rows: &[&str]) -> String {
        let mut text = String::from("QCEW nonprofits 2020\n\n");
        text.push_str(HEADER);
        text.push('\n');
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    fn row(title: &str, naics: &str, establishments: &str, percent: &str) -> String {
        format!(
            "x,\"{title}\",{naics},Health care,\"{establishments}\",\"1,200\",50000,41666.5,801,0,0,0,0,0,0,{percent},1.02"
        )
    }

    #[test]
    fn test_expand_state() {
        assert_eq!(expand_state("Albany County, NY"), "Albany County, New York");
        assert_eq!(expand_state("Somewhere, ZZ"), "Somewhere, ZZ");
        assert_eq!(expand_state("Pennsylvania"), "Pennsylvania");
        assert_eq!(expand_state("Washington, DC"), "Washington, DC");
    }

    #[test]
    fn test_excluded_areas() {
        assert_eq!(excluded_area("u.s. TOTALS"), Some(DROP_TOTALS));
        assert_eq!(excluded_area("Philadelphia, PA-NJ"), Some(DROP_MULTI_STATE));
        assert_eq!(excluded_area("Albany MSA"), Some(DROP_MSA));
        assert_eq!(excluded_area("Albany County, NY"), None);
    }

    #[test]
    fn test_clean_applies_every_rule() {
        let rows = [
            row("Albany County, NY", " 62 ", "1,234", "12.5%"),
            row("Albany County, NY", "62", "9", "1%"),
            row("Kent County, DE", "Total", "9", "1%"),
            row("Kent County, DE", "62", "(D)", "1%"),
            row("U.S. Totals", "62", "9", "1%"),
            row("Philadelphia, PA-NJ", "62", "9", "1%"),
            row("Boston MSA", "62", "9", "1%"),
            row("Puerto Rico", "62", "9", "1%"),
            row("Kent County, DE", "61", "7", "2 %"),
        ];
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let (cleaned, summary) = clean(export(&rows).as_bytes(), None).unwrap();

        assert_eq!(cleaned.len(), 2);
        let first = &cleaned[0];
        assert_eq!(first.geographic_title, "Albany County, New York");
        assert_eq!(first.naics, "62");
        assert_eq!(first.average_establishments, 1234.0);
        assert_eq!(first.annual_average_employment, 1200.0);
        assert_eq!(first.percent_employment, 12.5);
        assert_eq!(first.wage_ratio, 1.02);
        assert_eq!(cleaned[1].geographic_title, "Kent County, Delaware");

        assert_eq!(summary.rows_read, 9);
        assert_eq!(summary.dropped_for(DROP_DUPLICATE), 1);
        assert_eq!(summary.dropped_for(DROP_NAICS), 1);
        assert_eq!(summary.dropped_for(DROP_UNPARSEABLE), 1);
        assert_eq!(summary.dropped_for(DROP_TOTALS), 1);
        assert_eq!(summary.dropped_for(DROP_MULTI_STATE), 1);
        assert_eq!(summary.dropped_for(DROP_MSA), 1);
        assert_eq!(summary.dropped_for(DROP_TERRITORY), 1);
    }

    #[test]
    fn test_row_limit() {
        let rows = [row("A County, NY", "1", "1", "1%"), row("B County, NY", "1", "1", "1%")];
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let (cleaned, summary) = clean(export(&rows).as_bytes(), Some(1)).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(summary.dropped_for(DROP_ROW_LIMIT), 1);
    }

    #[test]
    fn test_missing_nonprofit_columns() {
        let text = "title\n\nA,B,C,D,E,F,G,H,I,J,K,L,M,N,O,P,Q\n";
        let err = clean(text.as_bytes(), None).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }
}

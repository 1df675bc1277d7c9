//! Form 990 charity financials.
//!
//! Keeps seven columns of the NCCS core file, attaches each organization's
//! state from an EIN lookup file, and drops rows that cannot be placed in a
//! US state.

use super::{CleanSummary, column_index, parse_number, serialize_optional_number, states};
use crate::error::Result;
use crate::outputs::tables::{WriteMode, write_records};
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, instrument};

const DATASET: &str = "charities";
const MAPPING_DATASET: &str = "EIN mapping";

const EIN_COLUMN: &str = "F9_00_ORG_EIN";
/// Numeric source columns, in output order.
const NUMERIC_COLUMNS: [&str; 6] = [
    "F9_09_EXP_OTH_EMPL_BEN_TOT",
    "F9_09_EXP_OTH_SAL_WAGE_TOT",
    "F9_08_REV_TOT_TOT",
    "F9_08_REV_OTH_FUNDR_DIRECT_EXP",
    "F9_08_REV_CONTR_TOT",
    "F9_05_NUM_EMPL",
];

/// States excluded after the lookup.
const EXCLUDED_STATES: [&str; 2] = ["Puerto Rico", "VI"];

const DROP_NO_STATE: &str = "no state";
const DROP_UNPARSEABLE: &str = "unparseable number";
const DROP_DUPLICATE: &str = "duplicate EIN";
const DROP_TERRITORY: &str = "territory";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharityRow {
    #[serde(rename = "Employee Identification Number")]
    pub ein: String,
    #[serde(rename = "Other Employee Benefit", serialize_with = "serialize_optional_number")]
    pub other_employee_benefit: Option<f64>,
    #[serde(rename = "Other Salaries and Wages - Total", serialize_with = "serialize_optional_number")]
    pub other_salaries_and_wages: Option<f64>,
    #[serde(rename = "Total Revenue", serialize_with = "serialize_optional_number")]
    pub total_revenue: Option<f64>,
    #[serde(rename = "Direct Expenses", serialize_with = "serialize_optional_number")]
    pub direct_expenses: Option<f64>,
    #[serde(rename = "Total Contributions", serialize_with = "serialize_optional_number")]
    pub total_contributions: Option<f64>,
    #[serde(rename = "Number of Employees", serialize_with = "serialize_optional_number")]
    pub number_of_employees: Option<f64>,
    #[serde(rename = "State")]
    pub state: String,
}

/// Canonical EIN text: trimmed, and without leading zeros when numeric.
pub fn normalize_ein(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        if stripped.is_empty() { "0".to_string() } else { stripped.to_string() }
    } else {
        trimmed.to_string()
    }
}

/// EIN → state from the mapping file; the first row for an EIN wins and
/// rows with a blank state are ignored.
pub fn load_ein_states<R: Read>(mapping: R) -> Result<HashMap<String, String>> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(mapping);
    let headers = reader.headers()?.clone();
    let ein_idx = column_index(&headers, "Ein", MAPPING_DATASET)?;
    let state_idx = column_index(&headers, "State", MAPPING_DATASET)?;

    let mut states = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let ein = normalize_ein(record.get(ein_idx).unwrap_or_default());
        let state = record.get(state_idx).unwrap_or_default().trim();
        if ein.is_empty() || state.is_empty() {
            continue;
        }
        states.entry(ein).or_insert_with(|| state.to_string());
    }
    debug!(count = states.len(), "Loaded EIN states");
    Ok(states)
}

/// Clean charity rows read from `data` using an EIN → state lookup.
pub fn clean<R: Read>(data: R, ein_states: &HashMap<String, String>) -> Result<(Vec<CharityRow>, CleanSummary)> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(data);
    let headers = reader.headers()?.clone();
    let ein_idx = column_index(&headers, EIN_COLUMN, DATASET)?;
    let numeric_idx = NUMERIC_COLUMNS
        .iter()
        .map(|name| column_index(&headers, name, DATASET))
        .collect::<Result<Vec<_>>>()?;

    let mut summary = CleanSummary::default();
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        summary.rows_read += 1;

        let ein = normalize_ein(record.get(ein_idx).unwrap_or_default());
        let Some(raw_state) = ein_states.get(&ein) else {
            summary.drop_row(DROP_NO_STATE);
            continue;
        };

        let mut numbers = Vec::with_capacity(numeric_idx.len());
        let mut parse_failed = false;
        for &idx in &numeric_idx {
            let raw = record.get(idx).unwrap_or_default();
            let value = parse_number(raw);
            if value.is_none() && !raw.trim().is_empty() {
                parse_failed = true;
                break;
            }
            numbers.push(value);
        }
        if parse_failed {
            summary.drop_row(DROP_UNPARSEABLE);
            continue;
        }

        let state = states::state_or_territory_name(raw_state)
            .map(str::to_string)
            .unwrap_or_else(|| raw_state.clone());

        if !seen.insert(ein.clone()) {
            summary.drop_row(DROP_DUPLICATE);
            continue;
        }
        if EXCLUDED_STATES.contains(&state.as_str()) {
            summary.drop_row(DROP_TERRITORY);
            continue;
        }

        rows.push(CharityRow {
            ein,
            other_employee_benefit: numbers[0],
            other_salaries_and_wages: numbers[1],
            total_revenue: numbers[2],
            direct_expenses: numbers[3],
            total_contributions: numbers[4],
            number_of_employees: numbers[5],
            state,
        });
    }
    summary.rows_written = rows.len();
    Ok((rows, summary))
}

/// Read `input` and `ein_mapping`, write the cleaned table to `output`.
#[instrument(level = "info", skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn run(input: &Path, ein_mapping: &Path, output: &Path) -> Result<CleanSummary> {
    let ein_states = load_ein_states(File::open(ein_mapping)?)?;
    let (rows, summary) = clean(File::open(input)?, &ein_states)?;
    write_records(output, &rows, WriteMode::Overwrite)?;
    summary.log(DATASET);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    const HEADER: &str = "F9_00_ORG_EIN,F9_09_EXP_OTH_EMPL_BEN_TOT,F9_09_EXP_OTH_SAL_WAGE_TOT,\
                          F9_08_REV_TOT_TOT,F9_08_REV_OTH_FUNDR_DIRECT_EXP,F9_08_REV_CONTR_TOT,\
                          F9_05_NUM_EMPL,EXTRA\n";

    const MAPPING: &str = "Ein,Name,State\n\
                           010000001,First,NY\n\
                           10000001,Second,CA\n\
                           10000002,Other,PR\n\
                           10000003,Isles,VI\n\
                           10000004,Capital,DC\n\
                           10000005,Nowhere,\n\
                           10000006,Odd,ZZ\n";

    fn data(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    fn lookup() -> HashMap<String, String> {
        load_ein_states(MAPPING.as_bytes()).unwrap()
    }

    #[test]
    fn test_normalize_ein() {
        assert_eq!(normalize_ein(" 010000001 "), "10000001");
        assert_eq!(normalize_ein("000"), "0");
        assert_eq!(normalize_ein("AB-12"), "AB-12");
    }

    #[test]
    fn test_mapping_first_row_wins_and_blank_state_ignored() {
        let states = lookup();
        assert_eq!(states.get("10000001").map(String::as_str), Some("NY"));
        assert!(!states.contains_key("10000005"));
    }

    #[test]
    fn test_clean_applies_every_rule() {
        let input = data(&[
            "10000001,\"1,000\",2000,3000,400,500,6,x",
            "10000001,1,1,1,1,1,1,x",
            "10000002,1,1,1,1,1,1,x",
            "10000003,1,1,1,1,1,1,x",
            "10000004,,2,3,4,5,6,x",
            "10000005,1,1,1,1,1,1,x",
            "10000006,1,1,1,1,1,1,x",
            "10000007,1,1,1,1,1,1,x",
            "10000006,abc,1,1,1,1,1,x",
        ]);
        let (rows, summary) = clean(input.as_bytes(), &lookup()).unwrap();

        let eins: Vec<&str> = rows.iter().map(|r| r.ein.as_str()).collect();
        assert_eq!(eins, vec!["10000001", "10000004", "10000006"]);
        assert_eq!(rows[0].state, "New York");
        assert_eq!(rows[0].other_employee_benefit, Some(1000.0));
        assert_eq!(rows[1].state, "District of Columbia");
        assert_eq!(rows[1].other_employee_benefit, None);
        assert_eq!(rows[2].state, "ZZ");

        assert_eq!(summary.rows_read, 9);
        assert_eq!(summary.rows_written, 3);
        assert_eq!(summary.dropped_for(DROP_DUPLICATE), 1);
        assert_eq!(summary.dropped_for(DROP_TERRITORY), 2);
        assert_eq!(summary.dropped_for(DROP_NO_STATE), 2);
        assert_eq!(summary.dropped_for(DROP_UNPARSEABLE), 1);
    }

    #[test]
    fn test_missing_column_fails_job() {
        let err = clean("F9_00_ORG_EIN,F9_05_NUM_EMPL\n1,2\n".as_bytes(), &lookup()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column, .. } if column == "F9_09_EXP_OTH_EMPL_BEN_TOT"));
    }

    #[test]
    fn test_run_writes_renamed_columns() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("core.csv");
        let mapping = dir.path().join("map.csv");
        let output = dir.path().join("cleaned.csv");
        std::fs::write(&input, data(&["10000001,1,2,3,4,5,6.5,x"])).unwrap();
        std::fs::write(&mapping, MAPPING).unwrap();

        let summary = run(&input, &mapping, &output).unwrap();
        assert_eq!(summary.rows_written, 1);
        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            text,
            "\u{feff}Employee Identification Number,Other Employee Benefit,\
             Other Salaries and Wages - Total,Total Revenue,Direct Expenses,\
             Total Contributions,Number of Employees,State\n\
             10000001,1,2,3,4,5,6.5,New York\n"
        );
    }
}

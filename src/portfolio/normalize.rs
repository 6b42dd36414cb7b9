//! Record normalizer: sheet rows → `Solution`.
//!
//! The header row is mapped once per load into a `ResolvedSchema`. A missing
//! header never fails the load; its field reads as `""` for every row and the
//! header is reported as drift so the caller can surface it separately from
//! transport or payload errors.

use std::collections::HashSet;

use super::{empty_series, Solution, MONTHS_PER_YEAR, MONTH_ABBREVIATIONS};

/// Columns the schema knows about, with the exact header text that locates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Area,
    Name,
    Problem,
    SolutionText,
    Owner,
    Maturity,
    TargetUser,
    IndirectUser,
    JourneyMain,
    JourneyCollateral,
    Platform,
    Regulatory,
    KeyMetricUx,
    KeyMetricBi,
    TargetUx,
    TargetBi,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Area,
        Field::Name,
        Field::Problem,
        Field::SolutionText,
        Field::Owner,
        Field::Maturity,
        Field::TargetUser,
        Field::IndirectUser,
        Field::JourneyMain,
        Field::JourneyCollateral,
        Field::Platform,
        Field::Regulatory,
        Field::KeyMetricUx,
        Field::KeyMetricBi,
        Field::TargetUx,
        Field::TargetBi,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Field::Area => "Area",
            Field::Name => "Solution Name",
            Field::Problem => "Problem",
            Field::SolutionText => "Solution",
            Field::Owner => "Owner",
            Field::Maturity => "Maturity",
            Field::TargetUser => "Target User",
            Field::IndirectUser => "Indirect User",
            Field::JourneyMain => "Main Journey",
            Field::JourneyCollateral => "Collateral Journey",
            Field::Platform => "Platform",
            Field::Regulatory => "Regulatory",
            Field::KeyMetricUx => "Key Metric UX",
            Field::KeyMetricBi => "Key Metric BI",
            Field::TargetUx => "Target UX",
            Field::TargetBi => "Target BI",
        }
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

/// Header schema resolved against one header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    columns: [Option<usize>; 16],
    months_ux: [Option<usize>; MONTHS_PER_YEAR],
    months_bi: [Option<usize>; MONTHS_PER_YEAR],
    headers: Vec<String>,
}

impl ResolvedSchema {
    pub fn resolve(header_row: &[String]) -> Self {
        let headers: Vec<String> = header_row.iter().map(|h| h.trim().to_string()).collect();

        let mut columns = [None; 16];
        for field in Field::ALL {
            columns[field.slot()] = headers.iter().position(|h| h == field.header());
        }

        let months_ux = locate_months(&headers, columns[Field::KeyMetricUx.slot()]);
        let months_bi = locate_months(&headers, columns[Field::KeyMetricBi.slot()]);

        Self {
            columns,
            months_ux,
            months_bi,
            headers,
        }
    }

    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns[field.slot()]
    }

    pub fn ux_month_columns(&self) -> &[Option<usize>; MONTHS_PER_YEAR] {
        &self.months_ux
    }

    pub fn bi_month_columns(&self) -> &[Option<usize>; MONTHS_PER_YEAR] {
        &self.months_bi
    }

    /// Headers the schema expected but did not find.
    pub fn missing_headers(&self) -> Vec<&'static str> {
        Field::ALL
            .iter()
            .filter(|f| self.column(**f).is_none())
            .map(|f| f.header())
            .collect()
    }

    fn mapped_columns(&self) -> HashSet<usize> {
        self.columns
            .iter()
            .chain(self.months_ux.iter())
            .chain(self.months_bi.iter())
            .flatten()
            .copied()
            .collect()
    }
}

/// Months are the first occurrence of each abbreviation at or after the
/// block's key-metric column. The UX and BI panels sit side by side, so each
/// block searches from its own anchor.
fn locate_months(headers: &[String], anchor: Option<usize>) -> [Option<usize>; MONTHS_PER_YEAR] {
    let mut out = [None; MONTHS_PER_YEAR];
    let Some(start) = anchor else {
        return out;
    };
    for (slot, abbrev) in MONTH_ABBREVIATIONS.iter().enumerate() {
        out[slot] = headers
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, h)| h.as_str() == *abbrev)
            .map(|(i, _)| i);
    }
    out
}

/// Result of one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub solutions: Vec<Solution>,
    pub missing_headers: Vec<&'static str>,
    pub skipped_rows: usize,
}

/// Normalize data rows against the header row, dropping nameless rows.
pub fn normalize(raw_rows: &[Vec<String>], header_row: &[String]) -> Vec<Solution> {
    normalize_with_report(raw_rows, header_row).solutions
}

pub fn normalize_with_report(raw_rows: &[Vec<String>], header_row: &[String]) -> IngestReport {
    let schema = ResolvedSchema::resolve(header_row);
    let missing_headers = schema.missing_headers();
    if !missing_headers.is_empty() {
        log::warn!(
            "Sheet header drift: {} expected header(s) missing: {}",
            missing_headers.len(),
            missing_headers.join(", ")
        );
    }

    let mapped = schema.mapped_columns();
    let mut solutions = Vec::with_capacity(raw_rows.len());
    let mut skipped_rows = 0usize;

    for row in raw_rows {
        let name = text(row, schema.column(Field::Name));
        if name.is_empty() {
            skipped_rows += 1;
            continue;
        }

        let id = solutions.len() as u32 + 1;
        let field = |f: Field| text(row, schema.column(f));
        solutions.push(Solution {
            id,
            area: field(Field::Area),
            name,
            problem: field(Field::Problem),
            solution_text: field(Field::SolutionText),
            owner: field(Field::Owner),
            maturity: field(Field::Maturity),
            target_user: field(Field::TargetUser),
            indirect_user: field(Field::IndirectUser),
            journey_main: field(Field::JourneyMain),
            journey_collateral: field(Field::JourneyCollateral),
            platform: field(Field::Platform),
            regulatory: field(Field::Regulatory),
            key_metric_ux: field(Field::KeyMetricUx),
            key_metric_bi: field(Field::KeyMetricBi),
            target_ux: raw(row, schema.column(Field::TargetUx)),
            target_bi: raw(row, schema.column(Field::TargetBi)),
            monthly_ux: series(row, schema.ux_month_columns()),
            monthly_bi: series(row, schema.bi_month_columns()),
            other_columns: other_columns(row, &schema.headers, &mapped),
        });
    }

    log::debug!(
        "Normalized {} solution(s), skipped {} nameless row(s)",
        solutions.len(),
        skipped_rows
    );

    IngestReport {
        solutions,
        missing_headers,
        skipped_rows,
    }
}

fn text(row: &[String], column: Option<usize>) -> String {
    column
        .and_then(|i| row.get(i))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Targets pass through untouched; consumers parse with validity checks.
fn raw(row: &[String], column: Option<usize>) -> String {
    column
        .and_then(|i| row.get(i))
        .cloned()
        .unwrap_or_default()
}

fn series(row: &[String], columns: &[Option<usize>; MONTHS_PER_YEAR]) -> Vec<String> {
    let mut out = empty_series();
    for (slot, column) in columns.iter().enumerate() {
        out[slot] = text(row, *column);
    }
    out
}

fn other_columns(row: &[String], headers: &[String], mapped: &HashSet<usize>) -> String {
    row.iter()
        .enumerate()
        .filter(|(i, _)| !mapped.contains(i))
        .filter_map(|(i, value)| {
            let header = headers.get(i)?;
            let value = value.trim();
            if header.is_empty() || value.is_empty() {
                return None;
            }
            Some(format!("{}: {}", header, value))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn header() -> Vec<String> {
        strings(&[
            "Area",
            "Solution Name",
            "Problem",
            "Solution",
            "Owner",
            "Maturity",
            "BAU Effort",
            "Key Metric UX",
            "Target UX",
            "Jan",
            "Feb",
            "Mar",
            "Key Metric BI",
            "Target BI",
            "Jan",
            "Feb",
            "Mar",
        ])
    }

    #[test]
    fn months_are_located_per_block() {
        let schema = ResolvedSchema::resolve(&header());
        assert_eq!(schema.ux_month_columns()[0], Some(9));
        assert_eq!(schema.ux_month_columns()[2], Some(11));
        assert_eq!(schema.bi_month_columns()[0], Some(14));
        assert_eq!(schema.bi_month_columns()[2], Some(16));
        assert_eq!(schema.ux_month_columns()[11], None);
    }

    #[test]
    fn blank_names_are_dropped_and_ids_are_sequential() {
        let rows = vec![
            strings(&["Pay", "Checkout", "", "", "Jane", "3. Mature"]),
            strings(&["Pay", "   ", "", "", "Bob", ""]),
            strings(&["Ops", "Routing", "", "", "", ""]),
        ];
        let report = normalize_with_report(&rows, &header());
        assert_eq!(report.solutions.len(), 2);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(report.solutions[0].id, 1);
        assert_eq!(report.solutions[1].id, 2);
        assert_eq!(report.solutions[1].name, "Routing");
    }

    #[test]
    fn fields_are_trimmed_but_targets_pass_through() {
        let rows = vec![strings(&[
            " Pay ", " Checkout ", "", "", " Jane ", "3. Mature", "", " CSAT ", " 80 ", " 81 ",
            "", "N/A", "Conv", "50%", "10", "11", "-",
        ])];
        let solutions = normalize(&rows, &header());
        let s = &solutions[0];
        assert_eq!(s.area, "Pay");
        assert_eq!(s.owner, "Jane");
        assert_eq!(s.key_metric_ux, "CSAT");
        assert_eq!(s.target_ux, " 80 ");
        assert_eq!(s.target_bi, "50%");
        assert_eq!(s.monthly_ux[0], "81");
        assert_eq!(s.monthly_ux[2], "N/A");
        assert_eq!(s.monthly_bi[1], "11");
        assert_eq!(s.monthly_ux.len(), 12);
        assert_eq!(s.monthly_bi.len(), 12);
    }

    #[test]
    fn missing_headers_degrade_to_empty_fields() {
        let header = strings(&["Solution Name", "Owner"]);
        let rows = vec![strings(&["Checkout", "Jane"])];
        let report = normalize_with_report(&rows, &header);
        assert_eq!(report.solutions.len(), 1);
        assert_eq!(report.solutions[0].area, "");
        assert!(report.solutions[0].monthly_ux.iter().all(|v| v.is_empty()));
        assert!(report.missing_headers.contains(&"Area"));
        assert!(report.missing_headers.contains(&"Key Metric UX"));
        assert!(!report.missing_headers.contains(&"Owner"));
    }

    #[test]
    fn missing_name_header_yields_no_solutions() {
        let header = strings(&["Area", "Owner"]);
        let rows = vec![strings(&["Pay", "Jane"])];
        assert!(normalize(&rows, &header).is_empty());
    }

    #[test]
    fn unmapped_columns_are_collected() {
        let mut row = vec![String::new(); 17];
        row[1] = "Checkout".to_string();
        row[6] = "2 FTE".to_string();
        let solutions = normalize(&[row], &header());
        assert_eq!(solutions[0].other_columns, "BAU Effort: 2 FTE");
    }

    #[test]
    fn short_rows_do_not_panic() {
        let rows = vec![strings(&["Pay", "Checkout"])];
        let solutions = normalize(&rows, &header());
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].target_bi, "");
    }
}

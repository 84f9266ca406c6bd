// CSV order ingest: typed records, blank-code normalization, and the
// two-month due-date window.

use std::io::Read;
use std::path::Path;

use chrono::{Months, NaiveDate, NaiveDateTime, NaiveTime};
use csv::StringRecord;
use log::info;
use thiserror::Error;

/// Tokens the source table uses where no code exists.
const BLANK_TOKENS: [&str; 5] = ["", "nan", "None", "0", "NaN"];

/// Timestamp shapes seen in ERP exports.
const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d.%m.%Y %H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not read order table: {0}")]
    Table(#[from] csv::Error),
    #[error("order table is missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("row {row}: missing value for `{column}`")]
    MissingValue { row: usize, column: &'static str },
    #[error("row {row}: cannot parse `{value}` as {expected} for `{column}`")]
    BadValue {
        row: usize,
        column: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// One order line as read from the table, codes already normalized.
#[derive(Clone, Debug)]
pub struct RawOrder {
    pub order_id: String,
    pub line_id: String,
    pub quantity_meters: f64,
    pub due_at: NaiveDateTime,
    /// Weft picks per cm; `None` when the table had no usable number.
    pub pick_density: Option<f64>,
    pub type_name: String,
    pub variant: Option<String>,
    pub ulak: Option<String>,
}

/// Positions of the required columns in the header row.
struct Columns {
    order_id: usize,
    line_id: usize,
    quantity: usize,
    due_at: usize,
    pick_density: usize,
    type_name: usize,
    variant: usize,
    ulak: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self, IngestError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or(IngestError::MissingColumn(name))
        };
        Ok(Self {
            order_id: find("siparisId")?,
            line_id: find("siparisDetayId")?,
            quantity: find("hamMiktar")?,
            due_at: find("hamTermin")?,
            pick_density: find("atkiSikligi")?,
            type_name: find("tipAd")?,
            variant: find("varyantKodu")?,
            ulak: find("UlakKodu")?,
        })
    }
}

/// Reads the order table and keeps only the most recent two calendar
/// months relative to the latest due date in it.
pub fn read_orders(path: &Path) -> Result<Vec<RawOrder>, IngestError> {
    let reader = csv::ReaderBuilder::new().from_path(path)?;
    parse_table(reader)
}

fn parse_table<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<RawOrder>, IngestError> {
    let columns = Columns::locate(reader.headers()?)?;
    let mut orders = Vec::new();
    for (index, record) in reader.records().enumerate() {
        orders.push(parse_row(&record?, &columns, index + 1)?);
    }

    let Some(latest) = orders.iter().map(|order| order.due_at).max() else {
        return Ok(orders);
    };
    let cutoff = latest
        .checked_sub_months(Months::new(2))
        .unwrap_or(NaiveDateTime::MIN);
    let before = orders.len();
    orders.retain(|order| order.due_at >= cutoff);
    info!(
        "keeping {} of {before} order lines due on or after {cutoff}",
        orders.len(),
    );
    Ok(orders)
}

fn parse_row(record: &StringRecord, columns: &Columns, row: usize) -> Result<RawOrder, IngestError> {
    let cell = |column: &'static str, index: usize| {
        record
            .get(index)
            .map(str::trim)
            .ok_or(IngestError::MissingValue { row, column })
    };

    let quantity_raw = cell("hamMiktar", columns.quantity)?;
    let quantity_meters: f64 =
        quantity_raw
            .parse()
            .map_err(|_| IngestError::BadValue {
                row,
                column: "hamMiktar",
                expected: "a quantity in meters",
                value: quantity_raw.to_string(),
            })?;

    let due_raw = cell("hamTermin", columns.due_at)?;
    let due_at = parse_timestamp(due_raw).ok_or_else(|| IngestError::BadValue {
        row,
        column: "hamTermin",
        expected: "a timestamp",
        value: due_raw.to_string(),
    })?;

    // Mirrors the tolerant numeric coercion of the upstream export: an
    // unusable pick density means "unknown", not a rejected row.
    let pick_density = cell("atkiSikligi", columns.pick_density)?
        .parse::<f64>()
        .ok()
        .filter(|picks| *picks > 0.0);

    Ok(RawOrder {
        order_id: cell("siparisId", columns.order_id)?.to_string(),
        line_id: cell("siparisDetayId", columns.line_id)?.to_string(),
        quantity_meters,
        due_at,
        pick_density,
        type_name: cell("tipAd", columns.type_name)?.to_string(),
        variant: normalize_code(cell("varyantKodu", columns.variant)?),
        ulak: normalize_code(cell("UlakKodu", columns.ulak)?),
    })
}

/// Collapses the table's blank stand-ins (`""`, `"nan"`, `"None"`, `"0"`,
/// `"NaN"`, and a numeric-export `".0"` suffix) into a real absent code,
/// so downstream comparisons never touch sentinel strings.
pub fn normalize_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if BLANK_TOKENS.contains(&stripped) {
        None
    } else {
        Some(stripped.to_string())
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> Result<Vec<RawOrder>, IngestError> {
        parse_table(csv::ReaderBuilder::new().from_reader(data.as_bytes()))
    }

    const HEADER: &str = "siparisId,siparisDetayId,hamMiktar,hamTermin,atkiSikligi,tipAd,varyantKodu,UlakKodu\n";

    #[test]
    fn blank_stand_ins_become_absent_codes() {
        for token in ["", "nan", "None", "0", "NaN", "0.0", "  nan  "] {
            assert_eq!(normalize_code(token), None, "token {token:?}");
        }
    }

    #[test]
    fn numeric_export_suffix_is_stripped() {
        assert_eq!(normalize_code("7.0"), Some("7".to_string()));
        assert_eq!(normalize_code(" AB12 "), Some("AB12".to_string()));
        // Only a trailing ".0" is an export artifact.
        assert_eq!(normalize_code("10.05"), Some("10.05".to_string()));
    }

    #[test]
    fn rows_parse_into_typed_orders() {
        let orders = parse(&format!(
            "{HEADER}4711,1,1000.5,2025-06-30 12:00:00,15,dokuma,V1.0,nan\n"
        ))
        .unwrap();

        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.order_id, "4711");
        assert_eq!(order.line_id, "1");
        assert!((order.quantity_meters - 1000.5).abs() < f64::EPSILON);
        assert_eq!(order.pick_density, Some(15.0));
        assert_eq!(order.variant, Some("V1".to_string()));
        assert_eq!(order.ulak, None);
    }

    #[test]
    fn date_only_due_dates_are_accepted() {
        let orders = parse(&format!("{HEADER}1,1,100,2025-06-30,15,dokuma,V1,U1\n")).unwrap();
        assert_eq!(
            orders[0].due_at,
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap().and_time(NaiveTime::MIN)
        );
    }

    #[test]
    fn zero_or_garbled_pick_density_means_unknown() {
        let orders = parse(&format!(
            "{HEADER}1,1,100,2025-06-30,0,dokuma,V1,U1\n2,1,100,2025-06-30,x,dokuma,V1,U1\n"
        ))
        .unwrap();
        assert_eq!(orders[0].pick_density, None);
        assert_eq!(orders[1].pick_density, None);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let err = parse("siparisId,siparisDetayId,hamMiktar,hamTermin,atkiSikligi,tipAd,varyantKodu\n")
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn("UlakKodu")));
    }

    #[test]
    fn unparseable_timestamp_identifies_the_row() {
        let err = parse(&format!(
            "{HEADER}1,1,100,2025-06-30,15,dokuma,V1,U1\n2,1,100,sometime,15,dokuma,V1,U1\n"
        ))
        .unwrap_err();
        assert!(err.to_string().contains("row 2"), "{err}");
        assert!(err.to_string().contains("hamTermin"), "{err}");
    }

    #[test]
    fn only_the_most_recent_two_months_survive() {
        let orders = parse(&format!(
            "{HEADER}\
             old,1,100,2025-01-15,15,dokuma,V1,U1\n\
             edge,1,100,2025-04-30,15,dokuma,V1,U1\n\
             new,1,100,2025-06-30,15,dokuma,V1,U1\n"
        ))
        .unwrap();
        let ids: Vec<&str> = orders.iter().map(|order| order.order_id.as_str()).collect();
        assert_eq!(ids, ["edge", "new"]);
    }

    #[test]
    fn empty_table_is_not_an_error() {
        assert!(parse(HEADER).unwrap().is_empty());
    }
}

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::DashboardError;
use crate::models::{FilterOptions, OrderRecord, NOT_DEFINED};

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "order_id",
    "order_purchase_timestamp",
    "payment_types",
    "order_status",
    "payment_value_total",
    "review_score",
];

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const OFFSET_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

#[derive(Debug, Deserialize)]
struct CsvRow {
    order_id: String,
    order_purchase_timestamp: String,
    payment_types: Option<String>,
    order_status: Option<String>,
    payment_value_total: Option<f64>,
    review_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    path: PathBuf,
    records: Vec<OrderRecord>,
}

impl Dataset {
    pub fn from_records(path: impl Into<PathBuf>, records: Vec<OrderRecord>) -> Self {
        Self {
            path: path.into(),
            records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[OrderRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bounds and choices offered to the filter controls.
    pub fn filter_options(&self) -> FilterOptions {
        let statuses: BTreeSet<&str> = self
            .records
            .iter()
            .map(|record| record.order_status.as_str())
            .collect();
        let payment_types: BTreeSet<&str> = self
            .records
            .iter()
            .map(|record| record.payment_type.as_str())
            .collect();

        FilterOptions {
            min_date: self.records.iter().map(|record| record.purchase_date).min(),
            max_date: self.records.iter().map(|record| record.purchase_date).max(),
            statuses: statuses.into_iter().map(str::to_string).collect(),
            payment_types: payment_types.into_iter().map(str::to_string).collect(),
        }
    }
}

pub fn load(path: &Path) -> Result<Dataset, DashboardError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => DashboardError::DatasetNotFound {
            path: path.to_path_buf(),
        },
        _ => DashboardError::Io(err),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DashboardError::SchemaMismatch {
            path: path.to_path_buf(),
            missing,
        });
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let raw = result?;
        let line = raw.position().map(|pos| pos.line()).unwrap_or_default();
        let row: CsvRow = raw.deserialize(Some(&headers))?;
        records.push(to_record(row, line)?);
    }

    tracing::info!(path = %path.display(), rows = records.len(), "dataset loaded");
    Ok(Dataset::from_records(path, records))
}

fn to_record(row: CsvRow, line: u64) -> Result<OrderRecord, DashboardError> {
    let purchased_at = parse_timestamp(&row.order_purchase_timestamp).ok_or_else(|| {
        DashboardError::MalformedRow {
            line,
            reason: format!(
                "unparseable order_purchase_timestamp '{}'",
                row.order_purchase_timestamp
            ),
        }
    })?;

    let payment_value = match row.payment_value_total {
        Some(value) if value.is_finite() && value >= 0.0 => value,
        Some(value) => {
            return Err(DashboardError::MalformedRow {
                line,
                reason: format!("payment_value_total must be non-negative, got {value}"),
            })
        }
        None => {
            tracing::warn!(line, order_id = %row.order_id, "empty payment_value_total, counted as 0");
            0.0
        }
    };

    let review_score = row.review_score.filter(|score| !score.is_nan());
    if let Some(score) = review_score {
        if !(1.0..=5.0).contains(&score) {
            return Err(DashboardError::MalformedRow {
                line,
                reason: format!("review_score must be between 1 and 5, got {score}"),
            });
        }
    }

    Ok(OrderRecord {
        order_id: row.order_id,
        purchase_date: purchased_at.date(),
        year_month: purchased_at.format("%Y-%m").to_string(),
        purchased_at,
        order_status: normalize_category(row.order_status),
        payment_type: normalize_category(row.payment_types),
        payment_value,
        review_score,
    })
}

/// Timestamps carrying a UTC offset keep their local wall-clock time.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .or_else(|| {
                    OFFSET_TIMESTAMP_FORMATS
                        .iter()
                        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
                })
                .map(|timestamp| timestamp.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub fn normalize_category(value: Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => NOT_DEFINED.to_string(),
    }
}

/// Loaded datasets keyed by path, reloaded when the file's modification time changes.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

#[derive(Debug)]
struct CacheEntry {
    modified: Option<SystemTime>,
    dataset: Arc<Dataset>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &Path) -> Result<Arc<Dataset>, DashboardError> {
        let modified = match std::fs::metadata(path) {
            Ok(metadata) => metadata.modified().ok(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.entries.remove(path);
                return Err(DashboardError::DatasetNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(DashboardError::Io(err)),
        };

        if let Some(entry) = self.entries.get(path) {
            if modified.is_some() && entry.modified == modified {
                tracing::debug!(path = %path.display(), "dataset cache hit");
                return Ok(Arc::clone(&entry.dataset));
            }
            tracing::info!(path = %path.display(), "dataset changed on disk, reloading");
        }

        let dataset = Arc::new(load(path)?);
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                modified,
                dataset: Arc::clone(&dataset),
            },
        );
        Ok(dataset)
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const HEADER: &str =
        "order_id,order_purchase_timestamp,payment_types,order_status,payment_value_total,review_score,customer_state";

    fn write_csv(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        write!(file, "{body}").unwrap();
        path
    }

    #[test]
    fn loads_rows_with_derived_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "orders.csv",
            "a1,2017-10-02 10:56:33,credit_card,delivered,38.71,4.0,SP\n\
             a2,2018-01-24 20:41:37,,,141.46,,RJ\n",
        );

        let dataset = load(&path).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = &dataset.records()[0];
        assert_eq!(first.order_id, "a1");
        assert_eq!(first.year_month, "2017-10");
        assert_eq!(
            first.purchase_date,
            NaiveDate::from_ymd_opt(2017, 10, 2).unwrap()
        );
        assert_eq!(first.review_score, Some(4.0));

        let second = &dataset.records()[1];
        assert_eq!(second.order_status, NOT_DEFINED);
        assert_eq!(second.payment_type, NOT_DEFINED);
        assert_eq!(second.review_score, None);
    }

    #[test]
    fn missing_file_is_dataset_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, DashboardError::DatasetNotFound { .. }));
        assert!(err.to_string().contains("absent.csv"));
    }

    #[test]
    fn missing_columns_are_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrow.csv");
        std::fs::write(&path, "order_id,order_status\na1,delivered\n").unwrap();

        match load(&path).unwrap_err() {
            DashboardError::SchemaMismatch { missing, .. } => assert_eq!(
                missing,
                vec![
                    "order_purchase_timestamp",
                    "payment_types",
                    "payment_value_total",
                    "review_score"
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_timestamp_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "orders.csv",
            "a1,2017-10-02 10:56:33,boleto,delivered,10,5,SP\na2,yesterday,boleto,delivered,10,5,SP\n",
        );

        match load(&path).unwrap_err() {
            DashboardError::MalformedRow { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("yesterday"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_payment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "orders.csv", "a1,2017-10-02,boleto,delivered,-1,5,SP\n");
        assert!(matches!(
            load(&path).unwrap_err(),
            DashboardError::MalformedRow { .. }
        ));
    }

    #[test]
    fn empty_payment_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "orders.csv",
            "a1,2017-10-02 10:56:33,credit_card,delivered,38.71,4,SP\n\
             a2,2017-10-03 08:00:00,,canceled,,,SP\n",
        );

        let dataset = load(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[0].payment_value, 38.71);
        assert_eq!(dataset.records()[1].payment_value, 0.0);
        assert_eq!(dataset.records()[1].payment_type, NOT_DEFINED);
    }

    #[test]
    fn review_outside_scale_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "orders.csv",
            "a1,2017-10-02,boleto,delivered,10,5,SP\na2,2017-10-02,boleto,delivered,10,0,SP\n",
        );

        match load(&path).unwrap_err() {
            DashboardError::MalformedRow { line, reason } => {
                assert_eq!(line, 3);
                assert_eq!(reason, "review_score must be between 1 and 5, got 0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nan_review_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "orders.csv", "a1,2017-10-02,boleto,delivered,10,nan,SP\n");
        assert_eq!(load(&path).unwrap().records()[0].review_score, None);
    }

    #[test]
    fn offset_timestamps_keep_wall_clock_time() {
        let expected = NaiveDate::from_ymd_opt(2017, 10, 2).and_then(|d| d.and_hms_opt(10, 56, 33));
        assert_eq!(parse_timestamp("2017-10-02 10:56:33+00:00"), expected);
        assert_eq!(parse_timestamp("2017-10-02T10:56:33Z"), expected);
        assert_eq!(parse_timestamp("2017-10-02T10:56:33-03:00"), expected);
        assert_eq!(parse_timestamp("2017-10-02 10:56:33+0000"), expected);
    }

    #[test]
    fn parses_supported_timestamp_shapes() {
        assert!(parse_timestamp("2018-08-08 10:00:35").is_some());
        assert!(parse_timestamp("2018-08-08T10:00:35").is_some());
        assert!(parse_timestamp("2018-08-08 10:00").is_some());
        assert_eq!(
            parse_timestamp("2018-08-08"),
            NaiveDate::from_ymd_opt(2018, 8, 8).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert!(parse_timestamp("08/08/2018").is_none());
    }

    #[test]
    fn filter_options_are_sorted_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "orders.csv",
            "a1,2018-03-01 09:00:00,voucher,shipped,5,,SP\n\
             a2,2017-01-05 12:00:00,boleto,delivered,7,3,SP\n\
             a3,2017-06-05 12:00:00,boleto,canceled,0,1,SP\n",
        );

        let options = load(&path).unwrap().filter_options();
        assert_eq!(options.min_date, NaiveDate::from_ymd_opt(2017, 1, 5));
        assert_eq!(options.max_date, NaiveDate::from_ymd_opt(2018, 3, 1));
        assert_eq!(options.statuses, vec!["canceled", "delivered", "shipped"]);
        assert_eq!(options.payment_types, vec!["boleto", "voucher"]);
    }

    #[test]
    fn cache_reuses_until_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "orders.csv", "a1,2017-10-02,boleto,delivered,10,5,SP\n");
        let mut cache = DatasetCache::new();

        let first = cache.get(&path).unwrap();
        let again = cache.get(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.len(), 1);

        let mut file = File::options().append(true).open(&path).unwrap();
        writeln!(file, "a2,2017-10-03,boleto,delivered,20,4,SP").unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(120))
            .unwrap();
        drop(file);

        let reloaded = cache.get(&path).unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn cache_forgets_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "orders.csv", "a1,2017-10-02,boleto,delivered,10,5,SP\n");
        let mut cache = DatasetCache::new();
        cache.get(&path).unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            cache.get(&path).unwrap_err(),
            DashboardError::DatasetNotFound { .. }
        ));
        assert_eq!(cache.len(), 0);
        assert!(!cache.invalidate(&path));
    }
}

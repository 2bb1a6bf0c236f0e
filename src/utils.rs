use chrono::{Datelike, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("data container is empty")]
    Empty,
    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("column '{name}' has {got} rows, expected {expected}")]
    RaggedColumn {
        name: String,
        got: usize,
        expected: usize,
    },
    #[error("inputs do not share the same column layout: {0}")]
    ColumnMismatch(String),
    #[error("inputs do not share a common date range")]
    DateMismatch,
}

/// Columnar table of f64 data with an optional categorical column.
///
/// All numeric columns hold the same number of rows. The categorical
/// column, when present, labels each row with a group id.
#[derive(Clone, Debug, Default)]
pub struct DataTable {
    columns: Vec<(String, Vec<f64>)>,
    group: Option<(String, Vec<String>)>,
}

impl DataTable {
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<f64>)>) -> Result<Self, DataError> {
        if columns.is_empty() {
            return Err(DataError::Empty);
        }
        let columns: Vec<(String, Vec<f64>)> = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .collect();
        let expected = columns[0].1.len();
        for (name, values) in &columns[1..] {
            if values.len() != expected {
                return Err(DataError::RaggedColumn {
                    name: name.clone(),
                    got: values.len(),
                    expected,
                });
            }
        }
        Ok(Self {
            columns,
            group: None,
        })
    }

    pub fn with_group<S: Into<String>>(
        mut self,
        name: S,
        labels: Vec<String>,
    ) -> Result<Self, DataError> {
        if labels.len() != self.num_rows() {
            return Err(DataError::LengthMismatch {
                left: labels.len(),
                right: self.num_rows(),
            });
        }
        self.group = Some((name.into(), labels));
        Ok(self)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|(_, v)| v.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|(n, _)| n.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&[f64], DataError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()))
    }

    pub fn group(&self) -> Option<(&str, &[String])> {
        self.group
            .as_ref()
            .map(|(n, labels)| (n.as_str(), labels.as_slice()))
    }

    /// Drops every row holding a non-finite value in any numeric column.
    pub fn drop_missing(&self) -> DataTable {
        let keep: Vec<bool> = (0..self.num_rows())
            .map(|i| self.columns.iter().all(|(_, v)| v[i].is_finite()))
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let kept = values
                    .iter()
                    .zip(&keep)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| *v)
                    .collect();
                (name.clone(), kept)
            })
            .collect();
        let group = self.group.as_ref().map(|(name, labels)| {
            let kept = labels
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(l, _)| l.clone())
                .collect();
            (name.clone(), kept)
        });
        DataTable { columns, group }
    }

    /// Reshapes the remaining columns into long form around `id_column`.
    ///
    /// Each non-id column contributes one block of rows labeled with the
    /// column name, in column order. Any prior categorical column is
    /// discarded.
    pub fn melt(
        &self,
        id_column: &str,
        group_name: &str,
        value_name: &str,
    ) -> Result<DataTable, DataError> {
        let id_values = self.column(id_column)?.to_vec();
        let mut ids = Vec::new();
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for (name, column) in &self.columns {
            if name == id_column {
                continue;
            }
            for (id, value) in id_values.iter().zip(column) {
                ids.push(*id);
                values.push(*value);
                labels.push(name.clone());
            }
        }
        if ids.is_empty() {
            return Err(DataError::Empty);
        }
        DataTable::from_columns(vec![
            (id_column.to_string(), ids),
            (value_name.to_string(), values),
        ])?
        .with_group(group_name, labels)
    }
}

/// A named series of values indexed by date, sorted ascending.
#[derive(Clone, Debug)]
pub struct TimeSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    pub name: String,
}

impl TimeSeries {
    pub fn new(
        dates: Vec<NaiveDate>,
        values: Vec<f64>,
        name: impl Into<String>,
    ) -> Result<Self, DataError> {
        if dates.is_empty() {
            return Err(DataError::Empty);
        }
        if dates.len() != values.len() {
            return Err(DataError::LengthMismatch {
                left: dates.len(),
                right: values.len(),
            });
        }
        let mut paired: Vec<(NaiveDate, f64)> = dates.into_iter().zip(values).collect();
        paired.sort_by_key(|(d, _)| *d);
        let (dates, values) = paired.into_iter().unzip();
        Ok(Self {
            dates,
            values,
            name: name.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.dates.first(), self.dates.last()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        }
    }

    /// Keeps observations falling inside `period`. May return an empty series.
    pub fn slice(&self, period: &TimePeriod) -> TimeSeries {
        let (dates, values) = self
            .dates
            .iter()
            .zip(&self.values)
            .filter(|(d, _)| period.contains(**d))
            .map(|(d, v)| (*d, *v))
            .unzip();
        TimeSeries {
            dates,
            values,
            name: self.name.clone(),
        }
    }

    /// Simple returns between consecutive observations. One row shorter.
    pub fn returns(&self) -> TimeSeries {
        let mut dates = Vec::new();
        let mut values = Vec::new();
        for i in 1..self.values.len() {
            let prev = self.values[i - 1];
            let current = self.values[i];
            let ret = if prev.is_finite() && current.is_finite() && prev != 0.0 {
                current / prev - 1.0
            } else {
                f64::NAN
            };
            dates.push(self.dates[i]);
            values.push(ret);
        }
        TimeSeries {
            dates,
            values,
            name: self.name.clone(),
        }
    }

    /// Scales the series so its first finite value equals `base`.
    pub fn rebase(&self, base: f64) -> TimeSeries {
        let first = self
            .values
            .iter()
            .copied()
            .find(|v| v.is_finite() && *v != 0.0);
        match first {
            Some(first) => TimeSeries {
                dates: self.dates.clone(),
                values: self.values.iter().map(|v| v / first * base).collect(),
                name: self.name.clone(),
            },
            None => self.clone(),
        }
    }

    /// Restricts both series to their common dates.
    pub fn align(&self, other: &TimeSeries) -> Result<(TimeSeries, TimeSeries), DataError> {
        let dates = common_dates(&self.dates, &other.dates);
        if dates.is_empty() {
            return Err(DataError::DateMismatch);
        }
        let left = TimeSeries {
            values: values_on(self, &dates),
            dates: dates.clone(),
            name: self.name.clone(),
        };
        let right = TimeSeries {
            values: values_on(other, &dates),
            dates,
            name: other.name.clone(),
        };
        Ok((left, right))
    }

    /// Keeps the last observation of each calendar bucket.
    pub fn resample_last(&self, freq: ResampleFreq) -> TimeSeries {
        let keep = last_of_bucket(&self.dates, freq);
        let (dates, values) = self
            .dates
            .iter()
            .zip(&self.values)
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|((d, v), _)| (*d, *v))
            .unzip();
        TimeSeries {
            dates,
            values,
            name: self.name.clone(),
        }
    }
}

/// Calendar buckets used when thinning a daily grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleFreq {
    Daily,
    WeekEnd,
    MonthEnd,
    QuarterEnd,
    YearEnd,
}

fn bucket_key(date: NaiveDate, freq: ResampleFreq) -> (i32, u32) {
    match freq {
        ResampleFreq::Daily => (date.num_days_from_ce(), 0),
        ResampleFreq::WeekEnd => (date.iso_week().year(), date.iso_week().week()),
        ResampleFreq::MonthEnd => (date.year(), date.month()),
        ResampleFreq::QuarterEnd => (date.year(), (date.month() - 1) / 3 + 1),
        ResampleFreq::YearEnd => (date.year(), 0),
    }
}

fn last_of_bucket(dates: &[NaiveDate], freq: ResampleFreq) -> Vec<bool> {
    (0..dates.len())
        .map(|i| {
            i + 1 == dates.len() || bucket_key(dates[i + 1], freq) != bucket_key(dates[i], freq)
        })
        .collect()
}

/// Intersection of two ascending date lists.
pub fn common_dates(a: &[NaiveDate], b: &[NaiveDate]) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Values of `series` sampled on `dates`, NaN where a date is missing.
pub(crate) fn values_on(series: &TimeSeries, dates: &[NaiveDate]) -> Vec<f64> {
    let mut out = Vec::with_capacity(dates.len());
    let mut i = 0;
    for date in dates {
        while i < series.dates.len() && series.dates[i] < *date {
            i += 1;
        }
        if i < series.dates.len() && series.dates[i] == *date {
            out.push(series.values[i]);
        } else {
            out.push(f64::NAN);
        }
    }
    out
}

/// Rectangular date-indexed matrix with named columns, rows sorted ascending.
#[derive(Clone, Debug)]
pub struct TimePanel {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl TimePanel {
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, DataError> {
        if dates.is_empty() || columns.is_empty() {
            return Err(DataError::Empty);
        }
        if dates.len() != rows.len() {
            return Err(DataError::LengthMismatch {
                left: dates.len(),
                right: rows.len(),
            });
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(DataError::LengthMismatch {
                    left: row.len(),
                    right: columns.len(),
                });
            }
        }
        let mut paired: Vec<(NaiveDate, Vec<f64>)> = dates.into_iter().zip(rows).collect();
        paired.sort_by_key(|(d, _)| *d);
        let (dates, rows) = paired.into_iter().unzip();
        Ok(Self {
            dates,
            columns,
            rows,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, DataError> {
        self.columns
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()))
    }

    pub fn column_series(&self, name: &str) -> Result<TimeSeries, DataError> {
        let index = self.column_index(name)?;
        Ok(TimeSeries {
            dates: self.dates.clone(),
            values: self.rows.iter().map(|row| row[index]).collect(),
            name: name.to_string(),
        })
    }

    /// Sum across columns per date, skipping non-finite entries.
    pub fn row_sums(&self, name: impl Into<String>) -> TimeSeries {
        TimeSeries {
            dates: self.dates.clone(),
            values: self
                .rows
                .iter()
                .map(|row| row.iter().filter(|v| v.is_finite()).sum())
                .collect(),
            name: name.into(),
        }
    }

    pub fn slice(&self, period: &TimePeriod) -> TimePanel {
        let (dates, rows) = self
            .dates
            .iter()
            .zip(&self.rows)
            .filter(|(d, _)| period.contains(**d))
            .map(|(d, row)| (*d, row.clone()))
            .unzip();
        TimePanel {
            dates,
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn resample_last(&self, freq: ResampleFreq) -> TimePanel {
        let keep = last_of_bucket(&self.dates, freq);
        let (dates, rows) = self
            .dates
            .iter()
            .zip(&self.rows)
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|((d, row), _)| (*d, row.clone()))
            .unzip();
        TimePanel {
            dates,
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn select_columns(&self, names: &[String]) -> Result<TimePanel, DataError> {
        let indices: Vec<usize> = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<_, _>>()?;
        Ok(TimePanel {
            dates: self.dates.clone(),
            columns: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i]).collect())
                .collect(),
        })
    }

    /// Collapses columns sharing a label into their per-date sums. The output
    /// keeps labels in first-encounter order.
    pub fn group_sum(&self, labels: &[String]) -> Result<TimePanel, DataError> {
        if labels.len() != self.columns.len() {
            return Err(DataError::LengthMismatch {
                left: labels.len(),
                right: self.columns.len(),
            });
        }
        let mut groups: Vec<String> = Vec::new();
        for label in labels {
            if !groups.contains(label) {
                groups.push(label.clone());
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                groups
                    .iter()
                    .map(|g| {
                        row.iter()
                            .zip(labels)
                            .filter(|(v, l)| *l == g && v.is_finite())
                            .map(|(v, _)| *v)
                            .sum()
                    })
                    .collect()
            })
            .collect();
        Ok(TimePanel {
            dates: self.dates.clone(),
            columns: groups,
            rows,
        })
    }

    /// Per-column simple returns. One row shorter.
    pub fn returns(&self) -> TimePanel {
        let mut rows = Vec::new();
        for i in 1..self.rows.len() {
            let row = self.rows[i]
                .iter()
                .zip(&self.rows[i - 1])
                .map(|(current, prev)| {
                    if prev.is_finite() && current.is_finite() && *prev != 0.0 {
                        current / prev - 1.0
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            rows.push(row);
        }
        TimePanel {
            dates: self.dates[1..].to_vec(),
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Per-column running sum. Non-finite entries count as zero.
    pub fn cumsum(&self) -> TimePanel {
        let mut totals = vec![0.0; self.columns.len()];
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(totals.iter_mut())
                    .map(|(v, total)| {
                        if v.is_finite() {
                            *total += v;
                        }
                        *total
                    })
                    .collect()
            })
            .collect();
        TimePanel {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Report window with inclusive bounds; `None` means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimePeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl TimePeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn full() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn from_columns_rejects_ragged_input() {
        let result =
            DataTable::from_columns(vec![("a", vec![1.0, 2.0]), ("b", vec![1.0, 2.0, 3.0])]);
        assert!(matches!(result, Err(DataError::RaggedColumn { .. })));
    }

    #[test]
    fn with_group_checks_length() {
        let table = DataTable::from_columns(vec![("a", vec![1.0, 2.0])]).unwrap();
        let result = table.with_group("g", vec!["x".to_string()]);
        assert!(matches!(result, Err(DataError::LengthMismatch { .. })));
    }

    #[test]
    fn drop_missing_removes_rows_and_labels() {
        let table = DataTable::from_columns(vec![
            ("a", vec![1.0, f64::NAN, 3.0]),
            ("b", vec![4.0, 5.0, 6.0]),
        ])
        .unwrap()
        .with_group("g", vec!["x".to_string(), "y".to_string(), "z".to_string()])
        .unwrap();
        let clean = table.drop_missing();
        assert_eq!(clean.num_rows(), 2);
        assert_eq!(clean.column("a").unwrap(), &[1.0, 3.0]);
        assert_eq!(clean.group().unwrap().1, &["x".to_string(), "z".to_string()]);
    }

    #[test]
    fn melt_stacks_columns_in_order() {
        let table = DataTable::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("a", vec![10.0, 11.0]),
            ("b", vec![20.0, 21.0]),
        ])
        .unwrap();
        let long = table.melt("x", "hue", "value").unwrap();
        assert_eq!(long.num_rows(), 4);
        assert_eq!(long.column("x").unwrap(), &[1.0, 2.0, 1.0, 2.0]);
        assert_eq!(long.column("value").unwrap(), &[10.0, 11.0, 20.0, 21.0]);
        let (name, labels) = long.group().unwrap();
        assert_eq!(name, "hue");
        assert_eq!(labels[0], "a");
        assert_eq!(labels[3], "b");
    }

    #[test]
    fn time_series_sorts_by_date() {
        let series = TimeSeries::new(
            vec![date(2021, 1, 3), date(2021, 1, 1), date(2021, 1, 2)],
            vec![3.0, 1.0, 2.0],
            "s",
        )
        .unwrap();
        assert_eq!(series.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn returns_are_consecutive_ratios() {
        let series = TimeSeries::new(
            vec![date(2021, 1, 1), date(2021, 1, 2), date(2021, 1, 3)],
            vec![100.0, 110.0, 99.0],
            "s",
        )
        .unwrap();
        let rets = series.returns();
        assert_eq!(rets.len(), 2);
        assert!((rets.values[0] - 0.1).abs() < 1e-12);
        assert!((rets.values[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn align_keeps_common_dates_only() {
        let a = TimeSeries::new(
            vec![date(2021, 1, 1), date(2021, 1, 2), date(2021, 1, 4)],
            vec![1.0, 2.0, 4.0],
            "a",
        )
        .unwrap();
        let b = TimeSeries::new(
            vec![date(2021, 1, 2), date(2021, 1, 3), date(2021, 1, 4)],
            vec![20.0, 30.0, 40.0],
            "b",
        )
        .unwrap();
        let (left, right) = a.align(&b).unwrap();
        assert_eq!(left.dates, vec![date(2021, 1, 2), date(2021, 1, 4)]);
        assert_eq!(left.values, vec![2.0, 4.0]);
        assert_eq!(right.values, vec![20.0, 40.0]);
    }

    #[test]
    fn resample_month_end_keeps_last_observation() {
        let series = TimeSeries::new(
            vec![
                date(2021, 1, 15),
                date(2021, 1, 29),
                date(2021, 2, 12),
                date(2021, 2, 26),
                date(2021, 3, 5),
            ],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            "s",
        )
        .unwrap();
        let monthly = series.resample_last(ResampleFreq::MonthEnd);
        assert_eq!(monthly.values, vec![2.0, 4.0, 5.0]);
        assert_eq!(monthly.dates[0], date(2021, 1, 29));
    }

    #[test]
    fn group_sum_collapses_in_first_encounter_order() {
        let panel = TimePanel::new(
            vec![date(2021, 1, 1), date(2021, 1, 2)],
            vec!["i1".to_string(), "i2".to_string(), "i3".to_string()],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, f64::NAN, 6.0]],
        )
        .unwrap();
        let labels = vec!["fx".to_string(), "rates".to_string(), "fx".to_string()];
        let grouped = panel.group_sum(&labels).unwrap();
        assert_eq!(grouped.columns, vec!["fx".to_string(), "rates".to_string()]);
        assert_eq!(grouped.rows[0], vec![4.0, 2.0]);
        assert_eq!(grouped.rows[1], vec![10.0, 0.0]);
    }

    #[test]
    fn panel_cumsum_skips_non_finite() {
        let panel = TimePanel::new(
            vec![date(2021, 1, 1), date(2021, 1, 2), date(2021, 1, 3)],
            vec!["a".to_string()],
            vec![vec![1.0], vec![f64::NAN], vec![2.0]],
        )
        .unwrap();
        let summed = panel.cumsum();
        assert_eq!(summed.rows[1][0], 1.0);
        assert_eq!(summed.rows[2][0], 3.0);
    }

    #[test]
    fn period_bounds_are_inclusive() {
        let period = TimePeriod::new(date(2021, 1, 2), date(2021, 1, 4));
        assert!(period.contains(date(2021, 1, 2)));
        assert!(period.contains(date(2021, 1, 4)));
        assert!(!period.contains(date(2021, 1, 1)));
        assert!(!period.contains(date(2021, 1, 5)));
        assert!(TimePeriod::full().contains(date(1999, 12, 31)));
    }
}

use thiserror::Error;
use tracing::warn;

use crate::plots::{palette_color, Axes, Figure, LegendEntry, LegendLoc, NumberFormat, BAND_COLOR};
use crate::stats::{self, FitError, PolyFit, PolySpec};
use crate::utils::{DataError, DataTable};

const POINT_COLOR: &str = "darkblue";
const IDENTITY_COLOR: &str = "black";

#[derive(Debug, Error)]
pub enum ScatterError {
    #[error("cannot infer plot columns: {0}")]
    AmbiguousColumns(String),
    #[error("group '{0}' has no rows")]
    EmptyGroup(String),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Fit(#[from] FitError),
}

/// Scatter-with-regression panel settings.
///
/// Column names left as `None` are inferred from the table shape; see
/// [`resolve_columns`] for the rules.
#[derive(Clone, Debug)]
pub struct ScatterConfig {
    pub x: Option<String>,
    pub y: Option<String>,
    /// Categorical column to split, color and fit per group.
    pub group: Option<String>,
    /// Per-group polynomial order; 0 draws points without a curve.
    pub order: usize,
    pub fit_intercept: bool,
    /// Pooled fit order over all rows; `None` or 0 disables the pooled model.
    pub full_sample_order: Option<usize>,
    /// Put the pooled equation into the legend.
    pub add_full_sample_label: bool,
    /// Draw the pooled prediction as a dashed line.
    pub add_full_sample_line: bool,
    /// Confidence level for the band around the pooled fit, e.g. 0.95.
    pub confidence: Option<f64>,
    pub full_sample_prefix: String,
    /// Shorten group legend labels to the R2 part.
    pub r2_only: bool,
    /// Include fitted equations in group legend labels.
    pub add_group_labels: bool,
    /// One text per row; empty strings stay unmarked.
    pub annotations: Option<Vec<String>>,
    pub annotation_colors: Option<Vec<String>>,
    pub annotation_color: Option<String>,
    pub add_identity_line: bool,
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub font_size: f64,
    pub line_width: f64,
    pub marker_size: f64,
    pub legend_loc: LegendLoc,
    pub x_format: NumberFormat,
    pub y_format: NumberFormat,
    pub x_limits: Option<(f64, f64)>,
    pub y_limits: Option<(f64, f64)>,
    /// Per-group color override, cycled when shorter than the group count.
    pub colors: Option<Vec<String>>,
    pub label_decimals: usize,
    /// Names used when a wide table is reshaped to long form.
    pub melt_group_name: String,
    pub melt_value_name: String,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            group: None,
            order: 2,
            fit_intercept: true,
            full_sample_order: Some(2),
            add_full_sample_label: true,
            add_full_sample_line: false,
            confidence: None,
            full_sample_prefix: String::from("Full sample: "),
            r2_only: false,
            add_group_labels: true,
            annotations: None,
            annotation_colors: None,
            annotation_color: Some(String::from("red")),
            add_identity_line: false,
            title: None,
            x_label: None,
            y_label: None,
            font_size: 10.0,
            line_width: 1.5,
            marker_size: 4.0,
            legend_loc: LegendLoc::UpperLeft,
            x_format: NumberFormat::Percent(0),
            y_format: NumberFormat::Percent(0),
            x_limits: None,
            y_limits: None,
            colors: None,
            label_decimals: 2,
            melt_group_name: String::from("hue"),
            melt_value_name: String::from("value_name"),
        }
    }
}

impl ScatterConfig {
    pub fn with_x(mut self, x: impl Into<String>) -> Self {
        self.x = Some(x.into());
        self
    }

    pub fn with_y(mut self, y: impl Into<String>) -> Self {
        self.y = Some(y.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_full_sample_order(mut self, order: Option<usize>) -> Self {
        self.full_sample_order = order;
        self
    }

    pub fn with_confidence(mut self, level: f64) -> Self {
        self.confidence = Some(level);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_annotations(mut self, annotations: Vec<String>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn with_identity_line(mut self) -> Self {
        self.add_identity_line = true;
        self
    }

    pub fn with_formats(mut self, x_format: NumberFormat, y_format: NumberFormat) -> Self {
        self.x_format = x_format;
        self.y_format = y_format;
        self
    }

    pub fn with_legend_loc(mut self, loc: LegendLoc) -> Self {
        self.legend_loc = loc;
        self
    }

    pub fn with_marker_size(mut self, size: f64) -> Self {
        self.marker_size = size;
        self
    }
}

/// Outcome of column resolution: the columns of the scatter by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub x: String,
    pub y: String,
    pub group: Option<String>,
}

/// Works out which columns provide x, y and the group labels, reshaping
/// wide input to long form when needed.
///
/// Rules, applied to the table after dropping rows with missing values:
/// explicit names win; with exactly two numeric columns x is the first
/// column not used by y and y the remaining one; a wider table with a known
/// x and no group is melted so the former column names become groups; any
/// other shape is ambiguous.
pub fn resolve_columns(
    table: &DataTable,
    cfg: &ScatterConfig,
) -> Result<(DataTable, Resolved), ScatterError> {
    let table = table.drop_missing();

    let group = match &cfg.group {
        Some(name) => match table.group() {
            Some((g, _)) if g == name => Some(name.clone()),
            _ => return Err(ScatterError::Data(DataError::UnknownColumn(name.clone()))),
        },
        None => None,
    };

    let ncols = table.num_columns();
    let x = match &cfg.x {
        Some(name) => {
            table.column(name)?;
            name.clone()
        }
        None => {
            if ncols == 2 {
                let first_free = table
                    .column_names()
                    .into_iter()
                    .find(|n| Some(*n) != cfg.y.as_deref());
                match first_free {
                    Some(name) => name.to_string(),
                    None => {
                        return Err(ScatterError::AmbiguousColumns(String::from(
                            "no column left for x",
                        )))
                    }
                }
            } else {
                return Err(ScatterError::AmbiguousColumns(format!(
                    "x is not defined for {ncols} numeric columns"
                )));
            }
        }
    };

    if let Some(name) = &cfg.y {
        table.column(name)?;
        return Ok((
            table.clone(),
            Resolved {
                x,
                y: name.clone(),
                group,
            },
        ));
    }

    if ncols == 2 {
        let y = table
            .column_names()
            .into_iter()
            .find(|n| *n != x)
            .unwrap_or(x.as_str())
            .to_string();
        Ok((table.clone(), Resolved { x, y, group }))
    } else if group.is_none() {
        let melted = table.melt(&x, &cfg.melt_group_name, &cfg.melt_value_name)?;
        Ok((
            melted,
            Resolved {
                x,
                y: cfg.melt_value_name.clone(),
                group: Some(cfg.melt_group_name.clone()),
            },
        ))
    } else {
        Err(ScatterError::AmbiguousColumns(format!(
            "y is not defined for {ncols} numeric columns with a group column"
        )))
    }
}

/// Scatter panel with per-group and pooled regression fits as a standalone
/// figure.
pub fn scatter_plot(table: &DataTable, cfg: &ScatterConfig) -> Result<Figure, ScatterError> {
    let mut axes = Axes::new();
    draw_scatter(&mut axes, table, cfg)?;
    Ok(Figure::single(&axes))
}

/// Draws the scatter onto existing axes, e.g. a cell of a report page.
pub fn draw_scatter(
    axes: &mut Axes,
    table: &DataTable,
    cfg: &ScatterConfig,
) -> Result<(), ScatterError> {
    let (table, resolved) = resolve_columns(table, cfg)?;
    draw_resolved(axes, &table, &resolved, cfg, None)
}

fn draw_resolved(
    axes: &mut Axes,
    table: &DataTable,
    resolved: &Resolved,
    cfg: &ScatterConfig,
    group_universe: Option<&[String]>,
) -> Result<(), ScatterError> {
    let xs = table.column(&resolved.x)?;
    let ys = table.column(&resolved.y)?;

    axes.set_x_format(cfg.x_format);
    axes.set_y_format(cfg.y_format);
    axes.set_font_size(cfg.font_size);
    axes.set_legend_loc(cfg.legend_loc);
    if let Some(title) = &cfg.title {
        axes.set_title(title.clone());
    }
    axes.set_x_label(
        cfg.x_label
            .clone()
            .unwrap_or_else(|| format!("x = {}", resolved.x)),
    );
    axes.set_y_label(
        cfg.y_label
            .clone()
            .unwrap_or_else(|| format!("y = {}", resolved.y)),
    );

    let mut point_colors: Vec<String> = vec![POINT_COLOR.to_string(); table.num_rows()];
    let mut group_entries: Vec<LegendEntry> = Vec::new();

    if let Some(group_name) = &resolved.group {
        let labels = match table.group() {
            Some((name, labels)) if name == group_name => labels,
            _ => {
                return Err(ScatterError::Data(DataError::UnknownColumn(
                    group_name.clone(),
                )))
            }
        };
        let universe: Vec<String> = match group_universe {
            Some(universe) => universe.to_vec(),
            None => {
                let mut seen = Vec::new();
                for label in labels {
                    if !seen.contains(label) {
                        seen.push(label.clone());
                    }
                }
                seen
            }
        };
        for (index, group_id) in universe.iter().enumerate() {
            let color = match cfg.colors.as_deref() {
                Some(colors) if !colors.is_empty() => colors[index % colors.len()].clone(),
                _ => palette_color(index).to_string(),
            };
            let row_indices: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| *l == group_id)
                .map(|(i, _)| i)
                .collect();
            if row_indices.is_empty() {
                let err = ScatterError::EmptyGroup(group_id.clone());
                warn!(group = group_id.as_str(), "skipping: {}", err);
                continue;
            }
            for &i in &row_indices {
                point_colors[i] = color.clone();
            }
            let mut points: Vec<(f64, f64)> =
                row_indices.iter().map(|&i| (xs[i], ys[i])).collect();
            points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            axes.add_points(&points, &color, cfg.marker_size);
            group_entries.push(fit_group(axes, &points, group_id, &color, cfg)?);
        }
    } else {
        let mut points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        axes.add_points(&points, POINT_COLOR, cfg.marker_size);
    }

    // Pooled model over all rows. Its legend entry goes first.
    let mut legend: Vec<LegendEntry> = Vec::new();
    let pooled_spec = cfg
        .full_sample_order
        .filter(|order| *order > 0)
        .map(|order| PolySpec::new(order, cfg.fit_intercept));
    let grouped = resolved.group.is_some();
    let pooled_wanted = !grouped
        || cfg.add_full_sample_label
        || cfg.add_full_sample_line
        || cfg.confidence.is_some();
    if let Some(spec) = pooled_spec {
        if pooled_wanted {
            let mut pairs: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            let sx: Vec<f64> = pairs.iter().map(|p| p.0).collect();
            let sy: Vec<f64> = pairs.iter().map(|p| p.1).collect();
            let fit = PolyFit::fit(&sx, &sy, spec)?;
            let predictions = fit.predict_many(&sx);
            if !grouped {
                axes.add_curve(
                    sx.iter().copied().zip(predictions.iter().copied()).collect(),
                    POINT_COLOR,
                    cfg.line_width,
                    false,
                );
            }
            if cfg.add_full_sample_line {
                axes.add_curve(
                    sx.iter().copied().zip(predictions.iter().copied()).collect(),
                    POINT_COLOR,
                    cfg.line_width,
                    true,
                );
            }
            if let Some(level) = cfg.confidence {
                let half = stats::confidence_half_widths(&sx, &sy, &predictions, level)?;
                let lower = sx
                    .iter()
                    .zip(&predictions)
                    .zip(&half)
                    .map(|((x, p), h)| (*x, p - h))
                    .collect();
                let upper = sx
                    .iter()
                    .zip(&predictions)
                    .zip(&half)
                    .map(|((x, p), h)| (*x, p + h))
                    .collect();
                axes.add_band(lower, upper, BAND_COLOR);
            }
            if cfg.add_full_sample_label {
                legend.push(LegendEntry {
                    label: format!(
                        "{}{}",
                        cfg.full_sample_prefix,
                        fit.summary_label(cfg.label_decimals, false)
                    ),
                    color: POINT_COLOR.to_string(),
                    dash: grouped || cfg.add_full_sample_line,
                });
            }
        }
    }
    legend.extend(group_entries);
    axes.set_legend(legend);

    if let Some(annotations) = &cfg.annotations {
        if annotations.len() != table.num_rows() {
            return Err(ScatterError::Data(DataError::LengthMismatch {
                left: annotations.len(),
                right: table.num_rows(),
            }));
        }
        for (i, text) in annotations.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let color = cfg
                .annotation_colors
                .as_ref()
                .and_then(|colors| colors.get(i).cloned())
                .or_else(|| cfg.annotation_color.clone())
                .unwrap_or_else(|| point_colors[i].clone());
            axes.add_note(xs[i], ys[i], text.clone(), &color, cfg.font_size);
            // marked rows get an enlarged point on top
            axes.add_points(&[(xs[i], ys[i])], &color, cfg.marker_size * 1.5);
        }
    }

    if cfg.add_identity_line {
        if let (Some((x_lo, x_hi)), Some((y_lo, y_hi))) = (axes.x_range(), axes.y_range()) {
            let lo = x_lo.min(y_lo);
            let hi = x_hi.max(y_hi);
            axes.set_x_limits(Some((lo, hi)));
            axes.set_y_limits(Some((lo, hi)));
            axes.add_curve(vec![(lo, lo), (hi, hi)], IDENTITY_COLOR, 1.0, true);
        }
    }
    // Explicit limits win over the identity-line union
    if cfg.x_limits.is_some() {
        axes.set_x_limits(cfg.x_limits);
    }
    if cfg.y_limits.is_some() {
        axes.set_y_limits(cfg.y_limits);
    }

    Ok(())
}

/// Fits one group and draws its curve. Groups too small for the requested
/// order keep their points and a plain legend label.
fn fit_group(
    axes: &mut Axes,
    points: &[(f64, f64)],
    name: &str,
    color: &str,
    cfg: &ScatterConfig,
) -> Result<LegendEntry, ScatterError> {
    let plain = LegendEntry {
        label: name.to_string(),
        color: color.to_string(),
        dash: false,
    };
    if cfg.order == 0 {
        return Ok(plain);
    }
    let sx: Vec<f64> = points.iter().map(|p| p.0).collect();
    let sy: Vec<f64> = points.iter().map(|p| p.1).collect();
    match PolyFit::fit(&sx, &sy, PolySpec::new(cfg.order, cfg.fit_intercept)) {
        Ok(fit) => {
            let predictions = fit.predict_many(&sx);
            axes.add_curve(
                sx.into_iter().zip(predictions).collect(),
                color,
                cfg.line_width,
                false,
            );
            let label = if cfg.add_group_labels {
                format!(
                    "{}: {}",
                    name,
                    fit.summary_label(cfg.label_decimals, cfg.r2_only)
                )
            } else {
                name.to_string()
            };
            Ok(LegendEntry {
                label,
                color: color.to_string(),
                dash: false,
            })
        }
        Err(err @ FitError::InsufficientData { .. }) => {
            warn!(group = name, "drawing points only: {}", err);
            Ok(plain)
        }
        Err(err) => Err(ScatterError::Fit(err)),
    }
}

/// How the x column is cut into buckets.
#[derive(Clone, Debug)]
pub enum Buckets {
    /// Explicit edges, assumed to be in standardized-score space.
    Edges(Vec<f64>),
    /// Equal-frequency cut points computed from the data.
    Quantiles(usize),
}

impl Default for Buckets {
    fn default() -> Self {
        Buckets::Edges(vec![-3.0, -1.5, 0.0, 1.5, 3.0])
    }
}

/// Scatter variant that first buckets rows by their x value, then renders
/// the buckets as groups.
#[derive(Clone, Debug)]
pub struct ClassificationConfig {
    pub buckets: Buckets,
    /// Name given to the derived group column.
    pub bucket_name: String,
    /// Decimals in the interval labels.
    pub bucket_decimals: usize,
    pub scatter: ScatterConfig,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            buckets: Buckets::default(),
            bucket_name: String::from("hue"),
            bucket_decimals: 2,
            scatter: ScatterConfig {
                order: 1,
                fit_intercept: false,
                full_sample_order: Some(3),
                marker_size: 10.0,
                x_format: NumberFormat::Decimal(2),
                y_format: NumberFormat::Decimal(2),
                ..ScatterConfig::default()
            },
        }
    }
}

pub fn classification_scatter_plot(
    table: &DataTable,
    cfg: &ClassificationConfig,
) -> Result<Figure, ScatterError> {
    let mut axes = Axes::new();
    draw_classification_scatter(&mut axes, table, cfg)?;
    Ok(Figure::single(&axes))
}

/// Buckets the x column and delegates to the core scatter with the derived
/// groups. Intervals that catch no rows are skipped with a warning.
pub fn draw_classification_scatter(
    axes: &mut Axes,
    table: &DataTable,
    cfg: &ClassificationConfig,
) -> Result<(), ScatterError> {
    let table = table.drop_missing();

    // Column inference is strict here: explicit names or exactly two columns.
    let x = match &cfg.scatter.x {
        Some(name) => {
            table.column(name)?;
            name.clone()
        }
        None if table.num_columns() == 2 => table
            .column_name(0)
            .unwrap_or_default()
            .to_string(),
        None => {
            return Err(ScatterError::AmbiguousColumns(format!(
                "x is not defined for {} numeric columns",
                table.num_columns()
            )))
        }
    };
    let y = match &cfg.scatter.y {
        Some(name) => {
            table.column(name)?;
            name.clone()
        }
        None if table.num_columns() == 2 => table
            .column_names()
            .into_iter()
            .find(|n| *n != x)
            .unwrap_or(x.as_str())
            .to_string(),
        None => {
            return Err(ScatterError::AmbiguousColumns(format!(
                "y is not defined for {} numeric columns",
                table.num_columns()
            )))
        }
    };

    let xs = table.column(&x)?;
    let ys = table.column(&y)?;
    let edges = match &cfg.buckets {
        Buckets::Edges(edges) => edges.clone(),
        Buckets::Quantiles(count) => stats::quantile_cut_points(xs, *count)?,
    };
    let universe = stats::bucket_labels(&edges, cfg.bucket_decimals);
    let assignments = stats::assign_buckets(xs, &edges);

    // Rows outside the edges are dropped
    let mut kept_x = Vec::new();
    let mut kept_y = Vec::new();
    let mut kept_labels = Vec::new();
    for ((assigned, x_value), y_value) in assignments.iter().zip(xs).zip(ys) {
        if let Some(bucket) = assigned {
            kept_x.push(*x_value);
            kept_y.push(*y_value);
            kept_labels.push(universe[*bucket].clone());
        }
    }
    let bucketed = DataTable::from_columns(vec![(x.clone(), kept_x), (y.clone(), kept_y)])?
        .with_group(cfg.bucket_name.clone(), kept_labels)?;

    let mut scatter_cfg = cfg.scatter.clone();
    scatter_cfg.x = Some(x.clone());
    scatter_cfg.y = Some(y.clone());
    scatter_cfg.group = Some(cfg.bucket_name.clone());
    let resolved = Resolved {
        x,
        y,
        group: Some(cfg.bucket_name.clone()),
    };
    draw_resolved(axes, &bucketed, &resolved, &scatter_cfg, Some(&universe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plots::Layer;

    fn two_column_table() -> DataTable {
        DataTable::from_columns(vec![
            ("alpha", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            ("beta", vec![2.0, 4.0, 5.0, 4.0, 5.0]),
        ])
        .unwrap()
    }

    fn grouped_table() -> DataTable {
        DataTable::from_columns(vec![
            ("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            ("y", vec![2.0, 4.0, 5.0, 4.0, 5.0, 7.0]),
        ])
        .unwrap()
        .with_group(
            "hue",
            vec![
                "b".to_string(),
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "b".to_string(),
                "a".to_string(),
            ],
        )
        .unwrap()
    }

    fn curve_count(axes: &Axes) -> usize {
        axes.layers()
            .iter()
            .filter(|l| matches!(l, Layer::Curve { .. }))
            .count()
    }

    fn plain_config() -> ScatterConfig {
        ScatterConfig {
            order: 0,
            full_sample_order: None,
            ..ScatterConfig::default()
        }
    }

    #[test]
    fn two_columns_resolve_as_x_then_y() {
        let (_, resolved) =
            resolve_columns(&two_column_table(), &ScatterConfig::default()).unwrap();
        assert_eq!(
            resolved,
            Resolved {
                x: "alpha".to_string(),
                y: "beta".to_string(),
                group: None,
            }
        );
    }

    #[test]
    fn five_columns_without_names_are_ambiguous() {
        let table = DataTable::from_columns(vec![
            ("a", vec![1.0]),
            ("b", vec![1.0]),
            ("c", vec![1.0]),
            ("d", vec![1.0]),
            ("e", vec![1.0]),
        ])
        .unwrap();
        let result = resolve_columns(&table, &ScatterConfig::default());
        assert!(matches!(result, Err(ScatterError::AmbiguousColumns(_))));
    }

    #[test]
    fn wide_table_with_known_x_melts_into_groups() {
        let table = DataTable::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("s1", vec![1.0, 2.0]),
            ("s2", vec![3.0, 4.0]),
        ])
        .unwrap();
        let cfg = ScatterConfig::default().with_x("x");
        let (long, resolved) = resolve_columns(&table, &cfg).unwrap();
        assert_eq!(resolved.x, "x");
        assert_eq!(resolved.y, "value_name");
        assert_eq!(resolved.group.as_deref(), Some("hue"));
        assert_eq!(long.num_rows(), 4);
        let (_, labels) = long.group().unwrap();
        assert_eq!(labels[0], "s1");
        assert_eq!(labels[2], "s2");
    }

    #[test]
    fn wide_table_with_group_but_no_y_is_ambiguous() {
        let table = DataTable::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("a", vec![1.0, 2.0]),
            ("b", vec![3.0, 4.0]),
        ])
        .unwrap()
        .with_group("g", vec!["u".to_string(), "v".to_string()])
        .unwrap();
        let cfg = ScatterConfig::default().with_x("x").with_group("g");
        let result = resolve_columns(&table, &cfg);
        assert!(matches!(result, Err(ScatterError::AmbiguousColumns(_))));
    }

    #[test]
    fn unknown_group_column_is_a_data_error() {
        let cfg = ScatterConfig::default().with_group("missing");
        let result = resolve_columns(&two_column_table(), &cfg);
        assert!(matches!(
            result,
            Err(ScatterError::Data(DataError::UnknownColumn(_)))
        ));
    }

    #[test]
    fn order_zero_draws_points_without_curves() {
        let mut axes = Axes::new();
        draw_scatter(&mut axes, &grouped_table(), &plain_config()).unwrap();
        assert_eq!(curve_count(&axes), 0);
        let labels: Vec<&str> = axes
            .legend_entries()
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(labels, vec!["b", "a", "c"]);
        assert!(!axes.render().contains("R2"));
    }

    #[test]
    fn groups_keep_first_encounter_order_and_colors() {
        let mut axes = Axes::new();
        let cfg = ScatterConfig {
            order: 1,
            full_sample_order: None,
            ..ScatterConfig::default()
        };
        draw_scatter(&mut axes, &grouped_table(), &cfg).unwrap();
        let entries = axes.legend_entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].label.starts_with("b: y = "));
        assert!(entries[1].label.starts_with("a: y = "));
        assert_eq!(entries[0].color, palette_color(0));
        assert_eq!(entries[1].color, palette_color(1));
        assert_eq!(entries[2].color, palette_color(2));
        // the single-row group "c" cannot support the fit, so the label
        // stays plain and it draws no curve
        assert_eq!(entries[2].label, "c");
        assert_eq!(curve_count(&axes), 2);
    }

    #[test]
    fn color_override_cycles_and_an_empty_one_is_ignored() {
        let mut axes = Axes::new();
        let cfg = ScatterConfig {
            order: 1,
            full_sample_order: None,
            colors: Some(vec!["teal".to_string(), "plum".to_string()]),
            ..ScatterConfig::default()
        };
        draw_scatter(&mut axes, &grouped_table(), &cfg).unwrap();
        let entries = axes.legend_entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].color, "teal");
        assert_eq!(entries[1].color, "plum");
        assert_eq!(entries[2].color, "teal");

        let mut axes = Axes::new();
        let cfg = ScatterConfig {
            order: 1,
            full_sample_order: None,
            colors: Some(Vec::new()),
            ..ScatterConfig::default()
        };
        draw_scatter(&mut axes, &grouped_table(), &cfg).unwrap();
        let entries = axes.legend_entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].color, palette_color(0));
        assert_eq!(entries[1].color, palette_color(1));
    }

    #[test]
    fn pooled_entry_leads_the_legend() {
        let mut axes = Axes::new();
        let cfg = ScatterConfig {
            order: 1,
            full_sample_order: Some(1),
            ..ScatterConfig::default()
        };
        draw_scatter(&mut axes, &grouped_table(), &cfg).unwrap();
        let entries = axes.legend_entries();
        assert_eq!(entries.len(), 4);
        assert!(entries[0].label.starts_with("Full sample: y = "));
        assert!(entries[0].dash);
        assert_eq!(entries[1].label.chars().next(), Some('b'));
    }

    #[test]
    fn confidence_adds_a_band_only_when_asked() {
        let mut axes = Axes::new();
        let cfg = ScatterConfig {
            order: 1,
            full_sample_order: Some(1),
            confidence: Some(0.95),
            ..ScatterConfig::default()
        };
        draw_scatter(&mut axes, &two_column_table(), &cfg).unwrap();
        let bands = axes
            .layers()
            .iter()
            .filter(|l| matches!(l, Layer::Band { .. }))
            .count();
        assert_eq!(bands, 1);

        let mut bare = Axes::new();
        let cfg = ScatterConfig {
            order: 1,
            full_sample_order: Some(1),
            ..ScatterConfig::default()
        };
        draw_scatter(&mut bare, &two_column_table(), &cfg).unwrap();
        assert!(!bare
            .layers()
            .iter()
            .any(|l| matches!(l, Layer::Band { .. })));
    }

    #[test]
    fn ungrouped_default_draws_a_solid_pooled_curve() {
        let mut axes = Axes::new();
        draw_scatter(&mut axes, &two_column_table(), &ScatterConfig::default()).unwrap();
        assert_eq!(curve_count(&axes), 1);
        let entries = axes.legend_entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].label.starts_with("Full sample: "));
        assert!(!entries[0].dash);
    }

    #[test]
    fn pooled_fit_failure_propagates() {
        let table = DataTable::from_columns(vec![("x", vec![1.0]), ("y", vec![1.0])]).unwrap();
        let cfg = ScatterConfig {
            order: 0,
            full_sample_order: Some(2),
            ..ScatterConfig::default()
        };
        let mut axes = Axes::new();
        let result = draw_scatter(&mut axes, &table, &cfg);
        assert!(matches!(
            result,
            Err(ScatterError::Fit(FitError::InsufficientData { .. }))
        ));
    }

    #[test]
    fn annotations_mark_and_enlarge_rows() {
        let mut axes = Axes::new();
        let cfg = plain_config().with_marker_size(6.0).with_annotations(vec![
            String::new(),
            "B".to_string(),
            String::new(),
            String::new(),
            String::new(),
        ]);
        draw_scatter(&mut axes, &two_column_table(), &cfg).unwrap();
        let notes: Vec<&Layer> = axes
            .layers()
            .iter()
            .filter(|l| matches!(l, Layer::Note { .. }))
            .collect();
        assert_eq!(notes.len(), 1);
        if let Layer::Note { text, color, .. } = notes[0] {
            assert_eq!(text, "B");
            assert_eq!(color, "red");
        }
        let radii: Vec<f64> = axes
            .layers()
            .iter()
            .filter_map(|l| match l {
                Layer::Points { radius, .. } => Some(*radius),
                _ => None,
            })
            .collect();
        // base markers plus the annotated row at 1.5x
        assert_eq!(radii, vec![6.0, 9.0]);
    }

    #[test]
    fn annotation_length_mismatch_is_an_error() {
        let cfg = ScatterConfig {
            annotations: Some(vec!["only one".to_string()]),
            ..plain_config()
        };
        let mut axes = Axes::new();
        let result = draw_scatter(&mut axes, &two_column_table(), &cfg);
        assert!(matches!(
            result,
            Err(ScatterError::Data(DataError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn identity_line_unions_both_ranges() {
        let table = DataTable::from_columns(vec![
            ("x", vec![0.0, 0.5, 1.0]),
            ("y", vec![10.0, 15.0, 20.0]),
        ])
        .unwrap();
        let cfg = plain_config().with_identity_line();
        let mut axes = Axes::new();
        draw_scatter(&mut axes, &table, &cfg).unwrap();
        assert_eq!(axes.x_range(), Some((0.0, 20.0)));
        assert_eq!(axes.y_range(), Some((0.0, 20.0)));
        let identity = axes.layers().iter().rev().find_map(|l| match l {
            Layer::Curve { dash, points, .. } => Some((*dash, points.clone())),
            _ => None,
        });
        let (dash, points) = identity.unwrap();
        assert!(dash);
        assert_eq!(points, vec![(0.0, 0.0), (20.0, 20.0)]);
    }

    #[test]
    fn explicit_limits_override_the_identity_union() {
        let table = DataTable::from_columns(vec![
            ("x", vec![0.0, 1.0]),
            ("y", vec![10.0, 20.0]),
        ])
        .unwrap();
        let cfg = ScatterConfig {
            add_identity_line: true,
            x_limits: Some((-1.0, 2.0)),
            ..plain_config()
        };
        let mut axes = Axes::new();
        draw_scatter(&mut axes, &table, &cfg).unwrap();
        assert_eq!(axes.x_range(), Some((-1.0, 2.0)));
        assert_eq!(axes.y_range(), Some((0.0, 20.0)));
    }

    #[test]
    fn classification_buckets_rows_by_x() {
        let n = 40;
        let xs: Vec<f64> = (0..n).map(|i| -2.0 + 4.0 * i as f64 / (n - 1) as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 0.5 * x).collect();
        let table = DataTable::from_columns(vec![("x", xs), ("y", ys)]).unwrap();
        let mut axes = Axes::new();
        draw_classification_scatter(&mut axes, &table, &ClassificationConfig::default()).unwrap();
        let entries = axes.legend_entries();
        // pooled label plus the four default intervals
        assert_eq!(entries.len(), 5);
        assert!(entries[0].label.starts_with("Full sample: "));
        assert_eq!(entries[1].label.split(':').next(), Some("[-3.00, -1.50]"));
    }

    #[test]
    fn empty_buckets_are_skipped_not_fatal() {
        let xs: Vec<f64> = (0..30).map(|i| 0.2 + 0.02 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x).collect();
        let table = DataTable::from_columns(vec![("x", xs), ("y", ys)]).unwrap();
        let cfg = ClassificationConfig {
            buckets: Buckets::Edges(vec![0.0, 1.0, 2.0, 3.0]),
            ..ClassificationConfig::default()
        };
        let mut axes = Axes::new();
        draw_classification_scatter(&mut axes, &table, &cfg).unwrap();
        let entries = axes.legend_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].label.starts_with("[0.00, 1.00]"));
    }

    #[test]
    fn quantile_classification_balances_buckets() {
        let n = 100;
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| -0.3 * x).collect();
        let table = DataTable::from_columns(vec![("x", xs), ("y", ys)]).unwrap();
        let cfg = ClassificationConfig {
            buckets: Buckets::Quantiles(4),
            ..ClassificationConfig::default()
        };
        let mut axes = Axes::new();
        draw_classification_scatter(&mut axes, &table, &cfg).unwrap();
        let point_counts: Vec<usize> = axes
            .layers()
            .iter()
            .filter_map(|l| match l {
                Layer::Points { points, .. } => Some(points.len()),
                _ => None,
            })
            .collect();
        assert_eq!(point_counts.len(), 4);
        for count in point_counts {
            assert!((24..=26).contains(&count));
        }
    }
}

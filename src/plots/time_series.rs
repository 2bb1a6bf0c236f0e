use std::collections::BTreeMap;

use crate::plots::{
    date_position, palette_color, Axes, LegendEntry, LegendLoc, NumberFormat, PANEL_HEIGHT,
    PANEL_WIDTH,
};
use crate::stats::performance_metrics;
use crate::utils::{TimePanel, TimeSeries};

const MONTH_LABELS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const TRADING_DAYS_PER_YEAR: u32 = 252;

/// Which running statistics a line's legend label carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegendStats {
    Plain,
    Last,
    AvgLast,
    FirstAvgLast,
    /// Return/vol/Sharpe of the series treated as a daily nav. Ignores the
    /// panel's y format.
    Performance,
}

/// Legend label for one series under the chosen statistics.
pub fn stat_label(series: &TimeSeries, stats: LegendStats, format: NumberFormat) -> String {
    let finite: Vec<f64> = series.values.iter().copied().filter(|v| v.is_finite()).collect();
    let first = finite.first().copied().unwrap_or(f64::NAN);
    let last = finite.last().copied().unwrap_or(f64::NAN);
    let avg = if finite.is_empty() {
        f64::NAN
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    };
    match stats {
        LegendStats::Plain => series.name.clone(),
        LegendStats::Last => format!("{}: last={}", series.name, format.format(last)),
        LegendStats::AvgLast => format!(
            "{}: avg={}, last={}",
            series.name,
            format.format(avg),
            format.format(last)
        ),
        LegendStats::FirstAvgLast => format!(
            "{}: first={}, avg={}, last={}",
            series.name,
            format.format(first),
            format.format(avg),
            format.format(last)
        ),
        LegendStats::Performance => {
            let metrics = performance_metrics(&series.returns(), 0.0, TRADING_DAYS_PER_YEAR);
            let pct = NumberFormat::Percent(0);
            format!(
                "{}: total={}, vol={}, Sharpe={:.2}",
                series.name,
                pct.format(metrics.total_return),
                pct.format(metrics.annualized_volatility),
                metrics.sharpe_ratio
            )
        }
    }
}

#[derive(Clone, Debug)]
pub struct LineOptions {
    pub title: Option<String>,
    pub y_format: NumberFormat,
    pub legend_stats: LegendStats,
    pub legend_loc: LegendLoc,
    pub line_width: f64,
    pub log_y: bool,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            title: None,
            y_format: NumberFormat::Percent(0),
            legend_stats: LegendStats::Last,
            legend_loc: LegendLoc::UpperLeft,
            line_width: 1.2,
            log_y: false,
        }
    }
}

impl LineOptions {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_format(mut self, format: NumberFormat) -> Self {
        self.y_format = format;
        self
    }

    pub fn with_stats(mut self, stats: LegendStats) -> Self {
        self.legend_stats = stats;
        self
    }

    pub fn with_legend_loc(mut self, loc: LegendLoc) -> Self {
        self.legend_loc = loc;
        self
    }

    pub fn with_log_y(mut self) -> Self {
        self.log_y = true;
        self
    }
}

/// Draws one colored line per series with a statistics legend. Date ticks
/// come from the longest series.
pub fn draw_lines(axes: &mut Axes, series: &[TimeSeries], options: &LineOptions) {
    axes.set_y_format(options.y_format);
    axes.set_legend_loc(options.legend_loc);
    axes.set_log_y(options.log_y);
    if let Some(title) = &options.title {
        axes.set_title(title.clone());
    }
    let mut legend = Vec::new();
    for (index, line) in series.iter().enumerate() {
        let color = palette_color(index);
        let points: Vec<(f64, f64)> = line
            .dates
            .iter()
            .zip(&line.values)
            .filter(|(_, v)| v.is_finite())
            .map(|(d, v)| (date_position(*d), *v))
            .collect();
        axes.add_curve(points, color, options.line_width, false);
        legend.push(LegendEntry {
            label: stat_label(line, options.legend_stats, options.y_format),
            color: color.to_string(),
            dash: false,
        });
    }
    axes.set_legend(legend);
    if let Some(longest) = series.iter().max_by_key(|s| s.dates.len()) {
        axes.set_date_ticks(&longest.dates);
    }
}

pub fn line_panel(series: &[TimeSeries], options: &LineOptions) -> Axes {
    let mut axes = Axes::new();
    draw_lines(&mut axes, series, options);
    axes
}

/// Typical spacing between consecutive dates, in axis units.
fn median_date_gap(dates: &[chrono::NaiveDate]) -> f64 {
    let mut gaps: Vec<f64> = dates
        .windows(2)
        .map(|w| date_position(w[1]) - date_position(w[0]))
        .collect();
    if gaps.is_empty() {
        return 1.0;
    }
    gaps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    gaps[gaps.len() / 2]
}

/// One stacked bar per date, a column per panel member.
pub fn stacked_bar_panel(panel: &TimePanel, title: &str, y_format: NumberFormat) -> Axes {
    let mut axes = Axes::new();
    axes.set_y_format(y_format);
    if !title.is_empty() {
        axes.set_title(title);
    }
    let width = median_date_gap(&panel.dates) * 0.8;
    let rows: Vec<(f64, Vec<f64>)> = panel
        .dates
        .iter()
        .zip(&panel.rows)
        .map(|(d, row)| (date_position(*d), row.clone()))
        .collect();
    let colors: Vec<String> = (0..panel.num_columns())
        .map(|i| palette_color(i).to_string())
        .collect();
    axes.add_stacked_bars(rows, colors.clone(), width);
    axes.set_legend(
        panel
            .columns
            .iter()
            .zip(colors)
            .map(|(name, color)| LegendEntry {
                label: name.clone(),
                color,
                dash: false,
            })
            .collect(),
    );
    axes.set_date_ticks(&panel.dates);
    axes
}

/// Side-by-side bars per category, one slot per series.
pub fn grouped_bar_panel(
    categories: &[String],
    series: &[(String, Vec<f64>)],
    title: &str,
    y_format: NumberFormat,
) -> Axes {
    let mut axes = Axes::new();
    axes.set_y_format(y_format);
    if !title.is_empty() {
        axes.set_title(title);
    }
    if categories.is_empty() || series.is_empty() {
        return axes;
    }
    let slot = 0.8 / series.len() as f64;
    let mut legend = Vec::new();
    for (j, (name, values)) in series.iter().enumerate() {
        let color = palette_color(j);
        let offset = -0.4 + slot * (j as f64 + 0.5);
        let bars: Vec<(f64, f64)> = values
            .iter()
            .take(categories.len())
            .enumerate()
            .map(|(i, v)| (i as f64 + offset, *v))
            .collect();
        axes.add_bars(bars, color, slot);
        legend.push(LegendEntry {
            label: name.clone(),
            color: color.to_string(),
            dash: false,
        });
    }
    axes.add_hguide(0.0, "#bbbbbb", true);
    axes.set_legend(legend);
    axes.set_category_ticks(categories);
    axes
}

fn heat_color(value: f64, max_abs: f64) -> String {
    if !value.is_finite() || max_abs <= 0.0 {
        return String::from("#f5f5f5");
    }
    let t = 0.2 + 0.8 * (value.abs() / max_abs).clamp(0.0, 1.0);
    let (r, g, b) = if value >= 0.0 {
        (79.0, 164.0, 135.0)
    } else {
        (175.0, 75.0, 100.0)
    };
    let blend = |c: f64| (255.0 + (c - 255.0) * t).round() as u8;
    format!("#{:02x}{:02x}{:02x}", blend(r), blend(g), blend(b))
}

/// Year-by-month return grid, green for gains and red for losses. Returns a
/// panel body string for figure embedding.
pub fn monthly_heatmap_panel(returns: &BTreeMap<(i32, u32), f64>, title: &str) -> String {
    if returns.is_empty() {
        return String::new();
    }
    let years: Vec<i32> = {
        let mut seen: Vec<i32> = returns.keys().map(|(y, _)| *y).collect();
        seen.dedup();
        seen
    };
    let max_abs = returns
        .values()
        .filter(|v| v.is_finite())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));

    let left = 46.0;
    let top = 38.0;
    let grid_w = PANEL_WIDTH as f64 - left - 8.0;
    let grid_h = PANEL_HEIGHT as f64 - top - 8.0;
    let cell_w = grid_w / 12.0;
    let cell_h = (grid_h / years.len() as f64).min(22.0);

    let mut svg = String::new();
    if !title.is_empty() {
        svg.push_str(&format!(
            r##"<text x="{x:.2}" y="14" text-anchor="middle" font-size="11" fill="#333">{title}</text>"##,
            x = PANEL_WIDTH as f64 / 2.0,
            title = title
        ));
    }
    for (m, label) in MONTH_LABELS.iter().enumerate() {
        svg.push_str(&format!(
            r#"<text x="{x:.2}" y="30" text-anchor="middle" font-size="8">{label}</text>"#,
            x = left + (m as f64 + 0.5) * cell_w,
            label = label
        ));
    }
    for (row, year) in years.iter().enumerate() {
        let y = top + row as f64 * cell_h;
        svg.push_str(&format!(
            r#"<text x="{x:.2}" y="{ty:.2}" text-anchor="end" font-size="8">{year}</text>"#,
            x = left - 4.0,
            ty = y + cell_h / 2.0 + 3.0,
            year = year
        ));
        for month in 1..=12u32 {
            let value = match returns.get(&(*year, month)) {
                Some(v) if v.is_finite() => *v,
                _ => continue,
            };
            let x = left + (month - 1) as f64 * cell_w;
            svg.push_str(&format!(
                r##"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{fill}" />"##,
                x = x,
                y = y,
                w = cell_w - 1.0,
                h = cell_h - 1.0,
                fill = heat_color(value, max_abs)
            ));
            svg.push_str(&format!(
                r#"<text x="{tx:.2}" y="{ty:.2}" text-anchor="middle" font-size="8">{value:.1}</text>"#,
                tx = x + (cell_w - 1.0) / 2.0,
                ty = y + cell_h / 2.0 + 3.0,
                value = value * 100.0
            ));
        }
    }
    svg
}

/// Plain text grid with a header row. Rows past the panel capacity are cut.
pub fn table_panel(title: &str, headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut svg = String::new();
    if !title.is_empty() {
        svg.push_str(&format!(
            r##"<text x="{x:.2}" y="14" text-anchor="middle" font-size="11" fill="#333">{title}</text>"##,
            x = PANEL_WIDTH as f64 / 2.0,
            title = title
        ));
    }
    let left = 12.0;
    let col_w = (PANEL_WIDTH as f64 - 2.0 * left) / headers.len() as f64;
    let text_x = |col: usize| {
        // first column flush left, the rest right-aligned
        if col == 0 {
            (left + col_w * col as f64, "start")
        } else {
            (left + col_w * (col + 1) as f64 - 4.0, "end")
        }
    };
    for (col, header) in headers.iter().enumerate() {
        let (x, anchor) = text_x(col);
        svg.push_str(&format!(
            r##"<text x="{x:.2}" y="32" text-anchor="{anchor}" font-size="9" fill="#333" font-weight="bold">{header}</text>"##,
            x = x,
            anchor = anchor,
            header = header
        ));
    }
    svg.push_str(&format!(
        r##"<line x1="{x1:.2}" y1="36" x2="{x2:.2}" y2="36" stroke="#ccc" stroke-width="1" />"##,
        x1 = left,
        x2 = PANEL_WIDTH as f64 - left
    ));

    let step = 14.0;
    let capacity = ((PANEL_HEIGHT as f64 - 48.0 - 6.0) / step) as usize;
    for (row_index, row) in rows.iter().take(capacity).enumerate() {
        let y = 48.0 + row_index as f64 * step;
        for (col, cell) in row.iter().take(headers.len()).enumerate() {
            let (x, anchor) = text_x(col);
            svg.push_str(&format!(
                r#"<text x="{x:.2}" y="{y:.2}" text-anchor="{anchor}" font-size="9">{cell}</text>"#,
                x = x,
                y = y,
                anchor = anchor,
                cell = cell
            ));
        }
    }
    svg
}

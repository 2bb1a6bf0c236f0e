pub mod scatter;
pub mod time_series;

use std::path::Path;

use chrono::{Datelike, NaiveDate};

pub(crate) const PANEL_WIDTH: i32 = 576;
pub(crate) const PANEL_HEIGHT: i32 = 288;
pub(crate) const PADDING: f64 = 36.0;
const PAGE_WIDTH: i32 = 595;
const PAGE_HEIGHT: i32 = 842;

pub(crate) const BAND_COLOR: &str = "#808080";

const PALETTE: [&str; 10] = [
    "#348dc1", "#ff9933", "#4fa487", "#af4b64", "#7a68a6", "#c49c44", "#46a2c8", "#8c8c8c",
    "#2f6f5e", "#b06fa8",
];

/// Stable series color by index, cycling past the palette end.
pub fn palette_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// Axis tick and legend value formatting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberFormat {
    /// Fraction shown as percent with the given decimals.
    Percent(usize),
    Decimal(usize),
    Integer,
}

impl NumberFormat {
    pub fn format(&self, value: f64) -> String {
        if !value.is_finite() {
            return String::from("-");
        }
        match self {
            NumberFormat::Percent(decimals) => {
                format!("{:.prec$}%", value * 100.0, prec = *decimals)
            }
            NumberFormat::Decimal(decimals) => format!("{:.prec$}", value, prec = *decimals),
            NumberFormat::Integer => format!("{value:.0}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegendLoc {
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
    Hidden,
}

#[derive(Clone, Debug)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
    pub dash: bool,
}

#[derive(Clone, Debug)]
pub(crate) enum Layer {
    Points {
        color: String,
        radius: f64,
        points: Vec<(f64, f64)>,
    },
    Curve {
        color: String,
        width: f64,
        dash: bool,
        points: Vec<(f64, f64)>,
    },
    Band {
        color: String,
        lower: Vec<(f64, f64)>,
        upper: Vec<(f64, f64)>,
    },
    Bars {
        color: String,
        width: f64,
        bars: Vec<(f64, f64)>,
    },
    StackedBars {
        colors: Vec<String>,
        width: f64,
        rows: Vec<(f64, Vec<f64>)>,
    },
    Note {
        x: f64,
        y: f64,
        text: String,
        color: String,
        size: f64,
    },
    HGuide {
        value: f64,
        color: String,
        dash: bool,
    },
}

/// One chart panel: a list of data layers plus axis state, rendered into
/// SVG elements on a fixed 576x288 canvas.
#[derive(Clone, Debug)]
pub struct Axes {
    title: Option<String>,
    x_label: Option<String>,
    y_label: Option<String>,
    x_format: NumberFormat,
    y_format: NumberFormat,
    font_size: f64,
    fixed_x_limits: Option<(f64, f64)>,
    fixed_y_limits: Option<(f64, f64)>,
    legend_loc: LegendLoc,
    legend: Vec<LegendEntry>,
    x_ticks: Option<Vec<(f64, String)>>,
    x_extent: Option<(f64, f64)>,
    y_extent: Option<(f64, f64)>,
    log_y: bool,
    layers: Vec<Layer>,
}

impl Default for Axes {
    fn default() -> Self {
        Self::new()
    }
}

impl Axes {
    pub fn new() -> Self {
        Self {
            title: None,
            x_label: None,
            y_label: None,
            x_format: NumberFormat::Decimal(2),
            y_format: NumberFormat::Decimal(2),
            font_size: 10.0,
            fixed_x_limits: None,
            fixed_y_limits: None,
            legend_loc: LegendLoc::UpperLeft,
            legend: Vec::new(),
            x_ticks: None,
            x_extent: None,
            y_extent: None,
            log_y: false,
            layers: Vec::new(),
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn set_x_label(&mut self, label: impl Into<String>) {
        self.x_label = Some(label.into());
    }

    pub fn set_y_label(&mut self, label: impl Into<String>) {
        self.y_label = Some(label.into());
    }

    pub fn set_x_format(&mut self, format: NumberFormat) {
        self.x_format = format;
    }

    pub fn set_y_format(&mut self, format: NumberFormat) {
        self.y_format = format;
    }

    pub fn set_font_size(&mut self, size: f64) {
        self.font_size = size;
    }

    pub fn set_legend_loc(&mut self, loc: LegendLoc) {
        self.legend_loc = loc;
    }

    pub fn set_x_limits(&mut self, limits: Option<(f64, f64)>) {
        self.fixed_x_limits = limits;
    }

    pub fn set_y_limits(&mut self, limits: Option<(f64, f64)>) {
        self.fixed_y_limits = limits;
    }

    /// Maps y through ln(); ignored unless the whole y range is positive.
    pub fn set_log_y(&mut self, log: bool) {
        self.log_y = log;
    }

    /// Current x range: fixed limits if set, the data extent otherwise.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        self.fixed_x_limits.or(self.x_extent)
    }

    pub fn y_range(&self) -> Option<(f64, f64)> {
        self.fixed_y_limits.or(self.y_extent)
    }

    /// Replaces the whole legend in one call.
    pub fn set_legend(&mut self, entries: Vec<LegendEntry>) {
        self.legend = entries;
    }

    pub fn legend_entries(&self) -> &[LegendEntry] {
        &self.legend
    }

    pub(crate) fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn expand_x(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.x_extent = Some(match self.x_extent {
            None => (value, value),
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
        });
    }

    fn expand_y(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.y_extent = Some(match self.y_extent {
            None => (value, value),
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
        });
    }

    pub fn add_points(&mut self, points: &[(f64, f64)], color: &str, marker_size: f64) {
        let kept: Vec<(f64, f64)> = points
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        if kept.is_empty() {
            return;
        }
        for (x, y) in &kept {
            self.expand_x(*x);
            self.expand_y(*y);
        }
        self.layers.push(Layer::Points {
            color: color.to_string(),
            radius: (marker_size / 2.0).max(0.75),
            points: kept,
        });
    }

    pub fn add_curve(&mut self, points: Vec<(f64, f64)>, color: &str, width: f64, dash: bool) {
        let kept: Vec<(f64, f64)> = points
            .into_iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        if kept.len() < 2 {
            return;
        }
        for (x, y) in &kept {
            self.expand_x(*x);
            self.expand_y(*y);
        }
        self.layers.push(Layer::Curve {
            color: color.to_string(),
            width,
            dash,
            points: kept,
        });
    }

    pub fn add_band(&mut self, lower: Vec<(f64, f64)>, upper: Vec<(f64, f64)>, color: &str) {
        if lower.len() < 2 || upper.len() < 2 {
            return;
        }
        for (x, y) in lower.iter().chain(&upper) {
            self.expand_x(*x);
            self.expand_y(*y);
        }
        self.layers.push(Layer::Band {
            color: color.to_string(),
            lower,
            upper,
        });
    }

    /// Vertical bars from zero; `width` is in x units.
    pub fn add_bars(&mut self, bars: Vec<(f64, f64)>, color: &str, width: f64) {
        let kept: Vec<(f64, f64)> = bars
            .into_iter()
            .filter(|(x, v)| x.is_finite() && v.is_finite())
            .collect();
        if kept.is_empty() {
            return;
        }
        for (x, v) in &kept {
            self.expand_x(*x - width / 2.0);
            self.expand_x(*x + width / 2.0);
            self.expand_y(*v);
            self.expand_y(0.0);
        }
        self.layers.push(Layer::Bars {
            color: color.to_string(),
            width,
            bars: kept,
        });
    }

    /// Bars stacked per x position, positives up and negatives down.
    pub fn add_stacked_bars(&mut self, rows: Vec<(f64, Vec<f64>)>, colors: Vec<String>, width: f64) {
        if rows.is_empty() || colors.is_empty() {
            return;
        }
        for (x, values) in &rows {
            if !x.is_finite() {
                continue;
            }
            self.expand_x(*x - width / 2.0);
            self.expand_x(*x + width / 2.0);
            let positive: f64 = values.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
            let negative: f64 = values.iter().filter(|v| v.is_finite() && **v < 0.0).sum();
            self.expand_y(positive);
            self.expand_y(negative);
            self.expand_y(0.0);
        }
        self.layers.push(Layer::StackedBars {
            colors,
            width,
            rows,
        });
    }

    pub fn add_note(&mut self, x: f64, y: f64, text: impl Into<String>, color: &str, size: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.expand_x(x);
        self.expand_y(y);
        self.layers.push(Layer::Note {
            x,
            y,
            text: text.into(),
            color: color.to_string(),
            size,
        });
    }

    pub fn add_hguide(&mut self, value: f64, color: &str, dash: bool) {
        if !value.is_finite() {
            return;
        }
        self.expand_y(value);
        self.layers.push(Layer::HGuide {
            value,
            color: color.to_string(),
            dash,
        });
    }

    /// Date ticks at month starts, or year starts for longer histories.
    pub fn set_date_ticks(&mut self, dates: &[NaiveDate]) {
        if dates.is_empty() {
            return;
        }
        let mut months: Vec<(i32, u32)> = Vec::new();
        for date in dates {
            let key = (date.year(), date.month());
            if months.last() != Some(&key) {
                months.push(key);
            }
        }
        let yearly = months.len() > 15;
        let mut ticks = Vec::new();
        let mut last_key: Option<(i32, u32)> = None;
        for date in dates {
            let key = if yearly {
                (date.year(), 0)
            } else {
                (date.year(), date.month())
            };
            if last_key == Some(key) {
                continue;
            }
            last_key = Some(key);
            let label = if yearly {
                date.format("%Y").to_string()
            } else {
                date.format("%Y-%m").to_string()
            };
            ticks.push((date_position(*date), label));
        }
        if ticks.len() > 12 {
            let step = ticks.len().div_ceil(12);
            ticks = ticks
                .into_iter()
                .enumerate()
                .filter(|(i, _)| i % step == 0)
                .map(|(_, t)| t)
                .collect();
        }
        self.x_ticks = Some(ticks);
    }

    /// Ticks at integer positions 0..n, thinned to at most eight labels.
    pub fn set_category_ticks(&mut self, labels: &[String]) {
        if labels.is_empty() {
            return;
        }
        let step = labels.len().div_ceil(8).max(1);
        self.x_ticks = Some(
            labels
                .iter()
                .enumerate()
                .filter(|(i, _)| i % step == 0)
                .map(|(i, label)| (i as f64, label.clone()))
                .collect(),
        );
    }

    /// Renders the panel body. Empty when there is nothing to draw.
    pub fn render(&self) -> String {
        let width = PANEL_WIDTH as f64;
        let height = PANEL_HEIGHT as f64;
        let (min_x, max_x) = match effective_range(self.fixed_x_limits, self.x_extent) {
            Some(range) => range,
            None => return String::new(),
        };
        let (min_y, max_y) = match effective_range(self.fixed_y_limits, self.y_extent) {
            Some(range) => range,
            None => return String::new(),
        };
        let inner_w = width - 2.0 * PADDING;
        let inner_h = height - 2.0 * PADDING;
        let x_to_px = |v: f64| PADDING + (v - min_x) / (max_x - min_x) * inner_w;
        let log_y = self.log_y && min_y > 0.0;
        let (y_lo, y_span) = if log_y {
            (min_y.ln(), max_y.ln() - min_y.ln())
        } else {
            (min_y, max_y - min_y)
        };
        let y_to_px = move |v: f64| {
            let t = if log_y {
                (v.ln() - y_lo) / y_span
            } else {
                (v - y_lo) / y_span
            };
            PADDING + (1.0 - t) * inner_h
        };

        let mut svg = String::new();

        // Horizontal gridlines with y labels
        for i in 0..=4 {
            let t = i as f64 / 4.0;
            let value = if log_y {
                (y_lo + y_span * t).exp()
            } else {
                min_y + (max_y - min_y) * t
            };
            let y = y_to_px(value);
            let color = if i == 0 { "#000" } else { "#eeeeee" };
            svg.push_str(&format!(
                r#"<line x1="{x1:.2}" y1="{y:.2}" x2="{x2:.2}" y2="{y:.2}" stroke="{color}" stroke-width="1" />"#,
                x1 = PADDING,
                x2 = width - PADDING,
                y = y,
                color = color
            ));
            svg.push_str(&format!(
                r#"<text x="{x:.2}" y="{y:.2}" dy="3" text-anchor="end" font-size="{fs}">{label}</text>"#,
                x = PADDING - 6.0,
                y = y,
                fs = self.font_size,
                label = self.y_format.format(value)
            ));
        }

        // X ticks: explicit date/category ticks or a numeric grid
        let ticks: Vec<(f64, String)> = match &self.x_ticks {
            Some(ticks) => ticks.clone(),
            None => (0..=4)
                .map(|i| {
                    let value = min_x + (max_x - min_x) * i as f64 / 4.0;
                    (value, self.x_format.format(value))
                })
                .collect(),
        };
        for (pos, label) in &ticks {
            let x = x_to_px(*pos);
            if x < PADDING - 1.0 || x > width - PADDING + 1.0 {
                continue;
            }
            svg.push_str(&format!(
                r##"<line x1="{x:.2}" y1="{y1:.2}" x2="{x:.2}" y2="{y2:.2}" stroke="#dddddd" stroke-width="1" />"##,
                x = x,
                y1 = PADDING,
                y2 = height - PADDING
            ));
            svg.push_str(&format!(
                r##"<line x1="{x:.2}" y1="{y1:.2}" x2="{x:.2}" y2="{y2:.2}" stroke="#ccc" stroke-width="1" />"##,
                x = x,
                y1 = height - PADDING,
                y2 = height - PADDING + 4.0
            ));
            svg.push_str(&format!(
                r#"<text x="{x:.2}" y="{y:.2}" text-anchor="middle" font-size="{fs}">{label}</text>"#,
                x = x,
                y = height - PADDING + 14.0,
                fs = self.font_size,
                label = label
            ));
        }

        for layer in &self.layers {
            match layer {
                Layer::Points {
                    color,
                    radius,
                    points,
                } => {
                    for (x, y) in points {
                        if *x < min_x || *x > max_x || *y < min_y || *y > max_y {
                            continue;
                        }
                        svg.push_str(&format!(
                            r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}" fill="{color}" />"#,
                            cx = x_to_px(*x),
                            cy = y_to_px(*y),
                            r = radius,
                            color = color
                        ));
                    }
                }
                Layer::Curve {
                    color,
                    width: line_width,
                    dash,
                    points,
                } => {
                    let px: Vec<(f64, f64)> = points
                        .iter()
                        .map(|(x, y)| (x_to_px(*x), y_to_px(*y)))
                        .collect();
                    svg.push_str(&polyline(&px, color, *line_width, *dash));
                }
                Layer::Band {
                    color,
                    lower,
                    upper,
                } => {
                    for edge in [lower, upper] {
                        let px: Vec<(f64, f64)> = edge
                            .iter()
                            .filter(|(x, y)| x.is_finite() && y.is_finite())
                            .map(|(x, y)| (x_to_px(*x), y_to_px(*y)))
                            .collect();
                        svg.push_str(&polyline(&px, color, 1.0, true));
                    }
                }
                Layer::Bars {
                    color,
                    width: bar_width,
                    bars,
                } => {
                    let zero = y_to_px(0.0f64.clamp(min_y, max_y));
                    for (cx, value) in bars {
                        let x0 = x_to_px(cx - bar_width / 2.0);
                        let x1 = x_to_px(cx + bar_width / 2.0);
                        let y = y_to_px(*value);
                        svg.push_str(&format!(
                            r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{color}" />"#,
                            x = x0,
                            y = y.min(zero),
                            w = (x1 - x0).max(0.5),
                            h = (y - zero).abs().max(0.5),
                            color = color
                        ));
                    }
                }
                Layer::StackedBars {
                    colors,
                    width: bar_width,
                    rows,
                } => {
                    for (cx, values) in rows {
                        let x0 = x_to_px(cx - bar_width / 2.0);
                        let x1 = x_to_px(cx + bar_width / 2.0);
                        let mut positive = 0.0;
                        let mut negative = 0.0;
                        for (j, value) in values.iter().enumerate() {
                            if !value.is_finite() || *value == 0.0 {
                                continue;
                            }
                            let (from, to) = if *value > 0.0 {
                                let seg = (positive, positive + value);
                                positive += value;
                                seg
                            } else {
                                let seg = (negative + value, negative);
                                negative += value;
                                seg
                            };
                            svg.push_str(&format!(
                                r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{color}" />"#,
                                x = x0,
                                y = y_to_px(to.clamp(min_y, max_y)),
                                w = (x1 - x0).max(0.5),
                                h = (y_to_px(from.clamp(min_y, max_y))
                                    - y_to_px(to.clamp(min_y, max_y)))
                                .abs(),
                                color = colors[j % colors.len()]
                            ));
                        }
                    }
                }
                Layer::Note {
                    x,
                    y,
                    text,
                    color,
                    size,
                } => {
                    svg.push_str(&format!(
                        r#"<text x="{x:.2}" y="{y:.2}" font-size="{fs}" fill="{color}">{text}</text>"#,
                        x = x_to_px(*x) + 3.0,
                        y = y_to_px(*y) - 3.0,
                        fs = size,
                        color = color,
                        text = text
                    ));
                }
                Layer::HGuide { value, color, dash } => {
                    if *value < min_y || *value > max_y {
                        continue;
                    }
                    let dash_attr = if *dash {
                        r#" stroke-dasharray="4,3""#
                    } else {
                        ""
                    };
                    svg.push_str(&format!(
                        r#"<line x1="{x1:.2}" y1="{y:.2}" x2="{x2:.2}" y2="{y:.2}" stroke="{color}" stroke-width="1"{dash} />"#,
                        x1 = PADDING,
                        x2 = width - PADDING,
                        y = y_to_px(*value),
                        color = color,
                        dash = dash_attr
                    ));
                }
            }
        }

        if let Some(title) = &self.title {
            svg.push_str(&format!(
                r##"<text x="{x:.2}" y="14" text-anchor="middle" font-size="{fs}" fill="#333">{title}</text>"##,
                x = width / 2.0,
                fs = self.font_size + 1.0,
                title = title
            ));
        }
        if let Some(label) = &self.x_label {
            svg.push_str(&format!(
                r#"<text x="{x:.2}" y="{y:.2}" text-anchor="middle" font-size="{fs}">{label}</text>"#,
                x = width / 2.0,
                y = height - 4.0,
                fs = self.font_size,
                label = label
            ));
        }
        if let Some(label) = &self.y_label {
            svg.push_str(&format!(
                r#"<text x="11" y="{y:.2}" text-anchor="middle" font-size="{fs}" transform="rotate(-90, 11, {y:.2})">{label}</text>"#,
                y = height / 2.0,
                fs = self.font_size,
                label = label
            ));
        }

        if self.legend_loc != LegendLoc::Hidden && !self.legend.is_empty() {
            draw_legend(&mut svg, &self.legend, self.legend_loc, self.font_size);
        }

        svg
    }
}

/// Maps a date onto a continuous x axis.
pub fn date_position(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

/// Fixed limits are honored exactly; data extents get a 5% margin and flat
/// ranges are widened so the scale never degenerates.
fn effective_range(fixed: Option<(f64, f64)>, extent: Option<(f64, f64)>) -> Option<(f64, f64)> {
    let (mut lo, mut hi) = match fixed {
        Some((lo, hi)) => (lo, hi),
        None => {
            let (lo, hi) = extent?;
            let margin = (hi - lo) * 0.05;
            (lo - margin, hi + margin)
        }
    };
    if !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    if lo == hi {
        // widen flat ranges
        let adjust = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
        lo -= adjust;
        hi += adjust;
    }
    Some((lo, hi))
}

fn polyline(points: &[(f64, f64)], color: &str, width: f64, dash: bool) -> String {
    if points.len() < 2 {
        return String::new();
    }
    let coords = points
        .iter()
        .map(|(x, y)| format!("{x:.2},{y:.2}"))
        .collect::<Vec<_>>()
        .join(" ");
    let dash_attr = if dash {
        r#" stroke-dasharray="5,4""#
    } else {
        ""
    };
    format!(
        r#"<polyline fill="none" stroke="{color}" stroke-width="{width}"{dash_attr} points="{coords}" />"#
    )
}

fn draw_legend(svg: &mut String, entries: &[LegendEntry], loc: LegendLoc, font_size: f64) {
    let width = PANEL_WIDTH as f64;
    let height = PANEL_HEIGHT as f64;
    let step = 16.0;
    let block = step * entries.len().saturating_sub(1) as f64;
    let (x, mut y) = match loc {
        LegendLoc::UpperLeft => (PADDING + 10.0, PADDING + 14.0),
        LegendLoc::UpperRight => (width - PADDING - 230.0, PADDING + 14.0),
        LegendLoc::LowerLeft => (PADDING + 10.0, height - PADDING - 10.0 - block),
        LegendLoc::LowerRight => (width - PADDING - 230.0, height - PADDING - 10.0 - block),
        LegendLoc::Hidden => return,
    };
    for entry in entries {
        let dash_attr = if entry.dash {
            r#" stroke-dasharray="5,4""#
        } else {
            ""
        };
        svg.push_str(&format!(
            r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y1:.2}" stroke="{color}" stroke-width="2"{dash} />"#,
            x1 = x,
            x2 = x + 20.0,
            y1 = y - 4.0,
            color = entry.color,
            dash = dash_attr
        ));
        svg.push_str(&format!(
            r#"<text x="{tx:.2}" y="{ty:.2}" font-size="{fs}">{label}</text>"#,
            tx = x + 26.0,
            ty = y,
            fs = font_size,
            label = entry.label
        ));
        y += step;
    }
}

pub(crate) fn svg_header(width: i32, height: i32) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><style>text {{ font-family: Arial, sans-serif; font-size: 10px; fill: #666; }}</style>"##,
        w = width,
        h = height
    )
}

pub(crate) fn svg_footer() -> &'static str {
    "</svg>"
}

/// Panel placement in page fractions, origin at the top left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }
}

/// Fractional grid used to place panels on a page.
#[derive(Clone, Copy, Debug)]
pub struct GridSpec {
    rows: usize,
    cols: usize,
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    hgap: f64,
    vgap: f64,
}

impl GridSpec {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            left: 0.01,
            right: 0.01,
            top: 0.025,
            bottom: 0.01,
            hgap: 0.006,
            vgap: 0.004,
        }
    }

    /// Rect spanning rows `r0..r1` and columns `c0..c1`.
    pub fn cell(&self, r0: usize, r1: usize, c0: usize, c1: usize) -> Rect {
        let r0 = r0.min(self.rows - 1);
        let c0 = c0.min(self.cols - 1);
        let r1 = r1.clamp(r0 + 1, self.rows);
        let c1 = c1.clamp(c0 + 1, self.cols);
        let content_w = 1.0 - self.left - self.right;
        let content_h = 1.0 - self.top - self.bottom;
        let col_w = (content_w - self.hgap * (self.cols - 1) as f64) / self.cols as f64;
        let row_h = (content_h - self.vgap * (self.rows - 1) as f64) / self.rows as f64;
        Rect {
            x: self.left + c0 as f64 * (col_w + self.hgap),
            y: self.top + r0 as f64 * (row_h + self.vgap),
            w: (c1 - c0) as f64 * col_w + (c1 - c0 - 1) as f64 * self.hgap,
            h: (r1 - r0) as f64 * row_h + (r1 - r0 - 1) as f64 * self.vgap,
        }
    }
}

/// A page of panels. Each panel body is rendered on the shared 576x288
/// canvas and embedded as a nested scaled svg element.
#[derive(Clone, Debug)]
pub struct Figure {
    width: i32,
    height: i32,
    title: Option<String>,
    panels: Vec<(Rect, String)>,
}

impl Figure {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            title: None,
            panels: Vec::new(),
        }
    }

    /// A4 portrait page.
    pub fn a4() -> Self {
        Self::new(PAGE_WIDTH, PAGE_HEIGHT)
    }

    /// One panel filling a chart-sized figure.
    pub fn single(axes: &Axes) -> Self {
        let mut figure = Self::new(PANEL_WIDTH, PANEL_HEIGHT);
        figure.add_panel(Rect::full(), axes.render());
        figure
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Adds a pre-rendered panel body; empty bodies are dropped.
    pub fn add_panel(&mut self, rect: Rect, body: String) {
        if !body.is_empty() {
            self.panels.push((rect, body));
        }
    }

    pub fn add_axes(&mut self, rect: Rect, axes: &Axes) {
        self.add_panel(rect, axes.render());
    }

    pub fn num_panels(&self) -> usize {
        self.panels.len()
    }

    pub fn to_svg(&self) -> String {
        let mut svg = svg_header(self.width, self.height);
        svg.push_str(&format!(
            r##"<rect x="0" y="0" width="{w}" height="{h}" fill="#ffffff" />"##,
            w = self.width,
            h = self.height
        ));
        if let Some(title) = &self.title {
            svg.push_str(&format!(
                r##"<text x="{x:.2}" y="15" text-anchor="middle" font-size="13" fill="#262626">{title}</text>"##,
                x = self.width as f64 / 2.0,
                title = title
            ));
        }
        for (rect, body) in &self.panels {
            svg.push_str(&format!(
                r#"<svg x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" viewBox="0 0 {vw} {vh}" preserveAspectRatio="none">"#,
                x = rect.x * self.width as f64,
                y = rect.y * self.height as f64,
                w = rect.w * self.width as f64,
                h = rect.h * self.height as f64,
                vw = PANEL_WIDTH,
                vh = PANEL_HEIGHT
            ));
            svg.push_str(body);
            svg.push_str("</svg>");
        }
        svg.push_str(svg_footer());
        svg
    }

    pub fn save_svg<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_svg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formats_render_plainly() {
        assert_eq!(NumberFormat::Percent(0).format(0.1234), "12%");
        assert_eq!(NumberFormat::Percent(1).format(-0.055), "-5.5%");
        assert_eq!(NumberFormat::Decimal(2).format(1.2345), "1.23");
        assert_eq!(NumberFormat::Integer.format(3.7), "4");
        assert_eq!(NumberFormat::Decimal(2).format(f64::NAN), "-");
    }

    #[test]
    fn palette_cycles_past_its_end() {
        assert_eq!(palette_color(0), palette_color(10));
        assert_ne!(palette_color(0), palette_color(1));
    }

    #[test]
    fn gridspec_splits_the_page() {
        let gs = GridSpec::new(14, 4);
        let left = gs.cell(0, 2, 0, 2);
        let right = gs.cell(0, 2, 2, 4);
        assert!(left.x < 0.02);
        assert!((left.w - right.w).abs() < 1e-9);
        assert!(right.x > 0.45);
        assert!(left.y + left.h < gs.cell(2, 4, 0, 2).y + 1e-9);
    }

    #[test]
    fn fixed_limits_override_data_extents() {
        let mut axes = Axes::new();
        axes.add_points(&[(0.0, 0.0), (1.0, 1.0)], "#000", 4.0);
        assert_eq!(axes.x_range(), Some((0.0, 1.0)));
        axes.set_x_limits(Some((-5.0, 5.0)));
        assert_eq!(axes.x_range(), Some((-5.0, 5.0)));
    }

    #[test]
    fn degenerate_band_does_not_move_the_extents() {
        let mut axes = Axes::new();
        axes.add_curve(vec![(0.0, 1.0), (1.0, 2.0)], "#348dc1", 1.5, false);
        axes.add_band(vec![(-50.0, -50.0)], vec![(50.0, 50.0)], BAND_COLOR);
        assert_eq!(axes.x_range(), Some((0.0, 1.0)));
        assert_eq!(axes.y_range(), Some((1.0, 2.0)));
    }

    #[test]
    fn render_emits_points_and_curves() {
        let mut axes = Axes::new();
        axes.set_title("fitted");
        axes.add_points(&[(0.0, 1.0), (1.0, 2.0)], "darkblue", 4.0);
        axes.add_curve(vec![(0.0, 1.0), (1.0, 2.0)], "#348dc1", 1.5, false);
        axes.set_legend(vec![LegendEntry {
            label: "fit".to_string(),
            color: "#348dc1".to_string(),
            dash: false,
        }]);
        let svg = axes.render();
        assert!(svg.contains("<circle"));
        assert!(svg.contains("<polyline"));
        assert!(svg.contains(">fit</text>"));
        assert!(svg.contains(r##"stroke="#dddddd""##));
        assert!(svg.contains(r##"stroke="#ccc""##));
        assert!(svg.contains(r##"fill="#333">fitted</text>"##));
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn log_axis_spaces_gridlines_geometrically() {
        let mut axes = Axes::new();
        axes.set_y_format(NumberFormat::Decimal(0));
        axes.set_y_limits(Some((100.0, 1000.0)));
        axes.set_log_y(true);
        axes.add_curve(vec![(0.0, 100.0), (1.0, 1000.0)], "#348dc1", 1.5, false);
        let svg = axes.render();
        // the middle gridline sits at the geometric mean
        assert!(svg.contains(">316</text>"));
        assert!(svg.contains(">100</text>"));
        assert!(svg.contains(">1000</text>"));
    }

    #[test]
    fn render_survives_flat_data() {
        let mut axes = Axes::new();
        axes.add_points(&[(1.0, 3.0), (1.0, 3.0)], "#000", 4.0);
        let svg = axes.render();
        assert!(!svg.is_empty());
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn empty_axes_render_nothing() {
        assert!(Axes::new().render().is_empty());
        let mut figure = Figure::a4();
        figure.add_panel(Rect::full(), Axes::new().render());
        assert_eq!(figure.num_panels(), 0);
    }

    #[test]
    fn figure_nests_panel_bodies() {
        let mut axes = Axes::new();
        axes.add_points(&[(0.0, 0.0), (2.0, 2.0)], "#000", 4.0);
        let figure = Figure::single(&axes);
        let svg = figure.to_svg();
        assert!(svg.starts_with("<svg xmlns"));
        assert!(svg.contains(r#"viewBox="0 0 576 288""#));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(figure.num_panels(), 1);
    }
}

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::plots::scatter::{
    draw_classification_scatter, draw_scatter, Buckets, ClassificationConfig, ScatterConfig,
    ScatterError,
};
use crate::plots::time_series::{
    grouped_bar_panel, line_panel, monthly_heatmap_panel, stacked_bar_panel, table_panel,
    LegendStats, LineOptions,
};
use crate::plots::{Axes, Figure, GridSpec, LegendLoc, NumberFormat};
use crate::portfolio::PortfolioData;
use crate::stats::{
    drawdown_series, performance_metrics, rolling_volatility, time_under_water, top_drawdowns,
    yearly_compounded, PerformanceMetrics,
};
use crate::utils::{DataError, ResampleFreq, TimePanel, TimePeriod, TimeSeries};

const DEFAULT_PERIODS_PER_YEAR: u32 = 252;

#[derive(Debug, Error)]
pub enum FactsheetError {
    #[error("no observations inside the report period")]
    EmptyPeriod,
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Scatter(#[from] ScatterError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Report knobs. The rolling windows are in observations of the underlying
/// grid, so the defaults assume daily data.
pub struct FactsheetOptions {
    pub title: Option<String>,
    pub period: TimePeriod,
    pub rf: f64,
    pub periods_per_year: u32,
    pub turnover_roll_period: usize,
    pub cost_roll_period: usize,
    pub beta_span: usize,
    pub beta_freq: ResampleFreq,
    pub vol_window: usize,
    pub var_window: usize,
    pub var_confidence: f64,
    pub weight_freq: ResampleFreq,
    pub scatter_freq: ResampleFreq,
    pub top_contributors: usize,
    pub add_risk_sheet: bool,
    pub add_grouped_exposures: bool,
    pub add_grouped_cum_pnl: bool,
}

impl Default for FactsheetOptions {
    fn default() -> Self {
        Self {
            title: None,
            period: TimePeriod::full(),
            rf: 0.0,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            turnover_roll_period: 260,
            cost_roll_period: 260,
            beta_span: 52,
            beta_freq: ResampleFreq::WeekEnd,
            vol_window: 63,
            var_window: 260,
            var_confidence: 0.95,
            weight_freq: ResampleFreq::MonthEnd,
            scatter_freq: ResampleFreq::MonthEnd,
            top_contributors: 8,
            add_risk_sheet: true,
            add_grouped_exposures: false,
            add_grouped_cum_pnl: false,
        }
    }
}

impl FactsheetOptions {
    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_period(mut self, period: TimePeriod) -> Self {
        self.period = period;
        self
    }

    pub fn with_rf(mut self, rf: f64) -> Self {
        self.rf = rf;
        self
    }

    pub fn with_risk_sheet(mut self, add: bool) -> Self {
        self.add_risk_sheet = add;
        self
    }

    pub fn with_grouped_exposures(mut self) -> Self {
        self.add_grouped_exposures = true;
        self
    }

    pub fn with_grouped_cum_pnl(mut self) -> Self {
        self.add_grouped_cum_pnl = true;
        self
    }
}

/// Builds the multi-page strategy factsheet: a performance page, a risk page
/// with benchmark regressions, and optional grouped appendix pages.
pub fn strategy_factsheet(
    portfolio: &PortfolioData,
    benchmark_prices: &TimePanel,
    options: FactsheetOptions,
) -> Result<Vec<Figure>, FactsheetError> {
    let nav = portfolio.nav(&options.period);
    let (start, end) = nav.date_range().ok_or(FactsheetError::EmptyPeriod)?;
    let title = format!(
        "{}: {} - {}",
        options
            .title
            .clone()
            .unwrap_or_else(|| format!("{} factsheet", portfolio.name())),
        start.format("%d %b %Y"),
        end.format("%d %b %Y")
    );

    let mut figures = Vec::new();
    debug!(strategy = portfolio.name(), "rendering performance page");
    figures.push(performance_page(portfolio, benchmark_prices, &options, &title)?);

    if options.add_risk_sheet {
        debug!(strategy = portfolio.name(), "rendering risk page");
        figures.push(risk_page(portfolio, benchmark_prices, &options, &title)?);
    }
    if options.add_grouped_exposures && portfolio.instrument_groups().is_some() {
        debug!(strategy = portfolio.name(), "rendering grouped exposures");
        figures.push(grouped_exposures_page(portfolio, &options, &title)?);
    }
    if options.add_grouped_cum_pnl && portfolio.instrument_groups().is_some() {
        debug!(strategy = portfolio.name(), "rendering grouped pnl");
        figures.push(grouped_pnl_page(portfolio, &options, &title)?);
    }
    Ok(figures)
}

fn performance_page(
    portfolio: &PortfolioData,
    benchmark_prices: &TimePanel,
    options: &FactsheetOptions,
    title: &str,
) -> Result<Figure, FactsheetError> {
    let period = &options.period;
    let grid = GridSpec::new(14, 4);
    let mut figure = Figure::a4();
    figure.set_title(title);

    // Left column: the time-series story
    let mut nav_lines = vec![portfolio.nav(period).rebase(100.0)];
    for name in &benchmark_prices.columns {
        nav_lines.push(
            benchmark_prices
                .column_series(name)?
                .slice(period)
                .rebase(100.0),
        );
    }
    figure.add_axes(
        grid.cell(0, 2, 0, 2),
        &line_panel(
            &nav_lines,
            &LineOptions::default()
                .with_title("Performance")
                .with_format(NumberFormat::Decimal(0))
                .with_stats(LegendStats::Performance)
                .with_log_y(),
        ),
    );

    let nav = portfolio.nav(period);
    figure.add_axes(
        grid.cell(2, 4, 0, 2),
        &line_panel(
            &[drawdown_series(&nav)],
            &LineOptions::default()
                .with_title("Drawdown")
                .with_legend_loc(LegendLoc::LowerLeft),
        ),
    );
    figure.add_axes(
        grid.cell(4, 6, 0, 2),
        &line_panel(
            &[time_under_water(&nav)],
            &LineOptions::default()
                .with_title("Time under water")
                .with_format(NumberFormat::Integer),
        ),
    );

    let grouped = portfolio.instrument_groups().is_some();
    figure.add_axes(
        grid.cell(6, 8, 0, 2),
        &stacked_bar_panel(
            &portfolio.weights(period, grouped, options.weight_freq),
            "Exposures",
            NumberFormat::Percent(0),
        ),
    );
    figure.add_axes(
        grid.cell(8, 10, 0, 2),
        &line_panel(
            &[portfolio.turnover(period, options.turnover_roll_period)],
            &LineOptions::default()
                .with_title("Turnover")
                .with_stats(LegendStats::AvgLast),
        ),
    );
    if let Some(costs) = portfolio.costs(period, options.cost_roll_period) {
        figure.add_axes(
            grid.cell(10, 12, 0, 2),
            &line_panel(
                &[costs],
                &LineOptions::default()
                    .with_title("Costs")
                    .with_format(NumberFormat::Percent(2))
                    .with_stats(LegendStats::AvgLast),
            ),
        );
    }
    figure.add_axes(
        grid.cell(12, 14, 0, 2),
        &line_panel(
            &portfolio.instrument_counts(period),
            &LineOptions::default()
                .with_title("Number of instruments")
                .with_format(NumberFormat::Integer),
        ),
    );

    // Right column: tables and periodic aggregates
    figure.add_panel(
        grid.cell(0, 2, 2, 4),
        ra_performance_table(portfolio, benchmark_prices, options)?,
    );
    figure.add_panel(
        grid.cell(2, 4, 2, 4),
        monthly_heatmap_panel(&portfolio.monthly_returns(period), "Monthly returns"),
    );
    figure.add_axes(
        grid.cell(4, 6, 2, 4),
        &annual_returns_panel(portfolio, benchmark_prices, period)?,
    );

    let ranked = portfolio.contributors(period);
    let shown = options.top_contributors.min(ranked.len());
    let bottom: Vec<(String, f64)> = ranked.iter().rev().take(shown).cloned().collect();
    figure.add_axes(
        grid.cell(6, 8, 2, 3),
        &pnl_bar_panel(&ranked[..shown], "Top contributors"),
    );
    figure.add_axes(
        grid.cell(6, 8, 3, 4),
        &pnl_bar_panel(&bottom, "Bottom contributors"),
    );

    let instrument_attr = portfolio.attribution(period, false);
    figure.add_axes(
        grid.cell(8, 10, 2, 4),
        &pnl_bar_panel(&instrument_attr, "Attribution by instrument"),
    );
    let group_attr = portfolio.attribution(period, true);
    figure.add_axes(
        grid.cell(10, 12, 2, 4),
        &pnl_bar_panel(&group_attr, "Attribution by group"),
    );

    let drawdowns = top_drawdowns(&nav, 5);
    let dd_headers: Vec<String> = ["start", "trough", "end", "depth", "days"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let dd_rows: Vec<Vec<String>> = drawdowns
        .iter()
        .map(|d| {
            vec![
                d.start.format("%Y-%m-%d").to_string(),
                d.trough.format("%Y-%m-%d").to_string(),
                d.end.format("%Y-%m-%d").to_string(),
                percent(d.depth, 1),
                d.duration.to_string(),
            ]
        })
        .collect();
    figure.add_panel(
        grid.cell(12, 14, 2, 4),
        table_panel("Worst drawdowns", &dd_headers, &dd_rows),
    );

    Ok(figure)
}

fn risk_page(
    portfolio: &PortfolioData,
    benchmark_prices: &TimePanel,
    options: &FactsheetOptions,
    title: &str,
) -> Result<Figure, FactsheetError> {
    let period = &options.period;
    let grid = GridSpec::new(10, 4);
    let mut figure = Figure::a4();
    figure.set_title(format!("{title} (risk)"));

    let betas =
        portfolio.benchmark_betas(benchmark_prices, period, options.beta_span, options.beta_freq)?;
    figure.add_axes(
        grid.cell(0, 2, 0, 2),
        &panel_lines(
            &betas,
            &LineOptions::default()
                .with_title("Benchmark betas")
                .with_format(NumberFormat::Decimal(2))
                .with_stats(LegendStats::AvgLast),
        )?,
    );

    let attribution = portfolio.benchmark_attribution(
        benchmark_prices,
        period,
        options.beta_span,
        options.beta_freq,
    )?;
    figure.add_axes(
        grid.cell(2, 4, 0, 2),
        &panel_lines(
            &attribution,
            &LineOptions::default().with_title("Factor attribution"),
        )?,
    );

    for (index, name) in benchmark_prices.columns.iter().take(2).enumerate() {
        let bench = benchmark_prices.column_series(name)?;
        let table = portfolio.returns_table(&bench, period, options.scatter_freq)?;

        let mut axes = Axes::new();
        let cfg = ScatterConfig {
            group: Some(String::from("year")),
            order: 2,
            full_sample_order: Some(2),
            add_full_sample_line: true,
            confidence: Some(0.95),
            title: Some(format!("Returns vs {name}")),
            x_format: NumberFormat::Percent(1),
            y_format: NumberFormat::Percent(1),
            ..ScatterConfig::default()
        };
        draw_scatter(&mut axes, &table, &cfg)?;
        figure.add_axes(grid.cell(2 * index, 2 * index + 2, 2, 4), &axes);
    }

    figure.add_axes(
        grid.cell(4, 6, 0, 2),
        &panel_lines(
            &portfolio.grouped_var(period, options.var_window, options.var_confidence, true),
            &LineOptions::default()
                .with_title("Correlated VaR")
                .with_format(NumberFormat::Percent(2)),
        )?,
    );
    figure.add_axes(
        grid.cell(4, 6, 2, 4),
        &panel_lines(
            &portfolio.grouped_var(period, options.var_window, options.var_confidence, false),
            &LineOptions::default()
                .with_title("Independent VaR")
                .with_format(NumberFormat::Percent(2)),
        )?,
    );

    for (index, name) in benchmark_prices.columns.iter().take(2).enumerate() {
        let bench = benchmark_prices.column_series(name)?;
        let table = portfolio.returns_table(&bench, period, options.scatter_freq)?;
        let mut axes = Axes::new();
        let cfg = ClassificationConfig {
            buckets: Buckets::Quantiles(4),
            scatter: ScatterConfig {
                title: Some(format!("Returns by {name} regime")),
                x_format: NumberFormat::Percent(1),
                y_format: NumberFormat::Percent(1),
                ..ClassificationConfig::default().scatter
            },
            ..ClassificationConfig::default()
        };
        draw_classification_scatter(&mut axes, &table, &cfg)?;
        figure.add_axes(grid.cell(6, 8, 2 * index, 2 * index + 2), &axes);
    }

    let mut vol_lines = vec![rolling_vol_series(
        &portfolio.returns(period),
        options.vol_window,
        options.periods_per_year,
    )];
    for name in &benchmark_prices.columns {
        let bench = benchmark_prices.column_series(name)?.slice(period).returns();
        vol_lines.push(rolling_vol_series(
            &bench,
            options.vol_window,
            options.periods_per_year,
        ));
    }
    figure.add_axes(
        grid.cell(8, 10, 0, 2),
        &line_panel(
            &vol_lines,
            &LineOptions::default().with_title("Rolling volatility"),
        ),
    );

    Ok(figure)
}

fn rolling_vol_series(returns: &TimeSeries, window: usize, periods_per_year: u32) -> TimeSeries {
    TimeSeries {
        values: rolling_volatility(&returns.values, window, periods_per_year),
        dates: returns.dates.clone(),
        name: returns.name.clone(),
    }
}

fn grouped_exposures_page(
    portfolio: &PortfolioData,
    options: &FactsheetOptions,
    title: &str,
) -> Result<Figure, FactsheetError> {
    let groups = portfolio.group_names();
    let grid = GridSpec::new(groups.len().div_ceil(2).max(1), 2);
    let mut figure = Figure::a4();
    figure.set_title(format!("{title} (exposures)"));
    let weights = portfolio.weights(&options.period, false, options.weight_freq);
    for (index, group) in groups.iter().enumerate() {
        let members = member_names(portfolio, group);
        let panel = weights.select_columns(&members)?;
        figure.add_axes(
            grid.cell(index / 2, index / 2 + 1, index % 2, index % 2 + 1),
            &panel_lines(
                &panel,
                &LineOptions::default()
                    .with_title(group.clone())
                    .with_stats(LegendStats::AvgLast),
            )?,
        );
    }
    Ok(figure)
}

fn grouped_pnl_page(
    portfolio: &PortfolioData,
    options: &FactsheetOptions,
    title: &str,
) -> Result<Figure, FactsheetError> {
    let groups = portfolio.group_names();
    let grid = GridSpec::new(groups.len().div_ceil(2).max(1), 2);
    let mut figure = Figure::a4();
    figure.set_title(format!("{title} (pnl)"));
    let pnl = portfolio.instrument_pnl(&options.period);
    for (index, group) in groups.iter().enumerate() {
        let members = member_names(portfolio, group);
        let cumulative = pnl.select_columns(&members)?.cumsum();
        figure.add_axes(
            grid.cell(index / 2, index / 2 + 1, index % 2, index % 2 + 1),
            &panel_lines(
                &cumulative,
                &LineOptions::default()
                    .with_title(group.clone())
                    .with_format(NumberFormat::Percent(1)),
            )?,
        );
    }
    Ok(figure)
}

fn member_names(portfolio: &PortfolioData, group: &str) -> Vec<String> {
    match portfolio.instrument_groups() {
        Some(labels) => portfolio
            .instrument_names()
            .iter()
            .zip(labels)
            .filter(|(_, label)| *label == group)
            .map(|(name, _)| name.clone())
            .collect(),
        None => Vec::new(),
    }
}

/// One line per panel column.
fn panel_lines(panel: &TimePanel, options: &LineOptions) -> Result<Axes, DataError> {
    let series: Vec<TimeSeries> = panel
        .columns
        .iter()
        .map(|name| panel.column_series(name))
        .collect::<Result<_, _>>()?;
    Ok(line_panel(&series, options))
}

/// Single-series bar chart of named totals, legend suppressed.
fn pnl_bar_panel(totals: &[(String, f64)], title: &str) -> Axes {
    let categories: Vec<String> = totals.iter().map(|(name, _)| name.clone()).collect();
    let values: Vec<f64> = totals.iter().map(|(_, value)| *value).collect();
    let mut axes = grouped_bar_panel(
        &categories,
        &[(String::from("pnl"), values)],
        title,
        NumberFormat::Percent(1),
    );
    axes.set_legend_loc(LegendLoc::Hidden);
    axes
}

fn ra_performance_table(
    portfolio: &PortfolioData,
    benchmark_prices: &TimePanel,
    options: &FactsheetOptions,
) -> Result<String, FactsheetError> {
    let headers: Vec<String> = ["", "total", "an. return", "vol", "sharpe", "max dd", "skew"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut rows = vec![metrics_row(
        portfolio.name(),
        &performance_metrics(
            &portfolio.returns(&options.period),
            options.rf,
            options.periods_per_year,
        ),
    )];
    for name in &benchmark_prices.columns {
        let returns = benchmark_prices
            .column_series(name)?
            .slice(&options.period)
            .returns();
        rows.push(metrics_row(
            name,
            &performance_metrics(&returns, options.rf, options.periods_per_year),
        ));
    }
    Ok(table_panel("Risk-adjusted performance", &headers, &rows))
}

fn metrics_row(name: &str, metrics: &PerformanceMetrics) -> Vec<String> {
    vec![
        name.to_string(),
        percent(metrics.total_return, 1),
        percent(metrics.annualized_return, 1),
        percent(metrics.annualized_volatility, 1),
        format!("{:.2}", metrics.sharpe_ratio),
        percent(metrics.max_drawdown, 1),
        format!("{:.2}", metrics.skewness),
    ]
}

fn annual_returns_panel(
    portfolio: &PortfolioData,
    benchmark_prices: &TimePanel,
    period: &TimePeriod,
) -> Result<Axes, FactsheetError> {
    let strategy_years = portfolio.annual_returns(period);
    let categories: Vec<String> = strategy_years.keys().map(|y| y.to_string()).collect();
    let mut series = vec![(
        portfolio.name().to_string(),
        strategy_years.values().copied().collect::<Vec<f64>>(),
    )];
    for name in &benchmark_prices.columns {
        let returns = benchmark_prices
            .column_series(name)?
            .slice(period)
            .returns();
        let by_year = yearly_compounded(&returns);
        let values: Vec<f64> = strategy_years
            .keys()
            .map(|year| by_year.get(year).copied().unwrap_or(f64::NAN))
            .collect();
        series.push((name.clone(), values));
    }
    Ok(grouped_bar_panel(
        &categories,
        &series,
        "Annual returns",
        NumberFormat::Percent(0),
    ))
}

fn percent(value: f64, decimals: usize) -> String {
    NumberFormat::Percent(decimals).format(value)
}

/// Writes one svg per page plus a small html index embedding them in order.
pub fn save_factsheet<P: AsRef<Path>>(
    figures: &[Figure],
    dir: P,
    stem: &str,
) -> Result<Vec<PathBuf>, FactsheetError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::new();
    let mut html = String::from("<!DOCTYPE html>\n<html><head><style>");
    html.push_str("body { background: #eee; margin: 0; } ");
    html.push_str(".qs-page { margin: 12px auto; width: 595px; box-shadow: 0 1px 4px #999; }");
    html.push_str("</style></head><body>\n");
    for (index, figure) in figures.iter().enumerate() {
        let file = format!("{}_{}.svg", stem, index + 1);
        let path = dir.join(&file);
        figure.save_svg(&path)?;
        html.push_str(&format!(r#"<img class="qs-page" src="{file}" />"#));
        html.push('\n');
        paths.push(path);
    }
    html.push_str("</body></html>\n");
    let index_path = dir.join(format!("{stem}.html"));
    std::fs::write(&index_path, html)?;
    paths.push(index_path);
    Ok(paths)
}

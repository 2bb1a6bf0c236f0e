mod plots;
mod portfolio;
mod reports;
mod stats;
mod utils;

pub use crate::plots::scatter::{
    classification_scatter_plot, draw_classification_scatter, draw_scatter, resolve_columns,
    scatter_plot, Buckets, ClassificationConfig, Resolved, ScatterConfig, ScatterError,
};
pub use crate::plots::time_series::{
    draw_lines, grouped_bar_panel, line_panel, monthly_heatmap_panel, stacked_bar_panel,
    stat_label, table_panel, LegendStats, LineOptions,
};
pub use crate::plots::{
    palette_color, Axes, Figure, GridSpec, LegendEntry, LegendLoc, NumberFormat, Rect,
};
pub use crate::portfolio::PortfolioData;
pub use crate::reports::{save_factsheet, strategy_factsheet, FactsheetError, FactsheetOptions};
pub use crate::stats::{
    assign_buckets, bucket_labels, confidence_half_widths, drawdown_series, monthly_compounded,
    performance_metrics, quantile_cut_points, rolling_beta, rolling_sum, rolling_var,
    rolling_volatility, time_under_water, top_drawdowns, yearly_compounded, Drawdown, FitError,
    PerformanceMetrics, PolyFit, PolySpec,
};
pub use crate::utils::{
    DataError, DataTable, ResampleFreq, TimePanel, TimePeriod, TimeSeries,
};

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use quantsheet_rs::{
    save_factsheet, strategy_factsheet, FactsheetOptions, PortfolioData, TimePanel, TimeSeries,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut rng = StdRng::seed_from_u64(7);
    let daily = Normal::new(0.0003, 0.01)?;

    // Business days over roughly a year and a half
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).expect("valid date");
    let dates: Vec<NaiveDate> = (0u64..520)
        .filter_map(|i| {
            let d = start + chrono::Days::new(i);
            (d.weekday().number_from_monday() <= 5).then_some(d)
        })
        .collect();
    let n = dates.len();

    let names = vec![
        "equities".to_string(),
        "bonds".to_string(),
        "commodities".to_string(),
    ];
    let returns_rows: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..3).map(|_| daily.sample(&mut rng)).collect())
        .collect();
    // Monthly rebalance between two tilts
    let weight_rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let tilt = 0.05 * ((i / 21) % 3) as f64;
            vec![0.5 - tilt, 0.3 + tilt, 0.2]
        })
        .collect();
    let cost_rows = vec![vec![0.00002, 0.00001, 0.00003]; n];

    let instrument_returns = TimePanel::new(dates.clone(), names.clone(), returns_rows)?;
    let weights = TimePanel::new(dates.clone(), names.clone(), weight_rows)?;
    let costs = TimePanel::new(dates.clone(), names.clone(), cost_rows)?;

    // Nav compounds the lagged-weight pnl net of costs
    let mut nav_values = vec![100.0];
    for t in 1..n {
        let gross: f64 = weights.rows[t - 1]
            .iter()
            .zip(&instrument_returns.rows[t])
            .map(|(w, r)| w * r)
            .sum();
        let cost: f64 = costs.rows[t].iter().sum();
        nav_values.push(nav_values[t - 1] * (1.0 + gross - cost));
    }
    let nav = TimeSeries::new(dates.clone(), nav_values, "demo strategy")?;

    let portfolio = PortfolioData::new("demo strategy", nav, weights, instrument_returns)?
        .with_costs(costs)?
        .with_groups(vec![
            "risk assets".to_string(),
            "defensives".to_string(),
            "risk assets".to_string(),
        ])?;

    let mut bench_rows = vec![vec![3000.0, 120.0]];
    for t in 1..n {
        let prev = bench_rows[t - 1].clone();
        bench_rows.push(vec![
            prev[0] * (1.0 + 1.5 * daily.sample(&mut rng)),
            prev[1] * (1.0 + 0.5 * daily.sample(&mut rng)),
        ]);
    }
    let benchmarks = TimePanel::new(
        dates,
        vec!["equity index".to_string(), "bond index".to_string()],
        bench_rows,
    )?;

    let options = FactsheetOptions::default()
        .with_title("Demo multi-asset strategy")
        .with_rf(0.02)
        .with_grouped_exposures()
        .with_grouped_cum_pnl();
    let figures = strategy_factsheet(&portfolio, &benchmarks, options)?;
    let paths = save_factsheet(&figures, "factsheet", "demo")?;
    for path in paths {
        println!("wrote {}", path.display());
    }

    Ok(())
}

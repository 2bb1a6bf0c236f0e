use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use quantsheet_rs::{
    classification_scatter_plot, scatter_plot, Buckets, ClassificationConfig, DataTable,
    NumberFormat, ScatterConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    // Quadratic signal in standardized units with unit noise
    let mut rng = StdRng::seed_from_u64(2);
    let noise = Normal::new(0.0, 1.0)?;
    let mut x: Vec<f64> = (0..400).map(|_| noise.sample(&mut rng)).collect();
    x.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let y: Vec<f64> = x
        .iter()
        .map(|&v| 0.4 * v * v + 0.8 * v + noise.sample(&mut rng))
        .collect();

    let table = DataTable::from_columns(vec![("signal", x), ("return", y)])?;

    let cfg = ScatterConfig::default()
        .with_confidence(0.95)
        .with_title("Quadratic fit with a 95% band")
        .with_formats(NumberFormat::Decimal(1), NumberFormat::Decimal(1));
    let figure = scatter_plot(&table, &cfg)?;
    figure.save_svg("scatter.svg")?;
    println!("wrote scatter.svg");

    let cfg = ClassificationConfig {
        buckets: Buckets::Quantiles(4),
        scatter: ScatterConfig {
            title: Some(String::from("Returns bucketed by signal quartile")),
            ..ClassificationConfig::default().scatter
        },
        ..ClassificationConfig::default()
    };
    let figure = classification_scatter_plot(&table, &cfg)?;
    figure.save_svg("classification.svg")?;
    println!("wrote classification.svg");

    Ok(())
}

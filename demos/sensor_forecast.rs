//! Compare a handful of regressors on a synthetic building-sensor log.
//!
//! Run with `cargo run --release --example sensor_forecast`; set `RUST_LOG`
//! to change verbosity.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use rand::prelude::*;
use timeseries_regression::prelude::*;

/// Zero-mean uniform noise in `[-scale, scale]`
fn noise<R: Rng>(rng: &mut R, scale: f64) -> f64 {
    (rng.gen::<f64>() * 2.0 - 1.0) * scale
}

fn sensor_log(days: i64) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(11);
    let start = NaiveDate::from_ymd_opt(2022, 6, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid start date")?;

    let n = (days * 24) as usize;
    let mut time = Vec::with_capacity(n);
    let mut outdoor = Vec::with_capacity(n);
    let mut occupancy = Vec::with_capacity(n);
    let mut supply = Vec::with_capacity(n);
    let mut load = Vec::with_capacity(n);

    let mut previous = 0.0;
    for i in 0..n {
        let hour = (i % 24) as f64;
        let phase = (hour - 9.0) * std::f64::consts::PI / 12.0;
        let temp = 22.0 + 6.0 * phase.sin() + noise(&mut rng, 0.5);
        let people = if (8.0..18.0).contains(&hour) { 40.0 + noise(&mut rng, 10.0) } else { 2.0 };
        let air = 14.0 + noise(&mut rng, 0.3);
        // the building lags its drivers by about an hour
        let current = 1.8 * temp + 0.25 * people - 0.9 * air;
        let value = 0.6 * current + 0.4 * previous + noise(&mut rng, 0.4);
        previous = current;

        time.push((start + Duration::hours(i as i64)).format("%Y-%m-%d %H:%M:%S").to_string());
        outdoor.push(temp);
        occupancy.push(people);
        supply.push(air);
        load.push(value);
    }

    let frame = df!(
        "time" => &time,
        "outdoor_temp" => &outdoor,
        "occupancy" => &occupancy,
        "supply_temp" => &supply,
        "cooling_load" => &load
    )?;

    let meta = [
        ColumnMeta::new("outdoor_temp", "Outdoor air temperature", "°C"),
        ColumnMeta::new("occupancy", "People in the building", "-"),
        ColumnMeta::new("supply_temp", "Supply air temperature", "°C"),
        ColumnMeta::new("cooling_load", "Chiller cooling load", "kW"),
    ];
    Ok(Dataset::from_frame(&frame, "time", &meta, &[], None)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timeseries_regression=info".into()),
        )
        .init();

    let dataset = sensor_log(14)?;

    let config = PipelineConfig::new(
        vec![
            ("2022-06-01 00:00:00", "2022-06-05 23:00:00"),
            ("2022-06-07 00:00:00", "2022-06-10 23:00:00"),
        ],
        vec![("2022-06-11 00:00:00", "2022-06-14 23:00:00")],
        vec!["cooling_load"],
    )
    .with_leakage_policy(LeakagePolicy::Warn);

    let prepared = Pipeline::new(config).prepare(&dataset)?;

    let mlp = ModelOptions::mlp()
        .with_epochs(200)
        .with_optimizer(OptimizerConfig::adam(0.005));
    let lstm = ModelOptions::lstm()
        .with_epochs(60)
        .with_verbose(0)
        .with_enrol_window(3)
        .with_optimizer(OptimizerConfig::adam(0.005));

    let models = vec![
        Model::linear("linear"),
        Model::linear_regularized("ridge_cv", ModelOptions::mlp().with_test_size(0.25)),
        Model::mlp("mlp", &[32], mlp.clone()),
        Model::mlp_dropout("mlp_dropout", &[32], 0.1, mlp),
        Model::lstm("lstm", &[16], lstm.clone()),
        Model::ensemble(
            "stack",
            vec![
                Model::linear("stack_linear"),
                Model::lstm("stack_lstm", &[16], lstm),
            ],
        )?,
    ];

    let mut set = ModelSet::new(models, &prepared)?;
    set.train(&prepared)?;
    let report = set.predict(&prepared)?;

    println!();
    println!("{}", report.summary());
    if let Some(best) = report.best() {
        println!("Best model on the test interval: {} (R² {:.4})", best.name, best.r2_test());
        println!("{}", report.deviations_frame(&best.name)?.head(Some(5)));
    }

    Ok(())
}

//! Integration test: Full pipeline (config → split → extract → train → predict)

use polars::prelude::*;
use timeseries_regression::prelude::*;
use timeseries_regression::training::{DEFAULT_ENCODING_DIM, DEFAULT_L1_RATE, DEFAULT_L2_RATE};

/// 96 hourly rows; `load` is a linear function of `temperature` and `humidity`
fn create_sensor_dataset() -> Dataset {
    let n = 96;
    let start = chrono::NaiveDate::from_ymd_opt(2021, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    let mut time = Vec::with_capacity(n);
    let mut temperature = Vec::with_capacity(n);
    let mut humidity = Vec::with_capacity(n);
    let mut station = Vec::with_capacity(n);
    let mut load = Vec::with_capacity(n);

    for i in 0..n {
        let t = i as f64;
        let stamp = start + chrono::Duration::hours(i as i64);
        time.push(stamp.format("%Y-%m-%d %H:%M:%S").to_string());
        let temp = 15.0 + 5.0 * (t * std::f64::consts::PI / 12.0).sin();
        let hum = 0.6 + 0.1 * (t * 0.17).cos();
        temperature.push(temp);
        humidity.push(hum);
        station.push(7.0);
        load.push(2.0 * temp - 30.0 * hum + 4.0);
    }

    let frame = df!(
        "time" => &time,
        "temperature" => &temperature,
        "humidity" => &humidity,
        "station" => &station,
        "load" => &load
    )
    .unwrap();

    let meta = vec![
        ColumnMeta::new("temperature", "Air temperature", "°C"),
        ColumnMeta::new("humidity", "Relative humidity", "-"),
        ColumnMeta::new("station", "Station id", "-"),
        ColumnMeta::new("load", "Cooling load", "kW"),
    ];
    Dataset::from_frame(&frame, "time", &meta, &["station"], None).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig::from_json(
        r#"{
            "train_intervals": [
                ["2021-03-01 00:00:00", "2021-03-02 23:00:00"],
                ["2021-03-03 00:00:00", "2021-03-03 11:00:00"]
            ],
            "test_intervals": [["2021-03-03 12:00:00", "2021-03-04 23:00:00"]],
            "target_columns": ["load"],
            "split": {"leakage_policy": "deny"}
        }"#,
    )
    .unwrap()
}

fn quick_mlp() -> ModelOptions {
    ModelOptions::mlp()
        .with_epochs(20)
        .with_batch_size(16)
        .with_early_stopping(None)
}

fn quick_lstm(window: usize) -> ModelOptions {
    ModelOptions::lstm()
        .with_epochs(3)
        .with_batch_size(16)
        .with_verbose(0)
        .with_enrol_window(window)
}

#[test]
fn test_prepare_drops_irrelevant_columns() {
    let dataset = create_sensor_dataset();
    assert!(!dataset.has_column("station"));
    assert_eq!(dataset.unit("load"), Some("kW"));

    let prepared = Pipeline::new(config()).prepare(&dataset).unwrap();
    assert_eq!(prepared.feature_columns(), &["temperature".to_string(), "humidity".to_string()]);
    assert_eq!(prepared.data().x_train.nrows(), 60);
    assert_eq!(prepared.data().x_test.nrows(), 36);
}

#[test]
fn test_full_regression_pipeline() {
    let dataset = create_sensor_dataset();
    let prepared = Pipeline::new(config()).prepare(&dataset).unwrap();

    let models = vec![
        Model::linear("linear"),
        Model::linear_regularized("ridge", quick_mlp()),
        Model::mlp("mlp", &[8], quick_mlp()),
        Model::mlp_regularized("mlp_l1l2", &[8], DEFAULT_L1_RATE, DEFAULT_L2_RATE, quick_mlp()),
        Model::lstm("lstm", &[4], quick_lstm(2)),
        Model::ensemble(
            "stack",
            vec![
                Model::linear("inner_linear"),
                Model::lstm("inner_lstm", &[4], quick_lstm(4)),
            ],
        )
        .unwrap(),
    ];

    let mut set = ModelSet::new(models, &prepared).unwrap();
    assert_eq!(set.max_enrol_window(), 4);
    assert_eq!(set.index_column(), &prepared.test_index()[4..]);

    set.train(&prepared).unwrap();
    assert!(set.is_fitted());

    let report = set.predict(&prepared).unwrap();
    assert_eq!(report.names(), vec!["linear", "ridge", "mlp", "mlp_l1l2", "lstm", "stack"]);
    assert_eq!(report.target_columns, vec!["load".to_string()]);
    assert_eq!(report.index_column.len(), 32);

    for model in &report.models {
        assert_eq!(model.predictions.dim(), (32, 1));
        assert_eq!(model.deviations.dim(), (32, 1));
        assert!(model.predictions.iter().all(|p| p.is_finite()));
        assert_eq!(model.metrics_test.n_samples, 32);
    }

    let linear = report.get("linear").unwrap();
    assert!(linear.r2_train() > 0.999);
    assert!(linear.r2_test() > 0.999);
    assert!(report.best().is_some());

    let summary = report.summary();
    assert!(summary.contains("stack"));

    let frame = report.deviations_frame("linear").unwrap();
    assert_eq!(frame.height(), 32);
}

#[test]
fn test_leakage_denied_by_config() {
    let dataset = create_sensor_dataset();
    let config = PipelineConfig::new(
        vec![("2021-03-01 00:00:00", "2021-03-03 00:00:00")],
        vec![("2021-03-02 12:00:00", "2021-03-04 23:00:00")],
        vec!["load"],
    )
    .with_leakage_policy(LeakagePolicy::Deny);

    let result = Pipeline::new(config).prepare(&dataset);
    assert!(matches!(result, Err(PipelineError::ConfigurationError(_))));
}

#[test]
fn test_autoencoder_pipeline() {
    let dataset = create_sensor_dataset();
    let prepared = Pipeline::new(config()).prepare(&dataset).unwrap();

    let ae = Model::autoencoder_dropout("ae", 0.1, DEFAULT_ENCODING_DIM, quick_mlp());
    assert!(matches!(
        ModelSet::new(vec![ae.clone(), Model::linear("linear")], &prepared),
        Err(PipelineError::ConfigurationError(_))
    ));

    let mut set = ModelSet::new(vec![ae], &prepared).unwrap();
    set.train(&prepared).unwrap();

    let report = set.reconstruct(&prepared).unwrap();
    assert_eq!(report.reconstruction.dim(), (36, 2));
    assert_eq!(report.errors.len(), 36);
    assert!(report.mean_error().is_finite());
    assert_eq!(report.reconstruction_frame().unwrap().width(), 3);
}

#[test]
fn test_window_larger_than_test_subset() {
    let dataset = create_sensor_dataset();
    let prepared = Pipeline::new(config()).prepare(&dataset).unwrap();

    let result = ModelSet::new(vec![Model::lstm("lstm", &[4], quick_lstm(36))], &prepared);
    assert!(matches!(result, Err(PipelineError::AlignmentError { window: 36, rows: 36 })));
}

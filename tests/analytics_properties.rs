//! Core analytics invariants
//!
//! Exercises the windowing, time-weighting, fitting and recurrence
//! behaviour the engine guarantees, independent of any file I/O.

use chrono::{Days, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use paceline::config::ConfigDocument;
use paceline::fitness::{FitnessInput, FitnessModel};
use paceline::metrics::power::{normalized_power, PowerCalculator};
use paceline::metrics::power_curve::fit_cp_model;
use paceline::metrics::tid::{classify_tid, TidCalculator};
use paceline::models::{Activity, ActivityType, MetricMap};
use paceline::table::{ActivityTable, EnrichedActivity};
use paceline::zone_edges::ZoneEdgeStamper;
use paceline::{AnalysisConfig, Stream, StreamSplitter};

fn config_with(ftp: f64, fthr: f64) -> AnalysisConfig {
    ConfigDocument {
        ftp: Some(ftp),
        fthr: Some(fthr),
        ..ConfigDocument::default()
    }
    .build(None)
    .unwrap()
}

fn one_hz_stream(watts: Vec<f64>) -> Stream {
    let n = watts.len();
    Stream {
        time: (0..n).map(|i| i as f64).collect(),
        moving: vec![true; n],
        watts: Some(watts),
        ..Stream::default()
    }
}

#[test]
fn unit_at_ftp() {
    let config = config_with(285.0, 170.0);
    let stream = one_hz_stream(vec![285.0; 3600]);
    let metrics = PowerCalculator::new(&config).calculate(&stream);

    let tss = metrics["training_stress_score"].as_f64().unwrap();
    let intensity = metrics["intensity_factor"].as_f64().unwrap();
    assert!((tss - 100.0).abs() <= 5.0, "tss = {}", tss);
    assert!((intensity - 1.0).abs() <= 0.05, "if = {}", intensity);
}

#[test]
fn variability_constant_power() {
    let config = config_with(285.0, 170.0);
    let stream = one_hz_stream(vec![240.0; 2400]);
    let metrics = PowerCalculator::new(&config).calculate(&stream);

    let avg = metrics["average_power"].as_f64().unwrap();
    let np = metrics["normalized_power"].as_f64().unwrap();
    assert!((np - avg).abs() / avg < 0.001, "np = {}, avg = {}", np, avg);
}

#[test]
fn variability_np_dominates_average() {
    let config = config_with(285.0, 170.0);
    // a hard interval session
    let mut watts = Vec::new();
    for block in 0..10 {
        let target = if block % 2 == 0 { 340.0 } else { 140.0 };
        watts.extend(vec![target; 180]);
    }
    let stream = one_hz_stream(watts);
    let metrics = PowerCalculator::new(&config).calculate(&stream);

    let avg = metrics["average_power"].as_f64().unwrap();
    let np = metrics["normalized_power"].as_f64().unwrap();
    assert!(np >= avg);
}

#[test]
fn time_weighting_two_segment_stream() {
    // 30 samples at 200 W, a 20 s recording gap carried by one 0 W sample,
    // then 30 more samples at 200 W: the raw average is exactly 150 W
    let mut time = Vec::new();
    let mut watts = Vec::new();
    for i in 0..30 {
        time.push(1.0 + i as f64);
        watts.push(200.0);
    }
    time.push(50.0);
    watts.push(0.0);
    for i in 0..30 {
        time.push(51.0 + i as f64);
        watts.push(200.0);
    }
    let n = time.len();
    let stream = Stream {
        time,
        moving: vec![true; n],
        watts: Some(watts),
        ..Stream::default()
    };

    let config = config_with(285.0, 170.0);
    let metrics = PowerCalculator::new(&config).calculate(&stream);
    let avg = metrics["average_power"].as_f64().unwrap();
    assert!((avg - 150.0).abs() < 1e-9, "avg = {}", avg);
}

#[test]
fn moving_view_contiguity() {
    let stream = Stream {
        time: vec![0.0, 1.0, 52.0, 53.0, 54.0],
        moving: vec![true; 5],
        watts: Some(vec![200.0; 5]),
        ..Stream::default()
    };

    let split = StreamSplitter::new().split(&stream);
    assert_eq!(split.moving.time, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

    // every delta on the re-pitched axis is exactly one second, so a
    // 30-second rolling operator sees 30 consecutive samples
    let deltas: Vec<f64> = split
        .moving
        .time
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect();
    assert!(deltas.iter().all(|d| *d == 1.0));
    assert_eq!(
        split.moving.original_time.as_deref(),
        Some(&[0.0, 1.0, 52.0, 53.0, 54.0][..])
    );
}

#[test]
fn tid_totals_are_exhaustive() {
    let config = config_with(300.0, 170.0);
    let n = 2000;
    let stream = Stream {
        time: (0..n).map(|i| i as f64).collect(),
        moving: vec![true; n],
        watts: Some((0..n).map(|i| ((i * 7) % 450) as f64).collect()),
        heartrate: Some((0..n).map(|i| 90.0 + ((i * 3) % 100) as f64).collect()),
        ..Stream::default()
    };
    let metrics = TidCalculator::new(&config).calculate(&stream);

    for family in ["power", "hr"] {
        let total: f64 = (1..=3)
            .map(|z| {
                metrics[&format!("{}_tid_z{}_percentage", family, z)]
                    .as_f64()
                    .unwrap()
            })
            .sum();
        assert!((total - 100.0).abs() < 1e-6, "{}: {}", family, total);
    }
}

#[test]
fn tid_classification_matrix() {
    assert_eq!(classify_tid(80.0, 5.0, 15.0), "polarized");
    assert_eq!(classify_tid(60.0, 30.0, 10.0), "pyramidal");
    assert_eq!(classify_tid(30.0, 50.0, 20.0), "threshold");
}

#[test]
fn cp_model_recovery() {
    // P(t) = 250 + 15000/t with a +/-2 W perturbation pattern
    let durations = [120.0, 180.0, 300.0, 600.0, 900.0, 1200.0, 1800.0, 2400.0, 3600.0];
    let points: Vec<(f64, f64)> = durations
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let noise = [2.0, -1.5, 1.0, -2.0, 0.5, 1.5, -0.5, -1.0, 2.0][i];
            (t, 250.0 + 15_000.0 / t + noise)
        })
        .collect();

    let model = fit_cp_model(&points, Some(285.0));
    assert!((model.cp - 250.0).abs() < 2.0, "cp = {}", model.cp);
    assert!(
        (model.w_prime - 15_000.0).abs() < 500.0,
        "w' = {}",
        model.w_prime
    );
}

#[test]
fn cp_model_needs_three_points() {
    let model = fit_cp_model(&[(300.0, 320.0), (1200.0, 270.0)], Some(285.0));
    assert!(model.cp.is_nan() && model.w_prime.is_nan() && model.r_squared.is_nan());
}

#[test]
fn fitness_recurrence_decay() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let inputs: Vec<FitnessInput> = (0..7)
        .map(|i| FitnessInput {
            activity_id: i + 1,
            date: start + Days::new(i as u64),
            tss: if i == 0 { 100.0 } else { 0.0 },
        })
        .collect();

    let states = FitnessModel::new(42.0, 7.0).compute(&inputs);
    let day7 = states[&7];
    assert!((day7.atl - 100.0 * (-6.0f64 / 7.0).exp()).abs() < 1e-6);
    assert!((day7.ctl - 100.0 * (-6.0f64 / 42.0).exp()).abs() < 1e-6);
}

#[test]
fn fitness_same_day_accumulation() {
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let k_atl = 1.0 - (-1.0f64 / 7.0).exp();
    let inputs = vec![
        FitnessInput {
            activity_id: 1,
            date: day,
            tss: 100.0,
        },
        FitnessInput {
            activity_id: 2,
            date: day,
            tss: 50.0,
        },
    ];

    let states = FitnessModel::new(42.0, 7.0).compute(&inputs);
    assert_eq!(states[&1].atl, 100.0);
    assert!((states[&2].atl - (100.0 + 50.0 * k_atl)).abs() < 1e-9);
}

#[test]
fn zone_edge_backpropagation() {
    let t = Utc
        .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
        .unwrap()
        .naive_utc();
    let config = ConfigDocument {
        ftp: Some(300.0),
        fthr: Some(170.0),
        configured_at: Some(t),
        ..ConfigDocument::default()
    }
    .build(None)
    .unwrap();

    let row_at = |id: i64, offset_days: i64| {
        let local = t + chrono::Duration::days(offset_days);
        EnrichedActivity::new(
            Activity {
                id,
                name: None,
                activity_type: ActivityType::Ride,
                start_date: Utc.from_utc_datetime(&local),
                start_date_local: local,
                distance: None,
                moving_time: None,
                elapsed_time: None,
                total_elevation_gain: None,
                average_speed: None,
                max_speed: None,
            },
            MetricMap::new(),
        )
    };

    let mut table = ActivityTable::new(vec![row_at(1, -10), row_at(2, -5), row_at(3, 1)]);
    ZoneEdgeStamper::from_config(&config).apply(&mut table);

    // T+1 is the anchor; it and everything older carries the edges
    let edges = config.power_zone_edges();
    for row in &table.rows {
        assert_eq!(row.power_zone_edges.as_deref(), Some(&edges[..]));
    }
}

#[test]
fn gapped_ride_moving_np_dominates_raw_np() {
    let n = 3600;
    let mut moving = vec![true; n];
    let mut watts = vec![260.0; n];
    for i in 1500..2000 {
        moving[i] = false;
        watts[i] = 0.0;
    }
    let stream = Stream {
        time: (0..n).map(|i| i as f64).collect(),
        moving,
        watts: Some(watts),
        ..Stream::default()
    };

    let split = StreamSplitter::new().split(&stream);
    let raw_np = normalized_power(&split.raw);
    let moving_np = normalized_power(&split.moving);
    assert!(
        moving_np > raw_np,
        "moving = {}, raw = {}",
        moving_np,
        raw_np
    );
}

proptest! {
    #[test]
    fn prop_tid_percentages_sum_to_100(
        watts in prop::collection::vec(0.0f64..600.0, 60..300)
    ) {
        let config = config_with(300.0, 170.0);
        let stream = one_hz_stream(watts);
        let metrics = TidCalculator::new(&config).calculate(&stream);

        let total: f64 = (1..=3)
            .map(|z| metrics[&format!("power_tid_z{}_percentage", z)].as_f64().unwrap())
            .sum();
        prop_assert!((total - 100.0).abs() < 1e-6);
    }

    #[test]
    fn prop_time_weighted_mean_is_bounded(
        watts in prop::collection::vec(0.0f64..800.0, 2..200)
    ) {
        let times: Vec<f64> = (0..watts.len()).map(|i| i as f64).collect();
        let mean = paceline::metrics::base::time_weighted_mean(&watts, &times);
        let lo = watts.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = watts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(mean >= lo - 1e-9 && mean <= hi + 1e-9);
    }
}

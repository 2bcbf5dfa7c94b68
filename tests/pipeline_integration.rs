//! End-to-end pipeline tests over on-disk fixtures
//!
//! Builds a small activity catalog with stream files in a temp directory,
//! runs the full pipeline, and checks the persisted tables and summary.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use paceline::config::ConfigDocument;
use paceline::{AnalysisConfig, AnalysisPipeline, ActivityTable, LongitudinalSummary};

fn fixture_config(dir: &TempDir) -> AnalysisConfig {
    ConfigDocument {
        ftp: Some(285.0),
        fthr: Some(170.0),
        rider_weight_kg: Some(75.0),
        configured_at: Some(
            Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0)
                .unwrap()
                .naive_utc(),
        ),
        data_dir: Some(dir.path().to_path_buf()),
        activities_file: Some(PathBuf::from("activities.csv")),
        streams_dir: Some(PathBuf::from("Streams")),
        processed_data_dir: Some(dir.path().join("processed_data")),
        ..ConfigDocument::default()
    }
    .build(None)
    .unwrap()
}

/// Catalog: an hour ride at FTP, a ride with a mid-activity stop, a run
fn write_fixtures(dir: &TempDir) {
    fs::write(
        dir.path().join("activities.csv"),
        "id;type;name;start_date;start_date_local;distance;moving_time;elapsed_time;total_elevation_gain\n\
         1;Ride;ftp hour;2024-06-01T06:00:00Z;2024-06-01T08:00:00;40000;3600;3600;200\n\
         2;Ride;stop and go;2024-06-03T06:00:00Z;2024-06-03T08:00:00;30000;1200;1500;150\n\
         3;Run;tempo run;2024-06-05T06:00:00Z;2024-06-05T08:00:00;9000;1800;1850;50\n",
    )
    .unwrap();

    let streams = dir.path().join("Streams");
    fs::create_dir_all(&streams).unwrap();

    // activity 1: 3600 s steady at exactly FTP
    let mut csv = String::from("time;watts;heartrate\n");
    for t in 0..3600 {
        writeln!(csv, "{};285;150", t).unwrap();
    }
    fs::write(streams.join("stream_1.csv"), csv).unwrap();

    // activity 2: 600 s at 250 W, a 300 s recording gap, 600 s at 250 W
    let mut csv = String::from("time;watts;heartrate\n");
    for t in 0..600 {
        writeln!(csv, "{};250;145", t).unwrap();
    }
    for t in 0..600 {
        let watts = if t == 0 { 0 } else { 250 };
        writeln!(csv, "{};{};145", 900 + t, watts).unwrap();
    }
    fs::write(streams.join("stream_2.csv"), csv).unwrap();

    // activity 3: run at 3 m/s on a steady 10% grade
    let mut csv = String::from("time;heartrate;velocity_smooth;grade_smooth;cadence\n");
    for t in 0..1800 {
        writeln!(csv, "{};155;3.0;0.1;178", t).unwrap();
    }
    fs::write(streams.join("stream_3.csv"), csv).unwrap();
}

#[test]
fn full_run_produces_enriched_tables_and_summary() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir);
    let config = fixture_config(&dir);

    let outcome = AnalysisPipeline::new(config.clone())
        .run_and_persist()
        .unwrap();
    assert_eq!(outcome.processed, 3);
    assert_eq!(outcome.skipped, 0);

    assert!(config.raw_table_path().exists());
    assert!(config.moving_table_path().exists());
    assert!(config.summary_path().exists());

    let raw = ActivityTable::read_csv(&config.raw_table_path()).unwrap();
    assert_eq!(raw.len(), 3);

    // the hour at FTP scores canonical values
    let ftp_hour = raw.rows.iter().find(|r| r.activity.id == 1).unwrap();
    let tss = ftp_hour.metric_f64("training_stress_score").unwrap();
    let intensity = ftp_hour.metric_f64("intensity_factor").unwrap();
    let np = ftp_hour.metric_f64("normalized_power").unwrap();
    assert!((tss - 100.0).abs() < 5.0, "tss = {}", tss);
    assert!((intensity - 1.0).abs() < 0.05);
    assert!((np - 285.0).abs() < 3.0);
    assert_eq!(ftp_hour.metric_f64("time_above_90_ftp"), Some(3600.0));

    // every row carries reference thresholds, fitness state and zone edges
    for row in &raw.rows {
        assert_eq!(row.ftp, Some(285.0));
        assert!(row.fitness.is_some());
        assert!(row.power_zone_edges.is_some());
        assert!(row.hr_zone_edges.is_some());
    }

    // the oldest activity seeds the fitness recurrence
    let state = ftp_hour.fitness.unwrap();
    assert!((state.ctl - tss).abs() < 1e-9);
    assert!((state.atl - tss).abs() < 1e-9);

    // the run carries NGP = 3 * (1 + 0.1 * 0.5)
    let run = raw.rows.iter().find(|r| r.activity.id == 3).unwrap();
    let ngp = run.metric_f64("normalized_graded_pace").unwrap();
    assert!((ngp - 3.15).abs() < 1e-9, "ngp = {}", ngp);
    assert!(run.metric_f64("average_power").is_none());

    // summary parses back and counts everything
    let summary: LongitudinalSummary =
        serde_json::from_str(&fs::read_to_string(config.summary_path()).unwrap()).unwrap();
    assert_eq!(summary.total_activities, 3);
    assert!(summary.training_load.chronic_training_load > 0.0);
}

#[test]
fn moving_view_is_insulated_from_stops() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir);
    let config = fixture_config(&dir);

    AnalysisPipeline::new(config.clone())
        .run_and_persist()
        .unwrap();

    let raw = ActivityTable::read_csv(&config.raw_table_path()).unwrap();
    let moving = ActivityTable::read_csv(&config.moving_table_path()).unwrap();

    let raw_row = raw.rows.iter().find(|r| r.activity.id == 2).unwrap();
    let moving_row = moving.rows.iter().find(|r| r.activity.id == 2).unwrap();

    // the 300 s gap counts in the raw duration only
    assert_eq!(raw_row.metric_f64("total_time"), Some(1499.0));
    let moving_time = moving_row.metric_f64("total_time").unwrap();
    assert!(moving_time < 1250.0);

    // the zero-power resume sample drags the raw average down
    let raw_avg = raw_row.metric_f64("average_power").unwrap();
    let moving_avg = moving_row.metric_f64("average_power").unwrap();
    assert!(moving_avg > raw_avg);
    assert!((moving_avg - 250.0).abs() < 1e-9);
}

#[test]
fn second_run_is_incremental_and_idempotent() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir);
    let config = fixture_config(&dir);

    let first = AnalysisPipeline::new(config.clone())
        .run_and_persist()
        .unwrap();
    assert_eq!(first.processed, 3);

    let raw_bytes = fs::read(config.raw_table_path()).unwrap();
    let moving_bytes = fs::read(config.moving_table_path()).unwrap();

    // nothing is pending on the rerun, and the outputs do not change
    let second = AnalysisPipeline::new(config.clone())
        .run_and_persist()
        .unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.raw_table.len(), 3);

    assert_eq!(raw_bytes, fs::read(config.raw_table_path()).unwrap());
    assert_eq!(moving_bytes, fs::read(config.moving_table_path()).unwrap());
}

#[test]
fn new_activity_is_picked_up_incrementally() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir);
    let config = fixture_config(&dir);

    AnalysisPipeline::new(config.clone())
        .run_and_persist()
        .unwrap();

    // append a fourth activity to the catalog
    let mut catalog = fs::read_to_string(config.activities_file.clone()).unwrap();
    catalog.push_str("4;Ride;evening spin;2024-06-07T16:00:00Z;2024-06-07T18:00:00;15000;900;900;40\n");
    fs::write(config.activities_file.clone(), catalog).unwrap();

    let mut csv = String::from("time;watts;heartrate\n");
    for t in 0..900 {
        writeln!(csv, "{};180;130", t).unwrap();
    }
    fs::write(config.streams_dir.join("stream_4.csv"), csv).unwrap();

    let outcome = AnalysisPipeline::new(config.clone())
        .run_and_persist()
        .unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.raw_table.len(), 4);

    let raw = ActivityTable::read_csv(&config.raw_table_path()).unwrap();
    assert!(raw.rows.iter().any(|r| r.activity.id == 4));
}

#[test]
fn broken_stream_is_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir);
    let config = fixture_config(&dir);

    // a catalog entry whose stream lacks the time column
    let mut catalog = fs::read_to_string(config.activities_file.clone()).unwrap();
    catalog.push_str("5;Ride;broken;2024-06-08T16:00:00Z;2024-06-08T18:00:00;;;;\n");
    fs::write(config.activities_file.clone(), catalog).unwrap();
    fs::write(
        config.streams_dir.join("stream_5.csv"),
        "watts;heartrate\n100;120\n",
    )
    .unwrap();

    let outcome = AnalysisPipeline::new(config).run_and_persist().unwrap();
    assert_eq!(outcome.processed, 3);
    assert_eq!(outcome.skipped, 1);
}

#[test]
fn walk_activities_are_never_selected() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir);
    let config = fixture_config(&dir);

    let mut catalog = fs::read_to_string(config.activities_file.clone()).unwrap();
    catalog.push_str("6;Walk;stroll;2024-06-09T16:00:00Z;2024-06-09T18:00:00;3000;2400;2400;10\n");
    fs::write(config.activities_file.clone(), catalog).unwrap();

    let outcome = AnalysisPipeline::new(config).run_and_persist().unwrap();
    assert_eq!(outcome.processed, 3);
    assert!(outcome.raw_table.rows.iter().all(|r| r.activity.id != 6));
}

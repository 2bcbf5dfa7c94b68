//! Longitudinal summarisation
//!
//! Aggregates the enriched raw table into a single summary object: period
//! totals, a training-load snapshot at period end, 28-day performance
//! trends, zone distribution means and rolling Efficiency Factor averages.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Utc};
use tracing::info;

use crate::config::AnalysisConfig;
use crate::models::{ActivityType, LongitudinalSummary, TrainingLoadSummary};
use crate::table::{ActivityTable, EnrichedActivity};

/// Rolling window for performance trends, in days
const TREND_WINDOW_DAYS: i64 = 28;

/// Metrics whose 28-day rolling mean is tracked start-to-end
const TREND_METRICS: [&str; 5] = [
    "normalized_power",
    "average_power",
    "training_stress_score",
    "intensity_factor",
    "efficiency_factor",
];

/// EF values outside (0, 10) are sensor artefacts and excluded
const EF_OUTLIER_CEILING: f64 = 10.0;

pub struct Summarizer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> Summarizer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Summarizer { config }
    }

    pub fn summarize(&self, table: &ActivityTable) -> LongitudinalSummary {
        self.generate_summary(table, None, None, None)
    }

    pub fn generate_summary(
        &self,
        table: &ActivityTable,
        start_date: Option<NaiveDateTime>,
        end_date: Option<NaiveDateTime>,
        activity_type: Option<ActivityType>,
    ) -> LongitudinalSummary {
        let mut rows: Vec<&EnrichedActivity> = table
            .rows
            .iter()
            .filter(|r| {
                start_date.map_or(true, |s| r.activity.start_date_local >= s)
                    && end_date.map_or(true, |e| r.activity.start_date_local <= e)
                    && activity_type.map_or(true, |t| r.activity.activity_type == t)
            })
            .collect();
        rows.sort_by(|a, b| {
            a.activity
                .start_date_local
                .cmp(&b.activity.start_date_local)
                .then(a.activity.id.cmp(&b.activity.id))
        });

        info!(activities = rows.len(), "summarising enriched activities");

        let now = Utc::now().naive_utc();
        let period_start = rows
            .first()
            .map(|r| r.activity.start_date_local)
            .or(start_date)
            .unwrap_or(now);
        let period_end = rows
            .last()
            .map(|r| r.activity.start_date_local)
            .or(end_date)
            .unwrap_or(now);

        // computed view values win over catalog values, mirroring the
        // column layout of the persisted tables
        let total_distance = rows
            .iter()
            .filter_map(|r| r.metric_f64("distance").or(r.activity.distance))
            .sum();
        let total_elevation = rows
            .iter()
            .filter_map(|r| r.activity.total_elevation_gain)
            .sum();
        let total_time = rows
            .iter()
            .filter_map(|r| r.metric_f64("moving_time").or(r.activity.moving_time))
            .sum();

        let training_load = self.training_load(&rows);
        let mut performance_trends = self.performance_trends(&rows);
        performance_trends.extend(self.rolling_ef(&rows));
        let zone_distributions = self.zone_distributions(&rows);

        LongitudinalSummary {
            period_start,
            period_end,
            total_activities: rows.len(),
            total_distance,
            total_elevation,
            total_time,
            training_load,
            performance_trends,
            zone_distributions,
        }
    }

    /// Span-EWMA over the TSS column in ascending order; the snapshot is
    /// the state after the last activity
    fn training_load(&self, rows: &[&EnrichedActivity]) -> TrainingLoadSummary {
        if rows.is_empty() {
            return TrainingLoadSummary::zero();
        }

        let tss: Vec<f64> = rows
            .iter()
            .map(|r| r.metric_f64("training_stress_score").unwrap_or(0.0))
            .collect();
        if tss.iter().all(|t| *t == 0.0) {
            return TrainingLoadSummary::zero();
        }

        let ctl = span_ewma(&tss, self.config.ctl_days);
        let atl = span_ewma(&tss, self.config.atl_days);
        let tsb = ctl - atl;
        let acwr = if ctl > 0.0 { atl / ctl } else { 0.0 };

        TrainingLoadSummary {
            chronic_training_load: ctl,
            acute_training_load: atl,
            training_stress_balance: tsb,
            acwr,
        }
    }

    /// Percent change of each metric's 28-day rolling mean, start to end
    fn performance_trends(&self, rows: &[&EnrichedActivity]) -> BTreeMap<String, f64> {
        let mut trends = BTreeMap::new();
        if rows.len() < 2 {
            return trends;
        }

        for metric in TREND_METRICS {
            let rolling = date_rolling_mean(rows, metric, TREND_WINDOW_DAYS);
            if rolling.len() < 2 {
                continue;
            }
            let start = rolling[0];
            let end = *rolling.last().unwrap();
            if start != 0.0 {
                trends.insert(format!("{}_trend", metric), (end - start) / start * 100.0);
            }
        }
        trends
    }

    /// 4-week and 52-week rolling EF averages plus the overall mean
    fn rolling_ef(&self, rows: &[&EnrichedActivity]) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        let valid: Vec<&EnrichedActivity> = rows
            .iter()
            .copied()
            .filter(|r| {
                r.metric_f64("efficiency_factor")
                    .map_or(false, |ef| ef > 0.0 && ef < EF_OUTLIER_CEILING)
            })
            .collect();
        if valid.is_empty() {
            return metrics;
        }

        if let Some(ef_4week) = date_rolling_mean(&valid, "efficiency_factor", 28).last() {
            metrics.insert("ef_4week_avg".to_string(), *ef_4week);
        }
        if let Some(ef_52week) = date_rolling_mean(&valid, "efficiency_factor", 364).last() {
            metrics.insert("ef_52week_avg".to_string(), *ef_52week);
        }

        let overall: f64 = valid
            .iter()
            .filter_map(|r| r.metric_f64("efficiency_factor"))
            .sum::<f64>()
            / valid.len() as f64;
        metrics.insert("ef_overall_avg".to_string(), overall);

        metrics
    }

    /// Mean of each zone-percentage column, grouped by family
    fn zone_distributions(
        &self,
        rows: &[&EnrichedActivity],
    ) -> BTreeMap<String, BTreeMap<String, f64>> {
        let mut distributions = BTreeMap::new();
        if rows.is_empty() {
            return distributions;
        }

        for (family, prefix) in [("power", "power_z"), ("heart_rate", "hr_z")] {
            let mut columns: BTreeMap<String, (f64, usize)> = BTreeMap::new();
            for row in rows {
                for (key, value) in &row.metrics {
                    if key.starts_with(prefix)
                        && key.ends_with("_percentage")
                        && !key.contains("tid")
                    {
                        if let Some(v) = value.as_f64() {
                            let entry = columns.entry(key.clone()).or_insert((0.0, 0));
                            entry.0 += v;
                            entry.1 += 1;
                        }
                    }
                }
            }
            if !columns.is_empty() {
                distributions.insert(
                    family.to_string(),
                    columns
                        .into_iter()
                        .map(|(key, (sum, count))| (key, sum / count as f64))
                        .collect(),
                );
            }
        }

        distributions
    }
}

/// Span-parameterised EWMA: alpha = 2/(span+1), seeded at the first value
fn span_ewma(values: &[f64], span: f64) -> f64 {
    let alpha = 2.0 / (span + 1.0);
    let mut state = values[0];
    for value in &values[1..] {
        state = (1.0 - alpha) * state + alpha * value;
    }
    state
}

/// Rolling mean of a metric over a trailing date window, one value per row
fn date_rolling_mean(rows: &[&EnrichedActivity], metric: &str, window_days: i64) -> Vec<f64> {
    let mut out = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let window_start = row.activity.start_date_local - chrono::Duration::days(window_days);
        let mut sum = 0.0;
        let mut count = 0usize;
        for other in &rows[..=i] {
            if other.activity.start_date_local > window_start {
                if let Some(v) = other.metric_f64(metric) {
                    sum += v;
                    count += 1;
                }
            }
        }
        if count > 0 {
            out.push(sum / count as f64);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{insert_metric, Activity, MetricMap};
    use chrono::{Days, TimeZone, Utc};

    fn row(id: i64, day_offset: u64, tss: f64, np: f64, ef: f64) -> EnrichedActivity {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
            .unwrap()
            .checked_add_days(Days::new(day_offset))
            .unwrap();
        let mut metrics = MetricMap::new();
        insert_metric(&mut metrics, "training_stress_score", tss);
        insert_metric(&mut metrics, "normalized_power", np);
        insert_metric(&mut metrics, "efficiency_factor", ef);
        insert_metric(&mut metrics, "power_z1_percentage", 60.0);
        insert_metric(&mut metrics, "power_z2_percentage", 40.0);
        EnrichedActivity::new(
            Activity {
                id,
                name: None,
                activity_type: ActivityType::Ride,
                start_date: start,
                start_date_local: start.naive_utc(),
                distance: Some(30_000.0),
                moving_time: Some(3600.0),
                elapsed_time: Some(3700.0),
                total_elevation_gain: Some(200.0),
                average_speed: None,
                max_speed: None,
            },
            metrics,
        )
    }

    #[test]
    fn test_totals() {
        let config = AnalysisConfig::default();
        let table = ActivityTable::new(vec![
            row(1, 0, 80.0, 250.0, 1.8),
            row(2, 1, 60.0, 240.0, 1.9),
        ]);
        let summary = Summarizer::new(&config).summarize(&table);

        assert_eq!(summary.total_activities, 2);
        assert_eq!(summary.total_distance, 60_000.0);
        assert_eq!(summary.total_elevation, 400.0);
        assert_eq!(summary.total_time, 7200.0);
        assert!(summary.period_start < summary.period_end);
    }

    #[test]
    fn test_training_load_snapshot() {
        let config = AnalysisConfig::default();
        let table = ActivityTable::new(
            (0..20).map(|i| row(i as i64 + 1, i, 80.0, 250.0, 1.8)).collect(),
        );
        let summary = Summarizer::new(&config).summarize(&table);

        let load = &summary.training_load;
        // constant TSS: both EWMAs sit at the constant
        assert!((load.chronic_training_load - 80.0).abs() < 1e-9);
        assert!((load.acute_training_load - 80.0).abs() < 1e-9);
        assert!(load.training_stress_balance.abs() < 1e-9);
        assert!((load.acwr - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trends_detect_improvement() {
        let config = AnalysisConfig::default();
        // NP ramps from 200 to 295 over 20 activities
        let table = ActivityTable::new(
            (0..20)
                .map(|i| row(i as i64 + 1, i * 2, 70.0, 200.0 + 5.0 * i as f64, 1.8))
                .collect(),
        );
        let summary = Summarizer::new(&config).summarize(&table);

        let trend = summary.performance_trends["normalized_power_trend"];
        assert!(trend > 0.0, "trend = {}", trend);
    }

    #[test]
    fn test_rolling_ef_and_outlier_filter() {
        let config = AnalysisConfig::default();
        let mut rows = vec![
            row(1, 0, 70.0, 250.0, 1.8),
            row(2, 5, 70.0, 250.0, 2.0),
        ];
        // an artefact row with absurd EF is excluded
        rows.push(row(3, 6, 70.0, 250.0, 55.0));
        let table = ActivityTable::new(rows);
        let summary = Summarizer::new(&config).summarize(&table);

        let overall = summary.performance_trends["ef_overall_avg"];
        assert!((overall - 1.9).abs() < 1e-9, "overall = {}", overall);
        assert!(summary.performance_trends.contains_key("ef_4week_avg"));
        assert!(summary.performance_trends.contains_key("ef_52week_avg"));
    }

    #[test]
    fn test_zone_distribution_means() {
        let config = AnalysisConfig::default();
        let table = ActivityTable::new(vec![
            row(1, 0, 70.0, 250.0, 1.8),
            row(2, 1, 70.0, 250.0, 1.8),
        ]);
        let summary = Summarizer::new(&config).summarize(&table);

        let power = &summary.zone_distributions["power"];
        assert_eq!(power["power_z1_percentage"], 60.0);
        assert_eq!(power["power_z2_percentage"], 40.0);
    }

    #[test]
    fn test_type_filter() {
        let config = AnalysisConfig::default();
        let mut run = row(3, 2, 40.0, 0.0, 0.0);
        run.activity.activity_type = ActivityType::Run;
        let table = ActivityTable::new(vec![row(1, 0, 70.0, 250.0, 1.8), run]);

        let summary = Summarizer::new(&config).generate_summary(
            &table,
            None,
            None,
            Some(ActivityType::Run),
        );
        assert_eq!(summary.total_activities, 1);
    }

    #[test]
    fn test_empty_table() {
        let config = AnalysisConfig::default();
        let summary = Summarizer::new(&config).summarize(&ActivityTable::default());
        assert_eq!(summary.total_activities, 0);
        assert_eq!(summary.training_load, TrainingLoadSummary::zero());
    }
}

//! Incremental analysis pipeline
//!
//! Selects the activities without enriched output, analyses them in
//! parallel with a deterministic commit order, merges the new rows into the
//! existing tables, then runs the chronological post-processing stages
//! (zone edges, reference thresholds, fitness recurrence, rolling CP fit)
//! and persists everything atomically. Per-activity failures are logged and
//! skipped; only configuration and I/O failures abort the run.

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::analyzer::ActivityAnalyzer;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::loader::ActivityDataLoader;
use crate::metrics::power_curve::{anaerobic_energy_index, fit_cp_model, interval_label};
use crate::models::{Activity, LongitudinalSummary};
use crate::processor::StreamProcessor;
use crate::repository::ActivityRepository;
use crate::summarizer::Summarizer;
use crate::table::{ActivityTable, EnrichedActivity};
use crate::thresholds::{ThresholdRecord, ThresholdResolver};
use crate::zone_edges::ZoneEdgeStamper;

/// Everything one pipeline run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub raw_table: ActivityTable,
    pub moving_table: ActivityTable,
    pub summary: LongitudinalSummary,
    /// Activities analysed in this run
    pub processed: usize,
    /// Activities skipped on per-activity errors
    pub skipped: usize,
}

pub struct AnalysisPipeline {
    config: AnalysisConfig,
    cancel: Arc<AtomicBool>,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        AnalysisPipeline {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between activities and before each post-processing
    /// stage; setting it makes the run abort without writing output
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(AnalysisError::Processing("run cancelled".to_string()));
        }
        Ok(())
    }

    /// Run the full workflow and persist the outputs
    pub fn run_and_persist(&self) -> Result<PipelineOutcome> {
        let outcome = self.run()?;
        self.persist(&outcome)?;
        Ok(outcome)
    }

    /// Run the full workflow without touching the output files
    pub fn run(&self) -> Result<PipelineOutcome> {
        info!("starting analysis pipeline");

        let mut raw_table = self.load_existing(&self.config.raw_table_path())?;
        let mut moving_table = self.load_existing(&self.config.moving_table_path())?;

        let repository = ActivityRepository::new(&self.config);
        let pending = repository.pending_activities(&raw_table.ids())?;

        if pending.is_empty() && raw_table.is_empty() {
            return Err(AnalysisError::Processing(
                "no activities to analyze".to_string(),
            ));
        }

        let (new_rows, skipped) = self.analyze_pending(&pending)?;
        let processed = new_rows.len();

        let mut raw_rows = Vec::with_capacity(new_rows.len());
        let mut moving_rows = Vec::with_capacity(new_rows.len());
        for (raw_row, moving_row) in new_rows {
            raw_rows.push(raw_row);
            moving_rows.push(moving_row);
        }
        raw_table.merge(raw_rows);
        moving_table.merge(moving_rows);

        if raw_table.is_empty() {
            return Err(AnalysisError::Processing(
                "no activities could be processed".to_string(),
            ));
        }

        let thresholds = ActivityDataLoader::new(&self.config).load_thresholds()?;

        self.check_cancelled()?;
        self.post_process(&mut raw_table, thresholds.as_deref())?;
        self.post_process(&mut moving_table, thresholds.as_deref())?;

        self.check_cancelled()?;
        let summary = Summarizer::new(&self.config).summarize(&raw_table);

        info!(
            processed,
            skipped,
            total = raw_table.len(),
            "pipeline completed"
        );

        Ok(PipelineOutcome {
            raw_table,
            moving_table,
            summary,
            processed,
            skipped,
        })
    }

    fn load_existing(&self, path: &std::path::Path) -> Result<ActivityTable> {
        if path.exists() {
            let table = ActivityTable::read_csv(path)?;
            info!(rows = table.len(), path = %path.display(), "loaded existing table");
            Ok(table)
        } else {
            Ok(ActivityTable::default())
        }
    }

    /// Analyze the pending activities on a worker pool
    ///
    /// The ordered collect commits results in catalog order regardless of
    /// which worker finishes first, keeping reruns deterministic.
    fn analyze_pending(
        &self,
        pending: &[Activity],
    ) -> Result<(Vec<(EnrichedActivity, EnrichedActivity)>, usize)> {
        if pending.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let progress = ProgressBar::new(pending.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let results: Vec<Option<(EnrichedActivity, EnrichedActivity)>> = pending
            .par_iter()
            .map(|activity| {
                if self.cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let result = self.analyze_one(activity);
                progress.inc(1);
                match result {
                    Ok(rows) => Some(rows),
                    Err(e) => {
                        // stream-level failures stay scoped to the activity
                        warn!(activity_id = activity.id, error = %e, "skipping activity");
                        None
                    }
                }
            })
            .collect();
        progress.finish_and_clear();

        self.check_cancelled()?;

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for result in results {
            match result {
                Some(pair) => rows.push(pair),
                None => skipped += 1,
            }
        }
        Ok((rows, skipped))
    }

    fn analyze_one(&self, activity: &Activity) -> Result<(EnrichedActivity, EnrichedActivity)> {
        let loader = ActivityDataLoader::new(&self.config);
        let raw_stream = loader.load_stream(activity.id)?;
        let stream = StreamProcessor::new().process(&raw_stream)?;
        let result = ActivityAnalyzer::new(&self.config).analyze(activity, &stream)?;

        Ok((
            EnrichedActivity::new(activity.clone(), result.raw_metrics),
            EnrichedActivity::new(activity.clone(), result.moving_metrics),
        ))
    }

    /// Chronological post-processing over one merged table
    fn post_process(
        &self,
        table: &mut ActivityTable,
        thresholds: Option<&[ThresholdRecord]>,
    ) -> Result<()> {
        self.check_cancelled()?;

        table.sort_descending();
        ZoneEdgeStamper::from_config(&self.config).apply(table);
        self.attach_thresholds(table, thresholds);
        self.attach_fitness(table);
        self.attach_cp_models(table);

        Ok(())
    }

    /// Reference thresholds in force on each activity's date
    fn attach_thresholds(&self, table: &mut ActivityTable, thresholds: Option<&[ThresholdRecord]>) {
        let resolver = ThresholdResolver::new(self.config.ftp_rolling_window_days);
        for row in &mut table.rows {
            let (ftp, fthr) = resolver.resolve(thresholds, row.activity.start_date_local.date());
            row.ftp = Some(ftp.unwrap_or(self.config.ftp));
            row.fthr = Some(fthr.unwrap_or(self.config.fthr));
            row.lt1_power = self.config.lt1_power;
            row.lt2_power = self.config.lt2_power;
            row.lt1_hr = self.config.lt1_hr;
            row.lt2_hr = self.config.lt2_hr;
        }
    }

    /// Per-activity CTL/ATL/TSB/ACWR from the table's own TSS column
    fn attach_fitness(&self, table: &mut ActivityTable) {
        use crate::fitness::{FitnessInput, FitnessModel};

        let inputs: Vec<FitnessInput> = table
            .rows
            .iter()
            .map(|row| FitnessInput {
                activity_id: row.activity.id,
                date: row.activity.start_date_local.date(),
                tss: row.metric_f64("training_stress_score").unwrap_or(0.0),
            })
            .collect();

        let states = FitnessModel::new(self.config.ctl_days, self.config.atl_days).compute(&inputs);
        for row in &mut table.rows {
            row.fitness = states.get(&row.activity.id).copied();
        }
    }

    /// Rolling-window CP/W' fit per activity, ascending
    ///
    /// The MMP points for an activity aggregate the best power at each
    /// configured duration over the activities inside the window ending on
    /// its date.
    fn attach_cp_models(&self, table: &mut ActivityTable) {
        let labels: Vec<(f64, String)> = self
            .config
            .power_curve_intervals
            .iter()
            .map(|&d| (d as f64, format!("power_curve_{}", interval_label(d))))
            .collect();

        let mut order: Vec<usize> = (0..table.rows.len()).collect();
        order.sort_by(|&a, &b| {
            let ra = &table.rows[a].activity;
            let rb = &table.rows[b].activity;
            ra.start_date_local
                .cmp(&rb.start_date_local)
                .then(ra.id.cmp(&rb.id))
        });

        let dates: Vec<NaiveDate> = table
            .rows
            .iter()
            .map(|r| r.activity.start_date_local.date())
            .collect();

        let mut models = BTreeMap::new();
        for &i in &order {
            let window_end = dates[i];
            let window_start = window_end - chrono::Duration::days(self.config.cp_window_days);

            let mut points = Vec::with_capacity(labels.len());
            for (duration, label) in &labels {
                let mut best: Option<f64> = None;
                for &j in &order {
                    if dates[j] < window_start || dates[j] > window_end {
                        continue;
                    }
                    if let Some(power) = table.rows[j].metric_f64(label) {
                        if power > 0.0 && best.map_or(true, |b| power > b) {
                            best = Some(power);
                        }
                    }
                }
                if let Some(power) = best {
                    points.push((*duration, power));
                }
            }

            let ftp_hint = table.rows[i].ftp.or(Some(self.config.ftp));
            let model = fit_cp_model(&points, ftp_hint);
            let aei = if model.is_valid() {
                anaerobic_energy_index(model.w_prime, self.config.rider_weight_kg)
            } else {
                f64::NAN
            };
            models.insert(table.rows[i].activity.id, (model, aei));
        }

        for row in &mut table.rows {
            if let Some((model, aei)) = models.get(&row.activity.id) {
                row.cp_model = Some(*model);
                row.aei = Some(*aei);
            }
        }
    }

    /// Write both tables and the summary, each atomically
    pub fn persist(&self, outcome: &PipelineOutcome) -> Result<()> {
        self.check_cancelled()?;
        fs::create_dir_all(&self.config.processed_data_dir)?;

        outcome.raw_table.write_csv(&self.config.raw_table_path())?;
        outcome
            .moving_table
            .write_csv(&self.config.moving_table_path())?;

        let summary_path = self.config.summary_path();
        let tmp_path = summary_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&outcome.summary)
            .map_err(|e| AnalysisError::Processing(format!("summary serialisation: {}", e)))?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &summary_path)?;

        info!(path = %summary_path.display(), "wrote summary");
        Ok(())
    }
}

//! Zone edge stamping with backpropagation
//!
//! The current zone right-edges describe the athlete's physiology at the
//! time the configuration was written. They are stamped onto the activity
//! closest to that timestamp and inherited backward by every strictly older
//! activity that has no edges yet. Newer rows are left alone: they may
//! already carry edges from a later configuration.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::models::ZoneEdges;
use crate::table::ActivityTable;

pub struct ZoneEdgeStamper {
    edges: ZoneEdges,
    config_timestamp: NaiveDateTime,
}

impl ZoneEdgeStamper {
    /// Build from the current configuration
    ///
    /// Edges exclude the unbounded top zone. Timestamps are naive wall
    /// clock on both sides; any offsets were already dropped at parse time
    /// so the comparison below is tz-consistent.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        ZoneEdgeStamper {
            edges: ZoneEdges {
                power: config.power_zone_edges(),
                hr: config.hr_zone_edges(),
            },
            config_timestamp: config.configured_at,
        }
    }

    /// Stamp the anchor activity and backfill older unstamped rows
    ///
    /// The table is sorted newest-first on return.
    pub fn apply(&self, table: &mut ActivityTable) {
        if table.is_empty() {
            return;
        }

        table.sort_descending();

        let anchor = table
            .rows
            .iter()
            .enumerate()
            .min_by_key(|(_, row)| {
                (row.activity.start_date_local - self.config_timestamp)
                    .num_seconds()
                    .abs()
            })
            .map(|(i, _)| i)
            .unwrap();

        debug!(
            anchor_id = table.rows[anchor].activity.id,
            config_timestamp = %self.config_timestamp,
            "stamping zone edges"
        );

        table.rows[anchor].power_zone_edges = Some(self.edges.power.clone());
        table.rows[anchor].hr_zone_edges = Some(self.edges.hr.clone());

        for row in table.rows.iter_mut().skip(anchor + 1) {
            if row.power_zone_edges.is_none() {
                row.power_zone_edges = Some(self.edges.power.clone());
            }
            if row.hr_zone_edges.is_none() {
                row.hr_zone_edges = Some(self.edges.hr.clone());
            }
        }
    }
}

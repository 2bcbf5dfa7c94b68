//! Activity repository
//!
//! High-level queries over the activity catalog: supported types, pending
//! selection against the enriched output, and simple lookups. The catalog
//! is cached after the first load and only refreshed through an explicit
//! invalidation.

use std::cell::RefCell;
use std::collections::HashSet;

use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::loader::ActivityDataLoader;
use crate::models::{Activity, ActivityType};

pub struct ActivityRepository<'a> {
    loader: ActivityDataLoader<'a>,
    cache: RefCell<Option<Vec<Activity>>>,
}

impl<'a> ActivityRepository<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        ActivityRepository {
            loader: ActivityDataLoader::new(config),
            cache: RefCell::new(None),
        }
    }

    /// All catalog activities, loading once and caching afterwards
    pub fn all_activities(&self) -> Result<Vec<Activity>> {
        if self.cache.borrow().is_none() {
            let activities = self.loader.load_activities()?;
            *self.cache.borrow_mut() = Some(activities);
        }
        Ok(self.cache.borrow().as_ref().unwrap().clone())
    }

    /// Activities of one specific type
    pub fn activities_by_type(&self, activity_type: ActivityType) -> Result<Vec<Activity>> {
        Ok(self
            .all_activities()?
            .into_iter()
            .filter(|a| a.activity_type == activity_type)
            .collect())
    }

    /// Activities of the analysed types (Ride, VirtualRide, Run)
    pub fn supported_activities(&self) -> Result<Vec<Activity>> {
        Ok(self
            .all_activities()?
            .into_iter()
            .filter(|a| a.activity_type.is_supported())
            .collect())
    }

    /// Supported activities that have no row in the enriched output yet
    pub fn pending_activities(&self, enriched_ids: &HashSet<i64>) -> Result<Vec<Activity>> {
        let pending: Vec<Activity> = self
            .supported_activities()?
            .into_iter()
            .filter(|a| !enriched_ids.contains(&a.id))
            .collect();
        info!(count = pending.len(), "activities pending processing");
        Ok(pending)
    }

    pub fn activity_by_id(&self, activity_id: i64) -> Result<Option<Activity>> {
        Ok(self
            .all_activities()?
            .into_iter()
            .find(|a| a.id == activity_id))
    }

    /// The `n` most recent activities by start date
    pub fn recent_activities(&self, n: usize) -> Result<Vec<Activity>> {
        let mut activities = self.all_activities()?;
        activities.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        activities.truncate(n);
        Ok(activities)
    }

    /// Drop the cache, forcing a reload on next access
    pub fn invalidate_cache(&self) {
        *self.cache.borrow_mut() = None;
    }
}

//! A station ready to be scheduled: its rule graph plus everything needed to
//! turn calendar days into compositions.

use crate::builder::PlaylistBuilder;
use crate::catalog::MediaCatalog;
use crate::compositor::{Compositor, Window};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::random::SharedRandom;
use crate::rules::RuleGraph;
use crate::station::{CommonDef, StationDef};
use crate::timeline::{AudioComponent, TimeRange};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const DAY_SECONDS: f64 = 86_400.0;

/// Epoch seconds of the day's local midnight, the seed of that day's walk.
pub fn day_seed(day: NaiveDate, utc_offset_secs: i32) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_default()
        - i64::from(utc_offset_secs)
}

/// A composed window together with the days it spans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayWindow {
    pub window: Window,
    pub first_day: NaiveDate,
    /// Day whose sequence holds `window.last_range`.
    pub last_day: NaiveDate,
}

pub struct Program {
    tag: String,
    graph: Arc<RuleGraph>,
    config: Config,
    compositor: Compositor,
    random: SharedRandom,
}

impl Program {
    /// Load a station document and, optionally, the common groups of its
    /// series.
    pub fn load(station_path: &Path, common_path: Option<&Path>, config: Config) -> Result<Self> {
        let station = StationDef::load(station_path)?;
        let catalog = load_catalog(&station, station_path, common_path)?;

        let graph = RuleGraph::build_with_ratio(&station.playlist, &catalog, config.anti_repeat_ratio)?;
        tracing::info!(
            "Station '{}' loaded: {} groups, {} fragments",
            station.tag,
            catalog.group_tags().len(),
            graph.fragments().len()
        );
        Ok(Program::new(station.tag, Arc::new(graph), config))
    }

    pub fn new(tag: String, graph: Arc<RuleGraph>, config: Config) -> Self {
        let compositor = Compositor::from_config(&config);
        Program {
            tag,
            graph,
            config,
            compositor,
            random: SharedRandom::new(),
        }
    }

    /// Replace the compositor, e.g. to resolve assets differently.
    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn graph(&self) -> &RuleGraph {
        &self.graph
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the day's sequence covering at least `duration` seconds.
    /// The same day always yields the same sequence; a shorter duration
    /// yields a prefix of a longer one.
    pub fn build_playlist(&self, day: NaiveDate, duration: f64) -> Result<Vec<AudioComponent>> {
        let seed = day_seed(day, self.config.utc_offset_secs);
        let mut rng = self.random.lock_for_build(seed);
        tracing::debug!("Building '{}' for {} (seed {})", self.tag, day, seed);
        PlaylistBuilder::new(&self.graph, &mut *rng).build_sequence(duration)
    }

    /// Compose `[from, to)` of `day`, in seconds of that day. Windows that
    /// run past the end of the day's sequence continue into the following
    /// days.
    pub fn compose_window(&self, day: NaiveDate, from: f64, to: f64) -> Result<DayWindow> {
        let first = self.build_playlist(day, to.min(DAY_SECONDS))?;
        let mut window = self.compositor.compose(&[first], from, to)?;
        let mut last_day = day;
        let mut current = day;

        while !window.depleted {
            current = current
                .succ_opt()
                .ok_or_else(|| Error::CompositionCreationFailure(format!("no day after {}", current)))?;
            let sequence = self.build_playlist(current, window.remaining().min(DAY_SECONDS))?;
            if sequence.is_empty() {
                return Err(Error::CompositionCreationFailure(format!(
                    "empty sequence for {}",
                    current
                )));
            }
            tracing::debug!("Window of '{}' rolls over into {}", self.tag, current);
            self.compositor.continue_into(&mut window, &sequence)?;
            last_day = current;
        }

        if window.composition.main.is_empty() {
            return Err(Error::CompositionCreationFailure(format!(
                "nothing to play between {:.2} and {:.2}",
                from, to
            )));
        }

        Ok(DayWindow {
            window,
            first_day: day,
            last_day,
        })
    }

    /// Compose at least `min_duration` seconds following the item that
    /// ended with `last_range` on `last_day`.
    pub fn prepare_next(
        &self,
        last_range: TimeRange,
        last_day: NaiveDate,
        min_duration: f64,
    ) -> Result<DayWindow> {
        let from = last_range.end();
        self.compose_window(last_day, from, from + min_duration)
    }
}

/// Resolve the station's groups over the optional common groups. File
/// paths resolve against each document's directory.
pub fn load_catalog(
    station: &StationDef,
    station_path: &Path,
    common_path: Option<&Path>,
) -> Result<MediaCatalog> {
    let common = common_path
        .map(|path| CommonDef::load(path).map(|def| (def, parent_dir(path))))
        .transpose()?;
    MediaCatalog::load(
        &station.file_groups,
        parent_dir(station_path),
        common
            .as_ref()
            .map(|(def, root)| (def.file_groups.as_slice(), *root)),
    )
}

/// Current wall-clock time in the station's local time.
pub fn local_now(utc_offset_secs: i32) -> NaiveDateTime {
    Utc::now().naive_utc() + TimeDelta::seconds(i64::from(utc_offset_secs))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

//! Audio timeline compositor.
//!
//! Turns builder output into a two-track composition description: the main
//! track carries the fragments, the mix track carries their mixes, and the
//! main track is ducked under every mix with linear volume ramps. Nothing is
//! decoded here; a player consumes the description.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::timeline::{AudioComponent, TimeRange};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file (or part of it) placed on a track of the composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub path: PathBuf,
    /// Portion of the file that plays, relative to the file's start.
    pub source: TimeRange,
    /// Offset of the segment on the composition.
    pub at: f64,
}

impl Segment {
    /// Range occupied on the composition.
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.at, self.source.duration)
    }
}

/// Linear volume change of the main track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeRamp {
    pub range: TimeRange,
    pub from_volume: f32,
    pub to_volume: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Composition {
    pub main: Vec<Segment>,
    pub mix: Vec<Segment>,
    pub ramps: Vec<VolumeRamp>,
}

impl Composition {
    /// End of the last main-track segment.
    pub fn duration(&self) -> f64 {
        self.main
            .iter()
            .map(|s| s.range().end())
            .fold(0.0, f64::max)
    }

    /// Main-track volume at composition time `t`.
    ///
    /// The track stays ducked while any mix plays. Between mixes the volume
    /// follows the running ramps (the lowest one wins) or else the ramp that
    /// ended last.
    pub fn main_volume_at(&self, t: f64) -> f32 {
        if self.mix.iter().any(|m| m.at <= t && t < m.range().end()) {
            return self
                .ramps
                .iter()
                .map(|r| r.to_volume.min(r.from_volume))
                .fold(1.0, f32::min);
        }

        let running = self
            .ramps
            .iter()
            .filter(|r| r.range.duration > 0.0 && r.range.start <= t && t < r.range.end())
            .map(|r| {
                let progress = ((t - r.range.start) / r.range.duration) as f32;
                r.from_volume + (r.to_volume - r.from_volume) * progress
            })
            .reduce(f32::min);
        if let Some(volume) = running {
            return volume;
        }

        self.ramps
            .iter()
            .filter(|r| r.range.end() <= t)
            .max_by(|a, b| a.range.end().total_cmp(&b.range.end()))
            .map_or(1.0, |r| r.to_volume)
    }
}

/// Maps a component's path to a playable location.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> Result<PathBuf>;
}

/// Requires the file to exist on disk.
pub struct FsResolver;

impl AssetResolver for FsResolver {
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::AssetNotFound(path.to_path_buf()))
        }
    }
}

/// Accepts every path as is, for dry runs against catalogs that are not
/// present locally.
pub struct AcceptAll;

impl AssetResolver for AcceptAll {
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// How the main track gives way to a mix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ducking {
    pub ramp_secs: f64,
    pub volume: f32,
}

impl Default for Ducking {
    fn default() -> Self {
        Ducking {
            ramp_secs: 1.0,
            volume: 0.3,
        }
    }
}

impl From<&Config> for Ducking {
    fn from(config: &Config) -> Self {
        Ducking {
            ramp_secs: config.duck_ramp_secs,
            volume: config.duck_volume,
        }
    }
}

/// A composition being filled for a requested window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    pub composition: Composition,
    /// The requested window is fully covered.
    pub depleted: bool,
    /// Day-local range of the last inserted component.
    pub last_range: Option<TimeRange>,
    /// Composition offset of the last inserted component.
    pub position_in_composition: f64,
    /// Composition offset where the last inserted component stops playing.
    pub end_in_composition: f64,
    /// Composition offset the window must reach.
    pub target_end: f64,
}

impl Window {
    fn new(length: f64) -> Self {
        Window {
            composition: Composition::default(),
            depleted: false,
            last_range: None,
            position_in_composition: 0.0,
            end_in_composition: 0.0,
            target_end: length,
        }
    }

    /// Seconds still missing from the composition.
    pub fn remaining(&self) -> f64 {
        (self.target_end - self.end_in_composition).max(0.0)
    }
}

#[derive(Clone)]
pub struct Compositor {
    resolver: Arc<dyn AssetResolver>,
    ducking: Ducking,
}

impl Compositor {
    pub fn new(resolver: Arc<dyn AssetResolver>, ducking: Ducking) -> Self {
        Compositor { resolver, ducking }
    }

    pub fn from_config(config: &Config) -> Self {
        let resolver: Arc<dyn AssetResolver> = if config.verify_assets {
            Arc::new(FsResolver)
        } else {
            Arc::new(AcceptAll)
        };
        Compositor::new(resolver, Ducking::from(config))
    }

    /// Compose the window `[from, to)` of the first sequence, then continue
    /// into the following ones (each a later day, starting at its local 0)
    /// until the window is covered or the sequences run out.
    pub fn compose(
        &self,
        sequences: &[Vec<AudioComponent>],
        from: f64,
        to: f64,
    ) -> Result<Window> {
        if !(from.is_finite() && to.is_finite()) || to <= from {
            return Err(Error::CompositionCreationFailure(format!(
                "empty window {:.2}..{:.2}",
                from, to
            )));
        }
        let (first, rest) = sequences
            .split_first()
            .ok_or_else(|| Error::CompositionCreationFailure("no sequence".to_string()))?;

        let mut window = Window::new(to - from);
        self.insert(&mut window, first, from, to, 0.0)?;
        for sequence in rest {
            if window.depleted {
                break;
            }
            self.continue_into(&mut window, sequence)?;
        }
        Ok(window)
    }

    /// Append the next day's sequence right after the last inserted
    /// component.
    pub fn continue_into(&self, window: &mut Window, components: &[AudioComponent]) -> Result<()> {
        let shift = window.end_in_composition;
        let to = window.target_end - shift;
        tracing::debug!("Continuing composition at {:.2}s, {:.2}s to go", shift, to);
        self.insert(window, components, 0.0, to, shift)
    }

    fn insert(
        &self,
        window: &mut Window,
        components: &[AudioComponent],
        from: f64,
        to: f64,
        shift: f64,
    ) -> Result<()> {
        let mut origin: Option<f64> = None;

        for component in components {
            let playing = component.playing;
            if playing.end() <= from {
                continue;
            }
            if playing.start > to {
                break;
            }
            let origin = *origin.get_or_insert(from.max(playing.start));
            let clip = (origin - playing.start).max(0.0);
            let at = shift + playing.start + clip - origin;

            let path = self.resolver.resolve(&component.path)?;
            window.composition.main.push(Segment {
                path,
                source: TimeRange::new(clip, playing.duration - clip),
                at,
            });
            for mix in &component.mixes {
                self.insert_mix(window, mix, origin, shift)?;
            }

            window.last_range = Some(playing);
            window.position_in_composition = at;
            window.end_in_composition = at + playing.duration - clip;

            if playing.end() >= to {
                window.depleted = true;
                break;
            }
        }
        Ok(())
    }

    fn insert_mix(
        &self,
        window: &mut Window,
        mix: &AudioComponent,
        origin: f64,
        shift: f64,
    ) -> Result<()> {
        let playing = mix.playing;
        if playing.end() <= origin {
            return Ok(());
        }
        let clip = (origin - playing.start).max(0.0);
        let at = shift + playing.start + clip - origin;
        let duration = playing.duration - clip;

        let path = self.resolver.resolve(&mix.path)?;
        window.composition.mix.push(Segment {
            path,
            source: TimeRange::new(clip, duration),
            at,
        });

        let down_start = (at - self.ducking.ramp_secs).max(0.0);
        window.composition.ramps.push(VolumeRamp {
            range: TimeRange::new(down_start, at - down_start),
            from_volume: 1.0,
            to_volume: self.ducking.volume,
        });
        window.composition.ramps.push(VolumeRamp {
            range: TimeRange::new(at + duration, self.ducking.ramp_secs),
            from_volume: self.ducking.volume,
            to_volume: 1.0,
        });
        Ok(())
    }
}

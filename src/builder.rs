//! Playlist builder: a weighted random walk over the rule graph.
//!
//! Draw order per fragment is fixed and observable in the output:
//! transition, main source, then for each mix rule its condition draws
//! followed by its source draws.

use crate::catalog::AudioFile;
use crate::error::{Error, Result};
use crate::program::DAY_SECONDS;
use crate::random::UniformSource;
use crate::rules::{Fragment, Mixin, RuleGraph};
use crate::source::FileSource;
use crate::timeline::{AudioComponent, TimeRange};
use std::collections::HashSet;

pub struct PlaylistBuilder<'a> {
    graph: &'a RuleGraph,
    rng: &'a mut dyn UniformSource,
    /// Selection state for this build, one entry per graph source.
    sources: Vec<Box<dyn FileSource>>,
}

impl<'a> PlaylistBuilder<'a> {
    pub fn new(graph: &'a RuleGraph, rng: &'a mut dyn UniformSource) -> Self {
        let sources = graph
            .sources()
            .iter()
            .map(|spec| spec.instantiate(graph.anti_repeat_ratio()))
            .collect();
        PlaylistBuilder {
            graph,
            rng,
            sources,
        }
    }

    /// Walk the graph from its first fragment until `duration` seconds are
    /// covered. The last component usually runs past `duration`.
    pub fn build_sequence(&mut self, duration: f64) -> Result<Vec<AudioComponent>> {
        let graph = self.graph;
        let mut components = Vec::new();
        let mut moment = 0.0;
        let mut current = graph.first_fragment().to_string();

        while moment < duration {
            let fragment = graph
                .fragment(&current)
                .ok_or_else(|| Error::MissingFragment(current.clone()))?;

            let next = self.next_fragment(fragment)?;

            let main = self.sources[fragment.source]
                .next(None, self.rng)
                .ok_or_else(|| Error::WrongSource(fragment.tag.clone()))?;
            let main_duration = main.audible_duration;

            let mixes = match &fragment.mixin {
                Some(mixin) => self.place_mixes(mixin, &main, &next, moment),
                None => Vec::new(),
            };

            tracing::trace!(
                "{} {} @{:.2} +{:.2} ({} mixes) -> {}",
                fragment.tag,
                main.label(),
                moment,
                main_duration,
                mixes.len(),
                next
            );

            components.push(AudioComponent {
                path: main.path.clone(),
                playing: TimeRange::new(moment, main_duration),
                mixes,
            });

            moment += main_duration;
            current = next;
        }

        tracing::debug!(
            "Built {} components covering {:.2}s (requested {:.2}s)",
            components.len(),
            moment,
            duration
        );
        Ok(components)
    }

    /// Sample the transition edges: first edge whose cumulative weight
    /// reaches the draw wins. Weights are never renormalized.
    fn next_fragment(&mut self, fragment: &Fragment) -> Result<String> {
        let r = self.rng.next_f64();
        let mut p = 0.0;
        for transition in &fragment.transitions {
            p += transition.weight();
            if p >= r {
                return Ok(transition.fragment.clone());
            }
        }
        Err(Error::NotExhaustiveTransition(fragment.tag.clone()))
    }

    fn place_mixes(
        &mut self,
        mixin: &Mixin,
        main: &AudioFile,
        next: &str,
        moment: f64,
    ) -> Vec<AudioComponent> {
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut mixes = Vec::new();

        let second_of_day = moment.rem_euclid(DAY_SECONDS);
        for rule in &mixin.rules {
            if rule.condition.evaluate(next, second_of_day, self.rng) != Some(true) {
                continue;
            }
            for position in &rule.positions {
                if claimed.contains(position.as_str()) {
                    continue;
                }
                // Positions are validated when the graph is built.
                let Some(&offset) = mixin.positions.get(position) else {
                    continue;
                };
                let Some(mix) = self.sources[rule.source].next(Some(main), self.rng) else {
                    continue;
                };
                let start = moment + (main.audible_duration - mix.audible_duration) * offset;
                mixes.push(AudioComponent::new(
                    mix.path.clone(),
                    TimeRange::new(start, mix.audible_duration),
                ));
                claimed.insert(position.as_str());
                break;
            }
        }

        mixes.sort_by(|a, b| a.playing.start.total_cmp(&b.playing.start));
        mixes
    }
}

//! Playlist rule graph: the station's fragments resolved against its media
//! catalog.
//!
//! Built once per station and read-only afterwards; any number of builds may
//! walk the same graph concurrently, each with its own selection state.

use crate::catalog::{AudioFile, MediaCatalog};
use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::source::{DEFAULT_ANTI_REPEAT_RATIO, SourceSpec};
use crate::station::{FragmentDef, MixDef, PlaylistDef, SourceDef, SourceKind};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Weight sums are compared against 1.0 with this slack in static checks.
const EXHAUSTIVE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Transition {
    pub fragment: String,
    /// `None` counts as 1.0 while sampling.
    pub probability: Option<f64>,
}

impl Transition {
    pub fn weight(&self) -> f64 {
        self.probability.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct MixRule {
    pub tag: String,
    /// Index into [`RuleGraph::sources`].
    pub source: usize,
    pub condition: Condition,
    /// Position tags in order of preference.
    pub positions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Mixin {
    /// Position tag to relative offset within the host.
    pub positions: HashMap<String, f64>,
    pub rules: Vec<MixRule>,
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub tag: String,
    /// Index into [`RuleGraph::sources`].
    pub source: usize,
    pub transitions: Vec<Transition>,
    pub mixin: Option<Mixin>,
}

#[derive(Debug, Clone)]
pub struct RuleGraph {
    first_fragment: String,
    fragments: HashMap<String, Fragment>,
    sources: Vec<SourceSpec>,
    anti_repeat_ratio: f64,
}

impl RuleGraph {
    pub fn build(def: &PlaylistDef, catalog: &MediaCatalog) -> Result<Self> {
        Self::build_with_ratio(def, catalog, DEFAULT_ANTI_REPEAT_RATIO)
    }

    pub fn build_with_ratio(
        def: &PlaylistDef,
        catalog: &MediaCatalog,
        anti_repeat_ratio: f64,
    ) -> Result<Self> {
        let mut sources = Vec::new();
        let mut fragments = HashMap::new();

        for fragment_def in &def.fragments {
            let fragment = resolve_fragment(fragment_def, catalog, &mut sources)?;
            if fragments.insert(fragment.tag.clone(), fragment).is_some() {
                tracing::warn!(
                    "Fragment '{}' declared twice, keeping the last declaration",
                    fragment_def.tag
                );
            }
        }

        let first_fragment = def.first_fragment.fragment_tag.clone();
        if !fragments.contains_key(&first_fragment) {
            return Err(Error::MissingFragment(first_fragment));
        }
        for fragment in fragments.values() {
            for transition in &fragment.transitions {
                if !fragments.contains_key(&transition.fragment) {
                    return Err(Error::MissingFragment(transition.fragment.clone()));
                }
            }
        }

        let graph = RuleGraph {
            first_fragment,
            fragments,
            sources,
            anti_repeat_ratio,
        };
        graph.check_mix_fits()?;

        tracing::debug!(
            "Rule graph built: {} fragments, {} sources, first '{}'",
            graph.fragments.len(),
            graph.sources.len(),
            graph.first_fragment
        );
        Ok(graph)
    }

    pub fn first_fragment(&self) -> &str {
        &self.first_fragment
    }

    pub fn fragment(&self, tag: &str) -> Option<&Fragment> {
        self.fragments.get(tag)
    }

    /// Fragments sorted by tag.
    pub fn fragments(&self) -> Vec<&Fragment> {
        let mut out: Vec<&Fragment> = self.fragments.values().collect();
        out.sort_by(|a, b| a.tag.cmp(&b.tag));
        out
    }

    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn anti_repeat_ratio(&self) -> f64 {
        self.anti_repeat_ratio
    }

    /// Verify that every fragment reachable from the first one declares
    /// transition weights adding up to at least 1, so that a walk can never
    /// run out of edges.
    pub fn check_exhaustive(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.first_fragment.as_str()]);

        while let Some(tag) = queue.pop_front() {
            if !seen.insert(tag) {
                continue;
            }
            let fragment = self
                .fragments
                .get(tag)
                .ok_or_else(|| Error::MissingFragment(tag.to_string()))?;
            let total: f64 = fragment.transitions.iter().map(Transition::weight).sum();
            if total < 1.0 - EXHAUSTIVE_EPSILON {
                return Err(Error::NotExhaustiveTransition(tag.to_string()));
            }
            queue.extend(fragment.transitions.iter().map(|t| t.fragment.as_str()));
        }
        Ok(())
    }

    /// Every mix must fit inside every host it can land on.
    fn check_mix_fits(&self) -> Result<()> {
        for fragment in self.fragments() {
            let Some(mixin) = &fragment.mixin else {
                continue;
            };
            let hosts = match &self.sources[fragment.source] {
                SourceSpec::Particular(file) => vec![file.clone()],
                SourceSpec::Group { files, .. } => files.clone(),
                SourceSpec::Attachment => Vec::new(),
            };
            for rule in &mixin.rules {
                let spec = &self.sources[rule.source];
                for host in &hosts {
                    for mix in spec.candidates(host) {
                        if mix.audible_duration > host.audible_duration {
                            return Err(Error::MixLongerThanHost {
                                fragment: fragment.tag.clone(),
                                mix: mix.label(),
                                mix_duration: mix.audible_duration,
                                host_duration: host.audible_duration,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn resolve_fragment(
    def: &FragmentDef,
    catalog: &MediaCatalog,
    sources: &mut Vec<SourceSpec>,
) -> Result<Fragment> {
    let spec = resolve_source(&def.src, catalog)?;
    if matches!(spec, SourceSpec::Attachment) {
        return Err(Error::InvalidSource {
            fragment: def.tag.clone(),
            reason: "attachments can only be mixed onto a host".to_string(),
        });
    }
    let hosts = match &spec {
        SourceSpec::Particular(file) => std::slice::from_ref(file),
        SourceSpec::Group { files, .. } => files.as_slice(),
        SourceSpec::Attachment => &[],
    };
    if let Some(file) = hosts.iter().find(|f| f.audible_duration <= 0.0) {
        return Err(Error::InvalidSource {
            fragment: def.tag.clone(),
            reason: format!("'{}' has no audible duration", file.label()),
        });
    }
    sources.push(spec);
    let source = sources.len() - 1;

    let transitions = def
        .next_fragment
        .iter()
        .map(|t| Transition {
            fragment: t.fragment_tag.clone(),
            probability: t.probability,
        })
        .collect();

    let mixin = match &def.mixins {
        Some(mixins) => {
            let positions: HashMap<String, f64> = mixins
                .pos
                .iter()
                .map(|p| (p.tag.clone(), p.relative_offset))
                .collect();
            let mut rules = Vec::with_capacity(mixins.mix.len());
            for mix in &mixins.mix {
                rules.push(resolve_mix(&def.tag, mix, &positions, catalog, sources)?);
            }
            Some(Mixin { positions, rules })
        }
        None => None,
    };

    Ok(Fragment {
        tag: def.tag.clone(),
        source,
        transitions,
        mixin,
    })
}

fn resolve_mix(
    fragment: &str,
    def: &MixDef,
    positions: &HashMap<String, f64>,
    catalog: &MediaCatalog,
    sources: &mut Vec<SourceSpec>,
) -> Result<MixRule> {
    let condition = Condition::parse(&def.condition);
    for problem in condition.problems() {
        tracing::warn!(
            "Mix '{}' of fragment '{}' has a malformed condition: {}",
            def.tag,
            fragment,
            problem
        );
    }

    let mut rule_positions = Vec::with_capacity(def.pos_variant.len());
    for variant in &def.pos_variant {
        if !positions.contains_key(&variant.pos_tag) {
            return Err(Error::MissingPositionTag {
                fragment: fragment.to_string(),
                position: variant.pos_tag.clone(),
            });
        }
        rule_positions.push(variant.pos_tag.clone());
    }

    sources.push(resolve_source(&def.src, catalog)?);
    Ok(MixRule {
        tag: def.tag.clone(),
        source: sources.len() - 1,
        condition,
        positions: rule_positions,
    })
}

fn resolve_source(def: &SourceDef, catalog: &MediaCatalog) -> Result<SourceSpec> {
    match def.kind {
        SourceKind::Attach => Ok(SourceSpec::Attachment),
        SourceKind::File => {
            let group = required_group(def)?;
            let file_tag = def.file_tag.as_deref().ok_or_else(|| Error::MissingGroupOrFile {
                group: group.to_string(),
                file: String::new(),
            })?;
            Ok(SourceSpec::Particular(catalog.file(group, file_tag)?))
        }
        SourceKind::Group => {
            let group = required_group(def)?;
            let files: Vec<Arc<AudioFile>> = catalog.files(group)?.to_vec();
            if files.len() < 2 {
                return Err(Error::EmptyGroup {
                    group: group.to_string(),
                    count: files.len(),
                });
            }
            Ok(SourceSpec::Group {
                tag: group.to_string(),
                files,
            })
        }
    }
}

fn required_group(def: &SourceDef) -> Result<&str> {
    def.group_tag
        .as_deref()
        .ok_or_else(|| Error::FileGroupNotFound(String::new()))
}

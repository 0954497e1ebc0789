//! File selection strategies.
//!
//! A [`SourceSpec`] is the immutable description stored in the rule graph;
//! [`SourceSpec::instantiate`] creates the stateful [`FileSource`] a single
//! build draws from.

use crate::catalog::AudioFile;
use crate::random::UniformSource;
use std::collections::VecDeque;
use std::sync::Arc;

/// Ratio of a group kept out of the draw pool after being played.
pub const DEFAULT_ANTI_REPEAT_RATIO: f64 = 3.0 / 7.0;

pub trait FileSource: Send {
    /// Next file to play. `parent` is the host file when the source feeds a
    /// mix rule, `None` for a fragment's main source.
    fn next(
        &mut self,
        parent: Option<&AudioFile>,
        rng: &mut dyn UniformSource,
    ) -> Option<Arc<AudioFile>>;
}

/// Resolved source of a fragment or mix rule.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Particular(Arc<AudioFile>),
    Group {
        tag: String,
        files: Vec<Arc<AudioFile>>,
    },
    Attachment,
}

impl SourceSpec {
    pub fn instantiate(&self, anti_repeat_ratio: f64) -> Box<dyn FileSource> {
        match self {
            SourceSpec::Particular(file) => Box::new(ParticularSource::new(file.clone())),
            SourceSpec::Group { files, .. } => {
                Box::new(GroupSource::new(files.clone(), anti_repeat_ratio))
            }
            SourceSpec::Attachment => Box::new(AttachmentSource),
        }
    }

    /// Files this source can return for a given host.
    pub fn candidates(&self, parent: &AudioFile) -> Vec<Arc<AudioFile>> {
        match self {
            SourceSpec::Particular(file) => vec![file.clone()],
            SourceSpec::Group { files, .. } => files.clone(),
            SourceSpec::Attachment => parent.attaches.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SourceSpec::Particular(file) => format!("file {}", file.label()),
            SourceSpec::Group { tag, files } => format!("group {} ({} files)", tag, files.len()),
            SourceSpec::Attachment => "attachment".to_string(),
        }
    }
}

/// Always the same file.
pub struct ParticularSource {
    file: Arc<AudioFile>,
}

impl ParticularSource {
    pub fn new(file: Arc<AudioFile>) -> Self {
        ParticularSource { file }
    }
}

impl FileSource for ParticularSource {
    fn next(&mut self, _: Option<&AudioFile>, _: &mut dyn UniformSource) -> Option<Arc<AudioFile>> {
        Some(self.file.clone())
    }
}

/// Uniform draws from a group, keeping recently played files aside so they
/// cannot come back before a number of other draws.
pub struct GroupSource {
    pool: Vec<Arc<AudioFile>>,
    discarded: VecDeque<Arc<AudioFile>>,
    discard_limit: usize,
}

impl GroupSource {
    pub fn new(files: Vec<Arc<AudioFile>>, anti_repeat_ratio: f64) -> Self {
        let discard_limit = Self::discard_limit(files.len(), anti_repeat_ratio);
        GroupSource {
            pool: files,
            discarded: VecDeque::new(),
            discard_limit,
        }
    }

    /// Size of the discard pile: `max(1, floor(ratio * total))`, capped so
    /// that at least one file always stays in the pool.
    pub fn discard_limit(total: usize, ratio: f64) -> usize {
        ((ratio * total as f64).floor() as usize)
            .max(1)
            .min(total.saturating_sub(1))
    }

    #[cfg(test)]
    fn pool_len(&self) -> usize {
        self.pool.len()
    }
}

impl FileSource for GroupSource {
    fn next(&mut self, _: Option<&AudioFile>, rng: &mut dyn UniformSource) -> Option<Arc<AudioFile>> {
        if self.pool.is_empty() {
            return None;
        }
        let index = pick_index(rng, self.pool.len());
        let file = self.pool.remove(index);
        self.discarded.push_back(file.clone());
        if self.discarded.len() > self.discard_limit {
            if let Some(back) = self.discarded.pop_front() {
                self.pool.push(back);
            }
        }
        Some(file)
    }
}

/// Random attachment of the host file.
pub struct AttachmentSource;

impl FileSource for AttachmentSource {
    fn next(
        &mut self,
        parent: Option<&AudioFile>,
        rng: &mut dyn UniformSource,
    ) -> Option<Arc<AudioFile>> {
        let attaches = &parent?.attaches;
        if attaches.is_empty() {
            return None;
        }
        Some(attaches[pick_index(rng, attaches.len())].clone())
    }
}

fn pick_index(rng: &mut dyn UniformSource, len: usize) -> usize {
    ((rng.next_f64() * len as f64) as usize).min(len - 1)
}

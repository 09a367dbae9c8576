//! Fan-in of build outcomes
//!
//! Runs on the control thread after the compile pool has drained. The store
//! it produces is owned by a single caller and never shared across threads.
//!
//! Submissions that share a kernel name would race on the same artifact
//! path, so [`Submissions`] folds them into one compile before dispatch and
//! keeps the later tags so every submission still gets its own row.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::compile::BuildOutcome;
use crate::config::{ConvConfig, TaggedConfig};

/// Success/failure tally of a build stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Configurations that produced an artifact
    pub success: usize,
    /// Configurations that did not
    pub failed: usize,
    /// All configurations submitted
    pub total: usize,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Success, {} Failed out of {} configs",
            self.success, self.failed, self.total
        )
    }
}

/// One compiled artifact and the configuration it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Path of the compiled artifact
    pub vmfb_path: PathBuf,
    /// Category tag
    pub tag: String,
    /// Source configuration
    pub config: ConvConfig,
}

/// Compiled artifacts keyed by path, iterated in insertion order
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    entries: Vec<StoreEntry>,
    by_path: HashMap<PathBuf, usize>,
}

impl ArtifactStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `vmfb_path`
    ///
    /// Replacing keeps the original position in iteration order.
    pub fn insert(&mut self, vmfb_path: PathBuf, tag: String, config: ConvConfig) {
        if let Some(&idx) = self.by_path.get(&vmfb_path) {
            self.entries[idx].tag = tag;
            self.entries[idx].config = config;
            return;
        }
        self.by_path.insert(vmfb_path.clone(), self.entries.len());
        self.entries.push(StoreEntry {
            vmfb_path,
            tag,
            config,
        });
    }

    /// Look up an artifact
    #[must_use]
    pub fn get(&self, vmfb_path: &Path) -> Option<&StoreEntry> {
        self.by_path.get(vmfb_path).map(|&idx| &self.entries[idx])
    }

    /// Number of artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no artifact was stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &StoreEntry> {
        self.entries.iter()
    }
}

/// Submitted configurations with duplicate kernels folded together
#[derive(Debug, Clone, Default)]
pub struct Submissions {
    unique: Vec<TaggedConfig>,
    extra_tags: HashMap<String, Vec<String>>,
    total: usize,
}

impl Submissions {
    /// Fold `configs`, keeping the first occurrence of each kernel name
    #[must_use]
    pub fn new(configs: &[TaggedConfig]) -> Self {
        let mut subs = Self {
            total: configs.len(),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        for tagged in configs {
            let name = tagged.config.name();
            if seen.contains(&name) {
                subs.extra_tags
                    .entry(name)
                    .or_default()
                    .push(tagged.tag.clone());
            } else {
                seen.insert(name);
                subs.unique.push(tagged.clone());
            }
        }
        subs
    }

    /// Configurations to compile, in first-submission order
    #[must_use]
    pub fn unique(&self) -> &[TaggedConfig] {
        &self.unique
    }

    /// Tags of later submissions of the kernel `name`
    #[must_use]
    pub fn extra_tags(&self, name: &str) -> &[String] {
        self.extra_tags.get(name).map_or(&[], Vec::as_slice)
    }

    /// Number of configurations submitted, duplicates included
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Submissions folded into an earlier one
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.total - self.unique.len()
    }
}

/// Everything the benchmark stage needs from the build stage
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    /// Successfully compiled artifacts
    pub store: ArtifactStore,
    /// Configurations whose compile failed, in outcome order
    pub failures: Vec<TaggedConfig>,
    /// Tally
    pub summary: BuildSummary,
}

/// Fold build outcomes into an [`Aggregate`]
///
/// `outcomes` are the builds of `submissions.unique()`. A duplicate
/// submission counts as a success or failure with the build it shares.
#[must_use]
pub fn aggregate(outcomes: Vec<BuildOutcome>, submissions: &Submissions) -> Aggregate {
    let mut agg = Aggregate {
        summary: BuildSummary {
            total: outcomes.len() + submissions.duplicates(),
            ..Default::default()
        },
        ..Default::default()
    };

    for outcome in outcomes {
        let shared = submissions.extra_tags(&outcome.config.name()).len();
        match outcome.vmfb_path {
            Some(path) => agg.store.insert(path, outcome.tag, outcome.config),
            None => {
                agg.summary.failed += 1 + shared;
                agg.failures
                    .push(TaggedConfig::new(outcome.tag, outcome.config));
            },
        }
    }
    agg.summary.success = agg.summary.total - agg.summary.failed;
    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DType;

    fn outcome(tag: &str, f: u64, ok: bool) -> BuildOutcome {
        let config = ConvConfig::new(1, 8, 8, 4, 3, 3, f, 1, DType::F16, DType::F32);
        let vmfb = PathBuf::from(format!("/vmfb/{}.vmfb", config.name()));
        BuildOutcome {
            tag: tag.to_string(),
            config,
            mlir_path: None,
            vmfb_path: ok.then_some(vmfb),
        }
    }

    #[test]
    fn test_summary_counts() {
        let agg = aggregate(
            vec![
                outcome("a", 8, true),
                outcome("a", 16, false),
                outcome("b", 32, true),
            ],
            &Submissions::default(),
        );
        assert_eq!(
            agg.summary,
            BuildSummary {
                success: 2,
                failed: 1,
                total: 3
            }
        );
        assert_eq!(agg.store.len(), 2);
        assert_eq!(agg.failures.len(), 1);
        assert_eq!(agg.failures[0].config.f(), 16);
    }

    #[test]
    fn test_summary_display() {
        let summary = BuildSummary {
            success: 2,
            failed: 1,
            total: 3,
        };
        assert_eq!(summary.to_string(), "2 Success, 1 Failed out of 3 configs");
    }

    #[test]
    fn test_store_excludes_failures() {
        let failed = outcome("a", 16, false);
        let path = PathBuf::from(format!("/vmfb/{}.vmfb", failed.config.name()));
        let agg = aggregate(vec![failed], &Submissions::default());
        assert!(agg.store.is_empty());
        assert!(agg.store.get(&path).is_none());
    }

    #[test]
    fn test_store_insertion_order_and_replace() {
        let mut store = ArtifactStore::new();
        let c1 = ConvConfig::new(1, 8, 8, 4, 3, 3, 8, 1, DType::F16, DType::F32);
        let c2 = ConvConfig::new(2, 8, 8, 4, 3, 3, 8, 1, DType::F16, DType::F32);
        store.insert("/v/b.vmfb".into(), "x".into(), c1.clone());
        store.insert("/v/a.vmfb".into(), "y".into(), c2.clone());
        store.insert("/v/b.vmfb".into(), "z".into(), c1);

        let tags: Vec<_> = store.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["z", "y"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(Path::new("/v/a.vmfb")).unwrap().config, c2);
    }

    #[test]
    fn test_empty_outcomes() {
        let agg = aggregate(Vec::new(), &Submissions::new(&[]));
        assert_eq!(agg.summary, BuildSummary::default());
    }

    fn tagged(tag: &str, f: u64) -> TaggedConfig {
        TaggedConfig::new(
            tag,
            ConvConfig::new(1, 8, 8, 4, 3, 3, f, 1, DType::F16, DType::F32),
        )
    }

    #[test]
    fn test_submissions_fold_duplicate_kernels() {
        let configs = vec![
            tagged("unet", 8),
            tagged("sdxl", 8),
            tagged("resnet", 16),
            tagged("vae", 8),
        ];
        let subs = Submissions::new(&configs);
        assert_eq!(subs.total(), 4);
        assert_eq!(subs.duplicates(), 2);

        let kept: Vec<_> = subs.unique().iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(kept, vec!["unet", "resnet"]);
        assert_eq!(subs.extra_tags(&configs[0].config.name()), ["sdxl", "vae"]);
        assert!(subs.extra_tags(&configs[2].config.name()).is_empty());
    }

    #[test]
    fn test_duplicates_count_with_shared_build() {
        let configs = vec![tagged("unet", 8), tagged("sdxl", 8), tagged("resnet", 16)];
        let subs = Submissions::new(&configs);
        let agg = aggregate(
            vec![outcome("unet", 8, true), outcome("resnet", 16, false)],
            &subs,
        );
        assert_eq!(
            agg.summary,
            BuildSummary {
                success: 2,
                failed: 1,
                total: 3
            }
        );
        assert_eq!(agg.store.len(), 1);

        let agg = aggregate(
            vec![outcome("unet", 8, false), outcome("resnet", 16, true)],
            &subs,
        );
        assert_eq!(agg.summary.failed, 2);
        assert_eq!(agg.summary.success, 1);
    }
}

use super::PairedViewIndex;
use crate::common::*;

/// The number of records of one source texture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCoverage {
    pub source_uv: PathBuf,
    pub pairs: usize,
}

/// Summary of how well each source texture is covered by augmented views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub dataset: PathBuf,
    pub unique_uv_textures: usize,
    pub total_augmented_pairs: usize,
    pub min_pairs_per_uv: usize,
    pub max_pairs_per_uv: usize,
    pub avg_pairs_per_uv: f64,
    /// Textures with a single view. Their samples pair a view with itself.
    pub num_singleton_uvs: usize,
    pub singleton_examples: Vec<PathBuf>,
    pub lowest_coverage: Vec<SourceCoverage>,
}

impl CoverageReport {
    pub fn new(dataset: impl AsRef<Path>, index: &PairedViewIndex, top_missing: usize) -> Self {
        let counts: Vec<_> = index
            .groups()
            .iter()
            .map(|group| SourceCoverage {
                source_uv: group.source_uv.clone(),
                pairs: group.records.len(),
            })
            .collect();

        let unique_uv_textures = counts.len();
        let total_augmented_pairs: usize = counts.iter().map(|count| count.pairs).sum();
        let min_pairs_per_uv = counts.iter().map(|count| count.pairs).min().unwrap_or(0);
        let max_pairs_per_uv = counts.iter().map(|count| count.pairs).max().unwrap_or(0);
        let avg_pairs_per_uv = if unique_uv_textures > 0 {
            let avg = total_augmented_pairs as f64 / unique_uv_textures as f64;
            (avg * 100.0).round() / 100.0
        } else {
            0.0
        };

        let singletons: Vec<_> = counts
            .iter()
            .filter(|count| count.pairs == 1)
            .map(|count| count.source_uv.clone())
            .collect();
        let lowest_coverage: Vec<_> = counts
            .iter()
            .sorted_by_key(|count| count.pairs)
            .take(top_missing)
            .cloned()
            .collect();

        Self {
            dataset: dataset.as_ref().to_owned(),
            unique_uv_textures,
            total_augmented_pairs,
            min_pairs_per_uv,
            max_pairs_per_uv,
            avg_pairs_per_uv,
            num_singleton_uvs: singletons.len(),
            singleton_examples: singletons.into_iter().take(top_missing).collect(),
            lowest_coverage,
        }
    }
}

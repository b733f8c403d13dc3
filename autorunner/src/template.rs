//! Experiment templates and the graph they form.

use crate::common::*;

/// The built-in template graph.
pub const BUILTIN_TEMPLATES: &str = include_str!("../templates.json5");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Greater than or equal to.
    Ge,
    /// Less than or equal to.
    Le,
}

/// A bound on one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub comparison: Comparison,
    pub value: f64,
}

impl Threshold {
    /// A missing or NaN metric never satisfies a threshold.
    pub fn is_satisfied(&self, metrics: &Metrics) -> bool {
        let actual = metrics.get(&self.metric).copied().unwrap_or(f64::NAN);
        match self.comparison {
            Comparison::Ge => actual >= self.value,
            Comparison::Le => actual <= self.value,
        }
    }
}

/// A parameterized training run and its successors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentTemplate {
    pub name: String,
    pub epochs: NonZeroUsize,
    /// Extra arguments appended to the training command.
    #[serde(default)]
    pub train_args: Vec<String>,
    pub checkpoint_stem: String,
    /// All must hold for the run to count as a success.
    #[serde(default)]
    pub success_thresholds: Vec<Threshold>,
    #[serde(default)]
    pub success_next: Option<String>,
    #[serde(default)]
    pub failure_next: Option<String>,
    /// Periodic checkpoint interval in epochs, zero to disable.
    #[serde(default)]
    pub checkpoint_every: usize,
    #[serde(default)]
    pub run_visuals: bool,
}

impl ExperimentTemplate {
    pub fn checkpoint_name(&self, run_tag: &str) -> String {
        format!("{}_{}.ckpt", run_tag, self.checkpoint_stem)
    }

    /// Pick the successor for the metrics of a completed run.
    ///
    /// Without thresholds the success successor is taken unconditionally.
    pub fn decide_next(&self, metrics: &Metrics) -> Option<&str> {
        let all_met = self
            .success_thresholds
            .iter()
            .all(|threshold| threshold.is_satisfied(metrics));

        if all_met {
            self.success_next.as_deref()
        } else {
            self.failure_next.as_deref()
        }
    }

    pub fn successors(&self) -> impl Iterator<Item = &str> {
        self.success_next
            .as_deref()
            .into_iter()
            .chain(self.failure_next.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemplateFile {
    templates: Vec<ExperimentTemplate>,
}

/// Templates keyed by name.
#[derive(Debug, Clone)]
pub struct TemplateGraph {
    templates: IndexMap<String, ExperimentTemplate>,
}

impl TemplateGraph {
    pub fn new(templates: impl IntoIterator<Item = ExperimentTemplate>) -> Result<Self> {
        let mut map = IndexMap::new();
        for template in templates {
            ensure!(
                !template.checkpoint_stem.is_empty(),
                "the template '{}' has an empty checkpoint_stem",
                template.name
            );
            let name = template.name.clone();
            let prev = map.insert(name.clone(), template);
            ensure!(prev.is_none(), "the template '{}' is defined twice", name);
        }

        let graph = Self { templates: map };
        for (name, successor) in graph.unknown_successors() {
            warn!(
                "the template '{}' refers to an unknown successor '{}'",
                name, successor
            );
        }
        Ok(graph)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read templates '{}'", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("invalid templates file '{}'", path.display()))
    }

    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_TEMPLATES)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let TemplateFile { templates } = json5::from_str(text)?;
        Self::new(templates)
    }

    pub fn get(&self, name: &str) -> Option<&ExperimentTemplate> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> impl Iterator<Item = &ExperimentTemplate> {
        self.templates.values()
    }

    /// Pairs of template name and a successor name absent from the graph.
    pub fn unknown_successors(&self) -> Vec<(&str, &str)> {
        self.templates
            .values()
            .flat_map(|template| {
                template
                    .successors()
                    .filter(|successor| !self.contains(successor))
                    .map(move |successor| (template.name.as_str(), successor))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> Metrics {
        pairs
            .iter()
            .map(|&(name, value)| (name.to_string(), value))
            .collect()
    }

    #[test]
    fn builtin_graph_has_short_and_full_runs() {
        let graph = TemplateGraph::builtin().unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.unknown_successors().is_empty());

        let short = graph.get("direct_decay_probe").unwrap();
        assert_eq!(short.epochs.get(), 20);
        assert_eq!(short.success_thresholds.len(), 2);
        assert_eq!(short.train_args[..2], ["--w-cycle", "0.26"]);

        let full = graph.get("directsteady_full").unwrap();
        assert_eq!(full.epochs.get(), 40);
        assert_eq!(full.checkpoint_every, 10);
        assert!(full.run_visuals);
        assert_eq!(full.successors().count(), 0);
    }

    #[test]
    fn thresholds_are_and_combined() {
        let graph = TemplateGraph::builtin().unwrap();
        let short = graph.get("direct_decay_probe").unwrap();

        let one_unmet = metrics(&[("ssim_uv", 0.20), ("lpips_view", 0.40)]);
        assert_eq!(short.decide_next(&one_unmet), Some("directsteady_full"));

        let both_met = metrics(&[("ssim_uv", 0.30), ("lpips_view", 0.45)]);
        assert_eq!(short.decide_next(&both_met), Some("direct_decay_full"));

        let boundary = metrics(&[("ssim_uv", 0.245), ("lpips_view", 0.52)]);
        assert_eq!(short.decide_next(&boundary), Some("direct_decay_full"));
    }

    #[test]
    fn missing_or_nan_metric_fails_threshold() {
        let threshold = Threshold {
            metric: "lpips_view".into(),
            comparison: Comparison::Le,
            value: 0.52,
        };
        assert!(!threshold.is_satisfied(&metrics(&[("ssim_uv", 0.3)])));
        assert!(!threshold.is_satisfied(&metrics(&[("lpips_view", f64::NAN)])));
    }

    #[test]
    fn template_without_thresholds_always_succeeds() {
        let template = ExperimentTemplate {
            name: "plain".into(),
            epochs: NonZeroUsize::new(5).unwrap(),
            train_args: vec![],
            checkpoint_stem: "plain".into(),
            success_thresholds: vec![],
            success_next: Some("next".into()),
            failure_next: Some("fallback".into()),
            checkpoint_every: 0,
            run_visuals: false,
        };
        assert_eq!(template.decide_next(&Metrics::new()), Some("next"));
        assert_eq!(template.checkpoint_name("tag"), "tag_plain.ckpt");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let text = r#"{
            templates: [
                { name: "a", epochs: 1, checkpoint_stem: "a" },
                { name: "a", epochs: 2, checkpoint_stem: "b" },
            ],
        }"#;
        assert!(TemplateGraph::parse(text).is_err());
    }

    #[test]
    fn unknown_successor_is_reported() {
        let text = r#"{
            templates: [
                { name: "a", epochs: 1, checkpoint_stem: "a", success_next: "ghost" },
            ],
        }"#;
        let graph = TemplateGraph::parse(text).unwrap();
        assert_eq!(graph.unknown_successors(), [("a", "ghost")]);
    }
}

use std::fmt;

use crate::model::Model;

const CONTEXT_WINDOW: i32 = 2;

/// Weight of one active feature for one label.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub feature: String,
    pub weight: f64,
}

/// Score of a label and the features pushing it up and down the most.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelExplanation {
    pub label: String,
    pub score: f64,

    /// Highest weights first.
    pub top: Vec<Contribution>,

    /// Lowest weights first.
    pub bottom: Vec<Contribution>,
}

/// Diagnostic report of a single prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Surface tokens of the `w[-2]=` .. `w[2]=` features with their offsets.
    pub context: Vec<(i32, String)>,
    pub predicted: String,
    pub gold: String,
    pub labels: Vec<LabelExplanation>,
}

impl Explanation {
    /// Builds an explanation.
    ///
    /// # Arguments
    ///
    /// * `model` - The model used for the prediction.
    /// * `scores` - Scores of every label.
    /// * `features` - Active features, including the transition feature if it should be
    ///   ranked. Duplicates are ranked once.
    /// * `predicted` - The predicted label.
    /// * `gold` - The reference label.
    /// * `size` - The number of top and bottom features reported per label.
    pub fn new<S>(
        model: &Model,
        scores: &[f64],
        features: &[S],
        predicted: &str,
        gold: &str,
        size: usize,
    ) -> Self
    where
        S: AsRef<str>,
    {
        let context = (-CONTEXT_WINDOW..=CONTEXT_WINDOW)
            .filter_map(|offset| {
                let prefix = format!("w[{}]=", offset);
                features
                    .iter()
                    .find_map(|f| f.as_ref().strip_prefix(prefix.as_str()))
                    .map(|word| (offset, word.to_string()))
            })
            .collect();

        let mut known: Vec<&str> = features
            .iter()
            .map(AsRef::as_ref)
            .filter(|f| model.feature_weights(f).is_some())
            .collect();
        known.sort_unstable();
        known.dedup();

        let labels = model
            .labels()
            .iter()
            .enumerate()
            .map(|(label_id, label)| {
                let mut contributions: Vec<Contribution> = known
                    .iter()
                    .map(|&feature| Contribution {
                        feature: feature.to_string(),
                        weight: model.weight(feature, label_id),
                    })
                    .collect();
                contributions.sort_by(|a, b| {
                    b.weight
                        .total_cmp(&a.weight)
                        .then_with(|| a.feature.cmp(&b.feature))
                });
                let top = contributions.iter().take(size).cloned().collect();
                contributions.sort_by(|a, b| {
                    a.weight
                        .total_cmp(&b.weight)
                        .then_with(|| a.feature.cmp(&b.feature))
                });
                contributions.truncate(size);
                LabelExplanation {
                    label: label.clone(),
                    score: scores.get(label_id).copied().unwrap_or_default(),
                    top,
                    bottom: contributions,
                }
            })
            .collect();

        Self {
            context,
            predicted: predicted.to_string(),
            gold: gold.to_string(),
            labels,
        }
    }
}

fn write_contributions(f: &mut fmt::Formatter, name: &str, cs: &[Contribution]) -> fmt::Result {
    write!(f, "  {}:", name)?;
    for c in cs {
        write!(f, " {}({})", c.feature, c.weight)?;
    }
    writeln!(f)
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "context:")?;
        for (offset, word) in &self.context {
            if *offset == 0 {
                write!(f, " [{}]", word)?;
            } else {
                write!(f, " {}", word)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "predicted: {}\tgold: {}", self.predicted, self.gold)?;
        for label in &self.labels {
            writeln!(f, "score: {}\t{}", label.label, label.score)?;
        }
        for label in &self.labels {
            writeln!(f, "label: {}", label.label)?;
            write_contributions(f, "top", &label.top)?;
            write_contributions(f, "bottom", &label.bottom)?;
        }
        Ok(())
    }
}

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::str::FromStr;

use hashbrown::HashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TaggerError};
use crate::utils;

const LABEL_MARKER: &str = "@label";

/// Field order of weight lines in a text model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// `<weight>\t<feature>\t<label>`
    Classias,

    /// `<weight>\t<label>\t<feature>`
    LabelFirst,
}

impl ModelFormat {
    /// Extracts `(weight, feature, label)` from the fields of a weight line.
    ///
    /// Returns `None` when there are fewer than three fields.
    fn split_weight_fields<'a>(&self, fields: &[&'a str]) -> Option<(&'a str, &'a str, &'a str)> {
        if fields.len() < 3 {
            return None;
        }
        match self {
            Self::Classias => Some((fields[0], fields[1], fields[2])),
            Self::LabelFirst => Some((fields[0], fields[2], fields[1])),
        }
    }
}

impl Default for ModelFormat {
    fn default() -> Self {
        Self::Classias
    }
}

impl FromStr for ModelFormat {
    type Err = &'static str;
    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format {
            "classias" => Ok(Self::Classias),
            "label-first" => Ok(Self::LabelFirst),
            _ => Err("Could not parse a model format"),
        }
    }
}

/// Settings used when a text model is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
    /// Field order of weight lines.
    pub format: ModelFormat,

    /// Weight of label slots that are not assigned in the model file.
    pub default_weight: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            format: ModelFormat::Classias,
            default_weight: 0.,
        }
    }
}

struct WeightRecord {
    feature: String,
    label: String,
    weight: f64,
}

/// Label index and per-feature weight vectors of a linear multi-class model.
///
/// Every weight vector has exactly one slot per label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    labels: Vec<String>,
    #[serde(skip)]
    label_ids: HashMap<String, usize>,
    weights: HashMap<String, Vec<f64>>,
    default_weight: f64,
}

impl Model {
    /// Creates a model without labels and weights.
    pub fn empty(default_weight: f64) -> Self {
        Self {
            labels: vec![],
            label_ids: HashMap::new(),
            weights: HashMap::new(),
            default_weight,
        }
    }

    fn register_label(&mut self, label: &str) -> bool {
        if self.label_ids.contains_key(label) {
            return false;
        }
        self.label_ids.insert(label.to_string(), self.labels.len());
        self.labels.push(label.to_string());
        true
    }

    /// Loads a text model from a file.
    ///
    /// A file that cannot be opened or read results in an empty model, so callers must
    /// tolerate a model without labels.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the model file.
    /// * `config` - Load settings.
    ///
    /// # Returns
    ///
    /// A loaded model.
    pub fn open<P>(path: P, config: &ModelConfig) -> Self
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let result = File::open(path)
            .map_err(TaggerError::from)
            .and_then(|f| Self::read_text(BufReader::new(f), config));
        match result {
            Ok(model) => model,
            Err(e) => {
                warn!("{}: {}; using an empty model", path.display(), e);
                Self::empty(config.default_weight)
            }
        }
    }

    /// Reads a text model.
    ///
    /// The model is loaded in two passes: labels and weight lines are collected first,
    /// then every feature vector is allocated with the final number of labels. Malformed
    /// lines are skipped with a warning.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    /// * `config` - Load settings.
    ///
    /// # Returns
    ///
    /// A model read from `rdr`.
    ///
    /// # Errors
    ///
    /// When `rdr` generates an error, it will be returned as is.
    pub fn read_text<R>(mut rdr: R, config: &ModelConfig) -> Result<Self>
    where
        R: BufRead,
    {
        let mut model = Self::empty(config.default_weight);
        let mut records = vec![];
        let mut buf = vec![];
        let mut lineno = 0;
        while utils::read_line_bytes(&mut rdr, &mut buf)? {
            lineno += 1;
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!("line {}: {}", lineno, e);
                    continue;
                }
            };
            let fields: Vec<&str> = utils::tab_fields(line).collect();
            let first = match fields.first() {
                Some(&first) => first,
                None => continue,
            };
            if first == LABEL_MARKER {
                match fields.get(1) {
                    Some(label) => {
                        if !model.register_label(label) {
                            warn!("line {}: duplicate label `{}` is ignored", lineno, label);
                        }
                    }
                    None => warn!("line {}: `{}` without a label name", lineno, LABEL_MARKER),
                }
                continue;
            }
            if first.starts_with('@') {
                continue;
            }
            let (weight, feature, label) = match config.format.split_weight_fields(&fields) {
                Some(record) => record,
                None => {
                    warn!("line {}: expected 3 fields, found {}", lineno, fields.len());
                    continue;
                }
            };
            let weight = match weight.parse::<f64>() {
                Ok(weight) => weight,
                Err(_) => {
                    warn!("line {}: invalid weight `{}`", lineno, weight);
                    continue;
                }
            };
            records.push(WeightRecord {
                feature: feature.to_string(),
                label: label.to_string(),
                weight,
            });
        }

        let n_labels = model.labels.len();
        for record in records {
            let label_id = match model.label_ids.get(&record.label) {
                Some(&id) => id,
                None => {
                    warn!(
                        "undeclared label `{}` for feature `{}` is ignored",
                        record.label, record.feature
                    );
                    continue;
                }
            };
            let default_weight = model.default_weight;
            let ws = model
                .weights
                .entry(record.feature)
                .or_insert_with(|| vec![default_weight; n_labels]);
            ws[label_id] = record.weight;
        }
        debug!(
            "loaded {} labels and {} features",
            model.labels.len(),
            model.weights.len()
        );
        Ok(model)
    }

    /// Writes a human-readable dump of the model.
    ///
    /// Labels are written as `label: index` in index order, followed by
    /// `feature => w0 w1 ...` lines sorted by feature name.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write_dump<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        for (i, label) in self.labels.iter().enumerate() {
            writeln!(wtr, "{}: {}", label, i)?;
        }
        let mut features: Vec<_> = self.weights.iter().collect();
        features.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        for (feature, ws) in features {
            write!(wtr, "{} =>", feature)?;
            for w in ws {
                write!(wtr, " {}", w)?;
            }
            writeln!(wtr)?;
        }
        Ok(())
    }

    /// Reads a dump written by [`Model::write_dump()`].
    ///
    /// # Errors
    ///
    /// [`TaggerError::InvalidModel`] is returned when labels are out of order or a weight
    /// vector does not have one slot per label.
    pub fn read_dump<R>(rdr: R, default_weight: f64) -> Result<Self>
    where
        R: BufRead,
    {
        let mut model = Self::empty(default_weight);
        for line in rdr.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if let Some((feature, ws)) = parse_dump_weights(&line) {
                if ws.len() != model.labels.len() {
                    return Err(TaggerError::invalid_model(format!(
                        "feature `{}` has {} weights for {} labels",
                        feature,
                        ws.len(),
                        model.labels.len()
                    )));
                }
                model.weights.insert(feature.to_string(), ws);
                continue;
            }
            let (label, id) = line
                .rsplit_once(": ")
                .ok_or_else(|| TaggerError::invalid_model(format!("invalid line: {}", line)))?;
            let id: usize = id
                .parse()
                .map_err(|_| TaggerError::invalid_model(format!("invalid label index: {}", id)))?;
            if id != model.labels.len() || !model.register_label(label) {
                return Err(TaggerError::invalid_model(format!(
                    "unexpected label entry: {}",
                    line
                )));
            }
        }
        Ok(model)
    }

    /// Exports the compiled model data.
    ///
    /// # Arguments
    ///
    /// * `wtr` - Byte-oriented sink object.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, wtr: &mut W) -> Result<()>
    where
        W: Write,
    {
        bincode::serialize_into(wtr, self)?;
        Ok(())
    }

    /// Creates a model from compiled model data.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    ///
    /// # Returns
    ///
    /// A model data read from `rdr`.
    ///
    /// # Errors
    ///
    /// When `rdr` generates an error, it will be returned as is. When the data is
    /// inconsistent, [`TaggerError::InvalidModel`] is returned.
    pub fn read<R>(rdr: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let mut model: Self = bincode::deserialize_from(rdr)?;
        let labels = std::mem::take(&mut model.labels);
        for label in &labels {
            if !model.register_label(label) {
                return Err(TaggerError::invalid_model(format!(
                    "duplicate label: {}",
                    label
                )));
            }
        }
        let n_labels = model.labels.len();
        if let Some((feature, _)) = model.weights.iter().find(|(_, ws)| ws.len() != n_labels) {
            return Err(TaggerError::invalid_model(format!(
                "feature `{}` does not have {} weights",
                feature, n_labels
            )));
        }
        Ok(model)
    }

    /// Returns labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the number of labels.
    pub fn n_labels(&self) -> usize {
        self.labels.len()
    }

    /// Returns the number of features that have weights.
    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    /// Returns `true` if the model has no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the index of a label.
    pub fn label_id(&self, label: &str) -> Option<usize> {
        self.label_ids.get(label).copied()
    }

    /// Returns the label name of an index.
    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Returns the weight vector of a feature.
    pub fn feature_weights(&self, feature: &str) -> Option<&[f64]> {
        self.weights.get(feature).map(Vec::as_slice)
    }

    /// Returns the weight of a feature for a label.
    ///
    /// Unknown features weigh 0. A slot missing from a feature's vector is given the
    /// default weight.
    pub fn weight(&self, feature: &str, label_id: usize) -> f64 {
        self.feature_weights(feature).map_or(0., |ws| {
            ws.get(label_id).copied().unwrap_or(self.default_weight)
        })
    }

    /// Returns the weight of unassigned label slots.
    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    /// Iterates over features and their weight vectors in arbitrary order.
    pub fn features(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.weights
            .iter()
            .map(|(feature, ws)| (feature.as_str(), ws.as_slice()))
    }
}

fn parse_dump_weights(line: &str) -> Option<(&str, Vec<f64>)> {
    let (feature, ws) = line.rsplit_once(" =>")?;
    let ws = ws
        .split_whitespace()
        .map(|w| w.parse().ok())
        .collect::<Option<Vec<f64>>>()?;
    Some((feature, ws))
}

use std::borrow::Cow;
use std::io::{self, Write};

use crate::corpus::Item;
use crate::errors::Result;
use crate::explain::Explanation;
use crate::model::Model;
use crate::utils;

/// Prefix of the feature keyed by the previously predicted label.
pub const TRANSITION_PREFIX: &str = "$y[-1]=";

const HISTORY_PLACEHOLDER: &str = "__$y[";

/// Anything that accepts output one line at a time.
pub trait LineSink {
    /// Writes `line` followed by a line break.
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

impl<W> LineSink for W
where
    W: Write,
{
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self, "{}", line)
    }
}

/// Label chosen for a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction<'a> {
    pub label: &'a str,
    pub label_id: usize,

    /// Score gap between the chosen label and the runner-up.
    pub margin: f64,
}

/// Counts collected during one decoding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub n_tokens: usize,
    pub n_correct: usize,
    pub n_sequences: usize,
}

impl DecodeStats {
    /// Ratio of tokens whose prediction matches the gold label.
    pub fn accuracy(&self) -> f64 {
        if self.n_tokens == 0 {
            0.
        } else {
            self.n_correct as f64 / self.n_tokens as f64
        }
    }
}

/// Greedy left-to-right decoder.
///
/// The decoder itself holds no per-sequence state, so one decoder (and its model) can be
/// shared by several decoding passes.
pub struct Decoder<'a> {
    model: &'a Model,
    precision: usize,
    explain: bool,
    explain_size: usize,
    order: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder.
    ///
    /// # Arguments
    ///
    /// * `model` - A model data.
    ///
    /// # Returns
    ///
    /// A new decoder.
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            precision: 6,
            explain: false,
            explain_size: 10,
            order: 1,
        }
    }

    /// Sets the number of decimal places of margins in the output.
    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Enables diagnostic explanations of mispredicted tokens.
    pub fn explain(mut self, enabled: bool) -> Self {
        self.explain = enabled;
        self
    }

    /// Sets the number of top and bottom features reported per label in explanations.
    pub fn explain_size(mut self, size: usize) -> Self {
        self.explain_size = size;
        self
    }

    /// Sets the number of previous predictions available to features.
    ///
    /// A placeholder `__$y[-k]` in a feature name is replaced with the label predicted `k`
    /// tokens before (an empty string if there is none) for every `k <= order`. The history
    /// is cleared at every sequence boundary. The minimum is 1.
    pub fn order(mut self, order: usize) -> Self {
        self.order = std::cmp::max(order, 1);
        self
    }

    /// Replaces history placeholders in feature names.
    ///
    /// # Arguments
    ///
    /// * `features` - Active features of the token.
    /// * `history` - Previously predicted labels in the current sequence, oldest first.
    ///
    /// # Returns
    ///
    /// Features with `__$y[-1]` .. `__$y[-order]` substituted.
    pub fn expand_history<'f, S>(
        &self,
        features: &'f [S],
        history: &[String],
    ) -> Vec<Cow<'f, str>>
    where
        S: AsRef<str>,
    {
        features
            .iter()
            .map(|feature| {
                let feature = feature.as_ref();
                if !feature.contains(HISTORY_PLACEHOLDER) {
                    return Cow::Borrowed(feature);
                }
                let mut expanded = feature.to_string();
                for k in 1..=self.order {
                    let label = history
                        .len()
                        .checked_sub(k)
                        .map_or("", |i| history[i].as_str());
                    let placeholder = format!("{}-{}]", HISTORY_PLACEHOLDER, k);
                    expanded = expanded.replace(&placeholder, label);
                }
                Cow::Owned(expanded)
            })
            .collect()
    }

    fn add_feature_scores(&self, feature: &str, ys: &mut [f64]) {
        if let Some(ws) = self.model.feature_weights(feature) {
            let default_weight = self.model.default_weight();
            for (i, y) in ys.iter_mut().enumerate() {
                *y += ws.get(i).copied().unwrap_or(default_weight);
            }
        }
    }

    /// Computes raw linear scores of every label.
    ///
    /// # Arguments
    ///
    /// * `features` - Active features of the token.
    /// * `prev_label` - The label predicted for the previous token, or an empty string at
    ///   the start of a sequence.
    ///
    /// # Returns
    ///
    /// One score per label, in label index order.
    pub fn calc_scores<S>(&self, features: &[S], prev_label: &str) -> Vec<f64>
    where
        S: AsRef<str>,
    {
        let mut ys = vec![0.; self.model.n_labels()];
        self.add_feature_scores(&transition_feature(prev_label), &mut ys);
        for feature in features {
            self.add_feature_scores(feature.as_ref(), &mut ys);
        }
        ys
    }

    /// Picks the best label and its margin over the runner-up.
    ///
    /// Ties resolve to the lowest label index. Returns `None` if the model has no labels.
    pub fn predict_and_margin(&self, scores: &[f64]) -> Option<Prediction<'a>> {
        let top = utils::top_two(scores)?;
        let label = self.model.label(top.index)?;
        Some(Prediction {
            label,
            label_id: top.index,
            margin: top.margin(),
        })
    }

    /// Predicts the label of a single token.
    pub fn predict<S>(&self, features: &[S], prev_label: &str) -> Option<Prediction<'a>>
    where
        S: AsRef<str>,
    {
        self.predict_and_margin(&self.calc_scores(features, prev_label))
    }

    /// Builds a diagnostic report of a prediction.
    ///
    /// The transition feature of `prev_label` is ranked along with the active features.
    pub fn explanation<S>(
        &self,
        scores: &[f64],
        features: &[S],
        prev_label: &str,
        predicted: &str,
        gold: &str,
    ) -> Explanation
    where
        S: AsRef<str>,
    {
        let mut ranked: Vec<&str> = features.iter().map(AsRef::as_ref).collect();
        let transition = transition_feature(prev_label);
        ranked.push(&transition);
        Explanation::new(
            self.model,
            scores,
            &ranked,
            predicted,
            gold,
            self.explain_size,
        )
    }

    /// Decodes a token stream.
    ///
    /// Writes `gold \t predicted \t margin \t annotation` for each token and an empty line
    /// for each sequence boundary. The predicted label, not the gold label, is fed to the
    /// next token as the transition feature and as history for placeholders; both are reset
    /// at every boundary.
    ///
    /// # Arguments
    ///
    /// * `items` - Tokens and boundaries.
    /// * `out` - Sink of predictions.
    /// * `diag` - Sink of explanations. Used only if explanations are enabled.
    ///
    /// # Returns
    ///
    /// Statistics of the pass.
    ///
    /// # Errors
    ///
    /// Errors of `items` and of the sinks are returned as is.
    pub fn decode<I, O, D>(&self, items: I, out: &mut O, diag: &mut D) -> Result<DecodeStats>
    where
        I: IntoIterator<Item = Result<Item>>,
        O: LineSink,
        D: LineSink,
    {
        let mut stats = DecodeStats::default();
        let mut history: Vec<String> = Vec::with_capacity(self.order);
        let mut in_sequence = false;
        for item in items {
            let token = match item? {
                Item::Token(token) => token,
                Item::Boundary => {
                    out.write_line("")?;
                    history.clear();
                    if in_sequence {
                        stats.n_sequences += 1;
                        in_sequence = false;
                    }
                    continue;
                }
            };
            in_sequence = true;

            let prev_label = history.last().map_or("", String::as_str);
            let features = self.expand_history(token.features(), &history);
            let scores = self.calc_scores(&features, prev_label);
            let (label, margin) = self
                .predict_and_margin(&scores)
                .map_or(("", 0.), |p| (p.label, p.margin));
            out.write_line(&format!(
                "{}\t{}\t{:.*}\t{}",
                token.gold(),
                label,
                self.precision,
                margin,
                token.annotation(),
            ))?;

            stats.n_tokens += 1;
            if label == token.gold() {
                stats.n_correct += 1;
            } else if self.explain {
                let e = self.explanation(&scores, &features, prev_label, label, token.gold());
                diag.write_line(&e.to_string())?;
            }

            if history.len() == self.order {
                history.remove(0);
            }
            history.push(label.to_string());
        }
        if in_sequence {
            stats.n_sequences += 1;
        }
        Ok(stats)
    }
}

fn transition_feature(prev_label: &str) -> String {
    format!("{}{}", TRANSITION_PREFIX, prev_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::corpus::{Token, TokenReader};
    use crate::model::ModelConfig;

    fn load(text: &str) -> Model {
        Model::read_text(text.as_bytes(), &ModelConfig::default()).unwrap()
    }

    fn pos_neg_model() -> Model {
        load("@classias\n@label\tPOS\n@label\tNEG\n1.0\tbias\tPOS\n0.5\t$y[-1]=POS\tPOS\n")
    }

    fn token(gold: &str, features: &[&str]) -> Result<Item> {
        Ok(Item::Token(Token::new(gold, features.to_vec(), "")))
    }

    #[test]
    fn test_calc_scores_unknown_feature() {
        let model = pos_neg_model();
        let decoder = Decoder::new(&model);
        assert_eq!(vec![0., 0.], decoder.calc_scores(&["nothing"], ""));
    }

    #[test]
    fn test_calc_scores_additive() {
        let model = load("@label\tA\n@label\tB\n1\tf1\tA\n2\tf1\tB\n-4\tf2\tA\n0.5\tf2\tB\n");
        let decoder = Decoder::new(&model);
        let s1 = decoder.calc_scores(&["f1"], "");
        let s2 = decoder.calc_scores(&["f2"], "");
        let s12 = decoder.calc_scores(&["f1", "f2"], "");
        let sum: Vec<f64> = s1.iter().zip(&s2).map(|(a, b)| a + b).collect();
        assert_eq!(sum, s12);
    }

    #[test]
    fn test_calc_scores_duplicates() {
        let model = pos_neg_model();
        let decoder = Decoder::new(&model);
        assert_eq!(vec![2., 0.], decoder.calc_scores(&["bias", "bias"], ""));
    }

    #[test]
    fn test_calc_scores_transition() {
        let model = pos_neg_model();
        let decoder = Decoder::new(&model);
        assert_eq!(vec![1.0, 0.], decoder.calc_scores(&["bias"], ""));
        assert_eq!(vec![1.5, 0.], decoder.calc_scores(&["bias"], "POS"));
        assert_eq!(vec![1.0, 0.], decoder.calc_scores(&["bias"], "NEG"));
    }

    #[test]
    fn test_predict_and_margin_tie() {
        let model = load("@label\tA\n@label\tB\n@label\tC\n");
        let decoder = Decoder::new(&model);
        let p = decoder.predict_and_margin(&[5.0, 5.0, 2.0]).unwrap();
        assert_eq!("A", p.label);
        assert_eq!(0, p.label_id);
        assert_eq!(0.0, p.margin);
    }

    #[test]
    fn test_predict_and_margin_single_label() {
        let model = load("@label\tONLY\n");
        let decoder = Decoder::new(&model);
        let p = decoder.predict_and_margin(&[1.0]).unwrap();
        assert_eq!("ONLY", p.label);
        assert_eq!(0.0, p.margin);
    }

    #[test]
    fn test_predict_and_margin_negative_scores() {
        let model = load("@label\tA\n@label\tB\n");
        let decoder = Decoder::new(&model);
        let p = decoder.predict_and_margin(&[-2.0, -0.5]).unwrap();
        assert_eq!("B", p.label);
        assert_eq!(1.5, p.margin);
    }

    #[test]
    fn test_predict_and_margin_empty_model() {
        let model = Model::empty(0.);
        let decoder = Decoder::new(&model);
        assert_eq!(None, decoder.predict_and_margin(&[]));
        assert_eq!(None, decoder.predict(&["bias"], ""));
    }

    #[test]
    fn test_decode_feeds_prediction_forward() {
        let model = pos_neg_model();
        let decoder = Decoder::new(&model);
        let items = vec![token("POS", &["bias"]), token("POS", &["bias"])];
        let mut out = vec![];
        let stats = decoder.decode(items, &mut out, &mut io::sink()).unwrap();
        assert_eq!(
            "POS\tPOS\t1.000000\t\nPOS\tPOS\t1.500000\t\n",
            String::from_utf8(out).unwrap()
        );
        assert_eq!(
            DecodeStats {
                n_tokens: 2,
                n_correct: 2,
                n_sequences: 1
            },
            stats
        );
    }

    #[test]
    fn test_decode_feeds_predicted_not_gold() {
        let model = load(
            "@label\tA\n@label\tB\n\
             1\tx\tA\n\
             5\t$y[-1]=A\tB\n\
             5\t$y[-1]=B\tA\n",
        );
        let decoder = Decoder::new(&model).precision(1);
        let items = vec![token("B", &["x"]), token("B", &["x"])];
        let mut out = vec![];
        decoder.decode(items, &mut out, &mut io::sink()).unwrap();
        assert_eq!("B\tA\t1.0\t\nB\tB\t4.0\t\n", String::from_utf8(out).unwrap());
    }

    #[test]
    fn test_decode_resets_at_boundary() {
        let model = load(
            "@label\tA\n@label\tB\n\
             1\tx\tA\n\
             3\t$y[-1]=A\tB\n\
             2\t$y[-1]=\tA\n",
        );
        let decoder = Decoder::new(&model).precision(2);
        let items = vec![token("A", &["x"]), Ok(Item::Boundary), token("A", &["x"])];
        let mut out = vec![];
        let stats = decoder.decode(items, &mut out, &mut io::sink()).unwrap();
        assert_eq!(
            "A\tA\t3.00\t\n\nA\tA\t3.00\t\n",
            String::from_utf8(out).unwrap()
        );
        assert_eq!(2, stats.n_sequences);
        assert_eq!(1.0, stats.accuracy());
    }

    #[test]
    fn test_decode_annotation_passthrough() {
        let model = pos_neg_model();
        let decoder = Decoder::new(&model).precision(0);
        let items = vec![Ok(Item::Token(Token::new("NEG", vec!["bias"], "word")))];
        let mut out = vec![];
        let stats = decoder.decode(items, &mut out, &mut io::sink()).unwrap();
        assert_eq!("NEG\tPOS\t1\tword\n", String::from_utf8(out).unwrap());
        assert_eq!(0., stats.accuracy());
    }

    #[test]
    fn test_decode_empty_model() {
        let model = Model::empty(0.);
        let decoder = Decoder::new(&model);
        let items = TokenReader::new("A\tf\n".as_bytes());
        let mut out = vec![];
        decoder.decode(items, &mut out, &mut io::sink()).unwrap();
        assert_eq!("A\t\t0.000000\t\n", String::from_utf8(out).unwrap());
    }

    #[test]
    fn test_decode_explains_mispredictions() {
        let model = pos_neg_model();
        let decoder = Decoder::new(&model).explain(true).explain_size(1);
        let items = vec![token("POS", &["bias"]), token("NEG", &["bias", "w[0]=bad"])];
        let mut out = vec![];
        let mut diag = vec![];
        decoder.decode(items, &mut out, &mut diag).unwrap();
        let diag = String::from_utf8(diag).unwrap();
        assert!(diag.starts_with("context: [bad]\npredicted: POS\tgold: NEG\n"));
        assert!(diag.contains("score: POS\t1.5\n"));
        assert!(diag.contains("label: POS\n  top: bias(1)\n"));
        assert_eq!(1, diag.matches("context:").count());
    }

    #[test]
    fn test_decode_without_explain() {
        let model = pos_neg_model();
        let decoder = Decoder::new(&model);
        let items = vec![token("NEG", &["bias"])];
        let mut diag = vec![];
        decoder.decode(items, &mut io::sink(), &mut diag).unwrap();
        assert!(diag.is_empty());
    }

    #[test]
    fn test_expand_history() {
        let model = Model::empty(0.);
        let decoder = Decoder::new(&model).order(2);
        let history = vec!["A".to_string(), "B".to_string()];
        let features = ["w[0]=x", "y2=__$y[-2]|__$y[-1]", "y3=__$y[-3]"];
        assert_eq!(
            vec!["w[0]=x", "y2=A|B", "y3=__$y[-3]"],
            decoder.expand_history(&features, &history)
        );
        assert_eq!(
            vec!["w[0]=x", "y2=|", "y3=__$y[-3]"],
            decoder.expand_history(&features, &[])
        );
    }

    #[test]
    fn test_order_minimum() {
        let model = Model::empty(0.);
        let decoder = Decoder::new(&model).order(0);
        let history = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            vec!["B-__$y[-2]"],
            decoder.expand_history(&["__$y[-1]-__$y[-2]"], &history)
        );
    }

    #[test]
    fn test_decode_second_order() {
        // y2=A|B favours C; any other history favours A or B.
        let model = load(
            "@label\tA\n@label\tB\n@label\tC\n\
             1\t$y[-1]=\tA\n\
             1\t$y[-1]=A\tB\n\
             1\t$y[-1]=B\tA\n\
             3\ty2=A|B\tC\n",
        );
        let decoder = Decoder::new(&model).order(2).precision(0);
        let items = vec![
            token("A", &["y2=__$y[-2]|__$y[-1]"]),
            token("B", &["y2=__$y[-2]|__$y[-1]"]),
            token("C", &["y2=__$y[-2]|__$y[-1]"]),
            Ok(Item::Boundary),
            token("A", &["y2=__$y[-2]|__$y[-1]"]),
        ];
        let mut out = vec![];
        let stats = decoder.decode(items, &mut out, &mut io::sink()).unwrap();
        assert_eq!(
            "A\tA\t1\t\nB\tB\t1\t\nC\tC\t2\t\n\nA\tA\t1\t\n",
            String::from_utf8(out).unwrap()
        );
        assert_eq!(4, stats.n_correct);
    }

    #[test]
    fn test_decode_first_order_ignores_older_history() {
        let model = load(
            "@label\tA\n@label\tB\n@label\tC\n\
             1\t$y[-1]=\tA\n\
             1\t$y[-1]=A\tB\n\
             1\t$y[-1]=B\tA\n\
             3\ty2=A|B\tC\n",
        );
        let decoder = Decoder::new(&model).precision(0);
        let items = vec![
            token("A", &["y2=__$y[-2]|__$y[-1]"]),
            token("B", &["y2=__$y[-2]|__$y[-1]"]),
            token("C", &["y2=__$y[-2]|__$y[-1]"]),
        ];
        let mut out = vec![];
        decoder.decode(items, &mut out, &mut io::sink()).unwrap();
        assert_eq!(
            "A\tA\t1\t\nB\tB\t1\t\nC\tA\t1\t\n",
            String::from_utf8(out).unwrap()
        );
    }
}

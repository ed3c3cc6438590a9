//! # greedy_tagger
//!
//! Greedy first-order sequence labeling with a pre-trained linear multi-class model.
//!
//! Each token is scored by summing the per-label weights of its active features and of a
//! transition feature `$y[-1]=<label>` built from the label predicted for the previous
//! token. The best label wins, and the gap to the runner-up is reported as the margin.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{self, BufReader};
//!
//! use greedy_tagger::{Decoder, Model, ModelConfig, TokenReader};
//!
//! let model = Model::open("model.txt", &ModelConfig::default());
//! let decoder = Decoder::new(&model);
//!
//! let tokens = TokenReader::new(BufReader::new(File::open("test.txt").unwrap()));
//! let stats = decoder
//!     .decode(tokens, &mut io::stdout().lock(), &mut io::stderr().lock())
//!     .unwrap();
//! eprintln!("Accuracy: {}", stats.accuracy());
//! ```

mod corpus;
mod decoder;
pub mod errors;
mod explain;
mod model;
mod utils;

pub use corpus::{AnnotationReader, Corpus, Item, Token, TokenReader};
pub use decoder::{DecodeStats, Decoder, LineSink, Prediction, TRANSITION_PREFIX};
pub use explain::{Contribution, Explanation, LabelExplanation};
pub use model::{Model, ModelConfig, ModelFormat};
pub use utils::{top_two, TopTwo};

use std::fs::File;
use std::io::{self, prelude::*, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser};
use greedy_tagger::{
    AnnotationReader, Corpus, Decoder, Model, ModelConfig, ModelFormat, TokenReader,
};
use log::{info, warn};

const SAMPLE_MODEL: &str = "tests/train.sample";
const SAMPLE_TARGET: &str = "tests/test.base";

#[derive(Parser, Debug)]
#[command(
    name = "decode",
    about = "A program to label token sequences with a linear model.",
    after_help = "Without arguments, the sample model under tests/ is loaded and dumped."
)]
struct Args {
    /// The model file
    model: Option<PathBuf>,

    /// The feature file: a gold label and feature names per line, a blank line between sequences
    features: Option<PathBuf>,

    /// The annotation file: its second column is echoed in the output; the first line is a header
    annotations: Option<PathBuf>,

    /// Field order of weight lines: {classias, label-first}
    #[arg(long, default_value = "classias")]
    format: ModelFormat,

    /// Weight of label slots not assigned in the model file
    #[arg(long, default_value = "0")]
    default_weight: f64,

    /// Read a compiled model written by manipulate_model
    #[arg(long)]
    compiled: bool,

    /// Feature name appended to every token (e.g. __BIAS__)
    #[arg(long)]
    bias_feature: Option<String>,

    /// Print explanations of mispredicted tokens to stderr
    #[arg(long)]
    explain: bool,

    /// Number of top and bottom features reported per label
    #[arg(long, default_value = "10")]
    explain_size: usize,

    /// Number of previous predictions substituted for `__$y[-k]` placeholders in features
    #[arg(long, default_value = "1")]
    order: usize,

    /// Decimal places of margins
    #[arg(long, default_value = "6")]
    precision: usize,
}

fn load_model(path: &Path, args: &Args) -> Result<Model, Box<dyn std::error::Error>> {
    let config = ModelConfig {
        format: args.format,
        default_weight: args.default_weight,
    };
    if args.compiled {
        let mut f = zstd::Decoder::new(File::open(path)?)?;
        Ok(Model::read(&mut f)?)
    } else {
        Ok(Model::open(path, &config))
    }
}

fn open_or_empty(path: &Path) -> Box<dyn BufRead> {
    match File::open(path) {
        Ok(f) => Box::new(BufReader::new(f)),
        Err(e) => {
            warn!("{}: {}; treating it as empty", path.display(), e);
            Box::new(io::empty())
        }
    }
}

fn run_self_test(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let model = load_model(Path::new(SAMPLE_MODEL), args)?;
    let mut out = io::stdout().lock();
    writeln!(out, "target: {}", SAMPLE_TARGET)?;
    model.write_dump(&mut out)?;
    Ok(())
}

fn run_decode(
    model_path: &Path,
    features_path: &Path,
    annotations_path: &Path,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading model file...");
    let model = load_model(model_path, args)?;
    info!(
        "{} labels, {} features",
        model.n_labels(),
        model.n_features()
    );
    let decoder = Decoder::new(&model)
        .precision(args.precision)
        .explain(args.explain)
        .explain_size(args.explain_size)
        .order(args.order);

    let tokens =
        TokenReader::new(open_or_empty(features_path)).bias_feature(args.bias_feature.clone());
    let annotations = AnnotationReader::new(open_or_empty(annotations_path));
    let corpus = Corpus::new(tokens, Some(annotations));

    info!("Start decoding");
    let start = Instant::now();
    let mut out = io::BufWriter::new(io::stdout().lock());
    let mut diag = io::stderr().lock();
    let stats = decoder.decode(corpus, &mut out, &mut diag)?;
    out.flush()?;
    let duration = start.elapsed();

    info!("Elapsed: {} [sec]", duration.as_secs_f64());
    info!(
        "Tokens: {}, Sequences: {}, Accuracy: {}",
        stats.n_tokens,
        stats.n_sequences,
        stats.accuracy()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match (&args.model, &args.features, &args.annotations) {
        (None, None, None) => run_self_test(&args),
        (Some(model), Some(features), Some(annotations)) => {
            run_decode(model, features, annotations, &args)
        }
        _ => {
            eprintln!("{}", Args::command().render_usage());
            std::process::exit(1);
        }
    }
}

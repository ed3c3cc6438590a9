use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use greedy_tagger::{Model, ModelConfig, ModelFormat};
use log::info;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "manipulate_model",
    about = "A program to manipulate trained models."
)]
struct Args {
    /// Input path of the model file
    #[arg(long)]
    model_in: PathBuf,

    /// Field order of weight lines in a text model: {classias, label-first}
    #[arg(long, default_value = "classias")]
    format: ModelFormat,

    /// Weight of label slots not assigned in a text model
    #[arg(long, default_value = "0")]
    default_weight: f64,

    /// The input is a compiled model instead of a text model
    #[arg(long)]
    compiled_in: bool,

    /// Print labels and weight vectors to stdout
    #[arg(long)]
    dump: bool,

    /// Output every weight to a CSV file
    #[arg(long)]
    dump_weights: Option<PathBuf>,

    /// Output path of the compiled model file
    #[arg(long)]
    model_out: Option<PathBuf>,
}

#[derive(Serialize)]
struct WeightRecord<'a> {
    feature: &'a str,
    label: &'a str,
    weight: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Loading model file...");
    let model = if args.compiled_in {
        let mut f = zstd::Decoder::new(fs::File::open(&args.model_in)?)?;
        Model::read(&mut f)?
    } else {
        let config = ModelConfig {
            format: args.format,
            default_weight: args.default_weight,
        };
        Model::open(&args.model_in, &config)
    };
    info!(
        "{} labels, {} features",
        model.n_labels(),
        model.n_features()
    );

    if args.dump {
        let mut out = io::BufWriter::new(io::stdout().lock());
        model.write_dump(&mut out)?;
        out.flush()?;
    }

    if let Some(path) = args.dump_weights {
        info!("Saving weight file...");
        let file = fs::File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        let mut features: Vec<_> = model.features().collect();
        features.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        for (feature, ws) in features {
            for (label, &weight) in model.labels().iter().zip(ws) {
                wtr.serialize(WeightRecord {
                    feature,
                    label,
                    weight,
                })?;
            }
        }
        wtr.flush()?;
    }

    if let Some(path) = args.model_out {
        info!("Saving model file...");
        let mut f = zstd::Encoder::new(fs::File::create(path)?, 19)?;
        model.write(&mut f)?;
        f.finish()?;
    }

    Ok(())
}

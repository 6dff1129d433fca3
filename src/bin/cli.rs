//! f1predict CLI - Command-line interface for F1 race predictions

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use f1predict::context::{circuit_identifier, race_already_happened};
use f1predict::{
    Corpus, ForecastRequest, JsonSessionSource, PredictorConfig, RunContext, TrainOptions,
    TrainedModel,
};

/// Default session document directory (relative to the working directory)
const DEFAULT_SESSIONS_DIR: &str = "sessions";
const DEFAULT_MODEL_PATH: &str = "models/f1_model.json";

#[derive(Parser)]
#[command(name = "f1predict")]
#[command(author, version, about = "F1 race outcome prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the corpus CSV files (overrides the config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory of session JSON documents
    #[arg(long, default_value = DEFAULT_SESSIONS_DIR)]
    sessions_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or load) the historical corpus
    Build {
        /// Ignore cached corpus files and sweep again
        #[arg(long)]
        rebuild: bool,
    },

    /// Train a model and save it as JSON
    Train {
        /// Restrict training to circuits whose name contains this text
        #[arg(long)]
        circuit: Option<String>,

        /// Leave this season out of the race side
        #[arg(long)]
        exclude_year: Option<i32>,

        /// Output model path
        #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
        output: PathBuf,
    },

    /// Predict the finishing order of a race
    Predict {
        /// Season
        #[arg(short, long)]
        year: i32,

        /// Grand Prix name, e.g. "Monaco Grand Prix"
        #[arg(short, long)]
        grand_prix: String,

        /// The race has already run (current season only; past seasons always count)
        #[arg(long)]
        happened: bool,

        /// Reuse a saved model instead of training
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Directory for the prediction CSV
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("An error occurred: {:#}", e);
            for cause in e.chain().skip(1) {
                error!("  caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    println!("{}", "F1 Race Predictor".cyan().bold());
    println!();

    let mut config = match &cli.config {
        Some(path) => PredictorConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PredictorConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }

    let source = JsonSessionSource::new(&cli.sessions_dir);
    let ctx = RunContext::new(config, &source);

    if cli.interactive {
        return run_interactive(&ctx);
    }

    match cli.command {
        Some(Commands::Build { rebuild }) => {
            let corpus = build_corpus(&ctx, rebuild)?;
            println!(
                "{} {} race rows, {} qualifying rows",
                "Corpus ready:".green(),
                corpus.race_len(),
                corpus.quali_len()
            );
        }
        Some(Commands::Train {
            circuit,
            exclude_year,
            output,
        }) => {
            run_train(&ctx, circuit, exclude_year, &output)?;
        }
        Some(Commands::Predict {
            year,
            grand_prix,
            happened,
            model,
            output_dir,
        }) => {
            let happened = race_already_happened(year, current_year(), happened);
            let request = ForecastRequest {
                year,
                grand_prix,
                race_happened: happened,
                output_dir,
            };
            run_predict(&ctx, &request, model.as_deref())?;
        }
        None => {
            println!("Use --help for usage information or --interactive for interactive mode.");
        }
    }

    Ok(())
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// Load the cached corpus or sweep the session source behind a progress bar
fn build_corpus(ctx: &RunContext<'_>, rebuild: bool) -> Result<Corpus> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    pb.set_message("Collecting sessions...");

    let mut builder = ctx.corpus_builder().with_progress(|progress| {
        pb.set_length(progress.total as u64);
        pb.set_position(progress.done as u64);
        pb.set_message(format!("{} successful", progress.successful));
    });
    let result = if rebuild {
        builder.rebuild()
    } else {
        builder.build()
    };
    let corpus = result.context("Failed to build historical corpus")?;

    pb.finish_and_clear();
    Ok(corpus)
}

fn run_train(
    ctx: &RunContext<'_>,
    circuit: Option<String>,
    exclude_year: Option<i32>,
    output: &Path,
) -> Result<()> {
    let corpus = build_corpus(ctx, false)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid spinner template")?,
    );
    spinner.set_message("Training model...");

    let options = TrainOptions {
        circuit,
        exclude_year,
    };
    let trained = f1predict::train_model(
        corpus.race.as_deref(),
        corpus.quali.as_deref(),
        &options,
        ctx.config(),
    )
    .context("Failed to train model")?;
    spinner.finish_and_clear();

    trained
        .save(output)
        .with_context(|| format!("Failed to save model to {:?}", output))?;

    println!("{}", "Model trained".green().bold());
    println!("Training rows: {}", trained.train_rows);
    println!("Held-out rows: {}", trained.test_rows);
    if let Some(mae) = trained.mae {
        println!("Hold-out MAE:  {:.3}s", mae);
    }
    println!();
    println!("{}", "Feature importance:".yellow().bold());
    for (feature, importance) in trained.ranked_importances() {
        println!("  {:<20} {:>7.4}", feature, importance);
    }
    println!();
    println!("{} {:?}", "Saved to".green(), output);

    Ok(())
}

fn run_predict(ctx: &RunContext<'_>, request: &ForecastRequest, model: Option<&Path>) -> Result<()> {
    println!(
        "{}: {} {} (circuit filter: {})",
        "Predicting".green(),
        request.year,
        request.grand_prix,
        circuit_identifier(&request.grand_prix)
    );
    println!();

    let result = match model {
        Some(path) => {
            let trained = TrainedModel::load(path)
                .with_context(|| format!("Failed to load model from {:?}", path))?;
            info!("Loaded model with {} features", trained.feature_names.len());
            ctx.forecast_with_model(request, &trained)
        }
        None => {
            info!("Loading historical F1 data...");
            let corpus = build_corpus(ctx, false)?;
            ctx.forecast(request, &corpus)
        }
    };
    let forecast = result
        .with_context(|| format!("Failed to predict {} {}", request.year, request.grand_prix))?;

    println!();
    if let Some(accuracy) = forecast.accuracy {
        println!("{} {:.1}%", "Top 10 accuracy:".yellow(), accuracy);
    }
    println!("{} {:?}", "Prediction saved to".green(), forecast.output_path);

    Ok(())
}

fn run_interactive(ctx: &RunContext<'_>) -> Result<()> {
    println!("{}", "Interactive mode".green().bold());
    println!();

    let theme = ColorfulTheme::default();

    loop {
        let options = vec!["Predict a race", "Build corpus", "Quit"];

        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => {
                let year: i32 = Input::with_theme(&theme)
                    .with_prompt("Enter race year to predict")
                    .default(current_year())
                    .interact_text()?;

                let grand_prix: String = Input::with_theme(&theme)
                    .with_prompt("Enter Grand Prix name (e.g., 'Australian Grand Prix')")
                    .interact_text()?;

                let this_year = current_year();
                let confirmed = year == this_year
                    && Select::with_theme(&theme)
                        .with_prompt("Has this race already occurred?")
                        .items(&["No", "Yes"])
                        .default(0)
                        .interact()?
                        == 1;
                let happened = race_already_happened(year, this_year, confirmed);

                if happened {
                    let winner: String = Input::with_theme(&theme)
                        .with_prompt("Enter the actual winner (for validation)")
                        .allow_empty(true)
                        .interact_text()?;
                    if !winner.trim().is_empty() {
                        info!("Note: The actual winner of {} {} was {}", year, grand_prix, winner.trim());
                    }
                }

                let request = ForecastRequest {
                    year,
                    grand_prix,
                    race_happened: happened,
                    output_dir: PathBuf::from("."),
                };

                println!();
                if let Err(e) = run_predict(ctx, &request, None) {
                    error!("{:#}", e);
                }
                println!();
            }
            1 => {
                println!();
                let corpus = build_corpus(ctx, false)?;
                println!(
                    "{} {} race rows, {} qualifying rows",
                    "Corpus ready:".green(),
                    corpus.race_len(),
                    corpus.quali_len()
                );
                println!();
            }
            2 => {
                println!("Goodbye!");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

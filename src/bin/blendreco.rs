/**
 * BlendReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::env;
use std::process;

use getopts::{Matches, Options};
use tracing::{error, info};

use blendreco::io;
use blendreco::models::{self, ModelKind, Recommender};
use blendreco::{Config, EvaluationSplit, Result};

fn main() {

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("e", "events", "Interaction events (CSV with the columns timestamp, visitorid, \
        event and itemid). Required for 'train' and 'evaluate'.", "PATH");
    opts.optopt("p", "properties", "Item properties (CSV with the columns itemid, property and \
        value). Optional.", "PATH");
    opts.optopt("m", "models", "Trained models file, written by 'train' and read by 'recommend' \
        and 'similar'.", "PATH");
    opts.optopt("c", "config", "JSON file with configuration options (optional).", "PATH");
    opts.optopt("o", "output", "Output file for 'recommend' and 'similar' (stdout by default), \
        output directory for 'evaluate' (defaults to 'results').", "PATH");
    opts.optopt("u", "user", "User to recommend for.", "ID");
    opts.optopt("i", "item", "Item to find similar items for.", "ID");
    opts.optopt("", "model", "Model to recommend with: popularity, cf, content or hybrid \
        (defaults to hybrid).", "NAME");
    opts.optopt("a", "alpha", "Weight of the collaborative score in the blend, within [0, 1].", "NUMBER");
    opts.optopt("r", "rank", "Number of latent factors.", "NUMBER");
    opts.optopt("k", "top-k", "Number of items to return, also the K of the evaluation metrics.", "NUMBER");
    opts.optopt("t", "threads", "Number of worker threads (defaults to one per cpu).", "NUMBER");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let mode = match matches.free.first() {
        Some(mode) => mode.clone(),
        None => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify a mode: train, evaluate, recommend or similar."),
        ),
    };

    let config = match configure(&matches) {
        Ok(config) => config,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let result = match mode.as_str() {
        "train" => train(&matches, &config),
        "evaluate" => evaluate(&matches, &config),
        "recommend" => recommend(&matches, &config),
        "similar" => similar(&matches, &config),
        other => {
            let hint = format!("Unknown mode '{}'.", other);
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if let Err(failure) = result {
        error!("{}", failure);
        process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} (train|evaluate|recommend|similar) [options]", program);
    eprint!("{}", opts.usage(&brief));
    process::exit(if hint.is_some() { 2 } else { 0 });
}

/// Defaults, overridden by the config file, overridden by command line flags.
fn configure(matches: &Matches) -> Result<Config> {

    let mut config = match matches.opt_str("c") {
        Some(path) => Config::from_json_file(&path)?,
        None => Config::default(),
    };

    if let Some(alpha) = numeric_option(matches, "a", "blend_alpha")? {
        config.blend_alpha = alpha;
    }
    if let Some(rank) = numeric_option(matches, "r", "cf_rank")? {
        config.cf_rank = rank;
    }
    if let Some(top_k) = numeric_option(matches, "k", "default_top_k")? {
        config.default_top_k = top_k;
    }
    if let Some(threads) = numeric_option(matches, "t", "num_threads")? {
        config.num_threads = threads;
    }

    config.validate()?;
    Ok(config)
}

fn numeric_option<T: std::str::FromStr>(
    matches: &Matches,
    name: &str,
    option: &'static str,
) -> Result<Option<T>> {
    matches.opt_get::<T>(name)
        .map_err(|_| blendreco::RecoError::config(option, "is not a valid number"))
}

fn required(matches: &Matches, name: &str, what: &str) -> Result<String> {
    matches.opt_str(name)
        .ok_or_else(|| blendreco::RecoError::data(None, format!("please specify {} via --{}", what, name)))
}

fn read_properties(matches: &Matches) -> Result<Vec<blendreco::ItemProperty>> {
    match matches.opt_str("p") {
        Some(path) => io::read_properties(&path),
        None => Ok(Vec::new()),
    }
}

fn train(matches: &Matches, config: &Config) -> Result<()> {

    let events = io::read_events(required(matches, "events", "the events file")?)?;
    let properties = read_properties(matches)?;
    let models_path = required(matches, "models", "where to store the models")?;

    let trained = models::train_from_events(&events, &properties, config)?;
    io::save_models(&trained, &models_path)?;

    Ok(())
}

fn evaluate(matches: &Matches, config: &Config) -> Result<()> {

    let events = io::read_events(required(matches, "events", "the events file")?)?;
    let properties = read_properties(matches)?;
    let output_dir = matches.opt_str("o").unwrap_or_else(|| "results".to_string());

    let split = EvaluationSplit::from_config(&events, config)?;
    let table = models::evaluate_all(&split, &properties, config, config.default_top_k)?;

    io::write_metrics(&table, &output_dir)?;

    for (model, metrics) in table.results.iter() {
        let summary: Vec<String> = metrics.iter()
            .map(|(metric, value)| format!("{} = {:.4}", metric, value))
            .collect();
        info!("{:>10}: {}", model, summary.join(", "));
    }

    Ok(())
}

fn recommend(matches: &Matches, config: &Config) -> Result<()> {

    let trained = io::load_models(required(matches, "models", "the models file")?)?;
    let user_id = required(matches, "user", "a user")?;
    let kind: ModelKind = matches.opt_str("model").unwrap_or_else(|| "hybrid".to_string()).parse()?;

    let model = trained.model(kind).with_alpha(config.blend_alpha)?;
    let recommendations = model.recommend(&user_id, config.default_top_k)?;

    io::write_json_lines(&recommendations, matches.opt_str("o").as_ref().map(|path| path.as_str()))
}

fn similar(matches: &Matches, config: &Config) -> Result<()> {

    let trained = io::load_models(required(matches, "models", "the models file")?)?;
    let item_id = required(matches, "item", "an item")?;

    let similar_items = trained.similar_items(&item_id, config.default_top_k)?;

    io::write_json_lines(&similar_items, matches.opt_str("o").as_ref().map(|path| path.as_str()))
}

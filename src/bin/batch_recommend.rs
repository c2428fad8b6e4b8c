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

use getopts::Options;
use tracing::{error, info};

use blendreco::io;
use blendreco::models::ModelKind;
use blendreco::recommend;
use blendreco::Result;

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
    opts.optopt("m", "models", "Trained models file (required).", "PATH");
    opts.optopt("o", "outputfile", "Output file name (optional, output will be written to stdout \
        by default).", "PATH");
    opts.optopt("", "model", "Model to recommend with: popularity, cf, content or hybrid \
        (defaults to hybrid).", "NAME");
    opts.optopt("n", "num-items", "Number of items to recommend per user (optional, defaults to \
        the configured default_top_k).", "NUMBER");
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

    let models_path = match matches.opt_str("m") {
        Some(path) => path,
        None => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify a models file via --models."),
        ),
    };

    let kind: ModelKind = match matches.opt_str("model").unwrap_or_else(|| "hybrid".to_string()).parse() {
        Ok(kind) => kind,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let num_items: Option<usize> = match matches.opt_get("n") {
        Ok(num_items) => num_items,
        Err(failure) => {
            let hint = format!("Problem with option 'n': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let num_threads: Option<usize> = match matches.opt_get("t") {
        Ok(num_threads) => num_threads,
        Err(failure) => {
            let hint = format!("Problem with option 't': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let outputfile = matches.opt_str("o");

    if let Err(failure) = recommend_for_all_users(&models_path, kind, num_items, num_threads, outputfile) {
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

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));
    process::exit(if hint.is_some() { 2 } else { 0 });
}

fn recommend_for_all_users(
    models_path: &str,
    kind: ModelKind,
    num_items: Option<usize>,
    num_threads: Option<usize>,
    outputfile: Option<String>,
) -> Result<()> {

    let trained = io::load_models(models_path)?;

    let num_items = num_items.unwrap_or(trained.config().default_top_k);
    let pool_size = match num_threads {
        Some(num_threads) if num_threads > 0 => num_threads,
        _ => trained.config().worker_threads(),
    };

    let user_ids = trained.dictionary().user_names();
    info!("Recommending {} items to {} users with the {} model.", num_items, user_ids.len(), kind);

    let model = trained.model(kind);
    let recommendations = recommend::recommend_all(&model, user_ids, num_items, pool_size)?;

    io::write_json_lines(&recommendations, outputfile.as_ref().map(|path| path.as_str()))
}

mod correct;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use log::Level;
use simple_logger::init_with_level;

pub mod consts {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const BIN_NAME: &str = "debias";
}

fn build_parser() -> Command {
    Command::new(consts::BIN_NAME)
        .bin_name(consts::BIN_NAME)
        .version(consts::VERSION)
        .author("Databio")
        .about("Read-count bias correction of genomic signal tracks against precomputed covariates.")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log debug messages"),
        )
        .subcommand(correct::cli::create_correct_cli())
}

fn main() -> Result<()> {
    let app = build_parser();
    let matches = app.get_matches();

    let level = if matches.get_flag("verbose") {
        Level::Debug
    } else {
        Level::Info
    };
    init_with_level(level)?;

    match matches.subcommand() {
        //
        // CORRECT
        //
        Some((correct::cli::CORRECT_CMD, matches)) => {
            correct::handlers::run_correct(matches)?;
        }

        _ => unreachable!("Subcommand not found"),
    };

    Ok(())
}

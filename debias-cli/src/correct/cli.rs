use clap::{Arg, ArgAction, Command, arg, value_parser};

pub const CORRECT_CMD: &str = "correct";

pub fn create_correct_cli() -> Command {
    Command::new(CORRECT_CMD)
        .author("Databio")
        .about("Correct sequencing bias in read-count bigWig tracks using precomputed covariates.")
        .arg(
            arg!(-c --config <config> "YAML or TOML config file; other options override its values")
                .required(false),
        )
        .arg(
            Arg::new("ctrl")
                .long("ctrl")
                .short('r')
                .num_args(1..)
                .help("Control bigWig files; the first one is the reference track"),
        )
        .arg(
            Arg::new("exp")
                .long("exp")
                .short('e')
                .num_args(1..)
                .help("Experimental bigWig files"),
        )
        .arg(arg!(-l --regions <regions> "BED file of analysis regions").required(false))
        .arg(arg!(--blacklist <blacklist> "BED file of regions to exclude").required(false))
        .arg(
            arg!(--covariates <covariates> "Directory of per-chromosome covariate .npy files")
                .required(false),
        )
        .arg(
            Arg::new("bias")
                .long("bias")
                .short('b')
                .num_args(1..)
                .help("Bias types to correct: shear, pcr, map, gquad"),
        )
        .arg(
            Arg::new("frag-len")
                .long("frag-len")
                .value_parser(value_parser!(u32))
                .help("Fragment length; parsed from the covariate directory name if absent"),
        )
        .arg(arg!(-o --output <output> "Output directory").required(false))
        .arg(
            arg!(-p --workers <workers> "Number of worker threads")
                .value_parser(value_parser!(usize))
                .required(false),
        )
        .arg(
            Arg::new("min-frag-filter")
                .long("min-frag-filter")
                .value_parser(value_parser!(f64))
                .help("Minimum summed read count of a corrected position; defaults to the track count"),
        )
        .arg(
            arg!(--seed <seed> "Seed for training set sampling")
                .value_parser(value_parser!(u64))
                .required(false),
        )
        .arg(
            Arg::new("no-normalize")
                .long("no-normalize")
                .action(ArgAction::SetTrue)
                .help("Do not scale tracks against the reference track"),
        )
        .arg(
            Arg::new("generate-normalized")
                .long("generate-normalized")
                .action(ArgAction::SetTrue)
                .help("Also write normalized, uncorrected tracks"),
        )
}

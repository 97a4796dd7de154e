mod render;

use anyhow::{bail, Context, Result};
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use solver_search::{build_sections, optimize, swap_search, OptimizeConfig, SwapConfig};
use std::path::PathBuf;
use std::time::Duration;
use timetable_core::{parse_file, read_schedule_file, score};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use types::{InputModel, Placement};

fn prefix_arg() -> clap::Arg {
    arg!(--prefix [NAME] "file name prefix (.txt and .json suffixes will be added)")
        .default_value("schedule")
}

fn workers_arg() -> clap::Arg {
    arg!(--workers [N] "number of concurrent workers (default: CPU count)")
        .value_parser(value_parser!(usize))
}

fn cli() -> Command {
    Command::new("timetable")
        .about("Course schedule generator and optimizer")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("gen")
                .about("generate and optimize a schedule")
                .arg(workers_arg())
                .arg(prefix_arg())
                .arg(
                    arg!(-p --pin [PERCENT] "the mean percentage that a prior placement will be kept")
                        .value_parser(value_parser!(f64))
                        .default_value("95"),
                )
                .arg(
                    arg!(-d --pindev [PERCENT] "the stddev for how much to vary the pin between attempts")
                        .value_parser(value_parser!(f64))
                        .default_value("5"),
                )
                .arg(
                    arg!(-t --time [SECONDS] "total time to spend searching")
                        .value_parser(value_parser!(u64))
                        .default_value("600"),
                )
                .arg(
                    arg!(-w --warmup [SECONDS] "time to spend finding a starting schedule before refining it")
                        .value_parser(value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(-l --restartlocal [SECONDS] "restart after this long since finding a local best score")
                        .value_parser(value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(-g --restartglobal [SECONDS] "restart after this long since finding the global best score")
                        .value_parser(value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    arg!(--weightedwarmup "bias course placement toward low-badness slots during warmup")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--weightedoptimization "bias course placement toward low-badness slots during optimization")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--seed [SEED] "seed for the random number generators")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("swap")
                .about("optimize a schedule by swapping courses")
                .arg(workers_arg())
                .arg(prefix_arg())
                .arg(
                    arg!(-m --max [N] "maximum number of swaps to attempt")
                        .value_parser(value_parser!(usize))
                        .default_value("4"),
                )
                .arg(
                    arg!(-r --restart "restart after finding a successful swap")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("score")
                .about("score and display the current schedule")
                .arg(prefix_arg()),
        )
        .subcommand(
            Command::new("bycourse")
                .about("print a schedule ordered by course")
                .arg(prefix_arg()),
        )
        .subcommand(
            Command::new("byinstructor")
                .about("print a schedule ordered by instructor")
                .arg(prefix_arg()),
        )
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("gen", sub)) => command_gen(sub),
        Some(("swap", sub)) => command_swap(sub),
        Some(("score", sub)) => command_score(sub),
        Some(("bycourse", sub)) => command_by_course(sub),
        Some(("byinstructor", sub)) => command_by_instructor(sub),
        _ => unreachable!(),
    }
}

fn load_model(prefix: &str) -> Result<InputModel> {
    let path = PathBuf::from(format!("{prefix}.txt"));
    info!(path = %path.display(), "reading input file");
    Ok(parse_file(&path)?)
}

fn load_schedule(model: &InputModel, prefix: &str) -> Result<Vec<Placement>> {
    let path = PathBuf::from(format!("{prefix}.json"));
    read_schedule_file(model, &path)
        .with_context(|| format!("the list of course placements must be in {prefix}.json"))
}

fn seconds(args: &ArgMatches, name: &str) -> Duration {
    Duration::from_secs(*args.get_one::<u64>(name).unwrap())
}

fn command_gen(args: &ArgMatches) -> Result<()> {
    let workers = args
        .get_one::<usize>("workers")
        .copied()
        .unwrap_or_else(num_cpus::get);
    let prefix = args.get_one::<String>("prefix").unwrap();
    let pin = *args.get_one::<f64>("pin").unwrap();
    let pin_dev = *args.get_one::<f64>("pindev").unwrap();
    let duration = seconds(args, "time");
    let warmup = seconds(args, "warmup");
    let restart_local = seconds(args, "restartlocal");
    let restart_global = seconds(args, "restartglobal");

    if workers < 1 {
        bail!("workers must be >= 1");
    }
    if !(0.0..=100.0).contains(&pin) {
        bail!("pin must be between 0 and 100");
    }
    if pin_dev < 0.0 {
        bail!("pindev must be >= 0");
    }
    for (name, value) in [
        ("time", duration),
        ("warmup", warmup),
        ("restartlocal", restart_local),
        ("restartglobal", restart_global),
    ] {
        if value.is_zero() {
            bail!("{name} must be > 0");
        }
    }

    let model = load_model(prefix)?;
    let sections = build_sections(&model)?;

    let config = OptimizeConfig {
        workers,
        pin,
        pin_dev,
        duration,
        warmup,
        restart_local,
        restart_global,
        weighted_warmup: args.get_flag("weightedwarmup"),
        weighted_optimization: args.get_flag("weightedoptimization"),
        seed: args
            .get_one::<u64>("seed")
            .copied()
            .unwrap_or_else(rand::random),
        save_path: Some(PathBuf::from(format!("{prefix}.json"))),
    };
    let (best, _stats) = optimize(&model, &sections, &config)?;
    render::print_schedule(&model, &best);
    Ok(())
}

fn command_swap(args: &ArgMatches) -> Result<()> {
    let workers = args
        .get_one::<usize>("workers")
        .copied()
        .unwrap_or_else(num_cpus::get);
    let max_depth = *args.get_one::<usize>("max").unwrap();
    let prefix = args.get_one::<String>("prefix").unwrap();

    if workers < 1 {
        bail!("workers must be >= 1");
    }
    if max_depth < 1 {
        bail!("max must be >= 1");
    }

    let model = load_model(prefix)?;
    let sections = build_sections(&model)?;
    let placements = load_schedule(&model, prefix)?;
    let baseline = score(&model, &placements);

    let config = SwapConfig {
        workers,
        max_depth,
        restart: args.get_flag("restart"),
        save_path: Some(PathBuf::from(format!("{prefix}.json"))),
    };
    let best = swap_search(&model, &sections, &baseline, &config)?;
    render::print_schedule(&model, &best);
    Ok(())
}

fn command_score(args: &ArgMatches) -> Result<()> {
    let prefix = args.get_one::<String>("prefix").unwrap();
    let model = load_model(prefix)?;
    let placements = load_schedule(&model, prefix)?;
    let schedule = score(&model, &placements);
    render::print_schedule(&model, &schedule);
    Ok(())
}

fn command_by_course(args: &ArgMatches) -> Result<()> {
    let prefix = args.get_one::<String>("prefix").unwrap();
    let model = load_model(prefix)?;
    let placements = load_schedule(&model, prefix)?;
    render::print_by_course(&model, &placements);
    Ok(())
}

fn command_by_instructor(args: &ArgMatches) -> Result<()> {
    let prefix = args.get_one::<String>("prefix").unwrap();
    let model = load_model(prefix)?;
    let placements = load_schedule(&model, prefix)?;
    render::print_by_instructor(&model, &placements);
    Ok(())
}

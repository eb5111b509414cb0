use std::time::Duration;

use lstar::prelude::*;
use owo_colors::OwoColorize;
use tracing::{debug, trace};
use tracing_subscriber::{filter, prelude::*};

use clap::{Arg, ArgAction, ArgMatches, Command};

fn cli() -> clap::Command {
    Command::new("lstar")
        .about("Learns regular languages from a black box with Angluin's L* algorithm")
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(["info", "debug", "trace"])
                .default_missing_value("info"),
        )
        .arg(
            Arg::new("target")
                .required(true)
                .value_parser(["even-a", "ends-in-ab", "no-aaa", "protocol"])
                .help("the language that is learned"),
        )
        .arg(
            Arg::new("strategy")
                .long("strategy")
                .value_parser(["prefixes", "rivest-schapire"])
                .help("how counterexamples are processed"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_parser(clap::value_parser!(usize))
                .help("number of threads answering membership queries"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout-ms")
                .value_parser(clap::value_parser!(u64))
                .help("timeout for a single oracle call in milliseconds, 0 disables it"),
        )
        .arg(
            Arg::new("depth")
                .long("depth")
                .value_parser(clap::value_parser!(usize))
                .default_value("8")
                .help("length up to which equivalence queries compare words"),
        )
        .arg(
            Arg::new("snapshots")
                .long("snapshots")
                .action(ArgAction::SetTrue)
                .help("print the observation table of every round"),
        )
}

fn setup_logging(matches: &ArgMatches) {
    let level = match matches
        .try_get_one::<String>("verbosity")
        .ok()
        .flatten()
        .map(|m| m.as_str())
    {
        Some("trace") => filter::LevelFilter::TRACE,
        Some("debug") => filter::LevelFilter::DEBUG,
        Some("info") => filter::LevelFilter::INFO,
        _ => filter::LevelFilter::WARN,
    };

    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();

    trace!("setup {level} logging");
}

fn config(matches: &ArgMatches) -> Result<LStarConfig, String> {
    let mut config = LStarConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(strategy) = matches.get_one::<String>("strategy") {
        let strategy: CounterexampleStrategy = strategy.parse().map_err(|e| format!("{e}"))?;
        config = config.with_strategy(strategy);
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        if *workers == 0 {
            return Err("at least one worker is needed".to_string());
        }
        config = config.with_workers(*workers);
    }
    if let Some(millis) = matches.get_one::<u64>("timeout") {
        config = config.with_oracle_timeout((*millis > 0).then(|| Duration::from_millis(*millis)));
    }
    if matches.get_flag("snapshots") {
        config = config.with_snapshots(true);
    }
    Ok(config)
}

fn count_a(word: &[char]) -> usize {
    word.iter().filter(|c| **c == 'a').count()
}

/// The session protocol: HELLO opens, AUTH authenticates, DATA may be sent while authenticated
/// and CLOSE returns to the start. Every other action breaks the session.
fn protocol(word: &[String]) -> bool {
    let mut state = "INIT";
    for action in word {
        state = match (state, action.as_str()) {
            ("INIT", "HELLO") => "READY",
            ("READY", "AUTH") | ("AUTHENTICATED", "DATA") => "AUTHENTICATED",
            ("AUTHENTICATED", "CLOSE") => "INIT",
            _ => return false,
        };
    }
    true
}

fn learn<S, M>(alphabet: Alphabet<S>, membership: M, depth: usize, config: LStarConfig) -> bool
where
    S: Symbol,
    M: MembershipOracle<S> + Clone + Send + Sync + 'static,
{
    debug!("learning over alphabet {alphabet} with {config:?}");
    let equivalence = BoundedEquivalence::new(membership.clone(), depth);
    let mut learner = LStar::with_config(alphabet, membership, equivalence, config);
    let outcome = learner.infer();

    for snapshot in learner.snapshots() {
        println!("{}", format!("round {}", snapshot.round).bold());
        println!("{}", snapshot.table);
        println!("{}", snapshot.hypothesis);
    }

    let stats = learner.statistics();
    match outcome {
        Ok(dfa) => {
            println!("{} minimal DFA with {} states", "learned".green(), dfa.size());
            println!("{dfa}");
            println!(
                "{} rounds, {} membership queries, {} equivalence queries in {}ms",
                stats.rounds,
                stats.membership_queries,
                stats.equivalence_queries,
                stats.elapsed.as_millis()
            );
            true
        }
        Err(error) => {
            eprintln!("{} {error}", "failed:".red());
            false
        }
    }
}

pub fn main() {
    let matches = cli().get_matches();

    setup_logging(&matches);

    let config = match config(&matches) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{} {message}", "invalid configuration:".red());
            std::process::exit(2);
        }
    };
    let depth = matches.get_one::<usize>("depth").copied().unwrap_or(8);

    let binary = CharAlphabet::of_size(2);
    let learned = match matches.get_one::<String>("target").map(String::as_str) {
        Some("even-a") => {
            let even_a = FnMembership(|w: &[char]| count_a(w) % 2 == 0);
            learn(binary, even_a, depth, config)
        }
        Some("ends-in-ab") => {
            let ends_in_ab = FnMembership(|w: &[char]| w.ends_with(&['a', 'b']));
            learn(binary, ends_in_ab, depth, config)
        }
        Some("no-aaa") => {
            let no_aaa =
                FnMembership(|w: &[char]| !w.windows(3).any(|s| s.iter().all(|c| *c == 'a')));
            learn(binary, no_aaa, depth, config)
        }
        Some("protocol") => {
            let alphabet = TokenAlphabet::from_tokens(["HELLO", "AUTH", "DATA", "CLOSE"]);
            learn(alphabet, FnMembership(protocol), depth, config)
        }
        _ => unreachable!(),
    };

    if !learned {
        std::process::exit(1);
    }
}

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use station_flow::catalog::probe_duration;
use station_flow::condition::second_of_day;
use station_flow::config::Config;
use station_flow::error::Result;
use station_flow::program::{DayWindow, Program, load_catalog, local_now};
use station_flow::station::StationDef;
use station_flow::timeline::{AudioComponent, clock};
use std::path::{Path, PathBuf};

/// Declared and probed durations may differ by this much.
const DURATION_TOLERANCE_SECS: f64 = 0.5;

#[derive(Parser)]
#[command(name = "stationflow", about = "Procedural radio scheduler CLI")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a station: rule graph, transitions and conditions
    Check {
        station: PathBuf,
        /// Common file groups of the station's series
        #[arg(long)]
        common: Option<PathBuf>,
    },
    /// Print the playlist of a day
    Build {
        station: PathBuf,
        #[arg(long)]
        common: Option<PathBuf>,
        /// Day to build, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Hours of program to build
        #[arg(long, default_value_t = 24.0)]
        hours: f64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print a composition window
    Compose {
        station: PathBuf,
        #[arg(long)]
        common: Option<PathBuf>,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Window start, HH:MM[:SS] local time
        #[arg(long, value_parser = second_of_day)]
        from: u32,
        /// Window length in minutes
        #[arg(long, default_value_t = 60.0)]
        minutes: f64,
        #[arg(long)]
        json: bool,
    },
    /// Compare declared durations with the media files on disk
    Inspect {
        station: PathBuf,
        #[arg(long)]
        common: Option<PathBuf>,
    },
    /// Scheduler configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show current configuration
    Show,
    /// Write the current configuration (defaults for missing fields)
    Init,
    /// Set the station's offset from UTC in hours
    Offset { hours: f64 },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path);

    match cli.command {
        Commands::Check { station, common } => {
            let program = Program::load(&station, common.as_deref(), config)?;
            let graph = program.graph();
            println!(
                "Station '{}': {} fragment(s), {} source(s), first '{}'",
                program.tag(),
                graph.fragments().len(),
                graph.sources().len(),
                graph.first_fragment()
            );

            let mut warnings = 0;
            for fragment in graph.fragments() {
                let next: Vec<String> = fragment
                    .transitions
                    .iter()
                    .map(|t| format!("{} ({:.2})", t.fragment, t.weight()))
                    .collect();
                println!(
                    "  {:<16} {:<32} -> {}",
                    truncate(&fragment.tag, 16),
                    graph.sources()[fragment.source].describe(),
                    next.join(", ")
                );
                let Some(mixin) = &fragment.mixin else {
                    continue;
                };
                for rule in &mixin.rules {
                    for problem in rule.condition.problems() {
                        println!("  warning: {}/{}: {}", fragment.tag, rule.tag, problem);
                        warnings += 1;
                    }
                }
            }

            graph.check_exhaustive()?;
            println!("OK ({} warning(s))", warnings);
        }

        Commands::Build {
            station,
            common,
            date,
            hours,
            json,
        } => {
            let program = Program::load(&station, common.as_deref(), config)?;
            let day = date.unwrap_or_else(|| local_now(program.config().utc_offset_secs).date());
            let sequence = program.build_playlist(day, hours * 3600.0)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sequence)?);
            } else {
                print_sequence(program.tag(), day, &sequence);
            }
        }

        Commands::Compose {
            station,
            common,
            date,
            from,
            minutes,
            json,
        } => {
            let program = Program::load(&station, common.as_deref(), config)?;
            let day = date.unwrap_or_else(|| local_now(program.config().utc_offset_secs).date());
            let from = f64::from(from);
            let window = program.compose_window(day, from, from + minutes * 60.0)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&window)?);
            } else {
                print_window(program.tag(), from, &window);
            }
        }

        Commands::Inspect { station, common } => {
            let def = StationDef::load(&station)?;
            let catalog = load_catalog(&def, &station, common.as_deref())?;
            let files = catalog.all_files();
            let mut mismatches = 0;
            for file in &files {
                match probe_duration(&file.path) {
                    Ok(actual) => {
                        let actual = actual.as_secs_f64();
                        if (actual - file.duration).abs() > DURATION_TOLERANCE_SECS {
                            mismatches += 1;
                            println!(
                                "  {:<24} declared {:>9.2}s, file {:>9.2}s",
                                truncate(&file.label(), 24),
                                file.duration,
                                actual
                            );
                        }
                    }
                    Err(e) => {
                        mismatches += 1;
                        println!("  {:<24} {}", truncate(&file.label(), 24), e);
                    }
                }
            }
            println!("{} file(s) checked, {} problem(s)", files.len(), mismatches);
        }

        Commands::Config { action } => match action {
            ConfigCmd::Show => {
                println!("Config file: {}", config_path.display());
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCmd::Init => {
                config.save(&config_path)?;
                println!("Config written to {}", config_path.display());
            }
            ConfigCmd::Offset { hours } => {
                let config = Config {
                    utc_offset_secs: (hours * 3600.0).round() as i32,
                    ..config
                };
                config.save(&config_path)?;
                println!("UTC offset set to {}s", config.utc_offset_secs);
            }
        },
    }
    Ok(())
}

fn print_sequence(station: &str, day: NaiveDate, sequence: &[AudioComponent]) {
    println!("Station '{}' on {} ({} item(s)):", station, day, sequence.len());
    for (i, component) in sequence.iter().enumerate() {
        println!(
            "  {:>4}. {} {:>9.2}s  {}",
            i + 1,
            clock(component.playing.start),
            component.playing.duration,
            file_name(&component.path)
        );
        for mix in &component.mixes {
            println!(
                "        + {} {:>9.2}s  {}",
                clock(mix.playing.start),
                mix.playing.duration,
                file_name(&mix.path)
            );
        }
    }
}

fn print_window(station: &str, from: f64, result: &DayWindow) {
    let window = &result.window;
    let composition = &window.composition;
    println!(
        "Station '{}' from {} on {} ({:.2}s, depleted: {})",
        station,
        clock(from),
        result.first_day,
        composition.duration(),
        window.depleted
    );
    println!("Main:");
    for segment in &composition.main {
        println!(
            "  @{} {}  [{}]",
            clock(segment.at),
            file_name(&segment.path),
            segment.source.display()
        );
    }
    println!("Mix:");
    for segment in &composition.mix {
        println!(
            "  @{} {}  [{}]",
            clock(segment.at),
            file_name(&segment.path),
            segment.source.display()
        );
    }
    println!("Ramps:");
    for ramp in &composition.ramps {
        println!(
            "  {} {:.2} -> {:.2}",
            ramp.range.display(),
            ramp.from_volume,
            ramp.to_volume
        );
    }
    if let Some(last) = window.last_range {
        println!("Last item: {} of {}", last.display(), result.last_day);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}

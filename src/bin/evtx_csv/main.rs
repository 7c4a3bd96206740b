use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command, value_parser};
use indoc::indoc;
use log::{LevelFilter, debug, info};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::exit;

use evtx_csv::evtx_filter::{BOUNDARY_FORMAT, parse_boundary, parse_id_list};
use evtx_csv::{FileProcessor, FilterConfig, Run, TimestampFormat};

mod discover;
mod output;

struct EvtxCsv {
    paths: Vec<PathBuf>,
    destination: PathBuf,
    filter: FilterConfig,
    timestamp_format: TimestampFormat,
    show_metrics: bool,
}

impl EvtxCsv {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let paths = if let Some(file) = matches.get_one::<PathBuf>("file") {
            vec![file.clone()]
        } else if let Some(dir) = matches.get_one::<PathBuf>("directory") {
            info!("Looking for event log files in '{}'", dir.display());
            let paths = discover::collect_evtx_paths(dir)?;
            info!("Found {} file(s)", paths.len());
            paths
        } else {
            bail!("One of `-f` or `-d` is required");
        };

        let csv_dir = matches
            .get_one::<PathBuf>("csv")
            .context("`--csv` is required")?;
        let destination = output::resolve(csv_dir, matches.get_one::<String>("csv-file-name"))?;

        let include_ids = matches
            .get_one::<String>("include")
            .map(|v| parse_id_list(v))
            .unwrap_or_default();
        let exclude_ids = matches
            .get_one::<String>("exclude")
            .map(|v| parse_id_list(v))
            .unwrap_or_default();
        let from = matches
            .get_one::<String>("from")
            .map(|v| parse_boundary(v))
            .transpose()?;
        let to = matches
            .get_one::<String>("to")
            .map(|v| parse_boundary(v))
            .transpose()?;

        let filter = FilterConfig::new(include_ids, exclude_ids, from, to)?;

        let timestamp_format = match matches.get_one::<String>("datetime-format") {
            Some(pattern) => TimestampFormat::new(pattern)?,
            None => TimestampFormat::default(),
        };

        output::prepare(&destination, !matches.get_flag("no-confirm-overwrite"))?;

        Ok(EvtxCsv {
            paths,
            destination,
            filter,
            timestamp_format,
            show_metrics: matches.get_one::<bool>("metrics").copied().unwrap_or(true),
        })
    }

    /// Main entry point for `EvtxCsv`
    pub fn run(self) -> Result<()> {
        info!("CSV output will be saved to '{}'", self.destination.display());
        debug!("Timestamp format: '{}'", self.timestamp_format.pattern());

        let run = Run::new(FileProcessor::new(self.filter)).show_metrics(self.show_metrics);
        run.execute_to_path(&self.paths, &self.destination, self.timestamp_format)
            .with_context(|| format!("Failed writing `{}`", self.destination.display()))?;

        Ok(())
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();

    if let Err(e) = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn command() -> Command {
    Command::new("evtx_csv")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Filter and export EVTX records to CSV")
        .long_about(indoc!(r#"
            Filter and export Windows XML Event Log (EVTX) records to CSV.

            Each record becomes one row: TimeCreated, EventId, Provider, Channel, Computer,
            Payload and SourceFile. The payload (EventData / UserData) is flattened into
            `key: value` pairs.

            Files which are in use by another process can only be read with administrator
            privileges.
        "#))
        .arg(
            Arg::new("file")
                .short('f')
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("File to process."),
        )
        .arg(
            Arg::new("directory")
                .short('d')
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory to process, looking for files ending in .evtx recursively."),
        )
        .group(
            ArgGroup::new("input")
                .args(["file", "directory"])
                .required(true)
                .multiple(false),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .required(true)
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory to save CSV formatted results to. Will be created if it does not exist."),
        )
        .arg(
            Arg::new("csv-file-name")
                .long("csvf")
                .value_name("NAME")
                .help("File name to save CSV formatted results to. Defaults to <timestamp>-evtx-csv.csv"),
        )
        .arg(
            Arg::new("datetime-format")
                .long("dt")
                .value_name("PATTERN")
                .help("The custom date/time format to use when displaying time stamps (default: yyyy-MM-dd HH:mm:ss.fffffff)."),
        )
        .arg(
            Arg::new("include")
                .long("inc")
                .value_name("IDS")
                .help("List of event IDs to process, comma separated. All others are ignored. Overrides `--exc`."),
        )
        .arg(
            Arg::new("exclude")
                .long("exc")
                .value_name("IDS")
                .help("List of event IDs to IGNORE, comma separated. All others are included."),
        )
        .arg(
            Arg::new("from")
                .long("from")
                .value_name("DATETIME")
                .help(format!("Only process records on or after this time, in UTC ({}).", BOUNDARY_FORMAT)),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .value_name("DATETIME")
                .help(format!("Only process records on or before this time, in UTC ({}).", BOUNDARY_FORMAT)),
        )
        .arg(
            Arg::new("metrics")
                .long("met")
                .value_name("BOOL")
                .value_parser(value_parser!(bool))
                .default_value("true")
                .help("When true, show the event id metrics of each file."),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("-v - debug, -vv - trace. Trace output is only available in debug builds."),
        )
}

fn main() {
    let matches = command().get_matches();

    init_logging(matches.get_count("verbose"));
    debug!(
        "Command line: {}",
        std::env::args().skip(1).collect::<Vec<_>>().join(" ")
    );

    let result = EvtxCsv::from_cli_matches(&matches).and_then(EvtxCsv::run);

    if let Err(e) = result {
        eprintln!("{:?}", e);
        exit(1);
    }
}

use anyhow::{Context, Result};
use autoperf::annotation::{annotate, AnnotateMode, AnnotateOptions, CScanner};
use autoperf::cancel::{install_sigint_handler, CancelToken};
use autoperf::cli::{AnnotateArgs, Cli, Command};
use autoperf::config::RepoConfig;
use autoperf::hunkmap::HunkMap;
use autoperf::measure::Measurement;
use autoperf::pipeline::{Pipeline, PipelineOptions};
use autoperf::process::unix_timestamp;
use autoperf::vcs::{persist_hunkmaps, GitCli, VersionControl};
use autoperf::workdir::{WorkDir, WORK_DIR};
use autoperf::{detect, train, Error};
use clap::Parser;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Stderr logging filtered by `RUST_LOG`, plus a debug-level log file under
/// `.work/logs/` when a work directory is known
fn init_tracing(debug: bool, work_root: Option<&Path>) -> Option<PathBuf> {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let log_file = work_root.and_then(|root| {
        let dir = WorkDir::for_repo(root).logs_dir();
        fs::create_dir_all(&dir).ok()?;
        let path = dir.join(format!("autoperf-{}.log", unix_timestamp()));
        File::create(&path).ok().map(|file| (path, file))
    });
    let (log_path, file_layer) = match log_file {
        Some((path, file)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG);
            (Some(path), Some(layer))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(stderr).with(file_layer).init();
    log_path
}

/// Nearest ancestor of `start` holding a `.work/` directory
fn find_work_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(WORK_DIR).is_dir())
        .map(Path::to_path_buf)
}

fn main() {
    let cli = Cli::parse();
    let start = match &cli.repo {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let log_path = init_tracing(cli.debug, find_work_root(&start).as_deref());
    if let Some(path) = &log_path {
        tracing::debug!("logging to {}", path.display());
    }

    if let Err(err) = run(cli, &start) {
        let (kind, code) = err
            .downcast_ref::<Error>()
            .map(|e| (e.kind(), e.exit_code()))
            .unwrap_or(("Internal", 1));
        tracing::error!(kind, exit_code = code, "{:#}", err);
        eprintln!("autoperf: {:#}", err);
        std::process::exit(code);
    }
}

fn run(cli: Cli, start: &Path) -> Result<()> {
    if let Command::Init { force } = cli.command {
        let work = WorkDir::init(start, force)?;
        println!("Initialized {}", work.path().display());
        println!("Edit {} and list HPC events in {}", work.config().display(), work.counters().display());
        return Ok(());
    }

    let (root, config) = RepoConfig::discover(start)?;
    let work = WorkDir::for_repo(&root);
    let cancel = CancelToken::with_sigint();

    match cli.command {
        Command::Init { .. } => Ok(()),
        Command::Clean => {
            let removed = work.clean()?;
            println!("Removed {} entries from {}", removed.len(), work.path().display());
            Ok(())
        }
        Command::Measure { out_dir, runs } => {
            install_sigint_handler().context("cannot install SIGINT handler")?;
            let measurement = Measurement::new(&config, &work, &cancel);
            measurement.build()?;
            let out_dir = resolve(start, &out_dir);
            for index in runs {
                cancel.check()?;
                let record = measurement.run(&out_dir, Some(index))?;
                println!(
                    "run_{}: {} events, {} missing probe outputs",
                    record.index,
                    record.elapsed.len(),
                    record.missing.len()
                );
            }
            Ok(())
        }
        Command::Train {
            train_dir,
            hidden,
            encoding,
        } => {
            let mut config = config;
            if let Some(hidden) = hidden {
                config.model.hidden = hidden;
            }
            if let Some(encoding) = encoding {
                config.model.encoding = encoding;
            }
            config.validate()?;
            let dir = train_dir
                .map(|d| resolve(start, &d))
                .unwrap_or_else(|| work.train_dir());
            let outcome = train::train(&config, &work, &dir)?;
            println!(
                "Trained on {} rows from {} runs ({} events), {} epochs{}",
                outcome.rows,
                outcome.runs,
                outcome.events,
                outcome.history.epochs(),
                if outcome.history.stopped_early { " (stopped early)" } else { "" }
            );
            println!("Threshold: {:.6e}", outcome.threshold);
            Ok(())
        }
        Command::Evaluate {
            train,
            nominal,
            anomalous,
        } => {
            let report = detect::evaluate(
                &config,
                &work,
                &resolve(start, &train),
                &resolve(start, &nominal),
                &resolve(start, &anomalous),
            )?;
            let text = report.to_report_string();
            detect::write_report(&work, &text)?;
            print!("{}", text);
            Ok(())
        }
        Command::Detect { runs, retrain } => {
            let options = PipelineOptions::detect(runs).retrain(retrain);
            run_pipeline(&config, &work, &cancel, options)
        }
        Command::Baseline { runs } => run_pipeline(&config, &work, &cancel, PipelineOptions::baseline(runs)),
        Command::Annotate(args) => run_annotate(&config, &work, start, args),
    }
}

fn resolve(start: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        start.join(path)
    }
}

fn run_pipeline(config: &RepoConfig, work: &WorkDir, cancel: &CancelToken, options: PipelineOptions) -> Result<()> {
    install_sigint_handler().context("cannot install SIGINT handler")?;
    let mut git = GitCli::new(config.repo_root());
    let mut pipeline = Pipeline::new(config, work, &mut git, &CScanner, cancel, options);
    let result = pipeline.run();

    let states: Vec<String> = pipeline.executed().iter().map(ToString::to_string).collect();
    tracing::debug!("executed states: {}", states.join(" → "));
    if let Some(outcome) = pipeline.training() {
        println!("Trained on {} rows, threshold {:.6e}", outcome.rows, outcome.threshold);
    }
    if let Some(report) = pipeline.report() {
        print!("{}", report.to_report_string());
    }
    result.map_err(Into::into)
}

fn run_annotate(config: &RepoConfig, work: &WorkDir, start: &Path, args: AnnotateArgs) -> Result<()> {
    let root = config.repo_root();
    let git = GitCli::new(root);

    if let Some(base) = &args.diff {
        let head = git.current_branch()?;
        let maps = git.hunkmaps(base, &head)?;
        persist_hunkmaps(work, base, &head, &maps)?;
        println!(
            "{}: {} files changed, {}: {} files changed",
            base,
            maps.0.len(),
            head,
            maps.1.len()
        );
        return Ok(());
    }

    let only = if let Some(path) = &args.only {
        Some(HunkMap::load(&resolve(start, path))?)
    } else if args.apply {
        let head = git.current_branch()?;
        Some(HunkMap::load(&work.hunkmap(&head)).with_context(|| {
            format!("no persisted HunkMap for {} (run `annotate --diff <branch>` first)", head)
        })?)
    } else {
        None
    };

    let mode = if args.erase {
        AnnotateMode::Erase
    } else {
        AnnotateMode::Inject
    };
    let paths = if args.paths.is_empty() {
        vec![root.to_path_buf()]
    } else {
        args.paths.iter().map(|p| resolve(start, p)).collect()
    };
    let mut options = AnnotateOptions::new(paths, mode)
        .recursive(args.recursive)
        .only(only);
    if let Some(workers) = args.parallel {
        options = options.workers(workers);
    }

    let summary = annotate(root, &options, &CScanner)?;
    if args.detailed {
        for file in &summary.files {
            match &file.parse_error {
                Some(reason) => println!("{}: parse failed: {}", file.path.display(), reason),
                None => println!(
                    "{}: {} functions, {} annotated, {} markers",
                    file.path.display(),
                    file.functions,
                    file.annotated,
                    file.markers
                ),
            }
        }
    }
    let verb = match mode {
        AnnotateMode::Inject => "inserted",
        AnnotateMode::Erase => "removed",
    };
    println!(
        "{} markers {} in {} of {} files",
        summary.markers(),
        verb,
        summary.modified_files(),
        summary.files.len()
    );
    Ok(())
}

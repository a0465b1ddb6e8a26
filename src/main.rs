use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use typist::directory::{AppRegistry, SentenceDeck};
use typist::model::InputMode;
use typist::planner::build_plan;
use typist::settings::Settings;
use typist::sim::{self, SimNodeSpec, SimTree};
use typist::status::{LogStatus, RecordingStatus, Tee};
use typist::trace::{hierarchy_lines, plan_console_trace, print_trace_line};
use typist::tracker::{Collaborators, EventKind, Tracker, UiEvent};
use typist::tree::UiTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Leave fields that already contain text alone.
    Skip,
    /// Clear the field before typing.
    Clear,
    /// Keep existing text and type after a separator.
    Append,
}

impl ModeArg {
    fn to_library(self) -> InputMode {
        match self {
            ModeArg::Skip => InputMode::Skip,
            ModeArg::Clear => InputMode::Clear,
            ModeArg::Append => InputMode::Append,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "typist")]
#[command(about = "Human-like typing and send engine for foreign UI trees", long_about = None)]
struct Cli {
    /// Log decisions at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a typing plan (JSON) for one sentence
    Plan {
        /// Sentence to type
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,

        /// Read the sentence from a file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Text already present in the field
        #[arg(long, default_value = "")]
        existing: String,

        #[arg(long, value_enum, default_value_t = ModeArg::Clear)]
        mode: ModeArg,

        /// Settings file (JSON); only the typing section is used
        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,

        /// Output plan file (defaults to stdout)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Disable console typing trace output
        #[arg(long)]
        no_trace: bool,
    },

    /// Drive the engine through a scenario: a synthetic tree plus timed events
    Simulate {
        /// Scenario file (JSON)
        #[arg(long, value_name = "PATH")]
        scenario: PathBuf,

        /// App registry (JSON); defaults to the built-in apps
        #[arg(long, value_name = "PATH")]
        registry: Option<PathBuf>,

        /// Sentences (JSON list of {id, text, scenario_tag})
        #[arg(long, value_name = "PATH")]
        sentences: Option<PathBuf>,

        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,

        /// Override the input handling mode from settings
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Override the per-app cooldown from settings
        #[arg(long)]
        cooldown_ms: Option<u64>,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Wait in real time between callbacks instead of jumping the clock
        #[arg(long)]
        realtime: bool,
    },

    /// Print the hierarchy of a scenario tree
    Dump {
        #[arg(long, value_name = "PATH")]
        scenario: PathBuf,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Scenario {
    tree: SimNodeSpec,
    #[serde(default = "default_true")]
    gestures: bool,
    #[serde(default)]
    paste_menu: bool,
    #[serde(default)]
    events: Vec<ScenarioEvent>,
    /// Stop draining callbacks after this time.
    #[serde(default)]
    run_until_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ScenarioEvent {
    at_ms: u64,
    #[serde(flatten)]
    action: ScenarioAction,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ScenarioAction {
    WindowChanged {
        app_id: Option<String>,
        window_id: i64,
    },
    ContentChanged {
        app_id: Option<String>,
        window_id: i64,
    },
    FocusChanged {
        app_id: Option<String>,
        window_id: i64,
    },
    Start,
    Stop,
    Interrupt,
    Dump,
}

impl Scenario {
    fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&json).context("failed to parse scenario JSON")
    }

    fn build_tree(&self) -> SimTree {
        let mut tree = SimTree::new(self.tree.clone());
        tree.set_gestures_enabled(self.gestures);
        tree.set_paste_menu(self.paste_menu);
        tree
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path),
        None => Ok(Settings::default()),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn sleep_interruptible(stop: &AtomicBool, ms: u64) {
    let mut remaining = ms;
    while remaining > 0 {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let step = remaining.min(50);
        std::thread::sleep(Duration::from_millis(step));
        remaining -= step;
    }
}

struct Clock {
    now_ms: u64,
    realtime: bool,
}

impl Clock {
    fn advance<R: rand::Rng>(
        &mut self,
        tracker: &mut Tracker<R>,
        tree: &mut SimTree,
        to_ms: u64,
        stop: &AtomicBool,
    ) {
        while let Some(due) = tracker.next_due().filter(|due| *due <= to_ms) {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            self.wait_until(due, stop);
            tracker.tick(tree, due);
        }
        self.wait_until(to_ms, stop);
    }

    fn wait_until(&mut self, to_ms: u64, stop: &AtomicBool) {
        if to_ms <= self.now_ms {
            return;
        }
        if self.realtime {
            sleep_interruptible(stop, to_ms - self.now_ms);
        }
        self.now_ms = to_ms;
    }
}

fn window_event(kind: EventKind, app_id: Option<String>, window_id: i64) -> UiEvent {
    UiEvent {
        kind,
        app_id,
        window_id,
    }
}

fn simulate(
    scenario: &Scenario,
    settings: Settings,
    registry: AppRegistry,
    sentences: SentenceDeck,
    seed: Option<u64>,
    realtime: bool,
) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let recorder = RecordingStatus::new();
    let collaborators =
        Collaborators::new(registry, sentences).with_status(Tee(LogStatus, recorder.clone()));
    let mut tracker = Tracker::new(settings, collaborators, rng_from_seed(seed));
    let mut tree = scenario.build_tree();
    let mut clock = Clock {
        now_ms: 0,
        realtime,
    };

    let mut events: Vec<&ScenarioEvent> = scenario.events.iter().collect();
    events.sort_by_key(|e| e.at_ms);

    for event in events {
        clock.advance(&mut tracker, &mut tree, event.at_ms, &stop);
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let now = event.at_ms;
        match &event.action {
            ScenarioAction::WindowChanged { app_id, window_id } => tracker.on_event(
                &window_event(EventKind::WindowChanged, app_id.clone(), *window_id),
                now,
            ),
            ScenarioAction::ContentChanged { app_id, window_id } => tracker.on_event(
                &window_event(EventKind::ContentChanged, app_id.clone(), *window_id),
                now,
            ),
            ScenarioAction::FocusChanged { app_id, window_id } => tracker.on_event(
                &window_event(EventKind::FocusChanged, app_id.clone(), *window_id),
                now,
            ),
            ScenarioAction::Start => tracker.start(now),
            ScenarioAction::Stop => tracker.stop(),
            ScenarioAction::Interrupt => tracker.interrupt(),
            ScenarioAction::Dump => {
                for line in tracker.dump_hierarchy(&tree) {
                    println!("{line}");
                }
            }
        }
    }

    if !stop.load(Ordering::SeqCst) {
        let until = scenario.run_until_ms.unwrap_or(u64::MAX);
        while let Some(due) = tracker.next_due().filter(|due| *due <= until) {
            clock.advance(&mut tracker, &mut tree, due, &stop);
            if stop.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    if stop.load(Ordering::SeqCst) {
        eprintln!("Aborted. Cancelling outstanding work...");
        tracker.stop();
    }

    for outcome in recorder.sends() {
        print_trace_line(&format!("Send: {outcome}"));
    }
    for message in tree.committed() {
        println!("{message}");
    }
    eprintln!("{}", tracker.snapshot());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Plan {
            text,
            input,
            existing,
            mode,
            settings,
            output,
            seed,
            no_trace,
        } => {
            let sentence = match (text, input) {
                (Some(text), _) => text,
                (None, Some(path)) => read_input(&path)?.trim_end_matches('\n').to_string(),
                (None, None) => return Err(anyhow!("pass --text or --input")),
            };
            let settings = load_settings(settings.as_ref())?;
            let mut rng = rng_from_seed(seed);

            let Some(plan) = build_plan(
                &sentence,
                mode.to_library(),
                &existing,
                &settings.typing,
                &mut rng,
            )?
            else {
                eprintln!("Field already has text; skip mode types nothing.");
                return Ok(());
            };

            let stats = sim::stats(&plan);
            eprintln!(
                "Planned: {} steps ({} inserts, {} deletes), send after ~{:.1}s",
                stats.steps,
                stats.inserts,
                stats.deletes,
                (stats.total_ms as f64) / 1000.0
            );
            if !no_trace {
                for event in plan_console_trace(&plan) {
                    print_trace_line(&event.line);
                }
            }

            let json = serde_json::to_string_pretty(&plan).context("failed to serialize plan")?;
            if let Some(out) = output {
                write_output(&out, &json)?;
            } else {
                println!("{json}");
            }
        }
        Command::Simulate {
            scenario,
            registry,
            sentences,
            settings,
            mode,
            cooldown_ms,
            seed,
            realtime,
        } => {
            let scenario = Scenario::load(&scenario)?;
            let mut settings = load_settings(settings.as_ref())?;
            if let Some(mode) = mode {
                settings.input_mode = mode.to_library();
            }
            if let Some(cooldown_ms) = cooldown_ms {
                settings.cooldown_ms = cooldown_ms;
            }
            let registry = match registry {
                Some(path) => AppRegistry::load(&path)?,
                None => AppRegistry::builtin(),
            };
            let sentences = match sentences {
                Some(path) => SentenceDeck::load(&path)?,
                None => SentenceDeck::from_texts(["hi there"]),
            };
            info!(
                apps = registry.app_ids().count(),
                sentences = sentences.len(),
                mode = %settings.input_mode,
                "simulating"
            );

            simulate(&scenario, settings, registry, sentences, seed, realtime)?;
        }
        Command::Dump { scenario } => {
            let tree = Scenario::load(&scenario)?.build_tree();
            let root = tree
                .root()
                .ok_or_else(|| anyhow!("scenario tree has no root"))?;
            for line in hierarchy_lines(&tree, root) {
                println!("{line}");
            }
        }
    }

    Ok(())
}

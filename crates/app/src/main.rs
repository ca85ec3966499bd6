use std::fmt;

use rte_core::datamodel::LaunchContext;
use rte_core::model::{AttemptId, CourseId, FrameId, Module, ModuleId, RteVersion};
use serde::Deserialize;
use services::{AppServices, Clock, ProgressEvent, RemoteStoreConfig, SyncConfig};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidVersion { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidVersion { raw } => {
                write!(f, "invalid --version value: {raw} (expected 1.2 or 2004)")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<u64, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  player seed   [--db <sqlite_url>] --course-id <id> --module-id <id>");
    eprintln!("                [--version 1.2|2004] [--entry <url>] [--locale <tag>]");
    eprintln!("  player replay [--db <sqlite_url>] --attempt-id <id> --script <file.json>");
    eprintln!("                [--learner-id <id>] [--learner-name <name>]");
    eprintln!("  player show   [--db <sqlite_url>] --attempt-id <id>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://player.sqlite3  --version 1.2  --entry index.html  --locale en");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PLAYER_DB_URL, PLAYER_REMOTE_URL, PLAYER_REMOTE_TOKEN, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Replay,
    Show,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "replay" => Some(Self::Replay),
            "show" => Some(Self::Show),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct SeedArgs {
    course_id: CourseId,
    module_id: ModuleId,
    version: RteVersion,
    entry_url: String,
    locale: String,
}

#[derive(Debug)]
struct ReplayArgs {
    attempt_id: AttemptId,
    script: String,
    launch: LaunchContext,
}

#[derive(Debug)]
enum Action {
    Seed(SeedArgs),
    Replay(ReplayArgs),
    Show(AttemptId),
}

#[derive(Debug)]
struct Args {
    db_url: String,
    action: Action,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PLAYER_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://player.sqlite3".into(), normalize_sqlite_url);
        let mut course_id = None;
        let mut module_id = None;
        let mut attempt_id = None;
        let mut version = RteVersion::Scorm12;
        let mut entry_url = "index.html".to_string();
        let mut locale = "en".to_string();
        let mut script = None;
        let mut launch = LaunchContext::default();

        while let Some(arg) = args.next() {
            match (cmd, arg.as_str()) {
                (_, "--db") => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                (Command::Seed, "--course-id") => {
                    course_id = Some(CourseId::new(parse_id(args, "--course-id")?));
                }
                (Command::Seed, "--module-id") => {
                    module_id = Some(ModuleId::new(parse_id(args, "--module-id")?));
                }
                (Command::Seed, "--version") => {
                    let value = require_value(args, "--version")?;
                    version = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidVersion { raw: value })?;
                }
                (Command::Seed, "--entry") => entry_url = require_value(args, "--entry")?,
                (Command::Seed, "--locale") => locale = require_value(args, "--locale")?,
                (Command::Replay | Command::Show, "--attempt-id") => {
                    attempt_id = Some(AttemptId::new(parse_id(args, "--attempt-id")?));
                }
                (Command::Replay, "--script") => script = Some(require_value(args, "--script")?),
                (Command::Replay, "--learner-id") => {
                    launch.learner_id = Some(require_value(args, "--learner-id")?);
                }
                (Command::Replay, "--learner-name") => {
                    launch.learner_name = Some(require_value(args, "--learner-name")?);
                }
                (_, "--help" | "-h") => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let action = match cmd {
            Command::Seed => Action::Seed(SeedArgs {
                course_id: course_id.ok_or(ArgsError::MissingFlag { flag: "--course-id" })?,
                module_id: module_id.ok_or(ArgsError::MissingFlag { flag: "--module-id" })?,
                version,
                entry_url,
                locale,
            }),
            Command::Replay => Action::Replay(ReplayArgs {
                attempt_id: attempt_id.ok_or(ArgsError::MissingFlag {
                    flag: "--attempt-id",
                })?,
                script: script.ok_or(ArgsError::MissingFlag { flag: "--script" })?,
                launch,
            }),
            Command::Show => Action::Show(attempt_id.ok_or(ArgsError::MissingFlag {
                flag: "--attempt-id",
            })?),
        };

        Ok(Self { db_url, action })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// One content call in a replay script.
#[derive(Debug, Deserialize)]
struct ScriptCall {
    method: String,
    #[serde(default)]
    args: Vec<String>,
}

fn load_script(path: &str) -> Result<Vec<ScriptCall>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    log::info!("using database {}", parsed.db_url);
    let mut app =
        AppServices::new_sqlite(&parsed.db_url, Clock::system(), SyncConfig::default()).await?;
    if let Some(remote) = RemoteStoreConfig::from_env() {
        log::info!("remote attempt store at {}", remote.base_url);
        app = app.with_remote(remote)?;
    }

    match parsed.action {
        Action::Seed(seed) => {
            let module = Module::new(
                seed.module_id,
                seed.course_id,
                seed.version,
                seed.locale,
                1,
                seed.entry_url,
            )?;
            let attempt = app.seed_attempt(&module).await?;
            println!("{}", attempt.id());
        }
        Action::Replay(replay) => {
            let script = load_script(&replay.script)?;
            let player = app.player();
            let registry = app.registry();
            let frame = FrameId::generate();
            let mut session = player
                .launch(frame, replay.attempt_id, &replay.launch)
                .await?;
            println!(
                "launched attempt {} (SCORM {}), status {}",
                replay.attempt_id,
                session.module().version(),
                session.initial_progress().status
            );

            for call in &script {
                let args: Vec<&str> = call.args.iter().map(String::as_str).collect();
                match registry.invoke(frame, &call.method, &args) {
                    Some(result) => println!("{}({}) -> {result}", call.method, args.join(", ")),
                    None => println!("{}: not defined for this edition", call.method),
                }
                while let Ok(event) = session.progress_mut().try_recv() {
                    print_progress(&event);
                }
            }

            let closed = player.close(session).await?;
            for event in &closed.events {
                print_progress(event);
            }
            println!(
                "sync: {} writes, {} abandoned",
                closed.report.writes, closed.report.failures
            );
            show_attempt(&app, replay.attempt_id).await?;
        }
        Action::Show(attempt_id) => show_attempt(&app, attempt_id).await?,
    }

    Ok(())
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Updated(update) => {
            println!("  progress: {} (revision {})", update.progress.status, update.revision);
        }
        ProgressEvent::Completed(update) => {
            println!("  completed: {}", update.progress.status);
        }
    }
}

async fn show_attempt(app: &AppServices, id: AttemptId) -> Result<(), Box<dyn std::error::Error>> {
    let Some(attempt) = app.attempt(id).await? else {
        return Err(format!("attempt {id} not found").into());
    };
    println!("{}", serde_json::to_string_pretty(&attempt)?);
    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

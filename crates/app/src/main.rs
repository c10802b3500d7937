use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use services::{Clock, Engine, ReplanReason};
use storage::repository::Storage;
use study_core::model::{CardDraft, CardId, CourseId, GradeDraft, SessionId, TopicDraft, TopicId};
use study_core::settings::EngineSettings;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { command: &'static str, flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidValue { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => write!(f, "{command} requires {flag}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app dashboard");
    eprintln!("  app review --card <id> --quality <0-5>");
    eprintln!("  app add-card --front <text> --back <text> [--topic <id>]");
    eprintln!("  app replan");
    eprintln!("  app add-topic --title <text> --effort <minutes> [--deadline <YYYY-MM-DD>] [--course <id>]");
    eprintln!("  app complete-topic --topic <id>");
    eprintln!("  app archive-topic --topic <id>");
    eprintln!("  app complete-session --session <id>");
    eprintln!("  app attend --course <id> --date <YYYY-MM-DD> [--absent]");
    eprintln!("  app grade --course <id> --name <text> --score <n> --max <n> --weight <0-1>");
    eprintln!();
    eprintln!("Global options:");
    eprintln!("  --db <sqlite_url>     default sqlite://study.sqlite3");
    eprintln!("  --config <file.json>  engine settings");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_DB_URL, STUDY_CONFIG, STUDY_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Dashboard,
    Review,
    AddCard,
    Replan,
    AddTopic,
    CompleteTopic,
    ArchiveTopic,
    CompleteSession,
    Attend,
    Grade,
}

impl CommandKind {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "dashboard" => Some(Self::Dashboard),
            "review" => Some(Self::Review),
            "add-card" => Some(Self::AddCard),
            "replan" => Some(Self::Replan),
            "add-topic" => Some(Self::AddTopic),
            "complete-topic" => Some(Self::CompleteTopic),
            "archive-topic" => Some(Self::ArchiveTopic),
            "complete-session" => Some(Self::CompleteSession),
            "attend" => Some(Self::Attend),
            "grade" => Some(Self::Grade),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Review => "review",
            Self::AddCard => "add-card",
            Self::Replan => "replan",
            Self::AddTopic => "add-topic",
            Self::CompleteTopic => "complete-topic",
            Self::ArchiveTopic => "archive-topic",
            Self::CompleteSession => "complete-session",
            Self::Attend => "attend",
            Self::Grade => "grade",
        }
    }
}

#[derive(Debug)]
enum Command {
    Dashboard,
    Review { card_id: CardId, quality: u8 },
    AddCard(CardDraft),
    Replan(ReplanReason),
    Attend {
        course_id: CourseId,
        date: NaiveDate,
        present: bool,
    },
    Grade(GradeDraft),
}

/// Raw flag values collected before a command is validated.
#[derive(Debug, Default)]
struct Flags {
    card: Option<String>,
    quality: Option<String>,
    front: Option<String>,
    back: Option<String>,
    topic: Option<String>,
    session: Option<String>,
    title: Option<String>,
    effort: Option<String>,
    deadline: Option<String>,
    course: Option<String>,
    date: Option<String>,
    absent: bool,
    name: Option<String>,
    score: Option<String>,
    max: Option<String>,
    weight: Option<String>,
}

struct Args {
    db_url: String,
    config_path: Option<String>,
    command: Command,
}

fn parse_flag<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidValue { flag, raw })
}

fn required<T: std::str::FromStr>(
    kind: CommandKind,
    flag: &'static str,
    value: Option<String>,
) -> Result<T, ArgsError> {
    let raw = value.ok_or(ArgsError::MissingFlag {
        command: kind.name(),
        flag,
    })?;
    parse_flag(flag, raw)
}

fn optional<T: std::str::FromStr>(
    flag: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ArgsError> {
    value.map(|raw| parse_flag(flag, raw)).transpose()
}

impl Args {
    fn parse(kind: CommandKind, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("STUDY_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://study.sqlite3".into(), normalize_sqlite_url);
        let mut config_path = std::env::var("STUDY_CONFIG").ok();
        let mut flags = Flags::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--config" => config_path = Some(require_value(args, "--config")?),
                "--card" => flags.card = Some(require_value(args, "--card")?),
                "--quality" => flags.quality = Some(require_value(args, "--quality")?),
                "--front" => flags.front = Some(require_value(args, "--front")?),
                "--back" => flags.back = Some(require_value(args, "--back")?),
                "--topic" => flags.topic = Some(require_value(args, "--topic")?),
                "--session" => flags.session = Some(require_value(args, "--session")?),
                "--title" => flags.title = Some(require_value(args, "--title")?),
                "--effort" => flags.effort = Some(require_value(args, "--effort")?),
                "--deadline" => flags.deadline = Some(require_value(args, "--deadline")?),
                "--course" => flags.course = Some(require_value(args, "--course")?),
                "--date" => flags.date = Some(require_value(args, "--date")?),
                "--absent" => flags.absent = true,
                "--name" => flags.name = Some(require_value(args, "--name")?),
                "--score" => flags.score = Some(require_value(args, "--score")?),
                "--max" => flags.max = Some(require_value(args, "--max")?),
                "--weight" => flags.weight = Some(require_value(args, "--weight")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            config_path,
            command: build_command(kind, flags)?,
        })
    }
}

fn build_command(kind: CommandKind, flags: Flags) -> Result<Command, ArgsError> {
    let command = match kind {
        CommandKind::Dashboard => Command::Dashboard,
        CommandKind::Review => Command::Review {
            card_id: required(kind, "--card", flags.card)?,
            quality: required(kind, "--quality", flags.quality)?,
        },
        CommandKind::AddCard => {
            let front: String = required(kind, "--front", flags.front)?;
            let back: String = required(kind, "--back", flags.back)?;
            let mut draft = CardDraft::new(front, back);
            if let Some(topic_id) = optional::<TopicId>("--topic", flags.topic)? {
                draft = draft.for_topic(topic_id);
            }
            Command::AddCard(draft)
        }
        CommandKind::Replan => Command::Replan(ReplanReason::Manual),
        CommandKind::AddTopic => {
            let title: String = required(kind, "--title", flags.title)?;
            let mut draft = TopicDraft::new(title, required(kind, "--effort", flags.effort)?);
            if let Some(deadline) = optional::<NaiveDate>("--deadline", flags.deadline)? {
                draft = draft.with_deadline(deadline);
            }
            if let Some(course_id) = optional::<CourseId>("--course", flags.course)? {
                draft = draft.with_course(course_id);
            }
            Command::Replan(ReplanReason::TopicAdded(draft))
        }
        CommandKind::CompleteTopic => Command::Replan(ReplanReason::TopicCompleted(required(
            kind,
            "--topic",
            flags.topic,
        )?)),
        CommandKind::ArchiveTopic => Command::Replan(ReplanReason::TopicArchived(required(
            kind,
            "--topic",
            flags.topic,
        )?)),
        CommandKind::CompleteSession => Command::Replan(ReplanReason::SessionCompleted(
            required::<SessionId>(kind, "--session", flags.session)?,
        )),
        CommandKind::Attend => Command::Attend {
            course_id: required(kind, "--course", flags.course)?,
            date: required(kind, "--date", flags.date)?,
            present: !flags.absent,
        },
        CommandKind::Grade => Command::Grade(GradeDraft {
            course_id: required(kind, "--course", flags.course)?,
            name: required(kind, "--name", flags.name)?,
            score: required(kind, "--score", flags.score)?,
            max_score: required(kind, "--max", flags.max)?,
            weight: required(kind, "--weight", flags.weight)?,
        }),
    };
    Ok(command)
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

fn load_settings(path: Option<&str>) -> Result<EngineSettings, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(EngineSettings::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let settings: EngineSettings = serde_json::from_str(&raw)?;
    settings.validate()?;
    debug!(path, "loaded engine settings");
    Ok(settings)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = std::env::var("STUDY_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let kind = match argv.next() {
        None => CommandKind::Dashboard,
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => CommandKind::from_arg(&first).ok_or_else(|| {
            print_usage();
            ArgsError::UnknownCommand(first)
        })?,
    };

    let parsed = Args::parse(kind, &mut argv).map_err(|e| {
        print_usage();
        e
    })?;

    let settings = load_settings(parsed.config_path.as_deref())?;
    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    info!(db = %parsed.db_url, command = kind.name(), "starting");
    let storage = Storage::sqlite(&parsed.db_url).await?;
    let engine = Engine::start(storage.state, settings, Clock::default_clock()).await?;

    let result = match parsed.command {
        Command::Dashboard => print_json(&engine.dashboard_snapshot()),
        Command::Review { card_id, quality } => {
            print_json(&engine.submit_review(card_id, quality).await?)
        }
        Command::AddCard(draft) => print_json(&engine.add_card(draft).await?),
        Command::Replan(reason) => print_json(&engine.request_replan(reason).await?),
        Command::Attend {
            course_id,
            date,
            present,
        } => print_json(&engine.record_attendance(course_id, date, present).await?),
        Command::Grade(draft) => print_json(&engine.record_grade(draft).await?),
    };

    engine.shutdown().await;
    result
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

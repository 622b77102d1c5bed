use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use courier::api::{ApiError, create_api};
use courier::chat::{ChatSession, Notice, NoticeLevel};
use courier::error::ChatError;
use courier::identity::IdentityStore;
use courier::realtime::{ConnectionManager, Disconnected, RealtimeLink};
use courier::runtime::{ChatRuntime, Command, OpenTarget};
use courier::settings::{ClientSettings, SettingsError, SettingsStore};
use courier_protocol::{ConversationId, EventKind, Message, UserId};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: courier [--config <path>] [--identity <path>] [--api-url <url>] \
                     [--realtime-url <url>] [--logout]";
const HELP: &str = "commands: /chats, /users [search], /open <n|id>, /dm <userId>, \
                    /group <name> <id,id,...>, /type <draft>, /send, /close, /quit";

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("{message}"))]
    Usage { stage: &'static str, message: String },
    #[snafu(display("{source}"))]
    Identity {
        stage: &'static str,
        source: ChatError,
    },
    #[snafu(display("{source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to set up the HTTP client: {source}"))]
    Api {
        stage: &'static str,
        source: ApiError,
    },
}

#[derive(Debug, Default)]
struct CliFlags {
    config: Option<PathBuf>,
    identity: Option<PathBuf>,
    api_url: Option<String>,
    realtime_url: Option<String>,
    logout: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "courier=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("courier: {error}");
            if let CliError::Identity { source, .. } = &error
                && source.requires_login()
            {
                eprintln!("import an identity with --identity <file>");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), CliError> {
    let flags = parse_cli_flags(std::env::args().skip(1))?;
    let store = match &flags.config {
        Some(path) => SettingsStore::new(path.clone()),
        None => SettingsStore::load(),
    };
    let settings = save_endpoint_overrides(&store, &flags)?;
    let identity = IdentityStore::in_dir(
        store
            .config_path()
            .parent()
            .unwrap_or_else(|| Path::new(".")),
    );

    if flags.logout {
        identity.clear().context(IdentitySnafu { stage: "logout" })?;
        println!("signed out");
        return Ok(());
    }

    let me = match &flags.identity {
        Some(source) => identity.import_from(source),
        None => identity.current_user(),
    }
    .context(IdentitySnafu {
        stage: "load-identity",
    })?;
    tracing::info!(user_id = %me.id, "signed in as {}", me.name);

    let api = create_api(&settings).context(ApiSnafu { stage: "create-api" })?;
    let (link, events) = match ConnectionManager::connect(&settings.realtime_url, &me).await {
        Ok(connection) => {
            let events = connection.subscribe(&EventKind::INBOUND);
            (Box::new(connection) as Box<dyn RealtimeLink>, Some(events))
        }
        Err(error) => {
            tracing::warn!("{error}; continuing without live updates");
            (Box::new(Disconnected) as Box<dyn RealtimeLink>, None)
        }
    };

    let session = ChatSession::new(me, link, &settings);
    let runtime = ChatRuntime::new(session, api, events);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let _ = commands_tx.send(Command::LoadChats);
    tokio::spawn(read_commands(commands_tx));

    println!("{HELP}");
    let mut renderer = Renderer::default();
    runtime
        .run(commands_rx, |session, notices| renderer.render(session, notices))
        .await;
    Ok(())
}

fn parse_cli_flags(mut args: impl Iterator<Item = String>) -> Result<CliFlags, CliError> {
    let mut flags = CliFlags::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => flags.config = Some(read_path(&arg, args.next())?),
            "--identity" => flags.identity = Some(read_path(&arg, args.next())?),
            "--api-url" => flags.api_url = Some(read_value(&arg, args.next())?),
            "--realtime-url" => flags.realtime_url = Some(read_value(&arg, args.next())?),
            "--logout" => flags.logout = true,
            other => {
                return UsageSnafu {
                    stage: "parse-cli-flags",
                    message: format!("unknown argument '{other}'. {USAGE}"),
                }
                .fail();
            }
        }
    }

    Ok(flags)
}

fn read_path(flag: &str, value: Option<String>) -> Result<PathBuf, CliError> {
    read_value(flag, value).map(PathBuf::from)
}

fn read_value(flag: &str, value: Option<String>) -> Result<String, CliError> {
    value
        .filter(|value| !value.trim().is_empty())
        .context(UsageSnafu {
            stage: "parse-cli-flags",
            message: format!("missing value after {flag}. {USAGE}"),
        })
}

/// Writes `--api-url`/`--realtime-url` into the settings file so later runs
/// pick them up without the flags.
fn save_endpoint_overrides(
    store: &SettingsStore,
    flags: &CliFlags,
) -> Result<Arc<ClientSettings>, CliError> {
    let current = store.settings();
    if flags.api_url.is_none() && flags.realtime_url.is_none() {
        return Ok(current);
    }

    let mut updated = ClientSettings::clone(&current);
    if let Some(url) = &flags.api_url {
        updated.api_base_url = url.clone();
    }
    if let Some(url) = &flags.realtime_url {
        updated.realtime_url = url.clone();
    }

    let saved = store.save(updated).context(SettingsSnafu {
        stage: "save-endpoint-overrides",
    })?;
    println!("saved settings to {}", store.config_path().display());
    Ok(saved)
}

async fn read_commands(commands: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Ok(parsed) => {
                    for command in parsed {
                        if commands.send(command).is_err() {
                            return;
                        }
                    }
                }
                Err(message) => println!("{message}"),
            },
            Ok(None) => {
                let _ = commands.send(Command::Quit);
                return;
            }
            Err(error) => {
                tracing::error!("failed to read stdin: {error}");
                let _ = commands.send(Command::Quit);
                return;
            }
        }
    }
}

/// Turns one input line into commands. Plain text is typed, then sent.
fn parse_line(line: &str) -> Result<Vec<Command>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.strip_prefix('/') else {
        if line.trim().is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![
            Command::Keystroke(line.to_string()),
            Command::Send(line.to_string()),
        ]);
    };

    let (name, argument) = rest
        .split_once(' ')
        .map(|(name, argument)| (name, argument.trim()))
        .unwrap_or((rest, ""));

    match name {
        "chats" => Ok(vec![Command::LoadChats]),
        "users" => Ok(vec![Command::SearchUsers(
            (!argument.is_empty()).then(|| argument.to_string()),
        )]),
        "open" => parse_open(argument).map(|target| vec![Command::Open(target)]),
        "dm" => UserId::parse(argument)
            .map(|user_id| vec![Command::StartDirect(user_id)])
            .map_err(|error| error.to_string()),
        "group" => parse_group(argument),
        "type" => Ok(vec![Command::Keystroke(argument.to_string())]),
        "send" if argument.is_empty() => Ok(vec![Command::SendDraft]),
        "send" => Ok(vec![
            Command::Keystroke(argument.to_string()),
            Command::Send(argument.to_string()),
        ]),
        "close" => Ok(vec![Command::Close]),
        "quit" | "exit" => Ok(vec![Command::Quit]),
        other => Err(format!("unknown command '/{other}'. {HELP}")),
    }
}

fn parse_open(argument: &str) -> Result<OpenTarget, String> {
    match argument.parse::<usize>() {
        Ok(0) => Err("chat positions start at 1".to_string()),
        Ok(position) => Ok(OpenTarget::Index(position - 1)),
        Err(_) => ConversationId::parse(argument)
            .map(OpenTarget::Id)
            .map_err(|error| error.to_string()),
    }
}

fn parse_group(argument: &str) -> Result<Vec<Command>, String> {
    let Some((name, members)) = argument.rsplit_once(' ') else {
        return Err("usage: /group <name> <userId,userId,...>".to_string());
    };
    let members = members
        .split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
        .map(UserId::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| error.to_string())?;

    Ok(vec![Command::CreateGroup {
        name: name.to_string(),
        members,
    }])
}

/// Prints what changed since the previous snapshot.
#[derive(Debug, Default)]
struct Renderer {
    chat_list: String,
    directory: String,
    conversation: Option<ConversationId>,
    shown_messages: usize,
    typing: Option<String>,
}

impl Renderer {
    fn render<L: RealtimeLink>(&mut self, session: &ChatSession<L>, notices: &[Notice]) {
        let chat_list = format_chat_list(session);
        if chat_list != self.chat_list {
            print!("{chat_list}");
            self.chat_list = chat_list;
        }

        let directory = format_directory(session);
        if directory != self.directory {
            print!("{directory}");
            self.directory = directory;
        }

        let me = &session.me().id;
        let active = session.active();
        if active.id() != self.conversation.as_ref() {
            self.conversation = active.id().cloned();
            self.shown_messages = 0;
            if let Some(conversation) = active.conversation() {
                println!("== {} ==", conversation.display_name(me));
            }
        }

        let messages = active.messages();
        if messages.len() < self.shown_messages {
            self.shown_messages = 0;
        }
        for message in &messages[self.shown_messages..] {
            println!("{}", format_message(message, me));
        }
        self.shown_messages = messages.len();

        let typing = session.typing_indicator(Instant::now());
        if typing != self.typing {
            if let Some(name) = &typing {
                println!("   {name} is typing...");
            }
            self.typing = typing;
        }

        for notice in notices {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warn",
                NoticeLevel::Error => "error",
            };
            println!("[{tag}] {}", notice.message);
        }
    }
}

fn format_chat_list<L: RealtimeLink>(session: &ChatSession<L>) -> String {
    if !session.chats().is_loaded() {
        return String::new();
    }

    let notifications = session.notifications();
    let mut rendered = match notifications.pending_count() {
        0 => String::from("-- chats --\n"),
        unread => format!("-- chats ({unread} unread) --\n"),
    };
    for (position, entry) in session.chat_entries().iter().enumerate() {
        let marker = match notifications.count_for(&entry.conversation.id) {
            0 => "   ".to_string(),
            count => format!("({count})"),
        };
        let preview = entry
            .conversation
            .preview
            .as_ref()
            .map(|preview| format!(": {}", preview.content))
            .unwrap_or_default();
        rendered.push_str(&format!(
            "{marker}{:>3}. {}{preview}\n",
            position + 1,
            entry.display_name
        ));
    }
    rendered
}

fn format_directory<L: RealtimeLink>(session: &ChatSession<L>) -> String {
    if session.directory().is_empty() {
        return String::new();
    }

    let mut rendered = String::from("-- users --\n");
    for user in session.directory() {
        rendered.push_str(&format!("  {} ({})\n", user.name, user.id));
    }
    rendered
}

fn format_message(message: &Message, me: &UserId) -> String {
    let author = if message.is_from(me) {
        "you"
    } else {
        message.sender.name.as_str()
    };
    format!(
        "[{}] {author}: {}",
        message.created_at.with_timezone(&chrono::Local).format("%H:%M"),
        message.content
    )
}

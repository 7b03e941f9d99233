//! Subcommand handlers. Each builds the services it needs over the shared
//! connection and prints plain text.

use crate::cli::{Commands, DeleteArgs, GraphCommand, NoteCommand, QueueCommand};
use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use log::info;
use rusqlite::Connection;
use std::io::{self, BufRead, Write};
use unchaos_core::model::location::{format_path, parse_path};
use unchaos_core::{
    read_capture_input, unit_of_work, AddSnippetOutcome, AppConfig, CaptureResult,
    CaptureSession, Confirmation, DeleteOutcome, LocationService, Note, NoteDetail, NoteId,
    NoteSelector, NoteService, OllamaProvider, QueueService, QueueStatus, SearchFilter,
    SqliteLocationRepository, SqliteNoteRepository, SqliteQueueRepository, TaskProcessor,
    TokenKind, TokenStore,
};

pub fn run(command: Commands, conn: &mut Connection, config: &AppConfig) -> Result<()> {
    let name = command_name(&command);
    let result = dispatch(command, conn, config);
    info!(
        "event=cli_command module=cli status={} command={name}",
        if result.is_ok() { "ok" } else { "error" }
    );
    result
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Note(_) => "note",
        Commands::Graph(_) => "graph",
        Commands::Queue(_) => "queue",
        Commands::Tags => "tags",
        Commands::Entities => "entities",
        Commands::Tokens => "tokens",
        Commands::Times => "times",
        Commands::Urls => "urls",
    }
}

fn dispatch(command: Commands, conn: &mut Connection, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Note(command) => run_note(command, conn),
        Commands::Graph(command) => run_graph(command, conn, config),
        Commands::Queue(command) => run_queue(command, conn, config),
        Commands::Tags => print_lines(TokenStore::try_new(conn)?.list_in_use(TokenKind::Tag)?),
        Commands::Entities => {
            print_lines(TokenStore::try_new(conn)?.list_in_use(TokenKind::Entity)?)
        }
        Commands::Urls => print_lines(TokenStore::try_new(conn)?.list_in_use(TokenKind::Url)?),
        Commands::Tokens => {
            for token in TokenStore::try_new(conn)?.list_tokens()? {
                println!("{:>5}  {}", token.id, token.value);
            }
            Ok(())
        }
        Commands::Times => {
            for time in TokenStore::try_new(conn)?.list_times_in_use()? {
                println!("{}  ({})", time.display_value(), time.literal);
            }
            Ok(())
        }
    }
}

fn note_service(conn: &Connection) -> Result<NoteService<SqliteNoteRepository<'_>>> {
    Ok(NoteService::new(SqliteNoteRepository::try_new(conn)?))
}

fn queue_service(
    conn: &Connection,
) -> Result<QueueService<SqliteQueueRepository<'_>, SqliteNoteRepository<'_>>> {
    Ok(QueueService::new(
        SqliteQueueRepository::try_new(conn)?,
        SqliteNoteRepository::try_new(conn)?,
    ))
}

fn location_service(conn: &Connection) -> Result<LocationService<SqliteLocationRepository<'_>>> {
    Ok(LocationService::new(SqliteLocationRepository::try_new(conn)?))
}

fn run_note(command: NoteCommand, conn: &mut Connection) -> Result<()> {
    match command {
        NoteCommand::New { title } => capture(conn, title.as_deref()),
        NoteCommand::Add { id, text } => {
            let note = NoteId(id);
            let outcome = unit_of_work(conn, |conn| -> Result<_> {
                let outcome = note_service(conn)?.add_snippet(note, &text.join(" "))?;
                queue_service(conn)?.enqueue(note)?;
                Ok(outcome)
            })?;
            match outcome {
                AddSnippetOutcome::TagsMerged { tags } => {
                    println!("note {note}: tagged {}", join(tags.iter()));
                }
                AddSnippetOutcome::SnippetAdded { .. } => println!("note {note}: snippet added"),
            }
            Ok(())
        }
        NoteCommand::Show { id } => {
            let notes = note_service(conn)?;
            let detail = notes.get_note(NoteId(id))?;
            let fields = notes.custom_fields(NoteId(id))?;
            print_detail(&detail);
            if !fields.is_empty() {
                println!("fields:    {}", serde_fields(&fields));
            }
            Ok(())
        }
        NoteCommand::Edit { id, ordinal, text } => {
            let note = NoteId(id);
            unit_of_work(conn, |conn| -> Result<_> {
                note_service(conn)?.edit_snippet(note, ordinal, &text.join(" "))?;
                queue_service(conn)?.enqueue(note)?;
                Ok(())
            })?;
            println!("note {note}: snippet {ordinal} updated");
            Ok(())
        }
        NoteCommand::RmSnippet { id, ordinal } => {
            note_service(conn)?.delete_snippet(NoteId(id), ordinal)?;
            println!("note {id}: snippet {ordinal} deleted");
            Ok(())
        }
        NoteCommand::List { all } => {
            for note in note_service(conn)?.list_notes(all)? {
                print_note_line(&note);
            }
            Ok(())
        }
        NoteCommand::Archive { id } => {
            note_service(conn)?.archive(NoteId(id))?;
            println!("note {id} archived");
            Ok(())
        }
        NoteCommand::Restore { id } => {
            note_service(conn)?.restore(NoteId(id))?;
            println!("note {id} restored");
            Ok(())
        }
        NoteCommand::Delete(args) => delete(conn, args),
        NoteCommand::Title { id, title } => {
            note_service(conn)?.set_title(NoteId(id), &title.join(" "))?;
            println!("note {id} renamed");
            Ok(())
        }
        NoteCommand::Field { id, key, value } => {
            note_service(conn)?.set_custom_field(NoteId(id), &key, &value)?;
            println!("note {id}: field `{}` set", key.trim());
            Ok(())
        }
        NoteCommand::Search { terms } => {
            let outcome = note_service(conn)?.search(&SearchFilter::parse(&terms))?;
            if outcome.unscoped {
                eprintln!("warning: no search terms given; listing every active note");
            }
            for note in &outcome.notes {
                print_note_line(note);
            }
            Ok(())
        }
    }
}

fn capture(conn: &mut Connection, title: Option<&str>) -> Result<()> {
    let mut session = CaptureSession::begin(conn, title)?;
    eprintln!(
        "capturing note {}; one snippet per line, end with Ctrl-D or `:save`, `:discard` to abandon",
        session.note()
    );
    let stdin = io::stdin();
    let outcome = read_capture_input(&mut session, stdin.lock(), io::stdout())?;
    match session.finish(outcome)? {
        CaptureResult::Saved { note, enqueued } => {
            println!("note {note} saved; {enqueued} enrichment task(s) queued");
        }
        CaptureResult::Discarded => println!("note discarded"),
        CaptureResult::Empty => println!("nothing captured"),
    }
    Ok(())
}

fn delete(conn: &Connection, args: DeleteArgs) -> Result<()> {
    let selector = match args.target.title {
        Some(title) => NoteSelector::Title(title),
        None => NoteSelector::Ids(args.target.ids.into_iter().map(NoteId).collect()),
    };

    let mut ask = |targets: &[Note]| -> bool {
        for note in targets {
            print_note_line(note);
        }
        confirm(&format!("delete {} note(s) permanently?", targets.len()))
    };
    let confirmation = if args.yes {
        Confirmation::Skip
    } else {
        Confirmation::Ask(&mut ask)
    };

    match note_service(conn)?.delete_notes(&selector, confirmation)? {
        DeleteOutcome::Deleted(ids) => println!("deleted {} note(s)", ids.len()),
        DeleteOutcome::Declined => println!("nothing deleted"),
        DeleteOutcome::NothingMatched => println!("no matching notes"),
    }
    Ok(())
}

fn run_graph(command: GraphCommand, conn: &Connection, config: &AppConfig) -> Result<()> {
    let locations = location_service(conn)?;
    match command {
        GraphCommand::Init { specs } => {
            let specs = if specs.is_empty() {
                config.location_roots.clone()
            } else {
                specs
            };
            if specs.is_empty() {
                bail!("no root specs given and `locations.roots` is empty in config");
            }
            let ensured = locations.init_roots(&specs)?;
            let created: usize = ensured.iter().map(|path| path.created).sum();
            println!("{} path(s) loaded, {created} node(s) created", ensured.len());
        }
        GraphCommand::Add { path } => {
            let segments = parse_path(&path.join(" "))?;
            let ensured = locations.ensure_path(&segments)?;
            println!("{} ({} node(s) created)", format_path(&segments), ensured.created);
        }
        GraphCommand::Show => print!("{}", locations.render()?),
        GraphCommand::Link { id, path } => {
            let segments = parse_path(&path.join(" "))?;
            let ensured = locations.ensure_path(&segments)?;
            if locations.link_note(NoteId(id), ensured.node)? {
                println!("note {id} placed at {}", format_path(&segments));
            } else {
                println!("note {id} is already at {}", format_path(&segments));
            }
        }
    }
    Ok(())
}

fn run_queue(command: QueueCommand, conn: &Connection, config: &AppConfig) -> Result<()> {
    match command {
        QueueCommand::List { status } => {
            let status = match status {
                Some(value) => match QueueStatus::from_db(&value.trim().to_ascii_lowercase()) {
                    Some(status) => Some(status),
                    None => bail!(
                        "unknown status `{value}`; expected pending|processing|completed|failed"
                    ),
                },
                None => None,
            };
            for entry in queue_service(conn)?.list(status)? {
                let details = entry.status_details.as_deref().unwrap_or("");
                println!(
                    "{:>5}  note {:<5} {:<16} {:<11} attempts={} {details}",
                    entry.id,
                    entry.note_id,
                    entry.task.label(),
                    entry.status.label(),
                    entry.attempts
                );
            }
        }
        QueueCommand::Add { id } => {
            let inserted = queue_service(conn)?.enqueue(NoteId(id))?;
            println!("{inserted} task(s) queued for note {id}");
        }
        QueueCommand::Clear => {
            let removed = queue_service(conn)?.clear()?;
            println!("{removed} entr(ies) removed");
        }
        QueueCommand::Run => {
            let provider = OllamaProvider::new(&config.llm)?;
            let report = TaskProcessor::try_new(conn, &provider)?.drain()?;
            println!(
                "{} completed, {} failed",
                report.completed,
                report.failed.len()
            );
            for (entry, reason) in &report.failed {
                println!("  entry {entry} failed: {reason}");
            }
            if let Some((entry, cause)) = &report.stopped {
                println!("stopped at entry {entry}; model server unavailable: {cause}");
            }
        }
    }
    Ok(())
}

fn print_note_line(note: &Note) {
    let marker = if note.active { "" } else { "  [archived]" };
    println!(
        "{:>5}  {}  {}{marker}",
        note.id,
        format_millis(note.updated_at),
        note.title
    );
}

fn print_detail(detail: &NoteDetail) {
    let note = &detail.note;
    let marker = if note.active { "" } else { " [archived]" };
    println!("note {}: {}{marker}", note.id, note.title);
    println!(
        "created {}, updated {}",
        format_millis(note.created_at),
        format_millis(note.updated_at)
    );
    for (position, snippet) in detail.snippets.iter().enumerate() {
        println!("{:>3}. {}", position + 1, snippet.content);
    }

    let times: Vec<String> = detail
        .times_all()
        .iter()
        .map(|time| time.display_value())
        .collect();
    print_set("tags", detail.tags_all().iter());
    print_set("entities", detail.entities_all().iter());
    print_set("times", times.iter());
    print_set("urls", detail.urls.iter());
    print_set("locations", detail.locations.iter());
}

fn print_set<'a>(label: &str, values: impl Iterator<Item = &'a String>) {
    let joined = join(values);
    if !joined.is_empty() {
        println!("{:<10} {joined}", format!("{label}:"));
    }
}

fn print_lines(values: Vec<String>) -> Result<()> {
    for value in values {
        println!("{value}");
    }
    Ok(())
}

fn join<'a>(values: impl Iterator<Item = &'a String>) -> String {
    values.map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn serde_fields(fields: &serde_json::Map<String, serde_json::Value>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn confirm(question: &str) -> bool {
    print!("{question} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

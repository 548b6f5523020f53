use std::env;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use writ_api::{NewEntity, WritApi};
use writ_core::ManagementAnswer;
use writ_types::{DocumentId, EntityId, EntityKind, WritConfig};

fn print_usage() {
    println!("writ-cli <command> [sqlite_path]");
    println!("commands:");
    println!("  issue <owner>");
    println!("  spawn <kind> <name> <species> <colour> [traits] [lifespan]");
    println!("    kind: animal | player | npc");
    println!("  skill <viewer> <score>");
    println!("  assign <performer> <writ> <entity>");
    println!("  show <viewer> <writ>");
    println!("  remove <viewer> <writ> <row>...");
    println!("  tick [n]");
    println!("  protected");
    println!("  a trailing non-numeric argument is taken as the sqlite path");
    println!("    default: $WRIT_SQLITE_PATH or writ.sqlite");
    println!("  $WRIT_CONFIG names an optional JSON config file");
}

fn parse_u64(value: Option<&String>, label: &str) -> Result<u64, String> {
    let raw = value.ok_or_else(|| format!("missing {}", label))?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid {}: {}", label, raw))
}

fn parse_text<'a>(value: Option<&'a String>, label: &str) -> Result<&'a str, String> {
    value
        .map(String::as_str)
        .ok_or_else(|| format!("missing {label}"))
}

fn parse_optional_u64(value: Option<&String>, label: &str, default: u64) -> Result<u64, String> {
    value
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| format!("invalid {label}: {raw}"))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

fn default_sqlite_path() -> String {
    env::var("WRIT_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "writ.sqlite".to_string())
}

/// Splits a trailing sqlite path off the operands. Operands past
/// `min_operands` that do not parse as numbers are treated as the path.
fn split_sqlite_path(operands: &[String], min_operands: usize) -> (Vec<String>, String) {
    match operands.split_last() {
        Some((last, rest))
            if operands.len() > min_operands
                && !last.trim().is_empty()
                && last.parse::<f64>().is_err() =>
        {
            (rest.to_vec(), last.clone())
        }
        _ => (operands.to_vec(), default_sqlite_path()),
    }
}

fn load_config() -> Result<WritConfig, String> {
    match env::var("WRIT_CONFIG") {
        Ok(path) if !path.trim().is_empty() => WritConfig::load(&path)
            .map_err(|err| format!("failed to load config {path}: {err}")),
        _ => Ok(WritConfig::default()),
    }
}

fn open_api(sqlite_path: &str) -> Result<WritApi, String> {
    let mut api = WritApi::from_config(load_config()?);
    api.attach_sqlite_store(PathBuf::from(sqlite_path))
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
    api.start()
        .map_err(|err| format!("failed to rebuild protection registry: {err}"))?;
    Ok(api)
}

fn min_operands(command: &str) -> usize {
    match command {
        "issue" => 1,
        "spawn" => 4,
        "skill" => 2,
        "assign" => 3,
        "show" => 2,
        "remove" => 3,
        _ => 0,
    }
}

fn run(command: &str, operands: &[String], api: &mut WritApi) -> Result<(), String> {
    match command {
        "issue" => {
            let owner = EntityId(parse_u64(operands.first(), "owner")?);
            let writ = api.issue_contract(owner).map_err(|err| err.to_string())?;
            println!(
                "issued writ={} owner={} value={}",
                writ,
                owner,
                api.config().contract_price_in_irons
            );
        }
        "spawn" => {
            let kind = parse_text(operands.first(), "kind")?
                .parse::<EntityKind>()
                .map_err(|err| format!("invalid kind: {err}"))?;
            let entity = NewEntity {
                kind,
                name: parse_text(operands.get(1), "name")?.to_string(),
                species: parse_text(operands.get(2), "species")?.to_string(),
                colour: parse_text(operands.get(3), "colour")?.to_string(),
                traits: parse_optional_u64(operands.get(4), "traits", 0)?,
                lifespan: u32::try_from(parse_optional_u64(operands.get(5), "lifespan", 0)?)
                    .map_err(|_| "lifespan out of range".to_string())?,
                owner_id: None,
            };
            let spawned = api.spawn_entity(&entity).map_err(|err| err.to_string())?;
            println!("spawned id={} kind={}", spawned.id, spawned.kind.as_str());
        }
        "skill" => {
            let viewer = EntityId(parse_u64(operands.first(), "viewer")?);
            let raw = parse_text(operands.get(1), "score")?;
            let score = raw
                .parse::<f64>()
                .map_err(|_| format!("invalid score: {raw}"))?;
            api.set_breeding_skill(viewer, score)
                .map_err(|err| err.to_string())?;
            println!("skill viewer={} breeding={}", viewer, score);
        }
        "assign" => {
            let performer = EntityId(parse_u64(operands.first(), "performer")?);
            let writ = DocumentId(parse_u64(operands.get(1), "writ")?);
            let target = EntityId(parse_u64(operands.get(2), "entity")?);
            let outcome = api
                .assign(performer, writ, target)
                .map_err(|err| err.to_string())?;
            match outcome.message() {
                Some(message) => println!("{message}"),
                None => println!("nothing to do"),
            }
        }
        "show" => {
            let viewer = EntityId(parse_u64(operands.first(), "viewer")?);
            let writ = DocumentId(parse_u64(operands.get(1), "writ")?);
            let view = api
                .management_view(viewer, writ)
                .map_err(|err| err.to_string())?;
            print!("{}", view.render_text());
        }
        "remove" => {
            let viewer = EntityId(parse_u64(operands.first(), "viewer")?);
            let writ = DocumentId(parse_u64(operands.get(1), "writ")?);
            let rows = operands[2..]
                .iter()
                .map(|raw| {
                    raw.parse::<usize>()
                        .map_err(|_| format!("invalid row: {raw}"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let messages = api
                .apply_management_answer(viewer, writ, &ManagementAnswer::removing(rows))
                .map_err(|err| err.to_string())?;
            for message in messages {
                println!("{message}");
            }
        }
        "tick" => {
            let ticks = parse_optional_u64(operands.first(), "n", 1)?;
            for _ in 0..ticks {
                let report = api.age_tick().map_err(|err| err.to_string())?;
                println!(
                    "tick={} polled={} vetoed={} aged={} expired={}",
                    report.tick,
                    report.polled,
                    report.vetoed,
                    report.commit.aged,
                    report.commit.expired.len()
                );
            }
        }
        "protected" => {
            for id in api.protected_entities() {
                println!("{id}");
            }
        }
        other => return Err(format!("unknown command: {other}")),
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        print_usage();
        std::process::exit(2);
    };
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let (operands, sqlite_path) = split_sqlite_path(&args[2..], min_operands(command));
    if operands.len() < min_operands(command) {
        eprintln!("error: {command} needs {} arguments", min_operands(command));
        print_usage();
        std::process::exit(2);
    }

    let mut api = match open_api(&sqlite_path) {
        Ok(api) => api,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(command, &operands, &mut api) {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
}

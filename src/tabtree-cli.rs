use anyhow::{Context, Result};
use egui::{pos2, vec2, Rect};
use std::env;
use std::path::{Path, PathBuf};
use tabtree::{
    render_outline, ContentId, GroupId, MemoryStore, NodeId, NodeSpec, NodeUpdate, Settings,
    Snapshot, TreeMutator,
};

type Mutator = TreeMutator<MemoryStore, MemoryStore>;

struct Cli {
    store_path: PathBuf,
    settings_path: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args() -> Result<Cli> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut store_path = None;
    let mut settings_path = None;
    let mut command = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--store" | "--settings" if command.is_empty() => {
                let flag = args[i].clone();
                i += 1;
                if i >= args.len() {
                    anyhow::bail!("{flag} requires a file path argument");
                }
                if flag == "--store" {
                    store_path = Some(PathBuf::from(&args[i]));
                } else {
                    settings_path = Some(PathBuf::from(&args[i]));
                }
            }
            "-h" | "--help" if command.is_empty() => {
                print_help();
                std::process::exit(0);
            }
            _ => command.push(args[i].clone()),
        }
        i += 1;
    }

    if command.is_empty() {
        print_help();
        anyhow::bail!("no command given");
    }

    let store_path = match store_path.or_else(Settings::default_store_path) {
        Some(path) => path,
        None => anyhow::bail!("no data directory available, pass --store <path>"),
    };

    Ok(Cli {
        store_path,
        settings_path,
        command,
    })
}

fn print_help() {
    println!("Tab Tree Command Line");
    println!("Usage: tabtree-cli [--store <FILE>] [--settings <FILE>] <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("  groups                                   List groups");
    println!("  group-add <name>                         Create a group");
    println!("  group-rename <id> <name>                 Rename a group");
    println!("  group-rm <id>                            Delete a group with all its tabs");
    println!("  show <group>                             Print the tab tree of a group");
    println!("  add <group> <title> <url> [--parent <id>]");
    println!("  edit <id> [--title <t>] [--url <u>]");
    println!("  move <id> (<parent>|root) [--unlocked]   Unlocked moves leave children behind");
    println!("  reorder <id> <target> (before|after)");
    println!("  rm <id> [--unlocked]                     Unlocked deletes promote children");
    println!("  bulk <group> <json-file> [--parent <id>]");
    println!("  drop <group> <dragged> <target> <relative-y> <row-height> [--unlocked]");
    println!("  note-add <tab> <text>");
    println!("  notes <tab>");
    println!("  note-rm <id>");
    println!();
    println!("Snapshots ending in .br are Brotli compressed.");
}

// ===== Argument helpers =====

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|a| a == flag) {
        Some(index) => {
            args.remove(index);
            true
        }
        None => false,
    }
}

fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(index) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if index + 1 >= args.len() {
        anyhow::bail!("{name} requires an argument");
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Ok(Some(value))
}

fn positional<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("missing <{what}>"))
}

fn parse_id<T: From<u64>>(args: &[String], index: usize, what: &str) -> Result<T> {
    let raw = positional(args, index, what)?;
    let value: u64 = raw
        .parse()
        .with_context(|| format!("<{what}> must be a number, got {raw:?}"))?;
    Ok(T::from(value))
}

// ===== Store handling =====

fn open_store(path: &Path, settings: &Settings) -> Result<MemoryStore> {
    if !path.exists() {
        return Ok(MemoryStore::with_settings(settings.clone()));
    }
    let snapshot = Snapshot::load(path)?;
    MemoryStore::from_snapshot(snapshot, settings.clone())
        .with_context(|| format!("Invalid snapshot: {}", path.display()))
}

fn open_group(store: &MemoryStore, settings: &Settings, group: GroupId) -> Result<Mutator> {
    store.group(group)?;
    Ok(TreeMutator::open(
        store.clone(),
        store.clone(),
        group,
        settings.clone(),
    )?)
}

fn open_tab_group(store: &MemoryStore, settings: &Settings, tab: NodeId) -> Result<Mutator> {
    let group = store.registry().group_of(tab)?;
    open_group(store, settings, group)
}

fn show(mutator: &mut Mutator) {
    print!("{}", render_outline(&mutator.forest()));
}

// ===== Commands =====

/// Runs one command.
///
/// # Returns
/// `true` when the store changed and must be saved.
fn run(store: &MemoryStore, settings: &Settings, command: &[String]) -> Result<bool> {
    let (name, rest) = command
        .split_first()
        .context("no command given")?;
    let mut args = rest.to_vec();

    match name.as_str() {
        "groups" => {
            for group in store.groups() {
                println!(
                    "{}\t{}\t{} tabs",
                    group.id,
                    group.name,
                    store.node_count(group.id)
                );
            }
            Ok(false)
        }
        "group-add" => {
            let group = store.create_group(positional(&args, 0, "name")?)?;
            println!("{}", group.id);
            Ok(true)
        }
        "group-rename" => {
            let id: GroupId = parse_id(&args, 0, "id")?;
            store.rename_group(id, positional(&args, 1, "name")?)?;
            Ok(true)
        }
        "group-rm" => {
            let id: GroupId = parse_id(&args, 0, "id")?;
            let removed = store.delete_group(id)?;
            println!("group {id} deleted with {removed} tabs");
            Ok(true)
        }
        "show" => {
            let mut mutator = open_group(store, settings, parse_id(&args, 0, "group")?)?;
            show(&mut mutator);
            Ok(false)
        }
        "add" => {
            let parent = take_option(&mut args, "--parent")?;
            let mut mutator = open_group(store, settings, parse_id(&args, 0, "group")?)?;
            let title = positional(&args, 1, "title")?;
            let url = positional(&args, 2, "url")?;
            let id = match parent {
                Some(raw) => {
                    let parent = NodeId(raw.parse().context("--parent must be a number")?);
                    mutator.create_child(parent, title, url)?
                }
                None => mutator.create_root(title, url)?,
            };
            println!("{id}");
            Ok(true)
        }
        "edit" => {
            let update = NodeUpdate {
                title: take_option(&mut args, "--title")?,
                url: take_option(&mut args, "--url")?,
            };
            let id: NodeId = parse_id(&args, 0, "id")?;
            open_tab_group(store, settings, id)?.update_node(id, &update)?;
            Ok(true)
        }
        "move" => {
            let unlocked = take_flag(&mut args, "--unlocked");
            let id: NodeId = parse_id(&args, 0, "id")?;
            let parent = match positional(&args, 1, "parent")? {
                "root" => None,
                _ => Some(parse_id(&args, 1, "parent")?),
            };
            let mut mutator = open_tab_group(store, settings, id)?;
            mutator.move_node(id, parent, !unlocked)?;
            show(&mut mutator);
            Ok(true)
        }
        "reorder" => {
            let id: NodeId = parse_id(&args, 0, "id")?;
            let target: NodeId = parse_id(&args, 1, "target")?;
            let after = match positional(&args, 2, "before|after")? {
                "before" => false,
                "after" => true,
                other => anyhow::bail!("expected before or after, got {other:?}"),
            };
            let mut mutator = open_tab_group(store, settings, id)?;
            mutator.reorder_node(id, target, after)?;
            show(&mut mutator);
            Ok(true)
        }
        "rm" => {
            let unlocked = take_flag(&mut args, "--unlocked");
            let id: NodeId = parse_id(&args, 0, "id")?;
            let mut mutator = open_tab_group(store, settings, id)?;
            mutator.delete_node(id, !unlocked)?;
            show(&mut mutator);
            Ok(true)
        }
        "bulk" => {
            let parent = take_option(&mut args, "--parent")?
                .map(|raw| raw.parse().map(NodeId).context("--parent must be a number"))
                .transpose()?;
            let mut mutator = open_group(store, settings, parse_id(&args, 0, "group")?)?;
            let file = positional(&args, 1, "json-file")?;
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read file: {file}"))?;
            let specs: Vec<NodeSpec> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse tab specs: {file}"))?;
            let created = mutator.bulk_insert(parent, &specs)?;
            println!(
                "{} tabs created",
                created.iter().map(|c| c.count()).sum::<usize>()
            );
            Ok(true)
        }
        "drop" => {
            let unlocked = take_flag(&mut args, "--unlocked");
            let mut mutator = open_group(store, settings, parse_id(&args, 0, "group")?)?;
            let dragged: NodeId = parse_id(&args, 1, "dragged")?;
            let target: NodeId = parse_id(&args, 2, "target")?;
            let relative_y: f32 = positional(&args, 3, "relative-y")?
                .parse()
                .context("<relative-y> must be a number")?;
            let row_height: f32 = positional(&args, 4, "row-height")?
                .parse()
                .context("<row-height> must be a number")?;

            if unlocked && mutator.is_locked(dragged)? {
                mutator.toggle_lock(dragged)?;
            }
            mutator.begin_drag(dragged)?;
            let row = Rect::from_min_size(pos2(0.0, 0.0), vec2(1.0, row_height));
            mutator.hover(target, pos2(0.0, relative_y), row)?;
            let outcome = mutator.end_drag()?;
            println!(
                "{:?} {} (moved: {}, reordered: {})",
                outcome.intent.placement, outcome.intent.target, outcome.moved, outcome.reordered
            );
            show(&mut mutator);
            Ok(true)
        }
        "note-add" => {
            let tab: NodeId = parse_id(&args, 0, "tab")?;
            let note = store.add_content(tab, &args[1..].join(" "))?;
            println!("{}", note.id);
            Ok(true)
        }
        "notes" => {
            let tab: NodeId = parse_id(&args, 0, "tab")?;
            for note in store.contents_of(tab) {
                println!("{}\t{}", note.id, note.text);
            }
            Ok(false)
        }
        "note-rm" => {
            let id: ContentId = parse_id(&args, 0, "id")?;
            store.delete_content(id)?;
            Ok(true)
        }
        other => anyhow::bail!("unknown command {other:?}, see --help"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args()?;
    let settings = Settings::load(cli.settings_path.as_deref());
    let store = open_store(&cli.store_path, &settings)?;

    if run(&store, &settings, &cli.command)? {
        store.snapshot().save(&cli.store_path)?;
    }
    Ok(())
}

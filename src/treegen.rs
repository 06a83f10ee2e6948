use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::env;
use std::path::PathBuf;
use tabtree::{ApiClient, MemoryStore, NodeSpec, Settings};

// Topics for generated titles - (title word, host)
const TOPICS: &[(&str, &str)] = &[
    ("Rust", "doc.rust-lang.org"),
    ("Tokio", "tokio.rs"),
    ("Serde", "serde.rs"),
    ("Egui", "docs.rs"),
    ("Crates", "crates.io"),
    ("Compiler", "rustc-dev-guide.rust-lang.org"),
    ("Kernel", "kernel.org"),
    ("Postgres", "postgresql.org"),
    ("Wasm", "webassembly.org"),
    ("Linux", "lwn.net"),
];

const KINDS: &[&str] = &[
    "guide", "reference", "issue", "notes", "tutorial", "release", "blog", "forum", "talk", "paper",
];

const GROUP_NAMES: &[&str] = &["Reading", "Work", "Research", "Later", "Projects", "Archive"];

struct Config {
    num_groups: usize,
    num_roots: usize,
    depth: usize,
    fanout: usize,
    seed: u64,
    output_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_groups: 2,
            num_roots: 5,
            depth: 3,
            fanout: 3,
            seed: 42,
            output_file: None,
        }
    }
}

fn parse_args() -> Result<Config> {
    let args: Vec<String> = env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-groups" | "-roots" | "-depth" | "-fanout" | "-seed" | "-out" => {
                i += 1;
                if i >= args.len() {
                    anyhow::bail!("{flag} requires an argument");
                }
                let value = &args[i];
                match flag {
                    "-groups" => config.num_groups = value.parse()?,
                    "-roots" => config.num_roots = value.parse()?,
                    "-depth" => config.depth = value.parse()?,
                    "-fanout" => config.fanout = value.parse()?,
                    "-seed" => config.seed = value.parse()?,
                    _ => config.output_file = Some(value.clone()),
                }
            }
            "-h" | "-help" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Warning: Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    if config.depth == 0 {
        anyhow::bail!("-depth must be at least 1");
    }
    Ok(config)
}

fn print_help() {
    println!("Tab Tree Demo Generator");
    println!("Usage: tabtree-gen [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -groups <N>            Number of groups (default: 2)");
    println!("  -roots <N>             Root tabs per group (default: 5)");
    println!("  -depth <N>             Tree levels, roots included (default: 3)");
    println!("  -fanout <N>            Maximum children per tab (default: 3)");
    println!("  -seed <N>              Random seed (default: 42)");
    println!("  -out <FILE>            Output snapshot (default: tabs.json, *.br compresses)");
    println!("  -h, -help, --help      Show this help message");
}

fn random_spec(rng: &mut StdRng, levels_left: usize, fanout: usize) -> NodeSpec {
    let (topic, host) = TOPICS[rng.gen_range(0..TOPICS.len())];
    let kind = KINDS[rng.gen_range(0..KINDS.len())];
    let page: u32 = rng.gen_range(1..1000);

    let children = if levels_left > 1 {
        let count = rng.gen_range(0..=fanout);
        (0..count)
            .map(|_| random_spec(rng, levels_left - 1, fanout))
            .collect()
    } else {
        Vec::new()
    };

    NodeSpec::leaf(
        format!("{topic} {kind} {page}"),
        format!("https://{host}/{kind}/{page}"),
    )
    .with_children(children)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = parse_args()?;
    let settings = Settings::default();
    let depth = config.depth.min(settings.max_depth);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let store = MemoryStore::with_settings(settings);
    let mut total = 0;
    for g in 0..config.num_groups {
        let name = format!("{} {}", GROUP_NAMES[g % GROUP_NAMES.len()], g + 1);
        let group = store.create_group(&name)?;
        if config.num_roots == 0 {
            continue;
        }

        let specs: Vec<NodeSpec> = (0..config.num_roots)
            .map(|_| random_spec(&mut rng, depth, config.fanout))
            .collect();
        let created = store
            .bulk_create(group.id, None, &specs)
            .with_context(|| format!("Failed to populate group {}", group.name))?;
        total += created.iter().map(|c| c.count()).sum::<usize>();
    }

    let output_path = PathBuf::from(config.output_file.unwrap_or_else(|| "tabs.json".to_string()));
    store.snapshot().save(&output_path)?;
    println!(
        "{} groups with {} tabs written to: {}",
        config.num_groups,
        total,
        output_path.display()
    );

    Ok(())
}

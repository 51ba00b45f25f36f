//! pkv CLI - Command line interface for patricia_kv
//!
//! Keeps a key-value set in a state file and exposes the trie operations,
//! root hashes and proofs as JSON so other tools can script against them.

use clap::{Parser, Subcommand};
use patricia_kv::{
    verify_proof, Blake3, Database, Hash, MemoryStore, NodeHasher, Proof, Sha256, Trie,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pkv")]
#[command(about = "An authenticated key-value store on a Merkle Patricia trie")]
#[command(version)]
struct Cli {
    /// Path to the state file
    #[arg(short, long, default_value = "state.pkv")]
    state: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Hash function for node addresses
    #[arg(long, default_value = "blake3")]
    hash: HashAlgorithm,

    /// Read and print keys and values as hex instead of UTF-8
    #[arg(long)]
    hex: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum HashAlgorithm {
    Blake3,
    Sha256,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an empty state file
    Init,

    /// Insert or overwrite a key
    Put {
        /// The key
        key: String,
        /// The value
        value: String,
    },

    /// Get the value of a key
    Get {
        /// The key
        key: String,
    },

    /// Delete a key
    Delete {
        /// The key
        key: String,
    },

    /// Print the current root hash
    Root,

    /// List key-value pairs
    List {
        /// Only keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Produce a proof of a key's value or absence
    Prove {
        /// The key
        key: String,
    },

    /// Check a proof against a root hash
    Verify {
        /// Root hash (hex)
        root: String,
        /// The key
        key: String,
        /// Expected value; omit to check absence
        value: Option<String>,
        /// Proof nodes (hex), root first
        #[arg(short, long = "node", required = true)]
        nodes: Vec<String>,
    },

    /// Walk through a small account-balance scenario in memory
    Demo,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.hash {
        HashAlgorithm::Blake3 => run::<Blake3>(&cli),
        HashAlgorithm::Sha256 => run::<Sha256>(&cli),
    }
}

fn run<H: NodeHasher>(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init => {
            let db = Database::<H>::create(&cli.state)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created state file at {}", db.path().display()),
                    "hasher": H::NAME,
                    "root": db.root_hash().to_hex()
                }),
            )?;
        }

        Commands::Put { key, value } => {
            let mut db = open_db::<H>(&cli.state)?;
            let root = db.put(&parse_bytes(key, cli.hex)?, &parse_bytes(value, cli.hex)?)?;
            if db.is_dirty() {
                db.sync()?;
            }
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Get { key } => {
            let db = open_db::<H>(&cli.state)?;
            match db.get(&parse_bytes(key, cli.hex)?)? {
                Some(value) => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "key": key,
                            "value": render(&value, cli.hex),
                            "root": db.root_hash().to_hex()
                        }),
                    )?;
                }
                None => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "status": "error",
                            "message": format!("Key not found: {}", key)
                        }),
                    )?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Delete { key } => {
            let mut db = open_db::<H>(&cli.state)?;
            let removed = db.delete(&parse_bytes(key, cli.hex)?)?;
            if db.is_dirty() {
                db.sync()?;
            }
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key,
                    "deleted": removed.is_some(),
                    "previous": removed.map(|v| render(&v, cli.hex)),
                    "root": db.root_hash().to_hex()
                }),
            )?;
        }

        Commands::Root => {
            let db = open_db::<H>(&cli.state)?;
            output(
                cli.format,
                &serde_json::json!({
                    "root": db.root_hash().to_hex(),
                    "hasher": H::NAME
                }),
            )?;
        }

        Commands::List { prefix } => {
            let db = open_db::<H>(&cli.state)?;
            let prefix = match prefix {
                Some(p) => parse_bytes(p, cli.hex)?,
                None => Vec::new(),
            };
            let items: Vec<_> = db
                .entries(&prefix)?
                .iter()
                .map(|(k, v)| {
                    serde_json::json!({
                        "key": render(k, cli.hex),
                        "value": render(v, cli.hex)
                    })
                })
                .collect();
            output(
                cli.format,
                &serde_json::json!({
                    "count": items.len(),
                    "root": db.root_hash().to_hex(),
                    "entries": items
                }),
            )?;
        }

        Commands::Prove { key } => {
            let db = open_db::<H>(&cli.state)?;
            let key_bytes = parse_bytes(key, cli.hex)?;
            let value = db.get(&key_bytes)?;
            let proof = db.generate_proof(&key_bytes)?;
            output(
                cli.format,
                &serde_json::json!({
                    "key": key,
                    "value": value.map(|v| render(&v, cli.hex)),
                    "root": db.root_hash().to_hex(),
                    "hasher": H::NAME,
                    "nodes": proof.to_hex()
                }),
            )?;
        }

        Commands::Verify {
            root,
            key,
            value,
            nodes,
        } => {
            let root_hash = Hash::from_hex(root)?;
            let proof = Proof::from_hex(nodes)?;
            let value = value.as_deref().map(|v| parse_bytes(v, cli.hex)).transpose()?;
            let valid = verify_proof::<H>(
                &root_hash,
                &parse_bytes(key, cli.hex)?,
                value.as_deref(),
                &proof,
            );
            output(
                cli.format,
                &serde_json::json!({
                    "valid": valid,
                    "key": key,
                    "root": root_hash.to_hex()
                }),
            )?;
            if !valid {
                std::process::exit(1);
            }
        }

        Commands::Demo => {
            let mut trie = Trie::<MemoryStore, H>::with_hasher(MemoryStore::new());
            trie.put(b"0xA", b"100")?;
            trie.put(b"0xB", b"200")?;
            trie.put(b"0xC", b"300")?;
            let initial = snapshot_json(&trie, "initial balances")?;

            trie.put(b"0xB", b"250")?;
            let updated = snapshot_json(&trie, "after updating 0xB")?;

            output(
                cli.format,
                &serde_json::json!({
                    "hasher": H::NAME,
                    "steps": [initial, updated]
                }),
            )?;
        }
    }

    Ok(())
}

fn open_db<H: NodeHasher>(path: &Path) -> anyhow::Result<Database<H>> {
    let db = Database::open_or_create(path)?;
    Ok(db)
}

fn snapshot_json<H: NodeHasher>(
    trie: &Trie<MemoryStore, H>,
    label: &str,
) -> anyhow::Result<serde_json::Value> {
    let store: serde_json::Map<String, serde_json::Value> = trie
        .entries()?
        .into_iter()
        .map(|(k, v)| {
            (
                String::from_utf8_lossy(&k).into_owned(),
                serde_json::Value::String(String::from_utf8_lossy(&v).into_owned()),
            )
        })
        .collect();
    Ok(serde_json::json!({
        "label": label,
        "store": store,
        "root": trie.root_hash().to_hex()
    }))
}

fn parse_bytes(input: &str, as_hex: bool) -> anyhow::Result<Vec<u8>> {
    if as_hex {
        hex::decode(input.trim_start_matches("0x"))
            .map_err(|e| anyhow::anyhow!("Invalid hex {}: {}", input, e))
    } else {
        Ok(input.as_bytes().to_vec())
    }
}

fn render(bytes: &[u8], as_hex: bool) -> String {
    if as_hex {
        hex::encode(bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn output(format: OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

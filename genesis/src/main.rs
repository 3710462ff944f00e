// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - CONSORTIUM BOOTSTRAP GENERATOR
//
// Emits the initial validator set for a new consortium:
// - validators.toml   bootstrap set consumed by the coordinator node
// - validator-N.key   hex secp256k1 secret, one file per validator
//
// Usage: consortium_generator [count] [output-dir]
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_VALIDATOR_COUNT: usize = 4;
const DEFAULT_OUTPUT_DIR: &str = "consortium";

#[derive(Serialize)]
struct BootstrapFile {
    validators: Vec<BootstrapEntry>,
}

#[derive(Serialize)]
struct BootstrapEntry {
    address: String,
    public_key: String,
    voting_power: u64,
    active: bool,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let count: usize = args
        .get(1)
        .map(|v| v.parse().expect("count must be a number"))
        .unwrap_or(DEFAULT_VALIDATOR_COUNT);
    let out_dir = PathBuf::from(
        args.get(2)
            .map(String::as_str)
            .unwrap_or(DEFAULT_OUTPUT_DIR),
    );

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║  INTERCLEAR CONSORTIUM BOOTSTRAP GENERATOR           ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!("validators: {}", count);
    println!("output:     {}\n", out_dir.display());

    assert!(count >= 1, "a consortium needs at least one validator");
    if let Err(e) = generate(count, &out_dir) {
        eprintln!("generation failed: {}", e);
        std::process::exit(1);
    }

    // t = ⌈2n/3⌉
    let threshold = (2 * count + 2) / 3;
    println!("\nDone. Initial threshold will be {} of {}.", threshold, count);
    println!("Point the coordinator at {}/validators.toml", out_dir.display());
    println!("and give each signing node its validator-N.key file.");
}

fn generate(count: usize, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(out_dir)?;

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let pair = icl_crypto::generate_keypair();
        let address = icl_crypto::derive_address(&pair.public_key)?;

        let key_path = out_dir.join(format!("validator-{}.key", index));
        fs::write(&key_path, format!("{}\n", hex::encode(&pair.secret_key)))?;

        println!("validator {}: {}", index, address);
        entries.push(BootstrapEntry {
            address,
            public_key: hex::encode(&pair.public_key),
            voting_power: 1,
            active: true,
        });
    }

    let bootstrap = BootstrapFile { validators: entries };
    let set_path = out_dir.join("validators.toml");
    fs::write(&set_path, toml::to_string_pretty(&bootstrap)?)?;
    println!("\nwrote {}", set_path.display());
    Ok(())
}

//! Passage package tool
//!
//! Usage: pkgtool <COMMAND>
//!
//! Commands:
//!   keygen <public.key> <private.key>
//!   pack   <data-file> <public.key> <private.key> <out.pkg>
//!   unpack <in.pkg> <public.key> <out-file>

use std::env;
use std::fs;
use std::io;

use anyhow::Context;

use passage::{generate_keys, streaming_read_package, write_package};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "keygen" => {
            if args.len() != 4 {
                eprintln!("Error: keygen takes <public.key> <private.key>");
                print_usage();
                return Ok(());
            }
            keygen(&args[2], &args[3])?;
        }
        "pack" => {
            if args.len() != 6 {
                eprintln!("Error: pack takes <data-file> <public.key> <private.key> <out.pkg>");
                print_usage();
                return Ok(());
            }
            pack(&args[2], &args[3], &args[4], &args[5])?;
        }
        "unpack" => {
            if args.len() != 5 {
                eprintln!("Error: unpack takes <in.pkg> <public.key> <out-file>");
                print_usage();
                return Ok(());
            }
            unpack(&args[2], &args[3], &args[4])?;
        }
        "-h" | "--help" => {
            print_usage();
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"pkgtool - authenticated data package tool

USAGE:
    pkgtool keygen <public.key> <private.key>
        Generate a signing key pair and write it to the given files.

    pkgtool pack <data-file> <public.key> <private.key> <out.pkg>
        Sign the contents of <data-file> and write a compressed package.

    pkgtool unpack <in.pkg> <public.key> <out-file>
        Verify a package and stream its payload to <out-file>.
"#
    );
}

fn keygen(public_path: &str, private_path: &str) -> anyhow::Result<()> {
    tracing::info!("generating RSA-4096 key pair (this can take a while)");
    let (public_key, private_key) = generate_keys()?;

    fs::write(public_path, &public_key)
        .with_context(|| format!("writing {}", public_path))?;
    fs::write(private_path, &private_key)
        .with_context(|| format!("writing {}", private_path))?;

    tracing::info!("wrote {} and {}", public_path, private_path);
    Ok(())
}

fn pack(data_path: &str, public_path: &str, private_path: &str, out_path: &str) -> anyhow::Result<()> {
    let data = fs::read_to_string(data_path).with_context(|| format!("reading {}", data_path))?;
    let public_key = read_key(public_path)?;
    let private_key = read_key(private_path)?;

    let package = write_package(&data, &public_key, &private_key)?;
    fs::write(out_path, &package).with_context(|| format!("writing {}", out_path))?;

    tracing::info!(
        "packaged {} bytes of data into {} ({} bytes compressed)",
        data.len(),
        out_path,
        package.len()
    );
    Ok(())
}

fn unpack(package_path: &str, public_path: &str, out_path: &str) -> anyhow::Result<()> {
    let public_key = read_key(public_path)?;

    let mut payload = streaming_read_package(package_path, &public_key)
        .with_context(|| format!("verifying {}", package_path))?;
    let mut out = fs::File::create(out_path).with_context(|| format!("creating {}", out_path))?;
    let copied = io::copy(&mut payload, &mut out)?;

    tracing::info!("verified {} and wrote {} payload bytes", package_path, copied);
    Ok(())
}

fn read_key(path: &str) -> anyhow::Result<String> {
    let key = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    Ok(key.trim().to_string())
}

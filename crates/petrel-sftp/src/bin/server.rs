//! SFTP subsystem server binary
//!
//! Speaks SFTP v3 on stdin/stdout. Intended to be named as the "sftp"
//! subsystem command of an SSH server; running it by hand only makes
//! sense under a driver that frames packets. Logging goes to stderr so
//! the protocol stream stays clean.

use std::fs::File;
use std::os::fd::FromRawFd;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use petrel_sftp::serve;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Raw descriptors rather than std's buffered stdin: frame reads are
    // paced by poll(2), which must see exactly what the kernel has
    let mut reader = unsafe { File::from_raw_fd(libc::STDIN_FILENO) };
    let mut writer = unsafe { File::from_raw_fd(libc::STDOUT_FILENO) };

    serve(&mut reader, &mut writer).context("SFTP session failed")
}

//! myfs command-line harness.
//!
//! Mounts a fresh in-memory filesystem, runs a small command script
//! against it, then unmounts. Useful for poking at engine behaviour by hand.
//!
//! Usage:
//!   # Commands from stdin
//!   echo 'mkdir /a
//!   write /a/f hello
//!   cat /a/f' | cargo run -p myfs-cli
//!
//!   # Commands from a file, with mount options
//!   cargo run -p myfs-cli -- -o rsize=8192,wsize=8192 script.txt
//!
//! Commands (one per line, `#` starts a comment):
//!   mkdir PATH | touch PATH | write PATH TEXT | append PATH TEXT
//!   cat PATH | ls PATH | rm PATH | rmdir PATH | mv FROM TO
//!   ln TARGET PATH | symlink TARGET PATH | readlink PATH
//!   truncate PATH SIZE | stat PATH | statfs

use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use myfs_core::{Engine, FS_TYPE, FsTypeRegistry, Handle};

/// Drive an in-memory myfs mount from a command script.
#[derive(Parser, Debug)]
#[command(name = "myfs")]
#[command(about = "Run a command script against an in-memory myfs mount")]
struct Args {
    /// Mount options, e.g. `rsize=8192,wsize=8192`
    #[arg(short, long, default_value = "")]
    options: String,

    /// Script file (reads stdin when omitted)
    script: Option<PathBuf>,

    /// Stop at the first failing command
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let registry = FsTypeRegistry::new();
    registry.register(FS_TYPE)?;
    let fs = registry.mount(FS_TYPE.name, &args.options)?;
    for warning in fs.mount_warnings() {
        eprintln!("warning: {warning}");
    }

    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("opening script {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failures = 0usize;
    for (lineno, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(e) = run_command(&fs, line, &mut out) {
            failures += 1;
            eprintln!("line {}: {line}: {e:#}", lineno + 1);
            if args.strict {
                break;
            }
        }
    }
    out.flush()?;
    drop(out);

    let stats = fs.unmount();
    tracing::info!(
        released = stats.released,
        outstanding_handles = stats.outstanding_handles,
        failures,
        "done"
    );
    if failures > 0 && args.strict {
        bail!("{failures} command(s) failed");
    }
    Ok(())
}

/// Split `/a/b/c` into (`/a/b`, `c`).
fn split_parent(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) if !name.is_empty() => Ok((parent, name)),
        None if !trimmed.is_empty() => Ok(("", trimmed)),
        _ => bail!("path has no final component: {path:?}"),
    }
}

fn parent_of<'a>(fs: &Engine, path: &'a str) -> Result<(Handle, &'a str)> {
    let (parent, name) = split_parent(path)?;
    let dir = fs
        .resolve(parent)
        .with_context(|| format!("resolving {parent:?}"))?;
    Ok((dir, name))
}

fn run_command(fs: &Engine, line: &str, out: &mut impl Write) -> Result<()> {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match cmd {
        "mkdir" => {
            let (dir, name) = parent_of(fs, rest)?;
            fs.mkdir(dir.id(), name, 0o755)?;
        }
        "touch" => {
            let (dir, name) = parent_of(fs, rest)?;
            if fs.lookup(dir.id(), name).is_err() {
                fs.create(dir.id(), name, 0o644)?;
            }
        }
        "write" | "append" => {
            let (path, text) = rest.split_once(' ').unwrap_or((rest, ""));
            let (dir, name) = parent_of(fs, path)?;
            let file = match fs.lookup(dir.id(), name) {
                Ok(h) => h,
                Err(_) => fs.create(dir.id(), name, 0o644)?,
            };
            let offset = if cmd == "append" {
                fs.getattr(file.id())?.size
            } else {
                fs.truncate(file.id(), 0)?;
                0
            };
            fs.write(file.id(), offset, text.as_bytes())?;
        }
        "cat" => {
            let file = fs.resolve(rest)?;
            let size = fs.getattr(file.id())?.size as usize;
            let data = fs.read(file.id(), 0, size)?;
            out.write_all(&data)?;
            writeln!(out)?;
        }
        "ls" => {
            let dir = fs.resolve(rest)?;
            for entry in fs.readdir(dir.id())? {
                writeln!(out, "{:<10} {:>6} {}", entry.kind, entry.id.0, entry.name)?;
            }
        }
        "rm" => {
            let (dir, name) = parent_of(fs, rest)?;
            fs.unlink(dir.id(), name)?;
        }
        "rmdir" => {
            let (dir, name) = parent_of(fs, rest)?;
            fs.rmdir(dir.id(), name)?;
        }
        "mv" => {
            let (from, to) = rest.split_once(' ').context("usage: mv FROM TO")?;
            let (src_dir, src_name) = parent_of(fs, from)?;
            let (dst_dir, dst_name) = parent_of(fs, to.trim())?;
            fs.rename(src_dir.id(), src_name, dst_dir.id(), dst_name)?;
        }
        "ln" => {
            let (target, path) = rest.split_once(' ').context("usage: ln TARGET PATH")?;
            let node = fs.resolve(target)?;
            let (dir, name) = parent_of(fs, path.trim())?;
            fs.link(node.id(), dir.id(), name)?;
        }
        "symlink" => {
            let (target, path) = rest
                .split_once(' ')
                .context("usage: symlink TARGET PATH")?;
            let (dir, name) = parent_of(fs, path.trim())?;
            fs.symlink(dir.id(), name, target)?;
        }
        "readlink" => {
            let link = fs.resolve(rest)?;
            writeln!(out, "{}", fs.readlink(link.id())?)?;
        }
        "truncate" => {
            let (path, size) = rest.split_once(' ').context("usage: truncate PATH SIZE")?;
            let size: u64 = size.trim().parse().context("size must be an integer")?;
            let file = fs.resolve(path)?;
            fs.truncate(file.id(), size)?;
        }
        "stat" => {
            let node = fs.resolve(rest)?;
            let attr = fs.getattr(node.id())?;
            writeln!(out, "{}", serde_json::to_string(&attr)?)?;
        }
        "statfs" => {
            writeln!(out, "{}", serde_json::to_string(&fs.statfs())?)?;
        }
        other => bail!("unknown command: {other}"),
    }
    Ok(())
}

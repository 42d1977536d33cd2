use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use zipcrack::CrackError;

#[derive(Parser)]
#[command(name = "zipcrack", about = "Recover passwords for ZipCrypto-protected archives")]
struct Cli {
    /// Archive to attack.
    archive: PathBuf,

    /// Name of the entry to attack. Defaults to the first encrypted entry.
    #[arg(long)]
    entry: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exhaustively try every password in a length range over a charset.
    Bruteforce {
        /// Characters to draw candidate passwords from.
        #[arg(long, default_value = " !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~")]
        charset: String,

        #[arg(long, default_value_t = 1)]
        min_len: usize,

        #[arg(long, default_value_t = 8)]
        max_len: usize,

        /// Worker streams to partition the search space across. Defaults
        /// to the number of available CPUs.
        #[arg(long)]
        streams: Option<usize>,
    },
    /// Try every line of a wordlist as a candidate password.
    Dictionary {
        /// Path to a wordlist, one candidate per line. Gzip-decompressed
        /// automatically if the name ends in `.gz`.
        wordlist: PathBuf,
    },
    /// Recover the password from known plaintext at the start of the entry.
    Plaintext {
        /// Path to a file containing the known plaintext bytes.
        known_plaintext: PathBuf,

        #[arg(long, default_value_t = 6)]
        max_password_len: usize,
    },
    /// Recover the password directly from an already-known internal
    /// representation (key0/key1/key2), skipping the known-plaintext attack.
    /// Each key may be given in decimal or `0x`-prefixed hexadecimal.
    PasswordFromInternalRep {
        #[arg(value_parser = parse_u32)]
        key0: u32,
        #[arg(value_parser = parse_u32)]
        key1: u32,
        #[arg(value_parser = parse_u32)]
        key2: u32,

        #[arg(long, default_value_t = 6)]
        max_password_len: usize,
    },
    /// Check whether a specific password opens the entry.
    Check {
        password: String,
    },
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::from(2)
        }
    }
}

/// Returns `Ok(true)` when a password was found (and prints it),
/// `Ok(false)` when the search completed without finding one.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let streams_default = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let result = match cli.command {
        Command::Bruteforce {
            charset,
            min_len,
            max_len,
            streams,
        } => zipcrack::session::bruteforce(
            &cli.archive,
            cli.entry.as_deref(),
            charset.as_bytes(),
            min_len,
            max_len,
            streams.unwrap_or(streams_default),
        ),
        Command::Dictionary { wordlist } => {
            let candidates = read_wordlist(&wordlist)?;
            zipcrack::session::dictionary(&cli.archive, cli.entry.as_deref(), &candidates)
        }
        Command::Plaintext {
            known_plaintext,
            max_password_len,
        } => {
            let known = std::fs::read(&known_plaintext)
                .with_context(|| format!("reading known-plaintext file {known_plaintext:?}"))?;
            zipcrack::session::plaintext(&cli.archive, cli.entry.as_deref(), &known, max_password_len)
        }
        Command::PasswordFromInternalRep {
            key0,
            key1,
            key2,
            max_password_len,
        } => zipcrack::session::from_internal_rep(key0, key1, key2, max_password_len),
        Command::Check { password } => {
            let ok = zipcrack::session::check(&cli.archive, cli.entry.as_deref(), password.as_bytes())
                .context("checking password")?;
            if ok {
                println!("{password}");
            }
            return Ok(ok);
        }
    };

    match result {
        Ok(password) => {
            println!("{}", String::from_utf8_lossy(&password));
            Ok(true)
        }
        Err(CrackError::NotFound) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_wordlist(path: &PathBuf) -> anyhow::Result<Vec<Vec<u8>>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening wordlist {path:?}"))?;
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        zipcrack::dictionary::read_candidates_gz(file).context("reading gzip wordlist")
    } else {
        zipcrack::dictionary::read_candidates(std::io::BufReader::new(file)).context("reading wordlist")
    }
}

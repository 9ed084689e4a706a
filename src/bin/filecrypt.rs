//! filecrypt CLI - Passphrase-based file encryption
//!
//! Command-line interface for encrypting files into self-describing
//! AES-256-CBC containers with PBKDF2-SHA256 key derivation.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use filecrypt::params::{self, EncryptionParameters, Preset};
use filecrypt::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use filecrypt::{EncryptionService, FilecryptError};

#[derive(Parser)]
#[command(name = "filecrypt")]
#[command(version)]
#[command(about = "Passphrase-based file encryption.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// PBKDF2 iteration count for new containers (10000-1000000)
    #[arg(long, global = true, value_parser = parse_iterations, conflicts_with = "preset")]
    iterations: Option<u32>,

    /// Named iteration preset for new containers (see `presets`)
    #[arg(long, global = true, value_parser = parse_preset)]
    preset: Option<Preset>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the container to [default: INPUT.encrypted]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Decrypt a file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the container to decrypt
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the plaintext to [default: original name next to
        /// INPUT]. Existing files are never replaced; a numbered name is
        /// used instead.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Check that a container decrypts with the given passphrase
    Verify {
        /// Path to the container to verify
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Only parse the header and derive the key. Much faster, but it
        /// cannot actually reject a wrong passphrase.
        #[arg(long)]
        quick: bool,
    },

    /// Guess whether files are containers
    Detect {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Show container metadata without decrypting
    Info {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Encrypt several files into a directory
    Batch {
        /// Directory to write containers to (created if missing)
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,

        #[arg(required = true, value_name = "FILE")]
        inputs: Vec<PathBuf>,
    },

    /// List iteration presets
    Presets {
        /// Suggest a preset for this file
        #[arg(long = "for", value_name = "FILE")]
        for_file: Option<PathBuf>,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, FilecryptError> {
    let params = match (cli.iterations, cli.preset) {
        (Some(iterations), _) => EncryptionParameters::default().with_iterations(iterations),
        (None, Some(preset)) => EncryptionParameters::from_preset(preset),
        (None, None) => EncryptionParameters::default(),
    };
    let service = EncryptionService::new(params)?;

    match cli.command {
        Commands::Encrypt { input, output } => {
            let password = get_passphrase_reader(cli.passphrase_stdin).read_passphrase()?;
            let written = service.encrypt_file(&input, &password, output.as_deref(), false)?;
            println!("{}", written.display());
            Ok(0)
        }
        Commands::Decrypt { input, output } => {
            let password = get_passphrase_reader(cli.passphrase_stdin).read_passphrase()?;
            let written = service.decrypt_file(&input, &password, output.as_deref())?;
            println!("{}", written.display());
            Ok(0)
        }
        Commands::Verify { input, quick } => {
            let password = get_passphrase_reader(cli.passphrase_stdin).read_passphrase()?;
            let ok = if quick {
                service.verify_password(&input, &password)
            } else {
                service.verify_encrypted_file(&input, &password)
            };
            println!("{}", if ok { "OK" } else { "FAILED" });
            Ok(if ok { 0 } else { 1 })
        }
        Commands::Detect { paths } => {
            for path in paths {
                let verdict = if service.is_encrypted_file(&path) {
                    "encrypted"
                } else {
                    "plain"
                };
                println!("{}\t{}", verdict, path.display());
            }
            Ok(0)
        }
        Commands::Info { input } => {
            let info = service.encryption_info(&input)?;
            println!("original filename: {}", info.original_filename);
            println!("original size:     {}", info.original_size);
            println!("encrypted size:    {}", info.encrypted_size);
            println!("algorithm:         {}", info.algorithm);
            println!("key derivation:    {}", info.key_derivation);
            println!("iterations:        {}", info.iterations);
            if let Some(overhead) = info.size_overhead_percent() {
                println!("size overhead:     {:.1}%", overhead);
            }
            Ok(0)
        }
        Commands::Batch { output_dir, inputs } => {
            let password = get_passphrase_reader(cli.passphrase_stdin).read_passphrase()?;
            let report = service.batch_encrypt_report(&inputs, &password, &output_dir, false)?;
            for written in &report.encrypted {
                println!("{}", written.display());
            }
            for (source, err) in &report.failed {
                eprintln!("failed: {}: {}", source.display(), error_chain(err));
            }
            Ok(if report.failed.is_empty() { 0 } else { 1 })
        }
        Commands::Presets { for_file } => {
            match for_file {
                Some(path) => println!("{}", Preset::suggest_for(&path)),
                None => {
                    for preset in Preset::ALL {
                        println!(
                            "{:<18}{:>9}  {}",
                            preset.name(),
                            preset.iterations(),
                            preset.description()
                        );
                    }
                }
            }
            Ok(0)
        }
    }
}

fn init_logging() {
    // Accepted `RUST_LOG` values are `trace`, `debug`, `info`, `warn`,
    // and `error`.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Unable to set global default subscriber");
    }
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader)
    }
}

fn parse_iterations(s: &str) -> Result<u32, String> {
    let iterations: u32 = s.parse().map_err(|e| format!("{}", e))?;
    params::check_user_iterations(iterations).map_err(|e| e.to_string())
}

fn parse_preset(s: &str) -> Result<Preset, String> {
    s.parse::<Preset>().map_err(|e| e.to_string())
}

fn error_chain(err: &FilecryptError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source_error().map(|e| e as &dyn StdError);
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

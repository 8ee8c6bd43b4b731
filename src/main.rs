//! Fractured Key - CLI
//!
//! Command-line front end over the library API.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use fractured_key::{
    secure_fs, CredentialBundle, EngineConfig, FracturedKeyApi, KdfParams, ProgressEvent, Salt,
    VaultDescriptor, VaultSource,
};

#[derive(Parser)]
#[command(name = "fractured")]
#[command(version = fractured_key::VERSION)]
#[command(about = "Fractured Key - split a secret across ordinary images")]
struct Cli {
    /// Engine config (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the low-memory KDF preset for new vaults
    #[arg(long, global = true)]
    low_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a secret and hide the shares in images
    Encrypt {
        /// Shares needed to recover (K)
        #[arg(short = 'k', long, default_value_t = 2)]
        threshold: u8,

        /// File holding the secret; prompted for when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to save the vault descriptor
        #[arg(short, long, default_value = "vault.json")]
        descriptor: PathBuf,

        /// Carrier images, one per share (N = number of images)
        #[arg(required = true)]
        carriers: Vec<PathBuf>,
    },

    /// Recover a secret from stego images
    Decrypt {
        /// Vault descriptor written by `encrypt`
        #[arg(short, long, conflicts_with = "salt")]
        descriptor: Option<PathBuf>,

        /// Base64 salt, when no descriptor is available
        #[arg(long, requires_all = ["threshold", "total"])]
        salt: Option<String>,

        /// Argon2 time cost (with --salt)
        #[arg(long, default_value_t = 3)]
        time_cost: u32,

        /// Argon2 memory in KiB (with --salt)
        #[arg(long, default_value_t = 65536)]
        memory_kib: u32,

        /// Argon2 lanes (with --salt)
        #[arg(long, default_value_t = 2)]
        parallelism: u32,

        /// K (with --salt)
        #[arg(short = 'k', long)]
        threshold: Option<u8>,

        /// N (with --salt)
        #[arg(short = 'n', long)]
        total: Option<u8>,

        /// Write the secret here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stego images to read; defaults to those in the descriptor
        carriers: Vec<PathBuf>,
    },

    /// Show how many fragment bytes each image can hold
    Capacity {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },

    /// Password-only encryption into a single file
    Seal {
        /// File holding the secret; prompted for when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long, default_value = "encrypted_output.bin")]
        output: PathBuf,
    },

    /// Decrypt a sealed file
    Open {
        input: PathBuf,

        /// Write the secret here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fractured_key=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if cli.low_memory {
        config.kdf = KdfParams::low_memory();
    }
    Ok(config)
}

fn prompt_password(confirm: bool) -> Result<SecretString> {
    let first = rpassword::prompt_password("Master password: ").context("reading password")?;
    if first.is_empty() {
        bail!("password must not be empty");
    }
    if confirm {
        let second = Zeroizing::new(
            rpassword::prompt_password("Repeat password: ").context("reading password")?,
        );
        if first != *second {
            bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(first))
}

fn read_secret(input: Option<&Path>) -> Result<CredentialBundle> {
    match input {
        Some(path) => {
            let data = secure_fs::read_file(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(CredentialBundle::from_vec(data))
        }
        None => {
            let secret = rpassword::prompt_password("Secret: ").context("reading secret")?;
            let secret = SecretString::from(secret);
            Ok(CredentialBundle::from_bytes(secret.expose_secret().as_bytes()))
        }
    }
}

fn write_secret(bundle: &CredentialBundle, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            secure_fs::write_atomic(path, bundle.as_bytes())?;
            eprintln!("Secret written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bundle.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Progress bar over carriers, labelled with the current stage
fn progress_bar(carriers: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(carriers as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg:<14} [{bar:30}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    Ok(bar)
}

fn api_with_progress(config: EngineConfig, bar: &ProgressBar) -> FracturedKeyApi {
    let bar = bar.clone();
    FracturedKeyApi::new(config).with_observer(Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::Stage(stage) => bar.set_message(stage.to_string()),
        ProgressEvent::Carrier { .. } => bar.inc(1),
        ProgressEvent::Failed { .. } => bar.abandon(),
    }))
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Encrypt {
            threshold,
            input,
            descriptor,
            carriers,
        } => {
            let total = u8::try_from(carriers.len()).context("at most 255 carriers are supported")?;
            let bundle = read_secret(input.as_deref())?;
            let password = prompt_password(true)?;

            let bar = progress_bar(carriers.len())?;
            let api = api_with_progress(config, &bar);
            let vault = api.encrypt(&password, &bundle, threshold, total, &carriers)?;
            bar.finish_and_clear();

            vault.save(&descriptor)?;
            println!("Vault {} ({}-of-{})", vault.bundle_id, vault.threshold, vault.total);
            for path in &vault.carriers {
                println!("  {}", path.display());
            }
            println!("Descriptor: {}", descriptor.display());
        }

        Commands::Decrypt {
            descriptor,
            salt,
            time_cost,
            memory_kib,
            parallelism,
            threshold,
            total,
            output,
            carriers,
        } => {
            let loaded = descriptor
                .as_deref()
                .map(VaultDescriptor::load)
                .transpose()?;
            let salt = salt.as_deref().map(Salt::from_base64).transpose()?;
            let params = KdfParams::new(time_cost, memory_kib, parallelism);

            let source = match (&loaded, &salt, threshold, total) {
                (Some(d), _, _, _) => VaultSource::Descriptor(d),
                (None, Some(salt), Some(threshold), Some(total)) => VaultSource::Kdf {
                    salt,
                    params: &params,
                    threshold,
                    total,
                },
                _ => bail!("either --descriptor or --salt with -k and -n is required"),
            };

            let carriers = match (&loaded, carriers.is_empty()) {
                (Some(d), true) => d.carriers.clone(),
                _ => carriers,
            };
            if carriers.is_empty() {
                bail!("no carrier images given");
            }

            let password = prompt_password(false)?;
            let bar = progress_bar(carriers.len())?;
            let api = api_with_progress(config, &bar);
            let bundle = api.decrypt(&password, source, &carriers)?;
            bar.finish_and_clear();

            write_secret(&bundle, output.as_deref())?;
        }

        Commands::Capacity { images } => {
            let api = FracturedKeyApi::new(config);
            for image in &images {
                match api.manager().carrier_capacity(image) {
                    Ok(bytes) => println!("{:>10} bytes  {}", bytes, image.display()),
                    Err(e) => println!("{:>10}        {} ({})", "-", image.display(), e),
                }
            }
        }

        Commands::Seal { input, output } => {
            let bundle = read_secret(input.as_deref())?;
            let password = prompt_password(true)?;
            FracturedKeyApi::new(config).seal_to_file(&password, &bundle, &output)?;
            println!("Sealed to {}", output.display());
        }

        Commands::Open { input, output } => {
            let password = prompt_password(false)?;
            let bundle = FracturedKeyApi::new(config).open_sealed_file(&password, &input)?;
            write_secret(&bundle, output.as_deref())?;
        }
    }

    Ok(())
}

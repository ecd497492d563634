//! appimage-primer CLI
//!
//! Entry point for the `appimage-primer` command-line tool.

use appimage_primer::carrier::Architecture;
use appimage_primer::signing::{
    compute_key_fingerprint, export_text, generate_keypair, verify_artifact, write_signing_key,
};
use appimage_primer::{
    BuildContext, ChecksumEngine, DigestAlgorithm, EffectiveConfig, Pipeline, PipelineError,
    RegionTable,
};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "appimage-primer")]
#[command(about = "Assemble, patch and sign AppImage bundles", version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a bundle from an AppDir or a prepared payload image
    Build {
        #[command(flatten)]
        recipe: RecipeArgs,

        /// Prepared application directory to package
        #[arg(long, conflicts_with = "payload", required_unless_present = "payload")]
        appdir: Option<PathBuf>,

        /// Existing squashfs image to use as the payload (consumed)
        #[arg(long)]
        payload: Option<PathBuf>,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective recipe with provenance
    Config {
        #[command(flatten)]
        recipe: RecipeArgs,
    },

    /// List the reserved regions of a carrier or bundle
    Regions {
        /// Carrier or assembled bundle
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Digest a file the way the pipeline does
    Digest {
        file: PathBuf,

        /// Algorithms to compute (md5, sha256)
        #[arg(
            long,
            short = 'a',
            value_delimiter = ',',
            default_values_t = [DigestAlgorithm::Md5, DigestAlgorithm::Sha256]
        )]
        algorithm: Vec<DigestAlgorithm>,
    },

    /// Generate an Ed25519 signing key file
    Keygen {
        /// Where to write the base64 secret key
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Verify an Ed25519 signature embedded in a bundle
    Verify {
        artifact: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct RecipeArgs {
    /// Recipe file (TOML)
    #[arg(long, short = 'r')]
    recipe: Option<PathBuf>,

    /// Target architecture
    #[arg(long)]
    arch: Option<Architecture>,

    /// Output bundle path
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Signing key identifier
    #[arg(long)]
    sign_key: Option<String>,

    /// Signer backend (gpg, ed25519)
    #[arg(long)]
    signer: Option<String>,

    /// Update information string
    #[arg(long)]
    update_information: Option<String>,

    /// Build directory holding the carrier cache
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Directory of runtime-<arch> files to use instead of downloading
    #[arg(long)]
    carrier_mirror: Option<PathBuf>,

    /// Patch the MD5 digest into the carrier
    #[arg(long)]
    embed_md5_digest: bool,
}

impl RecipeArgs {
    /// CLI layer in recipe shape; only flags that were given appear.
    fn overrides(&self) -> Value {
        let mut appimage = Map::new();
        let mut build = Map::new();
        let mut carrier = Map::new();
        let mut signing = Map::new();

        if let Some(arch) = self.arch {
            appimage.insert("arch".into(), json!(arch.as_str()));
        }
        if let Some(output) = &self.output {
            if let Some(name) = output.file_name() {
                appimage.insert("file-name".into(), json!(name.to_string_lossy()));
            }
            let dir = output.parent().filter(|p| !p.as_os_str().is_empty());
            build.insert("output-dir".into(), json!(dir.unwrap_or(Path::new("."))));
        }
        if let Some(key) = &self.sign_key {
            appimage.insert("sign-key".into(), json!(key));
        }
        if let Some(info) = &self.update_information {
            appimage.insert("update-information".into(), json!(info));
        }
        if self.embed_md5_digest {
            appimage.insert("embed-md5-digest".into(), json!(true));
        }
        if let Some(dir) = &self.build_dir {
            build.insert("build-dir".into(), json!(dir));
        }
        if let Some(dir) = &self.carrier_mirror {
            carrier.insert("mirror-dir".into(), json!(dir));
        }
        if let Some(signer) = &self.signer {
            signing.insert("backend".into(), json!(signer.to_lowercase()));
        }

        json!({
            "appimage": appimage,
            "build": build,
            "carrier": carrier,
            "signing": signing,
        })
    }

    fn effective(&self) -> Result<EffectiveConfig, PipelineError> {
        Ok(EffectiveConfig::build(
            self.recipe.as_deref(),
            Some(self.overrides()),
        )?)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli.command {
        Commands::Build {
            recipe,
            appdir,
            payload,
            json,
        } => run_build(&recipe, appdir, payload, json),
        Commands::Config { recipe } => run_config(&recipe),
        Commands::Regions { path, json } => run_regions(&path, json),
        Commands::Digest { file, algorithm } => run_digest(&file, &algorithm),
        Commands::Keygen { output } => run_keygen(&output),
        Commands::Verify { artifact, json } => run_verify(&artifact, json),
    };
    process::exit(code);
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            1
        }
    }
}

fn run_build(recipe: &RecipeArgs, appdir: Option<PathBuf>, payload: Option<PathBuf>, json: bool) -> i32 {
    let result = recipe.effective().and_then(|effective| {
        let ctx = BuildContext::new(effective.bundle_config()?);
        let pipeline = Pipeline::from_context(&ctx)?;
        match (&appdir, &payload) {
            (_, Some(payload)) => pipeline.run_with_payload(&ctx, payload),
            (Some(appdir), None) => pipeline.run(&ctx, appdir),
            (None, None) => Err(PipelineError::Config(appimage_primer::ConfigError::Invalid(
                "either --appdir or --payload is required".to_string(),
            ))),
        }
    });

    match result {
        Ok(report) if json => print_json(&report),
        Ok(report) => {
            println!("{}", report.artifact.display());
            if let Some(index) = &report.update_index {
                println!("{}", index.display());
            }
            0
        }
        Err(e) => {
            tracing::error!(
                stage = e.stage().map(|s| s.as_str()).unwrap_or("config"),
                error = %e,
                "Build failed"
            );
            e.exit_code()
        }
    }
}

fn run_config(recipe: &RecipeArgs) -> i32 {
    let effective = match recipe.effective() {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return e.exit_code();
        }
    };
    if let Err(e) = effective.bundle_config() {
        eprintln!("Configuration error: {}", e);
        return 2;
    }
    match effective.to_json() {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            1
        }
    }
}

fn run_regions(path: &Path, json: bool) -> i32 {
    let table = match RegionTable::from_elf_file(path) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            return 1;
        }
    };

    if json {
        return print_json(&table);
    }
    if table.is_empty() {
        println!("No reserved regions");
    }
    for region in table.iter() {
        println!(
            "{:<12} {:<12} offset={:<10} size={}",
            region.name.as_str(),
            region.name.section_name(),
            region.offset,
            region.size
        );
    }
    0
}

fn run_digest(file: &Path, algorithms: &[DigestAlgorithm]) -> i32 {
    match ChecksumEngine::new().digest_file(file, algorithms) {
        Ok(digests) => {
            for (algorithm, bytes) in digests.iter() {
                println!("{}  {}  {}", algorithm, hex::encode(bytes), file.display());
            }
            0
        }
        Err(e) => {
            eprintln!("Error digesting {}: {}", file.display(), e);
            1
        }
    }
}

fn run_keygen(output: &Path) -> i32 {
    if output.exists() {
        eprintln!("Refusing to overwrite {}", output.display());
        return 1;
    }

    let key = generate_keypair();
    if let Err(e) = write_signing_key(output, &key) {
        eprintln!("Error writing {}: {}", output.display(), e);
        return 1;
    }

    let verifying = key.verifying_key();
    eprintln!("Wrote secret key to {}", output.display());
    eprintln!("Fingerprint: {}", compute_key_fingerprint(&verifying));
    print!("{}", export_text(&verifying));
    0
}

fn run_verify(artifact: &Path, json: bool) -> i32 {
    match verify_artifact(artifact) {
        Ok(result) => {
            let code = if result.valid { 0 } else { 1 };
            if json {
                print_json(&result);
            } else if result.valid {
                println!("Signature valid (key {})", result.fingerprint);
            } else {
                println!("Signature INVALID (key {})", result.fingerprint);
            }
            code
        }
        Err(e) => {
            eprintln!("Error verifying {}: {}", artifact.display(), e);
            1
        }
    }
}

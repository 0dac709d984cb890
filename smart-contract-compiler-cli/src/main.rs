//! Command line front end for the compilation layer.

use clap::Parser;
use smart_contract_compiler::export::{self, ExportFormat};
use smart_contract_compiler::platform::Platform;
use smart_contract_compiler::{platform, CompileConfig, Project};
use std::path::PathBuf;
use std::process::ExitCode;

/// Compile smart-contract projects through their own build framework
/// and export a unified artifact model.
#[derive(Parser, Debug)]
#[command(name = "smart-contract-compiler", version, about, long_about = None)]
struct Cli {
    /// Project directory, source file, exported archive, or address
    /// (e.g. `mainet:0x…`).
    target: String,

    /// Load additional settings from a JSON file.
    #[arg(long, default_value = "crytic_compile.config.json")]
    config_file: PathBuf,

    /// Skip detection and use the named framework.
    #[arg(long)]
    compile_force_framework: Option<String>,

    /// Run an arbitrary build command instead of the framework's own.
    #[arg(long)]
    compile_custom_build: Option<String>,

    /// Strip the CBOR metadata trailer from stored bytecodes.
    #[arg(long)]
    compile_remove_metadata: bool,

    /// Re-read existing artifacts without running the framework build.
    #[arg(long)]
    ignore_compile: bool,

    /// Compiler binary override.
    #[arg(long)]
    solc: Option<PathBuf>,

    /// Compiler version, resolved through the version manager.
    #[arg(long)]
    solc_version: Option<String>,

    /// Extra arguments passed through to the compiler.
    #[arg(long)]
    solc_args: Option<String>,

    /// Import remappings (`prefix=target`).
    #[arg(long, value_delimiter = ' ')]
    solc_remaps: Vec<String>,

    /// Drop compiler warnings from the logs.
    #[arg(long)]
    solc_disable_warnings: bool,

    /// Aggregate a directory of sources into one standard-json unit.
    #[arg(long)]
    solc_standard_json: bool,

    /// Vyper binary override.
    #[arg(long)]
    vyper: Option<PathBuf>,

    /// Etherscan-style API key (falls back to ETHERSCAN_API_KEY).
    #[arg(long = "etherscan-apikey")]
    etherscan_api_key: Option<String>,

    /// Export format: standard, solc, truffle or archive.
    #[arg(long)]
    export_format: Option<String>,

    /// Comma-separated list of export formats.
    #[arg(long, value_delimiter = ',')]
    export_formats: Vec<String>,

    /// Output directory for exports.
    #[arg(long, default_value = "crytic-export")]
    export_dir: PathBuf,

    /// Pack the exports into a single archive file.
    #[arg(long)]
    export_zip: Option<PathBuf>,

    /// Archive compression: zip or stored.
    #[arg(long, default_value = "zip")]
    export_zip_type: String,

    /// Print the four views of every source-file identity.
    #[arg(long)]
    print_filenames: bool,

    /// List the registered platform adapters and exit.
    #[arg(long)]
    supported_platforms: bool,
}

impl Cli {
    fn into_config(self) -> (CompileConfig, CliActions) {
        let actions = CliActions {
            config_file: self.config_file,
            export_format: self.export_format,
            export_formats: self.export_formats,
            export_dir: self.export_dir.clone(),
            export_zip: self.export_zip,
            export_zip_type: self.export_zip_type,
            print_filenames: self.print_filenames,
            target: self.target,
        };
        let config = CompileConfig {
            compile_force_framework: self.compile_force_framework,
            compile_custom_build: self.compile_custom_build,
            compile_remove_metadata: self.compile_remove_metadata,
            ignore_compile: self.ignore_compile,
            solc: self.solc,
            solc_version: self.solc_version,
            solc_args: self.solc_args,
            solc_remaps: self.solc_remaps,
            solc_disable_warnings: self.solc_disable_warnings,
            solc_standard_json: self.solc_standard_json,
            vyper: self.vyper,
            etherscan_api_key: self.etherscan_api_key,
            export_dir: self.export_dir,
            ..Default::default()
        };
        (config, actions)
    }
}

struct CliActions {
    config_file: PathBuf,
    export_format: Option<String>,
    export_formats: Vec<String>,
    export_dir: PathBuf,
    export_zip: Option<PathBuf>,
    export_zip_type: String,
    print_filenames: bool,
    target: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.supported_platforms {
        for adapter in platform::all() {
            println!("- {} (priority {})", adapter.name(), adapter.priority());
        }
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (mut config, actions) = cli.into_config();
    if actions.config_file.is_file() {
        config.apply_config_file(&actions.config_file)?;
    }

    let project = Project::compile(&actions.target, &config).await?;

    if actions.print_filenames {
        for filename in project.filenames() {
            println!("{}", filename.short.display());
            println!("\tAbsolute: {}", filename.absolute.display());
            println!("\tRelative: {}", filename.relative.display());
            println!("\tUsed: {}", filename.used);
        }
    }

    let mut formats: Vec<String> = actions.export_formats.clone();
    if let Some(format) = &actions.export_format {
        formats.push(format.clone());
    }

    let mut written = Vec::new();
    for format in formats {
        let format: ExportFormat = format.parse()?;
        let files = export::export(&project, format, &actions.export_dir)?;
        for file in &files {
            tracing::info!("exported {}", file.display());
        }
        written.extend(files);
    }

    if let Some(zip_path) = &actions.export_zip {
        if written.is_empty() {
            let files = export::export(&project, ExportFormat::Archive, &actions.export_dir)?;
            written.extend(files);
        }
        export::export_zip(&written, zip_path, &actions.export_zip_type)?;
        tracing::info!("packed exports into {}", zip_path.display());
    }

    Ok(())
}

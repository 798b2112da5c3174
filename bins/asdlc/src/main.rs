use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "asdlc",
    version,
    about = "Compile net-first ASDL circuit descriptions into SPICE-family netlists"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an ASDL file into a backend netlist.
    Netlist(NetlistArgs),
}

#[derive(Args)]
struct NetlistArgs {
    /// The entry ASDL file.
    input: PathBuf,

    /// The output path.
    ///
    /// Defaults to `{basename}{extension}` next to the input, where the
    /// extension comes from the selected backend.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Verify the netlist before emission (default).
    #[arg(long, overrides_with = "no_verify")]
    verify: bool,

    /// Skip netlist verification.
    #[arg(long, overrides_with = "verify")]
    no_verify: bool,

    /// The backend to emit for.
    #[arg(long, default_value = asdl::DEFAULT_BACKEND)]
    backend: String,

    /// Wrap the top module in a subcircuit as well.
    #[arg(long)]
    top_as_subckt: bool,

    /// An additional library root. Repeatable; probed in order before
    /// ASDL_LIB_PATH.
    #[arg(long = "lib", value_name = "DIR")]
    lib: Vec<PathBuf>,

    /// Write the GraphIR JSON dump consumed by the schematic visualizer.
    #[arg(long, value_name = "PATH")]
    dump_graphir: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Netlist(args) => netlist(args),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn netlist(args: NetlistArgs) -> anyhow::Result<ExitCode> {
    let opts = asdl::CompileOptions {
        lib_roots: args.lib.clone(),
        backend: args.backend.clone(),
        verify: args.verify || !args.no_verify,
        top_as_subckt: args.top_as_subckt,
        ..Default::default()
    };

    let (output, diagnostics) = asdl::compile(&args.input, &opts);
    for diagnostic in diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }

    let Some(output) = output else {
        return Ok(ExitCode::FAILURE);
    };
    if diagnostics.has_error() {
        // No output is written once an error was recorded.
        return Ok(ExitCode::FAILURE);
    }

    if let Some(path) = &args.dump_graphir {
        let json = serde_json::to_string_pretty(&output.graph)
            .context("failed to serialize the GraphIR dump")?;
        fs::write(path, json)
            .with_context(|| format!("failed to write GraphIR dump to {}", path.display()))?;
    }

    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| asdl::default_output_path(&args.input, &output.extension));
    fs::write(&out_path, &output.netlist)
        .with_context(|| format!("failed to write netlist to {}", out_path.display()))?;

    Ok(ExitCode::SUCCESS)
}

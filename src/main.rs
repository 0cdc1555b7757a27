use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use svo2extract::cli::{Cli, Commands};
use svo2extract::convert::{self, ConvertOptions};
use svo2extract::extract::{self, ChannelSelector};
use svo2extract::intrinsics::{ResolutionMode, StereoIntrinsics};
use svo2extract::metadata::Metadata;
use svo2extract::source::{self, McapSource};
use svo2extract::{Svo2Error, schema, validate};

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// `<dir>/<stem><suffix>` next to the input file.
fn default_output(input: &str, suffix: &str) -> String {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!("{stem}{suffix}"))
        .to_string_lossy()
        .into_owned()
}

fn open(input: &str) -> Result<McapSource> {
    McapSource::open(input).with_context(|| format!("failed to open {input}"))
}

fn run(cli: Cli) -> Result<()> {
    let progress = !cli.quiet;
    match cli.command {
        Commands::Inspect { input } => source::inspect(&input)?,
        Commands::Extract {
            input,
            output,
            channel,
        } => {
            let source = open(&input)?;
            extract::extract_channel_to_path(
                &source,
                &ChannelSelector::new(channel),
                &output,
                progress,
            )?;
        }
        Commands::Video {
            input,
            output,
            framed,
        } => {
            let output = output.unwrap_or_else(|| default_output(&input, "_video.h265"));
            let source = open(&input)?;
            if framed {
                extract::extract_video_channel(&source, &output, progress)?;
            } else {
                let options = ConvertOptions {
                    input_path: input,
                    output_path: output,
                    mode: Some(convert::OutputMode::Raw),
                    keyframes_path: None,
                    show_progress: progress,
                };
                convert::convert_source(&source, convert::OutputMode::Raw, &options)?;
            }
        }
        Commands::Sensors { input, output } => {
            let output = output.unwrap_or_else(|| default_output(&input, "_sensors.bin"));
            let source = open(&input)?;
            extract::extract_sensors(&source, &output, progress)?;
        }
        Commands::Convert {
            input,
            output,
            mode,
            keyframes,
        } => {
            let options = ConvertOptions {
                input_path: input,
                output_path: output,
                mode: mode.as_deref().map(str::parse::<convert::OutputMode>).transpose()?,
                keyframes_path: keyframes,
                show_progress: progress,
            };
            convert::convert_svo2(&options)?;
        }
        Commands::Metadata { input } => {
            let source = open(&input)?;
            let metadata = Metadata::extract(&source)?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Commands::Intrinsics { conf, mode, height } => {
            let mode = match (mode, height) {
                (Some(m), _) => m.parse::<ResolutionMode>()?,
                (None, Some(h)) => ResolutionMode::from_height(h)?,
                (None, None) => {
                    return Err(Svo2Error::Configuration(
                        "either --mode or --height must be provided".into(),
                    )
                    .into());
                }
            };
            let intrinsics = StereoIntrinsics::load(&conf, mode)?;
            println!("{}", serde_json::to_string_pretty(&intrinsics.to_json())?);
        }
        Commands::Schema {} => schema::print_schema()?,
        Commands::Validate { input } => {
            let report = validate::validate_svo2(&input)?;
            if !report.passed() {
                anyhow::bail!("validation of {input} failed");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<Svo2Error>() {
            Some(err) => {
                let kind = err.kind();
                eprintln!("error[{}]: {e:#}", kind.as_str());
                ExitCode::from(kind.exit_code())
            }
            None => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}


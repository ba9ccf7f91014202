//! vvvf-render - offline renderer
//!
//! Sweeps a vehicle through a speed range at a fixed notch and writes the
//! inverter sound to a 32-bit float WAV file. Updates go through the same
//! bridge a realtime host would use, at roughly the rate a UI would send them.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use simple_logger::SimpleLogger;

use vvvf::{
    AmplitudeLaw, EngineConfig, EngineMessage, HandlePosition, ModulationSegment, Session,
    VehicleProfile, create_bridge,
};

/// Seconds between two scripted speed updates.
const UPDATE_INTERVAL: f64 = 0.016;

/// Render a VVVF inverter sound sweep to a WAV file
#[derive(Parser)]
#[command(name = "vvvf-render")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bundled vehicle profile
    #[arg(short, long, default_value = "seibu-6000")]
    profile: String,

    /// Vehicle profile JSON file (overrides --profile)
    #[arg(long)]
    profile_file: Option<PathBuf>,

    /// Handle notch: positive for power, negative for brake
    #[arg(short, long, default_value_t = 4, allow_hyphen_values = true)]
    notch: i32,

    /// Vehicle speed at the start of the sweep, in km/h
    #[arg(long, default_value_t = 0.0)]
    from: f64,

    /// Vehicle speed at the end of the sweep, in km/h
    #[arg(long, default_value_t = 80.0)]
    to: f64,

    /// Length of the rendering in seconds
    #[arg(short, long, default_value_t = 20.0)]
    seconds: f64,

    /// Engine configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sample rate in Hz (overrides the configuration)
    #[arg(long)]
    sample_rate: Option<f64>,

    /// Use the volts-per-hertz amplitude law
    #[arg(long)]
    volts_per_hertz: bool,

    /// Frames per processing block
    #[arg(short, long, default_value_t = 128)]
    block_size: usize,

    /// Output WAV file
    #[arg(short, long, default_value = "vvvf.wav")]
    output: PathBuf,

    /// List the bundled vehicle profiles and exit
    #[arg(long)]
    list_profiles: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if let Err(err) = SimpleLogger::new().with_level(level).init() {
        eprintln!("failed to initialize logging: {err}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.list_profiles {
        for key in VehicleProfile::builtin_keys() {
            let profile = VehicleProfile::builtin(key)?;
            println!("{key:<12} {}", profile.name);
        }
        return Ok(());
    }

    let profile = load_profile(cli)?;
    let config = load_config(cli)?;
    if cli.block_size == 0 {
        bail!("block size must be at least 1");
    }
    if !(cli.seconds.is_finite() && cli.seconds > 0.0) {
        bail!("duration must be positive, got {}", cli.seconds);
    }

    log::info!(
        "rendering '{}' notch {} from {} to {} km/h over {} s",
        profile.name,
        cli.notch,
        cli.from,
        cli.to,
        cli.seconds
    );

    let (mut control, mut engine) = create_bridge(Session::new(profile), &config)?;
    control.poll();
    control.set_handle(HandlePosition::from_index(cli.notch));

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: config.sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&cli.output, spec)
        .with_context(|| format!("creating {}", cli.output.display()))?;

    let total_frames = (cli.seconds * config.sample_rate).round() as usize;
    let update_frames = ((config.sample_rate * UPDATE_INTERVAL) as usize).max(1);
    let mut buffer = vec![0.0_f32; cli.block_size];
    let mut rendered = 0;
    let mut next_update = 0;
    let mut active: Option<ModulationSegment> = None;
    let mut faults = 0;
    let mut peak = 0.0_f32;

    while rendered < total_frames {
        if rendered >= next_update {
            let progress = rendered as f64 / total_frames as f64;
            control.set_vehicle_speed(cli.from + (cli.to - cli.from) * progress);
            next_update += update_frames;
        }

        let frames = cli.block_size.min(total_frames - rendered);
        let block = &mut buffer[..frames];
        engine.process(block);
        for sample in block.iter() {
            writer.write_sample(*sample)?;
            peak = peak.max(sample.abs());
        }
        rendered += frames;

        for message in control.poll() {
            match message {
                EngineMessage::Waveform(snapshot) if snapshot.active_segment != active => {
                    let seconds = rendered as f64 / config.sample_rate;
                    match snapshot.active_segment {
                        Some(segment) => log::info!(
                            "{seconds:>7.3} s  {:>7.2} Hz  {}",
                            snapshot.drive_frequency,
                            segment.kind
                        ),
                        None => log::info!("{seconds:>7.3} s  silent"),
                    }
                    active = snapshot.active_segment;
                }
                EngineMessage::Fault(_) => faults += 1,
                _ => {}
            }
        }
    }

    writer.finalize()?;

    let readback = control.readback();
    log::info!(
        "wrote {} frames to {} (peak {peak:.3}, final drive {:.2} Hz)",
        readback.frames_rendered,
        cli.output.display(),
        readback.drive_frequency
    );
    if faults > 0 {
        log::warn!("{faults} engine faults reported during rendering");
    }
    if readback.dropped_messages > 0 {
        log::debug!("{} engine messages dropped", readback.dropped_messages);
    }
    Ok(())
}

fn load_profile(cli: &Cli) -> Result<VehicleProfile> {
    match &cli.profile_file {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            VehicleProfile::from_json(&json)
                .with_context(|| format!("parsing profile {}", path.display()))
        }
        None => Ok(VehicleProfile::builtin(&cli.profile)?),
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(sample_rate) = cli.sample_rate {
        config = config.with_sample_rate(sample_rate);
    }
    if cli.volts_per_hertz {
        config = config.with_amplitude_law(AmplitudeLaw::VoltsPerHertz);
    }
    config.validate()?;
    Ok(config)
}

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use ps_scan::{
    frequency_from_str, plan_scan, DeviceInfo, Frequency, ScanConfig, SpectrumAccumulator,
    SweepOutcome, SweepRunner,
};
use ps_sdr::mock::{MockRadio, MockSignal};
use ps_sdr::{Radio, SdrError};
use ps_web::SpectrumView;

#[derive(Parser, Debug)]
#[command(name = "powerscan")]
#[command(about = "Measure a power spectrum from an SDR receiver")]
#[command(disable_help_flag = true)]
struct Cli {
    /// Display detailed information
    #[arg(short = 'v')]
    verbose: bool,

    /// Select an SDR device ("help" for a list, "mock" for a synthetic one)
    #[arg(short = 'd', value_name = "DEVICE")]
    device: Option<String>,

    /// Select an SDR channel
    #[arg(short = 'C', value_name = "CHANNEL", default_value = "0")]
    channel: usize,

    /// Receive gain in dB
    #[arg(short = 'g', value_name = "GAIN", default_value = "0")]
    gain: f64,

    /// Start frequency
    #[arg(short = 's', value_name = "FREQ", value_parser = frequency_from_str)]
    start_frequency: Option<Frequency>,

    /// End frequency (defaults to a band centred on the start frequency)
    #[arg(short = 'e', value_name = "FREQ", value_parser = frequency_from_str)]
    end_frequency: Option<Frequency>,

    /// Frequency resolution (defaults to the finest the FFT allows)
    #[arg(short = 'r', value_name = "FREQ", value_parser = frequency_from_str)]
    resolution: Option<Frequency>,

    /// Sample rate upper limit
    #[arg(short = 'R', value_name = "RATE", value_parser = frequency_from_str)]
    rate_limit: Option<Frequency>,

    /// Crop ratio: how much of each tuning band to ignore (0-0.6)
    #[arg(short = 'c', value_name = "RATIO", default_value = "0.25")]
    crop: f64,

    /// Complete each scan in this many seconds
    #[arg(short = 't', value_name = "SECONDS", default_value = "10")]
    scan_time: u32,

    /// Make a single scan
    #[arg(short = '1')]
    single: bool,

    /// Scan this many times (0 = continuously)
    #[arg(short = 'l', value_name = "COUNT", default_value = "0")]
    limit: u32,

    /// Serve a web UI on this localhost port (0 = off)
    #[arg(short = 'w', value_name = "PORT", default_value = "0")]
    web_port: u16,

    /// Directory of static files for the web UI
    #[arg(long, value_name = "DIR", default_value = "./public")]
    public_dir: PathBuf,

    /// This help message
    #[arg(short = 'h', short_alias = '?', long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    if cli.device.as_deref() == Some("help") {
        list_devices();
        return;
    }

    let config = ScanConfig {
        sdr_name: cli.device.clone().unwrap_or_default(),
        sdr_channel: cli.channel,
        gain_db: cli.gain,
        start_frequency: cli.start_frequency.unwrap_or(0),
        end_frequency: cli.end_frequency.unwrap_or(0),
        frequency_resolution: cli.resolution.unwrap_or(0),
        requested_sample_rate_cap: cli.rate_limit.unwrap_or(0),
        repetition_limit: if cli.single { 1 } else { cli.limit },
        scan_time_s: cli.scan_time,
        crop_ratio: cli.crop,
        web_port: cli.web_port,
        verbose: cli.verbose,
    };

    match run(&config, &cli.public_dir) {
        Ok(outcome) => {
            log::info!(
                "scan {}",
                match outcome {
                    SweepOutcome::Completed => "completed",
                    SweepOutcome::Finished => "finished on interrupt",
                    SweepOutcome::Aborted => "aborted",
                }
            );
        }
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("run powerscan -h for usage");
            process::exit(1);
        }
    }
}

fn run(config: &ScanConfig, public_dir: &PathBuf) -> Result<SweepOutcome, Box<dyn std::error::Error>> {
    let channel = config.sdr_channel;
    let mut radio = open_radio(&config.sdr_name, channel)?;

    let channel_count = radio.channel_count();
    if channel >= channel_count {
        return Err(Box::new(SdrError::InvalidChannel {
            requested: channel,
            available: channel_count,
        }));
    }

    let sample_rates = radio.sample_rates(channel)?;
    log::debug!(
        "channel {} has {} sample rates: {:?}",
        channel,
        sample_rates.len(),
        sample_rates
    );
    let (native_format, full_scale) = radio.native_format(channel)?;
    log::info!(
        "native stream format is {} with fullscale of {}",
        native_format,
        full_scale
    );

    let device_info = DeviceInfo {
        channel_count,
        sample_rates,
        native_format,
        full_scale,
    };
    let plan = plan_scan(config, &device_info)?;
    log::info!("{}", plan.summary(config.repetition_limit));
    log::info!("{}", plan);

    if let Err(e) = radio.set_gain(channel, config.gain_db) {
        log::warn!("failed to set gain: {}", e);
    }
    radio.set_sample_rate(channel, plan.sample_rate)?;
    radio.start_stream(channel)?;

    // Two-level interrupt: the first signal lets the sweep in progress
    // finish, the second abandons it. SIGPIPE is already ignored by the
    // runtime.
    let signals = Arc::new(AtomicUsize::new(0));
    let handler_signals = Arc::clone(&signals);
    let mut signal_source = Signals::new([SIGINT, SIGTERM, SIGQUIT])?;
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for _signal in signal_source.forever() {
                let previous = handler_signals.fetch_add(1, Ordering::SeqCst);
                eprintln!(
                    "Signal caught, {}.",
                    if previous == 0 { "finishing" } else { "abort" }
                );
            }
        })?;

    let spectrum = SpectrumAccumulator::shared(&plan);
    let mut web = if config.web_port != 0 {
        Some(ps_web::start(
            config.web_port,
            public_dir.clone(),
            SpectrumView::new(&plan, Arc::clone(&spectrum)),
        ))
    } else {
        None
    };

    let outcome = SweepRunner::new(
        radio.as_mut(),
        &plan,
        channel,
        Arc::clone(&spectrum),
        Arc::clone(&signals),
    )
    .run(config.repetition_limit);

    if let Some(server) = web.as_mut() {
        server.stop();
    }
    radio.stop_stream();
    Ok(outcome)
}

/// Open the requested receiver. The "mock" device is a synthetic tone source
/// that works without hardware.
fn open_radio(name: &str, channel: usize) -> Result<Box<dyn Radio>, SdrError> {
    if name == "mock" {
        let mut radio = MockRadio::new(
            &[2_400_000.0],
            MockSignal::Tone {
                offset_hz: 100_000.0,
                amplitude: 0.5,
            },
        );
        radio.set_clock(ps_sdr::clock_time());
        return Ok(Box::new(radio));
    }

    #[cfg(feature = "soapysdr")]
    {
        return match ps_sdr::soapy::SoapyRadio::open(name) {
            Ok(radio) => {
                radio.log_channel_info(channel);
                Ok(Box::new(radio))
            }
            Err(e) => {
                eprintln!("SoapySDR device '{}' not found.", name);
                list_devices();
                Err(e)
            }
        };
    }

    #[cfg(not(feature = "soapysdr"))]
    {
        let _ = channel;
        return Err(SdrError::DeviceNotFound(format!(
            "{} (built without SoapySDR support; use -d mock)",
            name
        )));
    }
}

fn list_devices() {
    eprintln!("Available devices are:");
    #[cfg(feature = "soapysdr")]
    {
        for (i, line) in ps_sdr::soapy::list_devices().iter().enumerate() {
            eprintln!("\t{}: {}", i, line);
        }
    }
    eprintln!("\tmock (synthetic tone source)");
}

use mms101::{AppConfig, AutoZero, CalibrationTransform, CsvSampleWriter, SamplingSession, UdpTransport};
use std::io;
use std::time::Duration;
use tracing::{info, warn, Level};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().skip(1).any(|arg| arg == "-h" || arg == "--help") {
        let program = args.first().map_or("mms101", |s| s.as_str());
        eprintln!("Usage: {} [config.json] [sample_count]", program);
        eprintln!("   or: {} --discover [config.json]", program);
        return Ok(());
    }

    if args.get(1).map(String::as_str) == Some("--discover") {
        let config = match args.get(2) {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        tracing_subscriber::fmt().with_writer(io::stderr).init();

        let boards = UdpTransport::discover(config.session.src_port, Duration::from_secs(6))?;
        if boards.is_empty() {
            warn!("no boards answered");
        }
        for board in boards {
            println!("{}", board);
        }
        return Ok(());
    }

    let mut config = match args.get(1) {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(count) = args.get(2) {
        config.session.measure_max = count
            .parse()
            .map_err(|_| format!("invalid sample count '{}'", count))?;
    }

    let level = if config.session.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let calibration = CalibrationTransform::new(config.calibration.to_matrix()?)?;
    let mut session = SamplingSession::open(config.session.clone(), calibration)?;

    session.initialize_device()?;
    let version = session.version()?;
    info!(
        hardware = %version.hardware_hex(),
        software = %version.software_hex(),
        "board version"
    );
    session.tare()?;

    let transform = session.calibration();
    let mut auto_zero = config.auto_zero.clone().map(AutoZero::new);

    let stdout = io::stdout();
    let mut writer = CsvSampleWriter::new(stdout.lock())?;
    for _ in 0..config.session.measure_max {
        let (raw, sample) = session.read_one_with_raw()?;
        if let Some(auto_zero) = auto_zero.as_mut() {
            auto_zero.observe(&raw, &sample, &transform);
        }
        writer.write_sample(&sample)?;
    }
    writer.flush()?;

    info!(samples = writer.written(), stats = ?session.stats(), "acquisition complete");
    session.close();
    Ok(())
}

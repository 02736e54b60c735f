use crate::Cli;

/// Drive the acquisition session: one thread keeps the ring filled and
/// drains it into blocks, the main thread writes the blocks out.
#[cfg(feature = "hackrf")]
pub fn run(cli: &Cli) -> Result<(), String> {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::sync::Arc;

    use crossbeam::channel;
    use iq_sdr::hackrf::HackrfDevice;
    use iq_sdr::{ComplexSample, IqSource, SourceConfig, FLUSH_COUNT};

    let device =
        HackrfDevice::open(cli.device).map_err(|e| format!("failed to open device: {}", e))?;

    let config = SourceConfig {
        sample_rate: cli.sample_rate,
        ..SourceConfig::default()
    };
    let src = IqSource::new(Box::new(device), config);

    if let Err(err) = src.open() {
        log::warn!("continuing in degraded configuration: {}", err);
    }
    if let Err(err) = src.set_gain(cli.amp_gain, cli.lna_gain, cli.vga_gain) {
        log::warn!("gain configuration failed: {}", err);
    }
    src.set_freq_correction(cli.ppm);
    src.tune(cli.freq).map_err(|e| e.to_string())?;

    src.start().map_err(|e| e.to_string())?;
    src.flush(FLUSH_COUNT);

    log::info!(
        "capturing {} samples at {:.0} Hz, {:.3} MHz center",
        cli.samples,
        src.sample_rate(),
        src.center_frequency() / 1e6
    );

    let src = Arc::new(src);
    let target = cli.samples;
    let (tx, rx) = channel::bounded::<Vec<ComplexSample>>(64);

    let producer = {
        let src = src.clone();
        std::thread::spawn(move || {
            let buffer = src.get_buffer();
            let mut block = vec![ComplexSample::new(0.0, 0.0); 4096];
            let mut remaining = target;
            let mut overruns: u64 = 0;
            while remaining > 0 {
                overruns += src.fill(block.len()) as u64;
                let n = buffer.lock().unwrap().read(&mut block);
                if n == 0 {
                    continue;
                }
                let take = (remaining as usize).min(n);
                if tx.send(block[..take].to_vec()).is_err() {
                    break;
                }
                remaining -= take as u64;
            }
            overruns
        })
    };

    let file = File::create(&cli.output)
        .map_err(|e| format!("failed to create {}: {}", cli.output.display(), e))?;
    let mut writer = BufWriter::new(file);
    let mut written: u64 = 0;
    for chunk in rx.iter() {
        for sample in &chunk {
            writer
                .write_all(&sample.re.to_le_bytes())
                .and_then(|_| writer.write_all(&sample.im.to_le_bytes()))
                .map_err(|e| format!("write error: {}", e))?;
        }
        written += chunk.len() as u64;
    }

    let overruns = producer
        .join()
        .map_err(|_| "acquisition thread panicked".to_string())?;
    src.stop().map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| format!("write error: {}", e))?;

    log::info!("captured {} samples ({} overruns)", written, overruns);
    if overruns > 0 {
        eprintln!("warning: {} local overruns during capture", overruns);
    }
    Ok(())
}

#[cfg(not(feature = "hackrf"))]
pub fn run(_cli: &Cli) -> Result<(), String> {
    Err("built without HackRF support; rebuild with --features hackrf".to_string())
}

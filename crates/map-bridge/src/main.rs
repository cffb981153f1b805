// The binary uses the library, not duplicate modules
use map_bridge::{Replay, ReplayError, ReplayRecord, Settings, logging};
use std::io::{BufReader, Write};

fn write_record(out: &mut impl Write, record: &ReplayRecord, pretty: bool) -> std::io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, record)?;
    } else {
        serde_json::to_writer(&mut *out, record)?;
    }
    writeln!(out)
}

fn run(settings: &Settings) -> Result<(), ReplayError> {
    let config = settings.bridge_config()?;
    tracing::debug!("Bridge config: {config:?}");

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let mut replay = Replay::new(&config, settings.map_index);

    let records = match &settings.script {
        Some(path) => {
            tracing::info!("Replaying {}", path.display());
            let file = BufReader::new(std::fs::File::open(path)?);
            runtime.block_on(replay.run(file))?
        }
        None => runtime.block_on(replay.run(std::io::stdin().lock()))?,
    };
    let teardown = replay.finish();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in records.iter().chain(std::iter::once(&teardown)) {
        write_record(&mut out, record, settings.pretty)?;
    }
    Ok(())
}

fn main() {
    logging::setup_logging();
    let settings = Settings::from_cli();

    if let Err(e) = run(&settings) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use zcanfd_lib::{CanClient, CanError, ClientConfig};

/// Wake-up request sent on startup
const WAKE_ID: u32 = 0x31C;
const WAKE_PAYLOAD: [u8; 5] = [0x02, 0x00, 0x00, 0x00, 0x00];

fn run(config: ClientConfig) -> Result<(), CanError> {
    let mut client = CanClient::open_library(config)?;
    client.set_trace_callback(Box::new(|entry| {
        println!(
            "{} {} {:>8} {} {}",
            entry.timestamp,
            entry.direction,
            entry
                .arbitration_id
                .map(|id| format!("0x{:X}", id))
                .unwrap_or_default(),
            entry.data_hex,
            entry.description
        );
    }));

    match client.send(WAKE_ID, &WAKE_PAYLOAD) {
        Some(n) if n > 0 => log::info!("Sent wake-up frame 0x{:X}", WAKE_ID),
        _ => log::warn!("Wake-up frame 0x{:X} was not accepted", WAKE_ID),
    }

    let mut received = 0usize;
    while let Some(msg) = client.recv(Some(Duration::from_secs(1))) {
        received += 1;
        log::debug!("Received {:?}", msg);
    }
    log::info!("Received {} message(s), no traffic for 1 s", received);

    client.stop()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match ClientConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}", e);
                std::process::exit(1);
            }
        },
        None => ClientConfig::default(),
    };

    if let Err(e) = run(config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

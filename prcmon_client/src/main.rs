//! User mode reader for the PrcMon driver. Polls the device on an interval and prints
//! every process creation and exit it hands back, until Ctrl-C.

#![cfg_attr(not(windows), allow(dead_code))]

mod console;
#[cfg(windows)]
mod device;
mod render;
mod settings;

#[cfg(windows)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use clap::Parser;
    use console::Printer;
    use device::DriverHandle;
    use settings::ClientSettings;
    use shared_no_std::constants::VERSION_CLIENT;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = ClientSettings::parse();
    log::info!("PrcMon client {VERSION_CLIENT}, polling every {}ms", settings.interval_ms);

    let device = DriverHandle::open().context("Failed to open device")?;
    let printer = Printer::new(settings.format);
    let mut buffer = vec![0u8; settings.buffer_size];

    let mut interval = tokio::time::interval(settings.interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = interval.tick() => {
                let bytes = device.read(&mut buffer).context("Failed to read from device")?;
                if bytes != 0 {
                    printer.display(&buffer[..bytes])?;
                }
            }
        }
    }

    println!("Exiting...");
    Ok(())
}

#[cfg(not(windows))]
fn main() {
    eprintln!("[-] prcmon_client reads from the PrcMon kernel driver and only runs on Windows.");
    std::process::exit(1);
}

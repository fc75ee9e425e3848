mod devmem;

use anyhow::{Context, Result};
use axi_spi_controller::config::Config;
use axi_spi_controller::poll::Delay;
use axi_spi_controller::regs::{Registers, REGISTER_BLOCK_SIZE};
use axi_spi_controller::sim::SimRegisters;
use axi_spi_controller::{AxiSpiController, TransferRunner};
use devmem::DevMem;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/axispi/config.yaml".to_string());

    info!("AXI SPI controller starting...");
    info!("Loading configuration from: {}", config_path);

    let config = Config::load(&config_path)?;
    info!(
        "Configuration loaded successfully, {} transfer(s)",
        config.transfers.len()
    );

    // Stop between rounds on Ctrl+C
    let should_stop = Arc::new(AtomicBool::new(false));
    let should_stop_ctrl_c = Arc::clone(&should_stop);
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, stopping...");
        should_stop_ctrl_c.store(true, Ordering::SeqCst);
    })
    .context("Failed to setup Ctrl+C handler")?;

    if config.device.simulate {
        info!("Using simulated register block");
        let mut ctrl = AxiSpiController::new(SimRegisters::new(config.spi.ss_width));
        run(&mut ctrl, &config, &should_stop)?;
    } else {
        let mut mapping = DevMem::map(
            &config.device.path,
            config.device.base_address,
            REGISTER_BLOCK_SIZE,
        )?;
        // SAFETY: the mapping covers the register block and outlives the controller
        let mut ctrl = unsafe { AxiSpiController::from_raw(mapping.as_mut_ptr()) }
            .context("Failed to bind controller")?;
        run(&mut ctrl, &config, &should_stop)?;
    }

    info!("AXI SPI controller shutdown complete");
    Ok(())
}

fn run<R: Registers, D: Delay>(
    ctrl: &mut AxiSpiController<R, D>,
    config: &Config,
    should_stop: &AtomicBool,
) -> Result<()> {
    ctrl.init(&config.spi).context("Failed to initialize controller")?;

    let mut round: u32 = 0;
    while !should_stop.load(Ordering::SeqCst) {
        round += 1;
        match TransferRunner::new(ctrl).run(&config.transfers) {
            Ok(received) => {
                for (transfer, rx) in config.transfers.iter().zip(&received) {
                    if !rx.is_empty() {
                        info!(
                            "Round {} cs {} {:?}: {:02x?}",
                            round, transfer.chip_select, transfer.description, rx
                        );
                    }
                }
            }
            Err(e) => {
                error!("Round {} failed: {:#}", round, e);
                return Err(e);
            }
        }

        if config.polling.repeat != 0 && round >= config.polling.repeat {
            break;
        }
        thread::sleep(Duration::from_millis(config.polling.interval_ms));
    }
    Ok(())
}

fn init_logger() {
    // Use `env_logger` for logging, defaulting to info
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

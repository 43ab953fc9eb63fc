use chirp::{BrowserBuilder, ChannelListener, ChirpConfig, ServiceEvent};
use crossbeam::channel::RecvTimeoutError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Usage: `chirp_browse [filter]` or `chirp_browse --config <path>`.
fn main() {
    chirp::logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let builder = match args.as_slice() {
        [flag, path] if flag == "--config" => match ChirpConfig::load(path) {
            Ok(config) => BrowserBuilder::from_config(config.browser.unwrap_or_default()),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(2);
            }
        },
        [filter] => chirp::browse(filter.as_str()),
        _ => chirp::browse("*"),
    };

    let (listener, events) = ChannelListener::new();
    let browser = match builder.listener(listener).start() {
        Ok(browser) => browser,
        Err(e) => {
            log::error!("failed to start browser: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("browsing for {}", browser.filter());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::info!("shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(ServiceEvent::Discovered(service)) => println!("+ {} {:?}", service, service.payload()),
            Ok(ServiceEvent::Updated(service)) => println!("~ {} {:?}", service, service.payload()),
            Ok(ServiceEvent::Removed(service)) => println!("- {}", service),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    browser.stop();
}

use chirp::{ChirpConfig, Payload, PublisherBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Usage: `chirp_publish <service-name> [payload-json]` or
/// `chirp_publish --config <path>`.
fn main() {
    chirp::logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let builder = match builder_from_args(&args) {
        Ok(builder) => builder,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: chirp_publish <service-name> [payload-json] | --config <path>");
            std::process::exit(2);
        }
    };

    let publisher = match builder.start() {
        Ok(publisher) => publisher,
        Err(e) => {
            log::error!("failed to start publisher: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("publishing {} as {}", publisher.service_name(), publisher.id());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::info!("shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
    publisher.stop();
}

fn builder_from_args(args: &[String]) -> chirp::Result<PublisherBuilder> {
    match args {
        [flag, path] if flag == "--config" => {
            let config = ChirpConfig::load(path)?;
            let publisher = config
                .publisher
                .ok_or_else(|| chirp::ChirpError::Config(format!("{} has no publisher section", path)))?;
            Ok(PublisherBuilder::from_config(publisher))
        }
        [name] => Ok(chirp::publish(name.as_str())),
        [name, payload] => {
            let payload: Payload = serde_json::from_str(payload)?;
            Ok(chirp::publish(name.as_str()).payload(payload))
        }
        _ => Err(chirp::ChirpError::Config("missing service name".into())),
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;

use hematite::config::{parse_cli_args, print_help};
use hematite::network::Server;

lazy_static! {
    /// Flipped by the signal handler, polled by the event loop and the
    /// replication client
    static ref SHUTDOWN: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

extern "C" fn handle_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM into the shutdown flag
fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_cli_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            print_help();
            std::process::exit(1);
        }
    };

    install_signal_handlers();

    let mut server = match Server::from_config(config, Arc::clone(&SHUTDOWN)) {
        Ok(server) => server,
        Err(err) => {
            log::error!("Startup failed: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = server.run() {
        log::error!("Server error: {}", err);
        std::process::exit(1);
    }

    log::info!("Goodbye");
}

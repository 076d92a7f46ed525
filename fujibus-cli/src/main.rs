mod cli;
mod commands;

use std::process;

use structopt::StructOpt;

use fujibus_core::transport::DEFAULT_READ_TIMEOUT;
use fujibus_core::{open_serial, BusSession};

use cli::Opt;

fn main() {
    let opt = Opt::from_args();

    if opt.debug && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "fujibus_core=debug");
    }
    pretty_env_logger::init();

    if let Err(e) = run(&opt) {
        eprintln!("error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(opt: &Opt) -> Result<(), fujibus_core::ProtocolError> {
    let port = open_serial(&opt.port, opt.baud, DEFAULT_READ_TIMEOUT)?;
    let mut session = BusSession::new(port);
    session.set_debug(opt.debug);
    commands::dispatch(&mut session, opt)
}

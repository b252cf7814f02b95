// SPDX-License-Identifier: GPL-3.0-only

use nipasswd::{
    ExitOutcome, Supervisor,
    access::SystemDirectory,
    cli::Args,
    error::{Error, SystemError},
    pam::PamBackend,
};
use nipasswd_config::Config;
use std::{io, process::ExitCode};
use tracing_subscriber::{Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(debug: bool) {
    // Standard error is part of the interface: silent on success, one line on failure
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(if debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::OFF
        });

    #[cfg(feature = "systemd")]
    let journald = tracing_journald::layer()
        .ok()
        .map(|layer| layer.with_filter(LevelFilter::INFO));
    #[cfg(not(feature = "systemd"))]
    let journald: Option<tracing_subscriber::layer::Identity> = None;

    let _ = tracing_subscriber::registry()
        .with(stderr)
        .with(journald)
        .try_init();
}

fn run(args: Args) -> Result<(), Error> {
    let config = Config::load().map_err(|err| SystemError::Config(format!("{err:#}")))?;
    tracing::debug!("{:?}", config);

    let mut backend = PamBackend::new(config.service.clone());
    Supervisor::new(&config, args.mode, args.strict).run(
        io::stdin().lock(),
        &SystemDirectory,
        &mut backend,
    )
}

fn main() -> ExitCode {
    let _ = color_eyre::install();

    let result = Args::parse(std::env::args_os()).and_then(|args| {
        init_logging(args.debug);
        run(args)
    });

    match result {
        Ok(()) => {
            tracing::debug!("terminating with success exit status");
            ExitOutcome::Success.into()
        }
        Err(err) => {
            eprintln!("{err}");
            err.outcome().into()
        }
    }
}

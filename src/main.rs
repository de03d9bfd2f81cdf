use anyhow::Result;
use log::warn;

use mhq_manager::cli::Cli;
use mhq_manager::config::AppConfig;
use mhq_manager::orchestration;

fn main() {
    let args = Cli::parse_args();

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    if let Err(e) = run(&args) {
        // Errors go to stdout so the user sees them even without a log setup.
        println!("ERR {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let config = AppConfig::resolve(args)?;

    // --uninstall is a command-line only operation.
    if args.uninstall {
        return orchestration::run_uninstall(&config);
    }

    if !args.no_gui {
        // The desktop shell ships separately; this binary always drives the
        // core headlessly.
        warn!("GUI mode is not bundled with this build, running headless install");
    }

    orchestration::run_install(&config)
}

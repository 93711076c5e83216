use clap::Parser;
use hb_buildtools::console::{init_logging, stop_line};
use hb_buildtools::resources::{ResourcesArgs, TOOL};

fn main() {
    init_logging();
    if let Err(err) = ResourcesArgs::parse().run() {
        eprintln!("{}", stop_line(TOOL, &format!("{err:#}")));
        std::process::exit(1);
    }
}

use clap::Parser;
use hb_buildtools::console::{init_logging, stop_line};
use hb_buildtools::makedeps::{MakedepsArgs, TOOL};

fn main() {
    init_logging();
    if let Err(err) = MakedepsArgs::parse().run() {
        eprintln!("{}", stop_line(TOOL, &format!("{err:#}")));
        std::process::exit(1);
    }
}

use clap::Parser;
use hb_buildtools::configure::{self, options::ConfigureArgs};
use hb_buildtools::console::{init_logging, stop_line, Console, Verbosity};

fn main() {
    init_logging();
    let args = ConfigureArgs::parse();
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let verbosity = Verbosity::from_count(u8::from(args.verbose));
    let mut console = Console::new(configure::TOOL, verbosity);
    if let Err(err) = configure::run(&args, &argv, &mut console) {
        eprintln!("{}", stop_line(configure::TOOL, &format!("{err:#}")));
        std::process::exit(1);
    }
}

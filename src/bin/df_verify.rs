use clap::{CommandFactory, Parser};
use hb_buildtools::console::{init_logging, stop_line, Console};
use hb_buildtools::distfile::verify::{self, Prepared, VerifyArgs};

fn main() {
    init_logging();
    let result = VerifyArgs::parse().prepare().and_then(|prepared| match prepared {
        Prepared::Disabled => {
            println!("{} disabled; stop.", verify::TOOL);
            Ok(())
        }
        Prepared::Usage => {
            let _ = VerifyArgs::command().print_help();
            std::process::exit(1);
        }
        Prepared::Run {
            file,
            sha256,
            verbosity,
        } => {
            let mut console = Console::new(verify::TOOL, verbosity);
            verify::verify(&file, sha256.as_deref(), &mut console).map(|_| ())
        }
    });
    if let Err(err) = result {
        eprintln!("{}", stop_line(verify::TOOL, &format!("{err:#}")));
        std::process::exit(1);
    }
}

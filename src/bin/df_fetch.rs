use clap::{CommandFactory, Parser};
use hb_buildtools::console::{init_logging, stop_line, Console};
use hb_buildtools::distfile::fetch::{self, DefaultTransport, FetchArgs, Prepared};

fn main() {
    init_logging();
    let prepared = match FetchArgs::parse().prepare() {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("{}", stop_line(fetch::TOOL, &format!("{err:#}")));
            std::process::exit(1);
        }
    };
    let (request, verbosity) = match prepared {
        Prepared::Disabled => {
            println!("{} disabled; stop.", fetch::TOOL);
            return;
        }
        Prepared::Usage => {
            let _ = FetchArgs::command().print_help();
            std::process::exit(1);
        }
        Prepared::Run(request, verbosity) => (request, verbosity),
    };

    let mut console = Console::new(fetch::TOOL, verbosity);
    let result = DefaultTransport::new()
        .and_then(|transport| fetch::fetch(&request, &transport, &mut console));
    if let Err(err) = result {
        eprintln!(
            "{}",
            stop_line(fetch::TOOL, &format!("download failure; {err:#}"))
        );
        std::process::exit(1);
    }
}

use hb_buildtools::console::{init_logging, stop_line};
use hb_buildtools::flatpak::{FlatpakArgs, FlatpakError, EXIT_MULTIPLE_ARCHIVES, TOOL};

fn main() {
    init_logging();
    let args = FlatpakArgs::try_parse_ordered(std::env::args_os()).unwrap_or_else(|err| err.exit());
    if let Err(err) = args.run() {
        if let Some(archive_err) = err.downcast_ref::<FlatpakError>() {
            println!("Error: {archive_err}");
            std::process::exit(EXIT_MULTIPLE_ARCHIVES);
        }
        eprintln!("{}", stop_line(TOOL, &format!("{err:#}")));
        std::process::exit(1);
    }
}

use std::process::ExitCode;

fn main() -> ExitCode {
    tripcover_cli::run()
}

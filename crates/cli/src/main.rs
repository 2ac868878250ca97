use std::process::ExitCode;

fn main() -> ExitCode {
    attendly_cli::run()
}

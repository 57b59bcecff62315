use std::process::ExitCode;

fn main() -> ExitCode {
    saleslens_cli::run()
}

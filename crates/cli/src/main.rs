use std::process::ExitCode;

fn main() -> ExitCode {
    portaflow_cli::run()
}

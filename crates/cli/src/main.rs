use std::process::ExitCode;

fn main() -> ExitCode {
    awxchat_cli::run()
}

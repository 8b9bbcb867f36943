//! Main entry point for the ipkbuild CLI app

fn main() -> std::process::ExitCode {
    match ipkbuild::cli_runner::run_cli_app() {
        Ok(package) => {
            println!("{}", package.display());
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

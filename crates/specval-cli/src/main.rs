fn main() -> std::process::ExitCode {
    specval_cli::run()
}

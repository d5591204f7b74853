fn main() {
    let options = match phrasefind_core::runtime::parse_cli_args(std::env::args_os()) {
        Ok(options) => options,
        Err(error) => error.exit(),
    };

    if let Err(error) = phrasefind_core::runtime::run_with_options(options) {
        tracing::error!("runtime failed: {error}");
        eprintln!("[phrasefind-core] {error}");
        std::process::exit(1);
    }
}

use clap::Parser;
use handoff_cli::{init_tracing, run, Args};

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(code) => code.into(),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::ExitCode::from(1)
        }
    }
}

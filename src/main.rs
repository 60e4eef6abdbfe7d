//! splitpress - CLI entry point

use clap::Parser;
use splitpress::{
    inspect, BatchRunner, CancellationToken, Cli, Commands, ExitCode, Ghostscript, InfoArgs,
    JsonSink, ProgressSink, SplitArgs, TerminalSink,
};

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Split(args) => run_split(&args),
        Commands::Info(args) => run_info(&args),
    };

    std::process::exit(code.code());
}

// ============ Split Command ============

fn run_split(args: &SplitArgs) -> ExitCode {
    for input in &args.inputs {
        if !input.exists() {
            eprintln!("Error: input file does not exist: {}", input.display());
            return ExitCode::InputNotFound;
        }
    }

    let engine = Ghostscript::locate();
    if engine.is_none() && (args.compress.is_some() || args.repair_only) {
        eprintln!(
            "Error: Ghostscript (gs) is required for --compress/--repair-only \
             but was not found on PATH"
        );
        return ExitCode::ExternalToolError;
    }

    let config = args.to_config();
    let sink: Box<dyn ProgressSink> = if args.json {
        Box::new(JsonSink)
    } else {
        Box::new(TerminalSink::new())
    };

    let token = CancellationToken::new();
    let runner = BatchRunner::new(config, engine.as_ref());
    let summary = runner.run(&args.inputs, &token, sink);

    if summary.cancelled {
        ExitCode::Cancelled
    } else if summary.completed == summary.total {
        ExitCode::Success
    } else {
        // Partial success still surfaces as an error for scripting.
        ExitCode::ProcessingError
    }
}

// ============ Info Command ============

fn run_info(args: &InfoArgs) -> ExitCode {
    let engine = Ghostscript::locate();

    if args.inputs.is_empty() {
        println!("splitpress {}", env!("CARGO_PKG_VERSION"));
        println!(
            "Ghostscript: {}",
            if engine.is_some() {
                "available"
            } else {
                "not found"
            }
        );
        return ExitCode::Success;
    }

    let mut code = ExitCode::Success;
    for input in &args.inputs {
        let info = inspect(input, engine.as_ref());
        if args.json {
            match serde_json::to_string(&info) {
                Ok(line) => println!("{}", line),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    code = ExitCode::GeneralError;
                }
            }
        } else {
            println!(
                "{}: {} pages, {} [{}]{}",
                info.name,
                info.pages,
                info.size_human,
                match info.status {
                    splitpress::PdfStatus::Ok => "ok",
                    splitpress::PdfStatus::NeedsRepair => "needs repair",
                    splitpress::PdfStatus::Error => "error",
                },
                if info.error.is_empty() {
                    String::new()
                } else {
                    format!(" {}", info.error)
                }
            );
        }
        if info.status == splitpress::PdfStatus::Error {
            code = ExitCode::InputNotFound;
        }
    }
    code
}

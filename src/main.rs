//! fun CLI - file runner, REPL, and stub language server

use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::Parser as ClapParser;

use fun::module::{Module, Program, INLINE_MODULE};
use fun::types::{Scheme, Type, TASK_CONS};

/// A purely fun-ctional language
#[derive(ClapParser)]
#[command(name = "fun", version, about, long_about = None)]
struct Cli {
    /// Source file to run as the root module; `lsp` enters the stub
    /// language-server mode; omit to start the REPL
    file: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.file.as_deref() {
        Some("lsp") => match fun::lsp::serve() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("lsp error: {}", e);
                ExitCode::FAILURE
            }
        },
        Some(path) => run_file(path),
        None => repl(),
    }
}

/// A module whose type is a `Task` application is a deferred program:
/// the driver runs it by applying the final value.
fn is_task(scheme: &Scheme) -> bool {
    matches!(&scheme.ty, Type::Cons { name, .. } if name == TASK_CONS)
}

fn finish(program: &mut Program, module: &Module) -> Result<String, String> {
    if is_task(&module.scheme) {
        let evaluator = program.evaluator();
        let result = evaluator
            .apply(&module.value, &[], program)
            .map_err(|e| e.to_string())?;
        Ok(format!("{} : {}", result, module.scheme))
    } else {
        Ok(module.to_string())
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("failed to read {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let mut program = Program::new();
    let module = match program.run(&source, path) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match finish(&mut program, &module) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn repl() -> ExitCode {
    println!("fun v{} - type .help for help", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut program = Program::new();
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "> " } else { ". " };
        print!("{}", prompt);
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end();

        if buffer.is_empty() {
            match line {
                "" => continue,
                "quit" | "exit" => break,
                ".clear" => {
                    program = Program::new();
                    continue;
                }
                ".help" => {
                    println!("Commands:");
                    println!("  .help        Show this help");
                    println!("  .clear       Reset the session");
                    println!("  quit, exit   Leave the REPL");
                    println!("End a line with \\ to continue it on the next line.");
                    continue;
                }
                _ => {}
            }
        }

        // backslash continuation joins lines before parsing
        if let Some(rest) = line.strip_suffix('\\') {
            buffer.push_str(rest);
            buffer.push('\n');
            continue;
        }
        buffer.push_str(line);
        let input = std::mem::take(&mut buffer);
        if input.trim().is_empty() {
            continue;
        }

        match program.run(&input, INLINE_MODULE) {
            Ok(module) => match finish(&mut program, &module) {
                Ok(output) => println!("{}", output),
                Err(e) => eprintln!("{}", e),
            },
            Err(e) => eprintln!("{}", e),
        }
    }

    println!("Goodbye!");
    ExitCode::SUCCESS
}

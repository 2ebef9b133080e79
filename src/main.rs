//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, Context};
use clap::{crate_version, Arg, Command};
use pyc::{
    platform,
    toolchain::{BuildError, BuildOptions},
    CompileError, Trace,
};

use std::{
    fs::File,
    io::{self, BufReader, Write},
    path::Path,
    process,
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("pyc")
        .version(crate_version!())
        .about("Compiles a restricted subset of Python to C")
        .arg(
            Arg::new("platform")
                .short('p')
                .long("platform")
                .value_name("ID")
                .takes_value(true)
                .default_value(platform::default().id)
                .help("Target platform"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("PATH")
                .help("Build with the platform toolchain ('-' or absent for C on stdout)"),
        )
        .arg(
            Arg::new("strip")
                .short('s')
                .long("strip")
                .help("Strip executables"),
        )
        .arg(
            Arg::new("werror")
                .long("werror")
                .help("Treat C compiler warnings as errors"),
        )
        .arg(
            Arg::new("dump-tokens")
                .long("dump-tokens")
                .help("Print the token stream to stderr"),
        )
        .arg(
            Arg::new("dump-ast")
                .long("dump-ast")
                .help("Print the syntax tree to stderr"),
        )
        .arg(
            Arg::new("list-platforms")
                .long("list-platforms")
                .help("List available platforms and exit"),
        )
        .arg(
            Arg::new("SOURCE")
                .index(1)
                .default_value("-")
                .help("Source file ('-' for stdin)"),
        )
        .get_matches();

    if args.is_present("list-platforms") {
        for platform in platform::PLATFORMS {
            println!("{:16} {}", platform.id, platform.description);
        }

        return Ok(());
    }

    // Se extraen argumentos necesarios
    let platform = platform::lookup(args.value_of("platform").unwrap_or_default())?;
    let source = args.value_of("SOURCE").unwrap_or("-");

    let dump_tokens = args.is_present("dump-tokens");
    let dump_ast = args.is_present("dump-ast");
    let trace = |trace: Trace<'_>| match trace {
        Trace::Tokens(tokens) if dump_tokens => {
            for token in tokens {
                eprintln!("{}", token);
            }
        }

        Trace::Ast(ast) if dump_ast => eprintln!("{:#?}", ast),
        _ => (),
    };

    let result = if source == "-" {
        let stdin = io::stdin();
        pyc::compile_traced(stdin.lock(), "<stdin>", platform, trace)
    } else {
        let file = File::open(source)
            .with_context(|| format!("Failed to open for reading: {}", source))?;

        pyc::compile_traced(BufReader::new(file), source, platform, trace)
    };

    let code = match result {
        Ok(code) => code,
        Err(error) => report(error)?,
    };

    match args.value_of("output") {
        // Salida a stdout sin compilar
        None | Some("-") => {
            let stdout = io::stdout();
            let mut stdout = stdout.lock();

            stdout
                .write_all(code.as_bytes())
                .and_then(|()| stdout.flush())
                .context("Failed to write to stdout")?;
        }

        // Salida a archivo, pasando por la toolchain
        Some(path) => {
            let mut options = BuildOptions::empty();
            if args.is_present("strip") {
                options |= BuildOptions::STRIP;
            }

            if args.is_present("werror") {
                options |= BuildOptions::WARNINGS_AS_ERRORS;
            }

            match platform.toolchain.build(&code, Path::new(path), options) {
                Ok(()) => (),

                // El código de salida de la toolchain se propaga sin cambios
                Err(BuildError::Failed(status)) => process::exit(status.code().unwrap_or(1)),

                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("Failed to generate executable: {}", path))
                }
            }
        }
    };

    Ok(())
}

/// Reporta errores del programa fuente y termina con código 1.
fn report(error: CompileError) -> anyhow::Result<String> {
    let diagnostics = error.diagnostics().context("Code generation failed")?;
    eprint!("{}", diagnostics);

    process::exit(1)
}

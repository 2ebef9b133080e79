//! Construcción de ejecutables.
//!
//! Una vez que se ha emitido código C, este debe ser compilado por
//! la toolchain de la plataforma objetivo para producir un binario o
//! una imagen de ROM. El compilador de C siempre es externo.

use std::{
    fs,
    io::{self, BufWriter, Write},
    path::Path,
    process::{Command, ExitStatus, Stdio},
};

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Opciones a aplicar durante la construcción.
    pub struct BuildOptions: u32 {
        /// Remover símbolos de depuración del ejecutable final.
        const STRIP = 0x01;

        /// Tratar toda advertencia del compilador de C como error.
        const WARNINGS_AS_ERRORS = 0x02;
    }
}

/// Un error de compilación de C.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BuildError {
    /// Ocurrió un evento de error de E/S durante la invocación
    /// de comandos externos.
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// La toolchain inició su ejecución, pero terminó con error.
    #[error("Toolchain exited with status code {0:?}")]
    Failed(ExitStatus),
}

/// Forma de invocar al compilador de C de una plataforma.
#[derive(Copy, Clone, Debug)]
pub enum Toolchain {
    /// Un compilador hosted que recibe el código por stdin.
    Pipe {
        command: &'static str,
        args: &'static [&'static str],
    },

    /// Una imagen de contenedor que construye un proyecto montado
    /// en `/src`. El código se escribe en `src/main.c` dentro del
    /// directorio de salida y el resultado queda en `out/`.
    Container { image: &'static str },
}

impl Toolchain {
    /// Compila una unidad de traducción hacia `output`.
    ///
    /// Las opciones solo afectan a toolchains [`Toolchain::Pipe`]; el
    /// proyecto de una imagen de contenedor define sus propios flags.
    pub fn build(
        &self,
        code: &str,
        output: &Path,
        options: BuildOptions,
    ) -> Result<(), BuildError> {
        let status = match self {
            Toolchain::Pipe { .. } => {
                // Para compilar el código generado, se hace pipe del
                // mismo al stdin del compilador
                let mut child = self.command(output, options).spawn()?;
                let stdin = child.stdin.take().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::BrokenPipe, "toolchain stdin is not piped")
                })?;

                let mut stdin = BufWriter::new(stdin);
                stdin.write_all(code.as_bytes())?;
                stdin.flush()?;
                drop(stdin);

                child.wait()?
            }

            Toolchain::Container { .. } => {
                let sources = output.join("src");
                fs::create_dir_all(&sources)?;
                fs::write(sources.join("main.c"), code)?;

                let project = fs::canonicalize(output)?;
                self.command(&project, options).status()?
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(BuildError::Failed(status))
        }
    }

    /// Construye el comando de compilación sin ejecutarlo.
    fn command(&self, output: &Path, options: BuildOptions) -> Command {
        match *self {
            Toolchain::Pipe { command, args } => {
                let mut command = Command::new(command);
                command.args(args);

                if options.contains(BuildOptions::WARNINGS_AS_ERRORS) {
                    command.arg("-Werror");
                }

                if options.contains(BuildOptions::STRIP) {
                    command.arg("-s");
                }

                // Se asume entrada en C desde stdin
                command
                    .args(&["-x", "c", "-", "-o"])
                    .arg(output)
                    .stdin(Stdio::piped());

                command
            }

            Toolchain::Container { image } => {
                let mut volume = output.as_os_str().to_owned();
                volume.push(":/src");

                let mut command = Command::new("docker");
                command.args(&["run", "--rm", "-v"]).arg(volume).arg(image);

                command
            }
        }
    }
}

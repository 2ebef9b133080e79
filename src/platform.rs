//! Registro de plataformas objetivo.
//!
//! Una plataforma define el entorno en el que corre el código C
//! generado: cabeceras, punto de entrada, funciones builtin disponibles
//! para el programa y la toolchain que lo compila. Las plataformas son
//! descriptores estáticos de solo lectura; agregar una plataforma
//! consiste en agregar un descriptor a [`PLATFORMS`].
//!
//! # Plantillas
//! Los puntos de entrada y las expansiones de builtins son plantillas de
//! texto. Un marcador tiene la forma `{nombre}`, donde `nombre` consta
//! únicamente de caracteres alfanuméricos ASCII o `_`. Cualquier otra
//! llave se copia literalmente, lo cual permite escribir bloques de C
//! dentro de las plantillas. La expansión ocurre en una sola pasada: el
//! texto sustituido nunca se vuelve a examinar.

use thiserror::Error;

use crate::{ir::Type, toolchain::Toolchain};

/// Descriptor de una plataforma.
#[derive(Debug)]
pub struct Platform {
    /// Identificador para la CLI.
    pub id: &'static str,

    /// Descripción legible.
    pub description: &'static str,

    /// Cabeceras de C, en orden de inclusión.
    pub includes: &'static [&'static str],

    /// Plantilla del punto de entrada, con marcadores
    /// `{statements}` y `{completion}`.
    pub entry: &'static str,

    pub builtins: &'static [Builtin],
    pub toolchain: Toolchain,
}

/// Función de plataforma que se reemplaza por una secuencia fija de C.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub parameters: &'static [Type],
    pub returns: Type,

    /// Plantilla con marcadores `{0}`, `{1}`, ... para los argumentos.
    pub expansion: &'static str,
}

impl Platform {
    /// Busca un builtin de esta plataforma.
    pub fn builtin(&self, name: &str) -> Option<&'static Builtin> {
        self.builtins.iter().find(|builtin| builtin.name == name)
    }
}

#[derive(Error, Debug)]
#[error("Unknown platform `{0}`")]
pub struct UnknownPlatformError(pub String);

#[derive(Error, Debug)]
#[error("Template placeholder `{{{0}}}` has no value")]
pub struct UnboundPlaceholder(pub String);

/// Plataformas registradas. La primera es la plataforma por omisión.
pub static PLATFORMS: &[Platform] = &[DESKTOP_PROCESS, CONSOLE_MD];

const DESKTOP_PROCESS: Platform = Platform {
    id: "desktop-process",
    description: "Hosted process, completion value is the exit status",
    includes: &["stdint.h", "stdio.h"],
    entry: "int main(void)\n{\n{statements}\treturn (int) {completion};\n}\n",
    builtins: &[Builtin {
        name: "print",
        parameters: &[Type::Str],
        returns: Type::Void,
        expansion: "(void) puts({0})",
    }],
    toolchain: Toolchain::Pipe {
        command: "cc",
        args: &["-std=c99", "-pedantic", "-Wall", "-Wextra"],
    },
};

// SGDK invoca `main(bool hardReset)` luego de inicializar el hardware.
// El programa nunca retorna: el valor de completitud se dibuja en la
// última fila de texto y se espera por siempre en vblank.
const CONSOLE_MD: Platform = Platform {
    id: "console-md",
    description: "Sega Mega Drive / Genesis ROM built with SGDK",
    includes: &["stdint.h", "genesis.h"],
    entry: "int main(bool hardReset)\n\
            {\n\
            \t(void) hardReset;\n\
            \tVDP_setScreenWidth320();\n\
            \tVDP_setTextPalette(PAL0);\n\
            {statements}\
            \t{\n\
            \t\tchar completion_text[12];\n\
            \t\tintToStr({completion}, completion_text, 1);\n\
            \t\tVDP_drawText(completion_text, 1, 26);\n\
            \t}\n\
            \twhile (TRUE)\n\
            \t{\n\
            \t\tSYS_doVBlankProcess();\n\
            \t}\n\
            \treturn 0;\n\
            }\n",
    builtins: &[
        Builtin {
            name: "draw_text",
            parameters: &[Type::Str, Type::Int, Type::Int],
            returns: Type::Void,
            expansion: "VDP_drawText({0}, (u16) {1}, (u16) {2})",
        },
        Builtin {
            name: "clear_text",
            parameters: &[Type::Int, Type::Int, Type::Int],
            returns: Type::Void,
            expansion: "VDP_clearText((u16) {0}, (u16) {1}, (u16) {2})",
        },
        Builtin {
            name: "set_background",
            parameters: &[Type::Int],
            returns: Type::Void,
            expansion: "VDP_setBackgroundColor((u8) {0})",
        },
        Builtin {
            name: "wait_vblank",
            parameters: &[],
            returns: Type::Void,
            expansion: "SYS_doVBlankProcess()",
        },
    ],
    toolchain: Toolchain::Container {
        image: "ghcr.io/stephane-d/sgdk:latest",
    },
};

/// Busca una plataforma por identificador, sin distinguir mayúsculas.
pub fn lookup(id: &str) -> Result<&'static Platform, UnknownPlatformError> {
    PLATFORMS
        .iter()
        .find(|platform| unicase::eq_ascii(platform.id, id))
        .ok_or_else(|| UnknownPlatformError(id.to_owned()))
}

/// Plataforma por omisión.
pub fn default() -> &'static Platform {
    &PLATFORMS[0]
}

/// Busca alguna plataforma registrada que ofrezca un builtin con este nombre.
pub fn provider_of(name: &str) -> Option<&'static Platform> {
    PLATFORMS
        .iter()
        .find(|platform| platform.builtin(name).is_some())
}

/// Expande los marcadores de una plataforma en una sola pasada.
pub fn expand<'a, F>(template: &str, mut lookup: F) -> Result<String, UnboundPlaceholder>
where
    F: FnMut(&str) -> Option<&'a str>,
{
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        rest = &rest[open..];

        let name = rest[1..]
            .find('}')
            .map(|close| &rest[1..close + 1])
            .filter(|name| is_placeholder(name));

        match name {
            Some(name) => {
                let value = lookup(name).ok_or_else(|| UnboundPlaceholder(name.to_owned()))?;
                output.push_str(value);
                rest = &rest[name.len() + 2..];
            }

            None => {
                output.push('{');
                rest = &rest[1..];
            }
        }
    }

    output.push_str(rest);
    Ok(output)
}

/// Expande un builtin con argumentos ya generados.
pub fn expand_builtin(
    builtin: &Builtin,
    arguments: &[String],
) -> Result<String, UnboundPlaceholder> {
    expand(builtin.expansion, |name| {
        let index: usize = name.parse().ok()?;
        arguments.get(index).map(String::as_str)
    })
}

fn is_placeholder(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(lookup("desktop-process").unwrap().id, "desktop-process");
        assert_eq!(lookup("Console-MD").unwrap().id, "console-md");

        let error = lookup("gameboy").unwrap_err();
        assert_eq!(error.to_string(), "Unknown platform `gameboy`");
    }

    #[test]
    fn default_is_desktop() {
        assert_eq!(default().id, "desktop-process");
    }

    #[test]
    fn builtins_belong_to_their_platform() {
        let desktop = lookup("desktop-process").unwrap();
        let console = lookup("console-md").unwrap();

        assert!(desktop.builtin("print").is_some());
        assert!(desktop.builtin("draw_text").is_none());
        assert!(console.builtin("draw_text").is_some());

        assert_eq!(provider_of("draw_text").map(|p| p.id), Some("console-md"));
        assert!(provider_of("frobnicate").is_none());
    }

    #[test]
    fn expansions_use_every_argument_once() {
        for platform in PLATFORMS {
            for builtin in platform.builtins {
                for i in 0..builtin.parameters.len() {
                    let placeholder = format!("{{{}}}", i);
                    assert_eq!(
                        builtin.expansion.matches(&placeholder).count(),
                        1,
                        "{} in {}::{}",
                        placeholder,
                        platform.id,
                        builtin.name
                    );
                }

                let extra = format!("{{{}}}", builtin.parameters.len());
                assert!(!builtin.expansion.contains(&extra));
            }
        }
    }

    #[test]
    fn entry_templates_have_both_placeholders() {
        for platform in PLATFORMS {
            assert_eq!(platform.entry.matches("{statements}").count(), 1);
            assert_eq!(platform.entry.matches("{completion}").count(), 1);
        }
    }

    #[test]
    fn expansion_is_single_pass() {
        let expanded = expand("f({a}, {b}) { x; }", |name| match name {
            "a" => Some("{b}"),
            "b" => Some("2"),
            _ => None,
        })
        .unwrap();

        assert_eq!(expanded, "f({b}, 2) { x; }");
    }

    #[test]
    fn unbound_placeholders_fail() {
        let error = expand("{missing}", |_| None).unwrap_err();
        assert_eq!(error.0, "missing");
    }

    #[test]
    fn builtin_expansion() {
        let console = lookup("console-md").unwrap();
        let draw_text = console.builtin("draw_text").unwrap();

        let arguments = ["\"hi\"".to_owned(), "1".to_owned(), "2".to_owned()];
        assert_eq!(
            expand_builtin(draw_text, &arguments).unwrap(),
            "VDP_drawText(\"hi\", (u16) 1, (u16) 2)"
        );
    }
}

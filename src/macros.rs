/// Emite una línea de C con la indentación actual del emisor.
macro_rules! emit {
    ($emitter:expr, $($format:tt)*) => {{
        for _ in 0..$emitter.depth {
            $emitter.output.push('\t');
        }

        writeln!($emitter.output, $($format)*)
    }};
}

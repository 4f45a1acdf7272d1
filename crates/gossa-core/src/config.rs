use std::sync::OnceLock;

fn env_true(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|val| {
        let trimmed = val.trim();
        !trimmed.is_empty() && !matches!(trimmed, "0" | "false" | "FALSE" | "False")
    })
}

fn bool_from_env(key: &str) -> bool {
    env_true(key).unwrap_or(false)
}

/// Build packages one after another instead of on the rayon pool.
pub fn serial_build() -> bool {
    static SERIAL: OnceLock<bool> = OnceLock::new();
    *SERIAL.get_or_init(|| bool_from_env("GOSSA_SERIAL_BUILD"))
}

/// Skip emitting `Trace` markers at statement boundaries.
pub fn no_debug_markers() -> bool {
    static NO_MARKERS: OnceLock<bool> = OnceLock::new();
    *NO_MARKERS.get_or_init(|| bool_from_env("GOSSA_NO_DEBUG_MARKERS"))
}

/// Let interpreter faults crash the host instead of turning them into exit code 2.
pub fn no_catch_faults() -> bool {
    static NO_CATCH: OnceLock<bool> = OnceLock::new();
    *NO_CATCH.get_or_init(|| bool_from_env("GOSSA_NO_CATCH"))
}

/// Start with statement tracing enabled.
pub fn trace_statements() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| bool_from_env("GOSSA_TRACE"))
}

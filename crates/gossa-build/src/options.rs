use gossa_core::config;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Build packages sequentially on the calling thread.
    pub serial: bool,
    /// Emit `Trace` markers at statement boundaries and control points.
    pub debug_markers: bool,
    /// Run the CFG sanity checker on every finished body and panic on issues.
    pub sanity_check: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            serial: config::serial_build(),
            debug_markers: !config::no_debug_markers(),
            sanity_check: cfg!(debug_assertions),
        }
    }
}

impl BuildOptions {
    pub fn serial(mut self, serial: bool) -> Self {
        self.serial = serial;
        self
    }

    pub fn debug_markers(mut self, enabled: bool) -> Self {
        self.debug_markers = enabled;
        self
    }

    pub fn sanity_check(mut self, enabled: bool) -> Self {
        self.sanity_check = enabled;
        self
    }
}

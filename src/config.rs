/// Overridable runtime tunables (SPEC_FULL §1.1), mirroring the teacher's
/// bare-`constants` module but as fields a caller can set per-run rather
/// than compile-time constants.
#[derive(Clone, Copy, Debug)]
pub struct VmConfig {
    /// Ticks between stop-the-world GC cycles (SPEC_FULL §4.4).
    pub cycles_on_collect: u64,
    /// Initial capacity reserved for each new thread's value stack.
    pub initial_vstack_capacity: usize,
    /// Initial capacity reserved for each new thread's call stack.
    pub initial_cstack_capacity: usize,
    /// Maximum call-stack depth before a thread throws `RuntimeError`
    /// instead of growing `cstack` further (SPEC_FULL §1.2).
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> VmConfig {
        VmConfig {
            cycles_on_collect: 500,
            initial_vstack_capacity: 64,
            initial_cstack_capacity: 32,
            max_call_depth: 4096,
        }
    }
}

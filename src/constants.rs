/// Minimum dimension size the language permits at array-declaration time
/// (SPEC_FULL §3: "the language forbids 0- or 1-sized dimensions at
/// declaration"). Enforced by the compiler's `DeclNum`/`DeclScope` lowering.
pub const MIN_ARRAY_DIM: usize = 2;

// Constants for the machine

/// Upper end of the bounded integer domain; it tracks exact values in `[-1, BOUNDED_K]`
pub const BOUNDED_K: i128 = 100;

/// Unknown bits a concrete decode may enumerate before giving up
pub const MAX_UNKNOWN_BITS: u32 = 8;

/// Cap on distinct byte patterns assembled for one cross-unit access
pub const MAX_BYTE_COMBINATIONS: usize = 64;

/// Largest heap block `malloc`/`calloc` hand out; larger requests yield NULL
pub const MAX_HEAP_BLOCK: usize = 1 << 20;

/// Cap on tasks created for one `omp for`
pub const MAX_LOOP_TASKS: usize = 100_000;

/// Steps between sweeps of unreachable concrete continuations
pub const KONT_SWEEP_INTERVAL: u64 = 1024;

/// Store numbering starts here; 0 is the null sentinel in the unit chain
pub const FIRST_UNIT_ADDRESS: usize = 1;

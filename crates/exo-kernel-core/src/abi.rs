//! Syscall numbers shared by the gateway and the user-side library

/// Syscall numbers, in table order.
pub mod syscall {
    /// Print a byte string to the console
    pub const SYS_CPUTS: u64 = 0;
    /// Read one console character without blocking (0 if none pending)
    pub const SYS_CGETC: u64 = 1;
    /// Return the caller's environment identifier
    pub const SYS_GETENVID: u64 = 2;
    /// Destroy an environment (possibly the caller)
    pub const SYS_ENV_DESTROY: u64 = 3;
    /// Allocate and map fresh zeroed memory in an environment
    pub const SYS_ALLOC_REGION: u64 = 4;
    /// Map a region from one environment into another
    pub const SYS_MAP_REGION: u64 = 5;
    /// Remove a mapping from an environment
    pub const SYS_UNMAP_REGION: u64 = 6;
    /// Query reference counts of mapped regions
    pub const SYS_REGION_REFS: u64 = 7;
    /// Create a blank child environment sharing the caller's registers
    pub const SYS_EXOFORK: u64 = 8;
    /// Set an environment's scheduling status
    pub const SYS_ENV_SET_STATUS: u64 = 9;
    /// Install an environment's page-fault upcall entry point
    pub const SYS_ENV_SET_PGFAULT_UPCALL: u64 = 10;
    /// Give up the CPU voluntarily
    pub const SYS_YIELD: u64 = 11;
    /// Non-blocking IPC send
    pub const SYS_IPC_TRY_SEND: u64 = 12;
    /// Blocking IPC receive
    pub const SYS_IPC_RECV: u64 = 13;
}

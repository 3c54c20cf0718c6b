//! Global allocator.
//!
//! Every upload allocates one buffer per pulled chunk on each pass, so
//! the binary uses mimalloc instead of the system allocator.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

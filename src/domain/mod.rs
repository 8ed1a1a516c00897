// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that define what the
// detector works with: boxes, proposals, image info, the
// configuration object and the error type.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - NO tensor math beyond single-box helpers
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Boxes, deltas, proposals and image info
pub mod boxes;

// The immutable detector configuration
pub mod config;

// Error taxonomy of the detection core
pub mod error;

// Abstractions implemented by the data and infra layers
pub mod traits;

// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// specific goal per use case.
//
// Rules for this layer:
//   - No box math or model code here
//   - No printing here (that's Layer 1)
//   - No direct file access (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Every use case returns a serialisable report; the CLI decides
// how to show it.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Anchor layout inspection
pub mod anchors_use_case;

// Proposal decoding over a tensor dump
pub mod propose_use_case;

// Anchor target assignment over a tensor dump
pub mod assign_use_case;

// End-to-end network smoke run
pub mod probe_use_case;

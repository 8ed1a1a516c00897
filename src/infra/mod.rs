// ============================================================
// Layer 6: Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   config_store.rs - Loading and saving CtpnConfig as JSON.
//                     Missing files fall back to defaults;
//                     everything loaded is validated.
//
// Logging is set up once in main.rs with tracing-subscriber.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// JSON configuration persistence
pub mod config_store;

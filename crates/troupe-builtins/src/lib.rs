//! Built-in tools for the Troupe workflow engine.
//!
//! These are deliberately thin: they exist so the tool wiring (registry,
//! allowlists, timeouts, error results) is exercised by something real.
//! Production deployments are expected to register their own tools.

/// Echo tool for wiring tests.
pub mod echo;
/// HTTP GET tool with scheme and private-host guards.
pub mod http_fetch;
/// Line/word/item counting over a text payload.
pub mod text_stats;

pub use echo::EchoTool;
pub use http_fetch::HttpFetchTool;
pub use text_stats::TextStatsTool;

//! Worker-side store primitives: the confined handle and live collections.
//!
//! Handles and live collections are not `Send`. Values cross to callers only after being
//! decoded into owned entities by the stream adapter.

pub mod handle;
pub mod live;

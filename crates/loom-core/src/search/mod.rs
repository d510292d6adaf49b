//! Branch expansion.
//!
//! [`BranchExpander`] turns a node's next-token scores into at most `width`
//! children using a softmax followed by a deterministic top-k.
//!
//! # Example
//!
//! ```
//! use loom_core::config::LoomConfig;
//! use loom_core::search::BranchExpander;
//!
//! let expander = BranchExpander::new(&LoomConfig::new(2, 3), 10).unwrap();
//!
//! // Logits where token 5 is highest, then 3, then 7
//! let logits = [0.0, 0.0, 0.0, 2.0, 0.0, 5.0, 0.0, 1.5, 0.0, 0.0];
//! let selected = expander.select_tokens(&logits).unwrap();
//!
//! let tokens: Vec<u32> = selected.iter().map(|(t, _)| *t).collect();
//! assert_eq!(tokens, vec![5, 3, 7]);
//! ```

mod expander;

pub use expander::{softmax, top_k, BranchExpander, Expansion};

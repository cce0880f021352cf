//! Property-based tests for index rewriting and the replay window

mod index_rewrite;
mod replay_window;

//! Reusable test fixtures

mod two_node;

pub use two_node::{EVENT_TIMEOUT, TwoNodeFixture, fast_config, next_event};

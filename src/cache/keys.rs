//! Key formats for the post read cache.
//!
//! Two keys exist per post: a hash with the serialized snapshot and an
//! integer counter of views not yet flushed to the store.

use uuid::Uuid;

pub fn post_key(id: Uuid) -> String {
    format!("post:{id}")
}

pub fn view_key(id: Uuid) -> String {
    format!("post_view:{id}")
}

//! Views over recorded items
//!
//! - TableView: lookup by structural id with duplicate detection
//! - TreeView: layer hierarchy with forward/backward traversal orders

mod table;
mod tree;

pub use table::TableView;
pub use tree::TreeView;

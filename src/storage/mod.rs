pub mod btree;
mod freelist;
pub mod internal;
pub mod leaf;
pub mod page;
pub mod pager;

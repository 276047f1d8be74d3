//! Drivers module for storage operations
//!
//! The filesystem driver is the only backend: buckets, registries and
//! analytics all live on local disk.

mod filesystem;

pub use filesystem::{
    bytes_to_mb, copy_dir_all, dir_size, is_symlink, link_or_copy, path_occupied, read_json,
    read_json_opt, remove_link, write_json_atomic, FileLock, LinkKind, LOCK_FILE,
};

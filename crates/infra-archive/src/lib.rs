// Librarian archive adapter

mod client;

pub use client::{LibrarianClient, LibrarianConfig};

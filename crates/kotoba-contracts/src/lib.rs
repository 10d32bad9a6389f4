pub mod api;
pub mod events;
pub mod extract;
pub mod kanji;
pub mod models;

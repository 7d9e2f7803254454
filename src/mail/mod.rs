pub mod api;
pub mod decoders;
pub mod delivery;
pub mod imap_client;
pub mod mailbox;
pub mod message;
pub mod smtp;

pub mod annotation;
pub mod client;
pub mod reporter;
pub mod testlink;
pub mod xmlrpc;

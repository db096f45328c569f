/// HTTP collaborator abstraction and its implementations.
pub mod client;
pub mod providers;

pub use client::{ClientConfig, HttpClient, HttpClientEnum, HttpResponse};

/// Concrete HTTP client implementations.
pub mod dry_run;
#[cfg(feature = "reqwest-client")]
pub mod reqwest_client;

pub mod clock;
pub mod protocol;
pub mod relay_client;

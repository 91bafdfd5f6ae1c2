pub mod provider;
pub mod request;

pub use provider::ProviderCallError;
pub use request::RequestError;

pub mod models;
pub mod network;
pub mod parsing;
pub mod qr;
pub mod tokens;
pub mod validation;

pub use models::{Address, AddressError, PaymentDescriptor, PaymentStatus};
pub use network::{ChainInfo, NetworkMode};
pub use parsing::AmountError;
pub use tokens::{TokenLookup, TokenRecord, UnknownTokenPolicy};

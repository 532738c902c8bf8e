mod cancellation_source;
mod cancellation_token;

pub use cancellation_source::CancellationSource;
pub use cancellation_token::CancellationToken;

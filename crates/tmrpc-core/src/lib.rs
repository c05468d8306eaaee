pub mod adaptor;
pub mod broadcaster;
pub mod client;
pub mod error;
pub mod requests;
pub mod responses;
pub mod rpc;
#[cfg(test)]
mod test_util;

pub use adaptor::{Adaptor, Version};
pub use broadcaster::{Broadcaster, Producer, ProducerError, Updater, Updates};
pub use client::{Client, EventFeed};
pub use error::{CoreError, DecodeError, RpcError};
pub use requests::{build_tx_query, QueryString, TxQuery};
pub use responses::{tx_commit_success, TxHash};
pub use rpc::TransportConfig;

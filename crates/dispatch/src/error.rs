use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] database::StoreError),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Order {0} is no longer cancellable")]
    NotCancellable(Uuid),
}

pub mod http;

pub use http::{
    build_router, get_current_block, get_status, get_transactions, subscribe, unsubscribe,
    AddressQuery, ApiError, ApiServer, AppState, CurrentBlockResponse, ErrorResponse,
    StatusResponse, SubscriptionResponse, TransactionsResponse,
};

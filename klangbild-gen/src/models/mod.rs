//! Data models for klangbild-gen

pub mod transaction;
pub mod view;

pub use transaction::{
    ErrorInfo, MusicTransition, StatusTransition, SynthesisBackend, Transaction,
    TransactionError,
};
pub use view::TransactionView;

pub mod chunk_receiver;
pub mod janitor;
pub mod range;
pub mod resource_store;

mod env;
pub use env::Env;

mod kv;
pub use kv::KeyValue;
